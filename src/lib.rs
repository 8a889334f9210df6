// Links the LAPACK and BLAS symbols.
extern crate intel_mkl_src as _;

/// Error type shared by every module.
pub mod errors;

/// Input file parsing util.
/// # Subfiles
/// * __`params.csv`__ - Run parameters. In csv format, 2 columns, first the
/// key then the value.
pub mod parse;

/// Run parameters and their validation.
pub mod params;

/// Uniform imaginary time grid
/// # Definition
/// $$
/// \tau_l=l\Delta\tau,\quad \Delta\tau=\frac{\beta}{L},\quad l=0,\dots,L-1
/// $$
/// Fermionic functions are antiperiodic, $G(\tau-\beta)=-G(\tau)$.
pub mod grid;

/// Matsubara frequencies, high frequency tails and the transforms between
/// imaginary time and frequency.
/// # Definition
/// $$
/// G(\tau)=\frac1\beta\sum_n e^{-i\omega_n\tau}G(i\omega_n),\quad
/// \omega_n=\frac{(2n+1)\pi}{\beta}
/// $$
/// with the tail
/// $$
/// G(i\omega_n)\simeq\frac{c_1}{i\omega_n}+\frac{c_2}{(i\omega_n)^2}+\frac{c_3}{(i\omega_n)^3}
/// $$
/// summed analytically.
pub mod matsubara;

/// Green's functions on the grid and on the Matsubara axis, one block per
/// pair of sites.
pub mod green;

/// Dense column major matrices and the LAPACK calls on them.
pub mod linalg;

/// Retarded Weiss field matrix
/// # Definition
/// The kernel of the sampler is the $L\times L$ matrix
/// $$
/// G^0_{ij}=\begin{cases}g^0(\tau_i-\tau_j)&i\geq j\\\\
/// -g^0(\tau_i-\tau_j+\beta)&i<j\end{cases}
/// $$
/// built from the $L$ values $g^0(\tau_l)=-G^0(\tau_l)$.
pub mod weiss;

/// Discrete Hubbard-Stratonovich field
/// # Definition
/// The interaction on each slice is decoupled with
/// $$
/// e^{-\Delta\tau Un_\uparrow n_\downarrow}\propto\sum_{s=\pm1}
/// e^{\lambda s(n_\uparrow-n_\downarrow)},\quad
/// \cosh\lambda=e^{\Delta\tau U/2}
/// $$
/// so that each flavour sees the potential $v_l=\pm\lambda s_l$.
pub mod ising;

/// Green's function matrices of one field configuration and their rank one
/// and rank two updates.
/// # Definition
/// $$
/// B=1-(G^0-1)(e^{V}-1),\quad BG=G^0
/// $$
/// Flipping entry $k$ changes the weight by
/// $$
/// R=1+(1-G_{kk})(e^{\Delta v}-1)
/// $$
/// and the Green's function by
/// $$
/// G'=G+\frac{e^{\Delta v}-1}{R}(G-1)_{:,k}G_{k,:}
/// $$
pub mod fast_update;

/// Measurements, acceptance statistics and autocorrelation estimate.
pub mod accumulator;

/// Metropolis sampling of the auxiliary field.
pub mod monte_carlo;

/// Impurity solvers, Hirsch-Fye and second order perturbation theory.
pub mod solver;

/// Self-consistency relations of the Bethe lattice and of the dimer Bethe
/// lattice.
/// # Definition
/// $$
/// G^0(i\omega_n)^{-1}=i\omega_n+\mu-t^2G(i\omega_n)
/// $$
pub mod lattice;

/// Collectives between the Markov chains of one loop.
pub mod comm;

/// On disk storage of the iterations.
pub mod archive;

/// Self-consistency loop.
pub mod dmft;

pub use dmft::{run_with_workers, DmftLoop, DmftOutcome, LoopState};
pub use errors::{DmftError, Result};
pub use grid::ImaginaryTimeGrid;
pub use params::DmftParams;
