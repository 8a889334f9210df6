use num::complex::Complex64;

use crate::errors::Result;
use crate::green::MatsubaraGreen;
use crate::linalg::invert_complex;
use crate::matsubara::{semicircle_at, Tail};

/// Lattice relation closing the loop, $G\mapsto G^0$.
pub trait SelfConsistency {
    fn sites(&self) -> usize;

    /// Non interacting local Green's function, first guess of the loop.
    fn initial_guess(&self, beta: f64, n_freq: usize, mu: f64) -> MatsubaraGreen;

    /// Hybridisation function $\Delta(i\omega_n)$ seen by the impurity.
    fn hybridization(&self, g_iw: &MatsubaraGreen) -> MatsubaraGreen;

    /// $G^0=\[(i\omega_n+\mu)-h-\Delta\]^{-1}$.
    fn weiss_field(&self, g_iw: &MatsubaraGreen, mu: f64) -> Result<MatsubaraGreen>;

    /// Tails of the Weiss field blocks.
    fn weiss_tails(&self, mu: f64) -> Vec<Tail>;

    /// Tails of the local Green's function blocks.
    fn green_tails(&self, mu: f64) -> Vec<Tail> {
        self.weiss_tails(mu)
    }
}

/// Single band Bethe lattice with hopping $t$, $\Delta=t^2G$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetheLattice {
    pub t: f64,
}

impl SelfConsistency for BetheLattice {
    fn sites(&self) -> usize {
        1
    }

    fn initial_guess(&self, beta: f64, n_freq: usize, mu: f64) -> MatsubaraGreen {
        let mut out = MatsubaraGreen::zeros(beta, 1, n_freq);
        let wn = out.frequencies();
        out.data = wn
            .iter()
            .map(|&w| semicircle_at(Complex64::new(mu, w), 2.0 * self.t))
            .collect();
        out
    }

    fn hybridization(&self, g_iw: &MatsubaraGreen) -> MatsubaraGreen {
        let mut out = g_iw.clone();
        let t2 = self.t * self.t;
        out.data.iter_mut().for_each(|g| *g *= t2);
        out
    }

    fn weiss_field(&self, g_iw: &MatsubaraGreen, mu: f64) -> Result<MatsubaraGreen> {
        let delta = self.hybridization(g_iw);
        let mut out = delta.clone();
        for (g0, (d, w)) in out.data.iter_mut().zip(delta.data.iter().zip(g_iw.frequencies())) {
            *g0 = 1.0 / (Complex64::new(mu, w) - d);
        }
        Ok(out)
    }

    fn weiss_tails(&self, mu: f64) -> Vec<Tail> {
        vec![Tail::new(1.0, -mu, 0.0)]
    }
}

/// Bethe lattice of dimers. Intra dimer hopping $t_\perp$ enters the local
/// hamiltonian $h=t_\perp\sigma_x$, the lattice hopping matrix is
/// $T=\begin{pmatrix}t&t_{ab}\\\\t_{ab}&t\end{pmatrix}$ and $\Delta=TGT$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimerBethe {
    pub t: f64,
    pub tp: f64,
    pub tab: f64,
}

impl DimerBethe {
    fn hopping(&self) -> [f64; 4] {
        [self.t, self.tab, self.tab, self.t]
    }
}

fn matmul2(a: &[Complex64], b: &[Complex64]) -> [Complex64; 4] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
    ]
}

impl SelfConsistency for DimerBethe {
    fn sites(&self) -> usize {
        2
    }

    /// Bonding and antibonding bands decouple, each a semicircle of half
    /// bandwidth $2(t\pm t_{ab})$ shifted by $\mp t_\perp$.
    fn initial_guess(&self, beta: f64, n_freq: usize, mu: f64) -> MatsubaraGreen {
        let mut out = MatsubaraGreen::zeros(beta, 2, n_freq);
        let wn = out.frequencies();
        for (n, &w) in wn.iter().enumerate() {
            let bonding = semicircle_at(Complex64::new(mu - self.tp, w), 2.0 * <f64>::abs(self.t + self.tab));
            let antibonding = semicircle_at(Complex64::new(mu + self.tp, w), 2.0 * <f64>::abs(self.t - self.tab));
            let diag = 0.5 * (bonding + antibonding);
            let off = 0.5 * (bonding - antibonding);
            out.set_matrix_at(n, &[diag, off, off, diag]);
        }
        out
    }

    fn hybridization(&self, g_iw: &MatsubaraGreen) -> MatsubaraGreen {
        let t: Vec<Complex64> = self.hopping().iter().map(|x| Complex64::new(*x, 0.0)).collect();
        let mut out = g_iw.clone();
        for n in 0..g_iw.n_freq {
            let g = g_iw.matrix_at(n);
            out.set_matrix_at(n, &matmul2(&matmul2(&t, &g), &t));
        }
        out
    }

    fn weiss_field(&self, g_iw: &MatsubaraGreen, mu: f64) -> Result<MatsubaraGreen> {
        let delta = self.hybridization(g_iw);
        let mut out = delta.clone();
        for (n, w) in g_iw.frequencies().into_iter().enumerate() {
            let d = delta.matrix_at(n);
            let z = Complex64::new(mu, w);
            let tp = Complex64::new(self.tp, 0.0);
            let inverse = [z - d[0], -tp - d[1], -tp - d[2], z - d[3]];
            out.set_matrix_at(n, &invert_complex(&inverse, 2)?);
        }
        Ok(out)
    }

    fn weiss_tails(&self, mu: f64) -> Vec<Tail> {
        let diag = Tail::new(1.0, -mu, 0.0);
        let off = Tail::new(0.0, self.tp, 0.0);
        vec![diag, off, off, diag]
    }
}
