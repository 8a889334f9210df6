use num::complex::Complex64;

use crate::errors::{DmftError, Result};
use crate::matsubara::{gt_fouriertrans, gw_invfouriertrans, matsubara_frequencies, Tail};

/// Imaginary time Green's function $G_{ab}(\tau_l)$, $\tau_l=l\beta/L$.
/// Block $(a,b)$ lives at `data[(a*sites + b)*n_tau..]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GreenTau {
    pub beta: f64,
    pub sites: usize,
    pub n_tau: usize,
    pub data: Vec<f64>,
}

/// Matsubara Green's function $G_{ab}(i\omega_n)$ on the positive frequencies,
/// same block layout as [`GreenTau`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatsubaraGreen {
    pub beta: f64,
    pub sites: usize,
    pub n_freq: usize,
    pub data: Vec<Complex64>,
}

#[inline(always)]
fn block_range(sites: usize, len: usize, a: usize, b: usize) -> std::ops::Range<usize> {
    let start = (a * sites + b) * len;
    start..start + len
}

impl GreenTau {
    pub fn zeros(beta: f64, sites: usize, n_tau: usize) -> Self {
        GreenTau { beta, sites, n_tau, data: vec![0.0; sites * sites * n_tau] }
    }

    pub fn from_data(beta: f64, sites: usize, n_tau: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != sites * sites * n_tau {
            return Err(DmftError::configuration(format!(
                "Expected {} values for {} sites and {} slices, got {}.",
                sites * sites * n_tau,
                sites,
                n_tau,
                data.len()
            )));
        }
        Ok(GreenTau { beta, sites, n_tau, data })
    }

    /// Single site function.
    pub fn scalar(beta: f64, data: Vec<f64>) -> Self {
        let n_tau = data.len();
        GreenTau { beta, sites: 1, n_tau, data }
    }

    pub fn block(&self, a: usize, b: usize) -> &[f64] {
        &self.data[block_range(self.sites, self.n_tau, a, b)]
    }

    pub fn block_mut(&mut self, a: usize, b: usize) -> &mut [f64] {
        let range = block_range(self.sites, self.n_tau, a, b);
        &mut self.data[range]
    }

    pub fn taus(&self) -> Vec<f64> {
        let dtau = self.beta / self.n_tau as f64;
        (0..self.n_tau).map(|l| l as f64 * dtau).collect()
    }

    /// $G\leftarrow\alpha G+(1-\alpha)G_{\text{old}}$.
    pub fn mix(&mut self, previous: &GreenTau, alpha: f64) {
        for (new, old) in self.data.iter_mut().zip(previous.data.iter()) {
            *new = alpha * *new + (1.0 - alpha) * old;
        }
    }

    /// Transforms every block, `tails` is indexed like the blocks.
    pub fn to_matsubara(&self, n_freq: usize, tails: &[Tail]) -> MatsubaraGreen {
        let wn = matsubara_frequencies(self.beta, n_freq);
        let taus = self.taus();
        let mut out = MatsubaraGreen::zeros(self.beta, self.sites, n_freq);
        for a in 0..self.sites {
            for b in 0..self.sites {
                let tail = tails[a * self.sites + b];
                let giw = gt_fouriertrans(self.block(a, b), &taus, &wn, &tail, self.beta);
                out.block_mut(a, b).copy_from_slice(&giw);
            }
        }
        out
    }
}

impl MatsubaraGreen {
    pub fn zeros(beta: f64, sites: usize, n_freq: usize) -> Self {
        MatsubaraGreen {
            beta,
            sites,
            n_freq,
            data: vec![Complex64::new(0.0, 0.0); sites * sites * n_freq],
        }
    }

    pub fn frequencies(&self) -> Vec<f64> {
        matsubara_frequencies(self.beta, self.n_freq)
    }

    pub fn block(&self, a: usize, b: usize) -> &[Complex64] {
        &self.data[block_range(self.sites, self.n_freq, a, b)]
    }

    pub fn block_mut(&mut self, a: usize, b: usize) -> &mut [Complex64] {
        let range = block_range(self.sites, self.n_freq, a, b);
        &mut self.data[range]
    }

    /// $G_{ab}(i\omega_n)$ as a `sites`$\times$`sites` row major matrix.
    pub fn matrix_at(&self, n: usize) -> Vec<Complex64> {
        let mut out = Vec::with_capacity(self.sites * self.sites);
        for a in 0..self.sites {
            for b in 0..self.sites {
                out.push(self.block(a, b)[n]);
            }
        }
        out
    }

    pub fn set_matrix_at(&mut self, n: usize, m: &[Complex64]) {
        let sites = self.sites;
        for a in 0..sites {
            for b in 0..sites {
                self.block_mut(a, b)[n] = m[a * sites + b];
            }
        }
    }

    pub fn to_tau(&self, n_tau: usize, tails: &[Tail]) -> GreenTau {
        let wn = self.frequencies();
        let mut out = GreenTau::zeros(self.beta, self.sites, n_tau);
        let taus = out.taus();
        for a in 0..self.sites {
            for b in 0..self.sites {
                let tail = tails[a * self.sites + b];
                let gtau = gw_invfouriertrans(self.block(a, b), &taus, &wn, &tail, self.beta);
                out.block_mut(a, b).copy_from_slice(&gtau);
            }
        }
        out
    }

    /// $\max|G_{ab}(i\omega_n)-G'_{ab}(i\omega_n)|$ over the first `window`
    /// frequencies of every block.
    pub fn max_abs_diff(&self, other: &MatsubaraGreen, window: usize) -> f64 {
        let window = window.min(self.n_freq).min(other.n_freq);
        let mut dist: f64 = 0.0;
        for a in 0..self.sites {
            for b in 0..self.sites {
                for (x, y) in self.block(a, b)[..window].iter().zip(other.block(a, b)[..window].iter()) {
                    dist = dist.max((x - y).norm());
                }
            }
        }
        dist
    }
}
