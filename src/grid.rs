use crate::errors::{DmftError, Result};

/// Uniform discretisation of $\[0,\beta)$ in $L$ slices, $\tau_l=l\Delta\tau$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImaginaryTimeGrid {
    beta: f64,
    n_slices: usize,
}

impl ImaginaryTimeGrid {
    pub fn new(beta: f64, n_slices: usize) -> Result<Self> {
        if !beta.is_finite() || beta <= 0.0 || n_slices == 0 {
            return Err(DmftError::InvalidGrid { beta, n_slices });
        }
        Ok(ImaginaryTimeGrid { beta, n_slices })
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn n_slices(&self) -> usize {
        self.n_slices
    }

    pub fn dtau(&self) -> f64 {
        self.beta / self.n_slices as f64
    }

    pub fn tau(&self, l: usize) -> f64 {
        l as f64 * self.dtau()
    }

    pub fn taus(&self) -> Vec<f64> {
        (0..self.n_slices).map(|l| self.tau(l)).collect()
    }

    /// Slice containing `tau` once folded in $\[0,\beta)$.
    pub fn slice_of(&self, tau: f64) -> usize {
        let (tau, _) = self.wrap(tau);
        let l = <f64>::floor(tau / self.dtau()) as usize;
        l.min(self.n_slices - 1)
    }

    /// Antiperiodic fold, $G(\tau+\beta)=-G(\tau)$.
    /// Returns the folded time and the sign picked up on the way.
    pub fn wrap(&self, tau: f64) -> (f64, f64) {
        let periods = <f64>::floor(tau / self.beta);
        let folded = tau - periods * self.beta;
        let sign = if (periods as i64).rem_euclid(2) == 0 { 1.0 } else { -1.0 };
        // Rounding can land exactly on beta.
        if folded >= self.beta {
            return (folded - self.beta, -sign);
        }
        (folded, sign)
    }
}
