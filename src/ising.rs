use log::trace;
use rand::Rng;
use rand_mt::Mt64;

use crate::errors::{DmftError, Result};

/// Hubbard-Stratonovich coupling, $\cosh\lambda=e^{U\Delta\tau/2}$.
pub fn lambda(dtau: f64, u: f64) -> f64 {
    <f64>::acosh(<f64>::exp(0.5 * u * dtau))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Uninitialized,
    Seeded,
    Proposed,
    Accepted,
    Rejected,
    Finalized,
}

/// A pending move. $\Delta v$ is given for the up flavour, the down flavour
/// sees $-\Delta v$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proposal {
    Single { index: usize, delta_v: f64 },
    Double { first: usize, delta_first: f64, second: usize, delta_second: f64 },
    Global,
}

/// Auxiliary Ising field $v_{l}\in\{\pm\lambda\}$, one entry per slice and per
/// site, entry `site*L + l`.
#[derive(Debug, Clone)]
pub struct IsingField {
    values: Vec<f64>,
    lambda: f64,
    n_slices: usize,
    n_sites: usize,
    state: FieldState,
    pending: Option<Proposal>,
}

impl IsingField {
    pub fn uninitialized(n_slices: usize, n_sites: usize) -> Self {
        IsingField {
            values: vec![0.0; n_slices * n_sites],
            lambda: 0.0,
            n_slices,
            n_sites,
            state: FieldState::Uninitialized,
            pending: None,
        }
    }

    /// Draws every entry, $+\lambda$ with probability `polarization`.
    /// Deterministic in `rng_seed`.
    pub fn seed(&mut self, dtau: f64, u: f64, rng_seed: u64, polarization: f64) -> Result<()> {
        if self.state != FieldState::Uninitialized {
            return Err(DmftError::configuration("Ising field was already seeded."));
        }
        if !(0.0..=1.0).contains(&polarization) {
            return Err(DmftError::configuration(format!(
                "Spin polarization must be in [0, 1], got {}.",
                polarization
            )));
        }
        let mut rng = Mt64::new(rng_seed);
        self.lambda = lambda(dtau, u);
        for v in self.values.iter_mut() {
            *v = if rng.gen::<f64>() < polarization { self.lambda } else { -self.lambda };
        }
        trace!("Seeded field with lambda = {}: {:?}", self.lambda, self.values);
        self.state = FieldState::Seeded;
        Ok(())
    }

    pub fn seeded(
        n_slices: usize,
        n_sites: usize,
        dtau: f64,
        u: f64,
        rng_seed: u64,
        polarization: f64,
    ) -> Result<Self> {
        let mut field = IsingField::uninitialized(n_slices, n_sites);
        field.seed(dtau, u, rng_seed, polarization)?;
        Ok(field)
    }

    /// Field with given entries, each must be $\pm\lambda$ up to sign.
    pub fn from_values(values: Vec<f64>, n_sites: usize) -> Result<Self> {
        if n_sites == 0 || values.len() % n_sites != 0 || values.is_empty() {
            return Err(DmftError::configuration(format!(
                "Cannot split {} field entries over {} sites.",
                values.len(),
                n_sites
            )));
        }
        let lambda = <f64>::abs(values[0]);
        if values.iter().any(|v| <f64>::abs(<f64>::abs(*v) - lambda) > 1e-12 * lambda.max(1.0)) {
            return Err(DmftError::configuration("Field entries must all be +-lambda."));
        }
        Ok(IsingField {
            n_slices: values.len() / n_sites,
            values,
            lambda,
            n_sites,
            state: FieldState::Seeded,
            pending: None,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_slices(&self) -> usize {
        self.n_slices
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    /// $\sum_l v_l/(\lambda N)$.
    pub fn magnetization(&self) -> f64 {
        if self.lambda == 0.0 {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / (self.lambda * self.len() as f64)
    }

    fn check_can_propose(&self) -> Result<()> {
        match self.state {
            FieldState::Seeded | FieldState::Accepted | FieldState::Rejected => Ok(()),
            FieldState::Proposed => Err(DmftError::configuration(
                "A proposal is already pending on the Ising field.",
            )),
            FieldState::Uninitialized | FieldState::Finalized => Err(DmftError::configuration(
                format!("Cannot propose a move on a field in state {:?}.", self.state),
            )),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.values.len() {
            return Err(DmftError::IndexOutOfRange { index, len: self.values.len() });
        }
        Ok(())
    }

    fn pend(&mut self, proposal: Proposal) -> Proposal {
        self.pending = Some(proposal);
        self.state = FieldState::Proposed;
        proposal
    }

    pub fn propose_single_flip(&mut self, index: usize) -> Result<Proposal> {
        self.check_can_propose()?;
        self.check_index(index)?;
        Ok(self.pend(Proposal::Single { index, delta_v: -2.0 * self.values[index] }))
    }

    pub fn propose_double_flip(&mut self, first: usize, second: usize) -> Result<Proposal> {
        self.check_can_propose()?;
        self.check_index(first)?;
        self.check_index(second)?;
        if first == second {
            return Err(DmftError::configuration(format!(
                "Double flip needs two distinct entries, got {} twice.",
                first
            )));
        }
        Ok(self.pend(Proposal::Double {
            first,
            delta_first: -2.0 * self.values[first],
            second,
            delta_second: -2.0 * self.values[second],
        }))
    }

    pub fn propose_global_flip(&mut self) -> Result<Proposal> {
        self.check_can_propose()?;
        Ok(self.pend(Proposal::Global))
    }

    /// Values the field would take if the pending move is accepted.
    pub fn proposed_values(&self) -> Result<Vec<f64>> {
        let proposal = self.pending.ok_or_else(|| {
            DmftError::configuration("No pending proposal on the Ising field.")
        })?;
        let mut values = self.values.clone();
        flip(&mut values, &proposal);
        Ok(values)
    }

    /// Applies the pending move and returns it.
    pub fn accept(&mut self) -> Result<Proposal> {
        let proposal = self.pending.take().ok_or_else(|| {
            DmftError::configuration("Accept called without a pending proposal.")
        })?;
        flip(&mut self.values, &proposal);
        self.state = FieldState::Accepted;
        Ok(proposal)
    }

    pub fn reject(&mut self) -> Result<()> {
        if self.pending.take().is_none() {
            return Err(DmftError::configuration("Reject called without a pending proposal."));
        }
        self.state = FieldState::Rejected;
        Ok(())
    }

    /// Ends the run, further proposals fail.
    pub fn finalize(&mut self) {
        self.pending = None;
        self.state = FieldState::Finalized;
    }
}

fn flip(values: &mut [f64], proposal: &Proposal) {
    match *proposal {
        Proposal::Single { index, .. } => values[index] = -values[index],
        Proposal::Double { first, second, .. } => {
            values[first] = -values[first];
            values[second] = -values[second];
        }
        Proposal::Global => values.iter_mut().for_each(|v| *v = -*v),
    }
}

#[cfg(test)]
mod test {
    use assert::close;

    use super::*;

    #[test]
    fn coupling() {
        let l = lambda(0.5, 2.0);
        close(<f64>::cosh(l), <f64>::exp(0.5), 1e-14);
        close(lambda(0.5, 0.0), 0.0, 0.0);
    }

    #[test]
    fn seeding_is_deterministic() {
        let a = IsingField::seeded(32, 1, 0.5, 2.0, 4213, 0.5).unwrap();
        let b = IsingField::seeded(32, 1, 0.5, 2.0, 4213, 0.5).unwrap();
        let c = IsingField::seeded(32, 1, 0.5, 2.0, 4214, 0.5).unwrap();
        assert_eq!(a.values(), b.values());
        assert_ne!(a.values(), c.values());
        assert!(a.values().iter().all(|v| <f64>::abs(<f64>::abs(*v) - a.lambda()) < 1e-15));
        let up = IsingField::seeded(16, 2, 0.5, 2.0, 1, 1.0).unwrap();
        close(up.magnetization(), 1.0, 1e-15);
    }

    #[test]
    fn state_machine() {
        let mut field = IsingField::uninitialized(4, 1);
        assert_eq!(field.state(), FieldState::Uninitialized);
        assert!(field.propose_single_flip(0).is_err());
        field.seed(0.5, 2.0, 7, 0.5).unwrap();
        assert!(field.seed(0.5, 2.0, 7, 0.5).is_err());

        let before = field.values()[2];
        let p = field.propose_single_flip(2).unwrap();
        assert_eq!(p, Proposal::Single { index: 2, delta_v: -2.0 * before });
        assert_eq!(field.state(), FieldState::Proposed);
        assert!(field.propose_global_flip().is_err());
        field.reject().unwrap();
        assert_eq!(field.values()[2], before);

        field.propose_single_flip(2).unwrap();
        field.accept().unwrap();
        assert_eq!(field.state(), FieldState::Accepted);
        assert_eq!(field.values()[2], -before);
        assert!(field.accept().is_err());

        field.finalize();
        assert!(field.propose_global_flip().is_err());
    }

    #[test]
    fn invalid_proposals() {
        let mut field = IsingField::seeded(4, 1, 0.5, 2.0, 7, 0.5).unwrap();
        assert_eq!(
            field.propose_single_flip(4),
            Err(DmftError::IndexOutOfRange { index: 4, len: 4 })
        );
        assert!(field.propose_double_flip(1, 1).is_err());
        assert!(field.propose_double_flip(1, 9).is_err());
        assert_eq!(field.state(), FieldState::Seeded);
    }

    #[test]
    fn global_and_double_flip() {
        let mut field = IsingField::seeded(8, 1, 0.5, 2.0, 11, 0.5).unwrap();
        let before = field.values().to_vec();
        field.propose_global_flip().unwrap();
        let proposed = field.proposed_values().unwrap();
        field.accept().unwrap();
        assert_eq!(field.values(), &proposed[..]);
        for (a, b) in before.iter().zip(field.values()) {
            close(*a, -*b, 0.0);
        }
        field.propose_double_flip(0, 5).unwrap();
        field.accept().unwrap();
        close(field.values()[0], before[0], 0.0);
        close(field.values()[5], before[5], 0.0);
        close(field.values()[1], -before[1], 0.0);
    }
}
