use blas::dger;
use log::{debug, trace, warn};

use crate::errors::{DmftError, Result};
use crate::ising::{IsingField, Proposal};
use crate::linalg::{log_determinant, solve_in_place, SquareMatrix};

/// Sign of the field seen by each spin flavour, $v_\uparrow=v$, $v_\downarrow=-v$.
pub const FLAVOUR_SIGNS: [f64; 2] = [1.0, -1.0];

/// $B_{ij}=\delta_{ij}-(G^0_{ij}-\delta_{ij})(e^{v_j}-1)$
fn build_b(g0: &SquareMatrix, v: &[f64]) -> SquareMatrix {
    let n = g0.dim();
    let mut b = SquareMatrix::identity(n);
    for j in 0..n {
        let d = <f64>::exp_m1(v[j]);
        for i in 0..n {
            let delta = if i == j { 1.0 } else { 0.0 };
            b.set(i, j, delta - (g0.get(i, j) - delta) * d);
        }
    }
    b
}

/// Interacting Green's function of one flavour for a fixed field.
#[derive(Debug, Clone)]
pub struct GreenMatrix {
    g: SquareMatrix,
}

fn check_field_length(g0: &SquareMatrix, v: &[f64]) -> Result<()> {
    if v.len() != g0.dim() {
        return Err(DmftError::configuration(format!(
            "Field of length {} does not match a Weiss kernel of dimension {}.",
            v.len(),
            g0.dim()
        )));
    }
    Ok(())
}

impl GreenMatrix {
    /// Reference computation, solves $BG=G^0$.
    pub fn clean_build(g0: &SquareMatrix, v: &[f64]) -> Result<Self> {
        check_field_length(g0, v)?;
        let mut b = build_b(g0, v);
        let mut g = g0.clone();
        solve_in_place(&mut b, &mut g)?;
        Ok(GreenMatrix { g })
    }

    /// Sign and $\ln|\det B|$, the configuration weight up to a constant.
    pub fn log_weight(g0: &SquareMatrix, v: &[f64]) -> Result<(f64, f64)> {
        check_field_length(g0, v)?;
        log_determinant(&build_b(g0, v))
    }

    pub fn matrix(&self) -> &SquareMatrix {
        &self.g
    }

    pub fn dim(&self) -> usize {
        self.g.dim()
    }

    /// $R=1+(1-G_{kk})(e^{\Delta v}-1)$
    #[inline(always)]
    pub fn single_flip_ratio(&self, k: usize, delta_v: f64) -> f64 {
        1.0 + (1.0 - self.g.get(k, k)) * <f64>::exp_m1(delta_v)
    }

    /// Rank one update
    /// $G'=G+\frac{e^{\Delta v}-1}{R}(G-I)_{:,k}G_{k,:}$.
    pub fn apply_single_flip(&mut self, k: usize, delta_v: f64) {
        let ratio = self.single_flip_ratio(k, delta_v);
        let alpha = <f64>::exp_m1(delta_v) / ratio;
        let n = self.g.dim();
        let mut x = self.g.column(k).to_vec();
        x[k] -= 1.0;
        let y = self.g.row(k);
        unsafe {
            dger(n as i32, n as i32, alpha, &x, 1, &y, 1, self.g.as_mut_slice(), n as i32);
        }
    }

    /// $2\times2$ matrix $M_{ab}=\delta_{ab}+(\delta_{ab}-G_{k_ak_b})d_b$,
    /// $d=e^{\Delta v}-1$, row major.
    fn double_flip_m(&self, l: usize, k: usize, dv_l: f64, dv_k: f64) -> [f64; 4] {
        let d = [<f64>::exp_m1(dv_l), <f64>::exp_m1(dv_k)];
        let idx = [l, k];
        let mut m = [0.0; 4];
        for a in 0..2 {
            for b in 0..2 {
                let delta = if a == b { 1.0 } else { 0.0 };
                m[2 * a + b] = delta + (delta - self.g.get(idx[a], idx[b])) * d[b];
            }
        }
        m
    }

    /// $\det M$
    pub fn double_flip_ratio(&self, l: usize, k: usize, dv_l: f64, dv_k: f64) -> f64 {
        let m = self.double_flip_m(l, k, dv_l, dv_k);
        m[0] * m[3] - m[1] * m[2]
    }

    /// Rank two update, $G'=G+(G-I)_{:,K}DM^{-1}G_{K,:}$.
    pub fn apply_double_flip(&mut self, l: usize, k: usize, dv_l: f64, dv_k: f64) {
        let m = self.double_flip_m(l, k, dv_l, dv_k);
        let det = m[0] * m[3] - m[1] * m[2];
        let minv = [m[3] / det, -m[1] / det, -m[2] / det, m[0] / det];
        let d = [<f64>::exp_m1(dv_l), <f64>::exp_m1(dv_k)];
        let idx = [l, k];
        let n = self.g.dim();
        let rows = [self.g.row(l), self.g.row(k)];
        let mut cols = [self.g.column(l).to_vec(), self.g.column(k).to_vec()];
        cols[0][l] -= 1.0;
        cols[1][k] -= 1.0;
        for a in 0..2 {
            // Y_a = sum_b d_a (M^-1)_ab G_{k_b,:}
            let c0 = d[a] * minv[2 * a];
            let c1 = d[a] * minv[2 * a + 1];
            let y: Vec<f64> = rows[0].iter().zip(rows[1].iter()).map(|(r0, r1)| c0 * r0 + c1 * r1).collect();
            trace!("Rank two update column {} with coefficients ({}, {}).", idx[a], c0, c1);
            unsafe {
                dger(n as i32, n as i32, 1.0, &cols[a], 1, &y, 1, self.g.as_mut_slice(), n as i32);
            }
        }
    }
}

/// Drift control of the fast updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateTolerances {
    /// Accepted fast updates between two clean builds.
    pub resync_interval: usize,
    /// Largest allowed deviation at a resync before it is reported.
    pub tolerance_drift: f64,
    /// Smallest update denominator still used for a fast update.
    pub tolerance_singularity: f64,
}

impl Default for UpdateTolerances {
    fn default() -> Self {
        UpdateTolerances {
            resync_interval: 100,
            tolerance_drift: 1e-8,
            tolerance_singularity: 1e-12,
        }
    }
}

/// Owns $G^0_\sigma$ and $G_\sigma$ for both spin flavours during one sampling
/// run and keeps $G_\sigma$ consistent with the Ising field.
#[derive(Debug, Clone)]
pub struct FastUpdateEngine {
    weiss: Vec<SquareMatrix>,
    greens: Vec<GreenMatrix>,
    tolerances: UpdateTolerances,
    accepted_since_resync: usize,
    pub forced_resyncs: usize,
    pub drift_warnings: usize,
    pub max_drift: f64,
}

fn flavour_field(values: &[f64], sign: f64) -> Vec<f64> {
    values.iter().map(|v| sign * v).collect()
}

impl FastUpdateEngine {
    /// `weiss` holds one kernel per flavour (up then down).
    pub fn new(weiss: Vec<SquareMatrix>, field: &IsingField, tolerances: UpdateTolerances) -> Result<Self> {
        if weiss.len() != FLAVOUR_SIGNS.len() {
            return Err(DmftError::configuration(format!(
                "Expected {} Weiss kernels, got {}.",
                FLAVOUR_SIGNS.len(),
                weiss.len()
            )));
        }
        let mut greens = Vec::with_capacity(weiss.len());
        for (g0, sign) in weiss.iter().zip(FLAVOUR_SIGNS.iter()) {
            greens.push(GreenMatrix::clean_build(g0, &flavour_field(field.values(), *sign))?);
        }
        Ok(FastUpdateEngine {
            weiss,
            greens,
            tolerances,
            accepted_since_resync: 0,
            forced_resyncs: 0,
            drift_warnings: 0,
            max_drift: 0.0,
        })
    }

    pub fn greens(&self) -> &[GreenMatrix] {
        &self.greens
    }

    pub fn weiss(&self) -> &[SquareMatrix] {
        &self.weiss
    }

    fn log_weight(&self, values: &[f64]) -> Result<(f64, f64)> {
        let mut sign = 1.0;
        let mut logw = 0.0;
        for (g0, s) in self.weiss.iter().zip(FLAVOUR_SIGNS.iter()) {
            let (sg, lw) = GreenMatrix::log_weight(g0, &flavour_field(values, *s))?;
            sign *= sg;
            logw += lw;
        }
        Ok((sign, logw))
    }

    /// Weight ratio of the pending move on `field`, product over flavours.
    /// The global flip is evaluated from full determinants.
    pub fn ratio(&self, proposal: &Proposal, field: &IsingField) -> Result<f64> {
        match *proposal {
            Proposal::Single { index, delta_v } => Ok(self
                .greens
                .iter()
                .zip(FLAVOUR_SIGNS.iter())
                .map(|(g, s)| g.single_flip_ratio(index, s * delta_v))
                .product()),
            Proposal::Double { first, delta_first, second, delta_second } => Ok(self
                .greens
                .iter()
                .zip(FLAVOUR_SIGNS.iter())
                .map(|(g, s)| g.double_flip_ratio(first, second, s * delta_first, s * delta_second))
                .product()),
            Proposal::Global => {
                let (s0, w0) = self.log_weight(field.values())?;
                let (s1, w1) = self.log_weight(&field.proposed_values()?)?;
                if s0 == 0.0 {
                    warn!("Current configuration has a zero weight, global flip rejected.");
                    return Ok(0.0);
                }
                Ok(s0 * s1 * <f64>::exp(w1 - w0))
            }
        }
    }

    /// Brings $G_\sigma$ to the accepted configuration. `field` must already
    /// hold the flipped values.
    pub fn apply(&mut self, proposal: &Proposal, field: &IsingField) -> Result<()> {
        match *proposal {
            Proposal::Single { index, delta_v } => {
                let too_small = self
                    .greens
                    .iter()
                    .zip(FLAVOUR_SIGNS.iter())
                    .any(|(g, s)| <f64>::abs(g.single_flip_ratio(index, s * delta_v)) < self.tolerances.tolerance_singularity);
                if too_small {
                    return self.force_clean_build(field);
                }
                for (g, s) in self.greens.iter_mut().zip(FLAVOUR_SIGNS.iter()) {
                    g.apply_single_flip(index, s * delta_v);
                }
            }
            Proposal::Double { first, delta_first, second, delta_second } => {
                let too_small = self.greens.iter().zip(FLAVOUR_SIGNS.iter()).any(|(g, s)| {
                    <f64>::abs(g.double_flip_ratio(first, second, s * delta_first, s * delta_second))
                        < self.tolerances.tolerance_singularity
                });
                if too_small {
                    return self.force_clean_build(field);
                }
                for (g, s) in self.greens.iter_mut().zip(FLAVOUR_SIGNS.iter()) {
                    g.apply_double_flip(first, second, s * delta_first, s * delta_second);
                }
            }
            Proposal::Global => {
                self.rebuild(field)?;
                self.accepted_since_resync = 0;
                return Ok(());
            }
        }
        self.accepted_since_resync += 1;
        // Clean update once in a while
        if self.accepted_since_resync >= self.tolerances.resync_interval {
            self.resync(field)?;
        }
        Ok(())
    }

    fn rebuild(&mut self, field: &IsingField) -> Result<()> {
        for ((g, g0), s) in self.greens.iter_mut().zip(self.weiss.iter()).zip(FLAVOUR_SIGNS.iter()) {
            *g = GreenMatrix::clean_build(g0, &flavour_field(field.values(), *s))?;
        }
        Ok(())
    }

    fn force_clean_build(&mut self, field: &IsingField) -> Result<()> {
        warn!(
            "Update denominator below {:e}, forcing a clean build.",
            self.tolerances.tolerance_singularity
        );
        self.forced_resyncs += 1;
        self.accepted_since_resync = 0;
        self.rebuild(field)
    }

    /// Replaces $G_\sigma$ by a clean build and returns the largest deviation
    /// accumulated by the fast updates.
    pub fn resync(&mut self, field: &IsingField) -> Result<f64> {
        let mut drift: f64 = 0.0;
        for ((g, g0), s) in self.greens.iter_mut().zip(self.weiss.iter()).zip(FLAVOUR_SIGNS.iter()) {
            let clean = GreenMatrix::clean_build(g0, &flavour_field(field.values(), *s))?;
            drift = drift.max(clean.g.max_abs_diff(&g.g));
            *g = clean;
        }
        if drift >= self.tolerances.tolerance_drift {
            self.drift_warnings += 1;
            warn!(
                "Sherman-Morrisson update error of {:.2e} on G after {} updates. Tolerence is : {:e}.",
                drift, self.accepted_since_resync, self.tolerances.tolerance_drift
            );
        } else {
            debug!("Resync after {} updates, drift {:.2e}.", self.accepted_since_resync, drift);
        }
        self.max_drift = self.max_drift.max(drift);
        self.accepted_since_resync = 0;
        Ok(drift)
    }
}
