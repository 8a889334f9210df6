use blas::dcopy;
use lapack::{dgesv, dgetrf, zgesv};
use log::trace;
use num::complex::Complex64;

use crate::errors::{DmftError, Result};

/// Dense square matrix stored column major, $A_{ij}$ at `data[i + j*n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    pub fn zeros(n: usize) -> Self {
        SquareMatrix { n, data: vec![0.0; n * n] }
    }

    pub fn identity(n: usize) -> Self {
        let mut out = SquareMatrix::zeros(n);
        for i in 0..n {
            out.data[i + i * n] = 1.0;
        }
        out
    }

    /// Wraps column major data. The length must be a perfect square of `n`.
    pub fn from_col_major(n: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n * n {
            return Err(DmftError::configuration(format!(
                "Expected {} elements for a {}x{} matrix, got {}.",
                n * n,
                n,
                n,
                data.len()
            )));
        }
        Ok(SquareMatrix { n, data })
    }

    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.n
    }

    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i + j * self.n]
    }

    #[inline(always)]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i + j * self.n] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Column `j`, contiguous in memory.
    pub fn column(&self, j: usize) -> &[f64] {
        &self.data[j * self.n..(j + 1) * self.n]
    }

    /// Copy of row `i`.
    pub fn row(&self, i: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.n];
        let n = self.n as i32;
        unsafe {
            dcopy(n, &self.data[i..], n, &mut out, 1);
        }
        out
    }

    /// Largest $|A_{ij}-B_{ij}|$.
    pub fn max_abs_diff(&self, other: &SquareMatrix) -> f64 {
        self.data
            .iter()
            .zip(other.data.iter())
            .fold(0.0, |acc, (a, b)| <f64>::max(acc, <f64>::abs(a - b)))
    }

    /// Largest $|A_{ij}|$.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, a| <f64>::max(acc, <f64>::abs(*a)))
    }
}

/// Sign and $\ln|\det A|$ from the LU factorisation of `a`.
/// An exactly singular matrix gives a sign of zero and $-\infty$.
pub fn log_determinant(a: &SquareMatrix) -> Result<(f64, f64)> {
    let n = a.dim() as i32;
    let mut lu = a.data.clone();
    let mut ipiv = vec![0; a.dim()];
    let mut info = 0;
    unsafe {
        dgetrf(n, n, &mut lu, n, &mut ipiv, &mut info);
    }
    if info < 0 {
        return Err(DmftError::Singular {
            details: format!("dgetrf got an illegal value at argument {}.", -info),
        });
    }
    if info > 0 {
        trace!("Exact zero pivot at U[{}, {}].", info - 1, info - 1);
        return Ok((0.0, <f64>::NEG_INFINITY));
    }
    let mut sign = 1.0;
    let mut logdet = 0.0;
    for i in 0..a.dim() {
        let pivot = lu[i + i * a.dim()];
        // LAPACK pivots are 1-based.
        if ipiv[i] != (i + 1) as i32 {
            sign = -sign;
        }
        if pivot < 0.0 {
            sign = -sign;
        }
        logdet += <f64>::ln(<f64>::abs(pivot));
    }
    Ok((sign, logdet))
}

pub fn determinant(a: &SquareMatrix) -> Result<f64> {
    let (sign, logdet) = log_determinant(a)?;
    Ok(sign * <f64>::exp(logdet))
}

/// Solves $AX=B$, overwriting `b` with $X$. `a` is destroyed (LU factors).
pub fn solve_in_place(a: &mut SquareMatrix, b: &mut SquareMatrix) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(DmftError::configuration(format!(
            "Dimension mismatch in linear solve, {} against {}.",
            a.dim(),
            b.dim()
        )));
    }
    let n = a.dim() as i32;
    let mut ipiv = vec![0; a.dim()];
    let mut info = 0;
    unsafe {
        dgesv(n, n, &mut a.data, n, &mut ipiv, &mut b.data, n, &mut info);
    }
    if info < 0 {
        return Err(DmftError::Singular {
            details: format!("dgesv got an illegal value at argument {}.", -info),
        });
    }
    if info > 0 {
        return Err(DmftError::Singular {
            details: format!("dgesv found U[{}, {}] = 0.", info - 1, info - 1),
        });
    }
    Ok(())
}

/// Inverse of a small dense complex matrix. Storage order is preserved, a row
/// major input gives a row major inverse.
pub fn invert_complex(m: &[Complex64], n: usize) -> Result<Vec<Complex64>> {
    if m.len() != n * n {
        return Err(DmftError::configuration(format!(
            "Expected {} elements for a {}x{} matrix, got {}.",
            n * n,
            n,
            n,
            m.len()
        )));
    }
    let mut a = m.to_vec();
    let mut b = vec![Complex64::new(0.0, 0.0); n * n];
    for i in 0..n {
        b[i + i * n] = Complex64::new(1.0, 0.0);
    }
    let mut ipiv = vec![0; n];
    let mut info = 0;
    unsafe {
        zgesv(n as i32, n as i32, &mut a, n as i32, &mut ipiv, &mut b, n as i32, &mut info);
    }
    if info != 0 {
        return Err(DmftError::Singular {
            details: format!("zgesv returned info = {}.", info),
        });
    }
    Ok(b)
}
