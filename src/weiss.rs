use crate::linalg::SquareMatrix;

/// Expands the one sided array $g_0(\tau_l)$ into the $L\times L$ antiperiodic
/// kernel
///
/// $$
/// G^0_{ij}=\begin{cases}g_0\[i-j\] & i\geq j\\\\ -g_0\[i-j+L\] & i<j\end{cases}
/// $$
pub fn build_retarded_weiss(g0_raw: &[f64]) -> SquareMatrix {
    build_block_weiss(g0_raw, 1, g0_raw.len())
}

/// Same fold for every $(a,b)$ block of a `sites`$\cdot L$ matrix. `blocks`
/// stores block $(a,b)$ at `(a*sites + b)*n_slices`, matrix row `a*L + i`
/// belongs to site `a` and slice `i`.
pub fn build_block_weiss(blocks: &[f64], sites: usize, n_slices: usize) -> SquareMatrix {
    let dim = sites * n_slices;
    let mut out = SquareMatrix::zeros(dim);
    for a in 0..sites {
        for b in 0..sites {
            let raw = &blocks[(a * sites + b) * n_slices..(a * sites + b + 1) * n_slices];
            for j in 0..n_slices {
                for i in 0..n_slices {
                    let value = if i >= j {
                        raw[i - j]
                    } else {
                        -raw[i + n_slices - j]
                    };
                    out.set(a * n_slices + i, b * n_slices + j, value);
                }
            }
        }
    }
    out
}

/// Inverse of [`build_block_weiss`] for a translation invariant matrix, and
/// the estimator of $g_{ab}(\tau_k)$ for a sampled one:
///
/// $$
/// g(\tau_k)=\frac1L\Big\[\sum_{i-j=k}G_{ij}-\sum_{i-j=k-L}G_{ij}\Big\]
/// $$
pub fn translation_average(matrix: &SquareMatrix, sites: usize, n_slices: usize) -> Vec<f64> {
    let mut out = vec![0.0; sites * sites * n_slices];
    accumulate_translation_average(matrix, sites, n_slices, 1.0, &mut out);
    out
}

/// Adds `weight` times the translation average of `matrix` to `out`.
pub fn accumulate_translation_average(
    matrix: &SquareMatrix,
    sites: usize,
    n_slices: usize,
    weight: f64,
    out: &mut [f64],
) {
    let norm = weight / n_slices as f64;
    for a in 0..sites {
        for b in 0..sites {
            let offset = (a * sites + b) * n_slices;
            for j in 0..n_slices {
                let col = matrix.column(b * n_slices + j);
                let col = &col[a * n_slices..(a + 1) * n_slices];
                for (i, g) in col.iter().enumerate() {
                    if i >= j {
                        out[offset + i - j] += norm * g;
                    } else {
                        out[offset + i + n_slices - j] -= norm * g;
                    }
                }
            }
        }
    }
}
