//! Least-squares Fits

use ndarray::{Array1, Array2};

use crate::VectorError;

/// Relative pivot size below which the normal equations count as singular
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// Project `target` onto the span of `regressors`.
///
/// Returns `X (XᵀX)⁻¹ Xᵀ y`, the fitted values. Fails with
/// [`VectorError::Singular`] when the regressors are linearly dependent.
pub fn least_squares_fit(regressors: &[&[f64]], target: &[f64]) -> Result<Vec<f64>, VectorError> {
    let n = target.len();
    let p = regressors.len();
    if p == 0 {
        return Ok(vec![0.0; n]);
    }
    for column in regressors {
        if column.len() != n {
            return Err(VectorError::LengthMismatch {
                left: column.len(),
                right: n,
            });
        }
    }

    let x = Array2::from_shape_fn((n, p), |(i, j)| regressors[j][i]);
    let y = Array1::from(target.to_vec());

    let xtx = x.t().dot(&x);
    let xty = x.t().dot(&y);
    let beta = solve(xtx, xty)?;

    Ok(x.dot(&beta).to_vec())
}

/// Gauss-Jordan elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, VectorError> {
    let p = b.len();
    let scale = (0..p).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
    if scale == 0.0 {
        return Err(VectorError::Singular);
    }

    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&r1, &r2| a[[r1, col]].abs().total_cmp(&a[[r2, col]].abs()))
            .unwrap_or(col);
        if a[[pivot_row, col]].abs() <= SINGULAR_TOLERANCE * scale {
            return Err(VectorError::Singular);
        }
        if pivot_row != col {
            for k in 0..p {
                a.swap([col, k], [pivot_row, k]);
            }
            b.swap(col, pivot_row);
        }

        let pivot = a[[col, col]];
        for row in 0..p {
            if row == col {
                continue;
            }
            let factor = a[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..p {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    Ok(Array1::from_shape_fn(p, |i| b[i] / a[[i, i]]))
}
