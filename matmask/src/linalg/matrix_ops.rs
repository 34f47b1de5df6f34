use crate::errors::MatMaskError;
use crate::linalg::Matrix;

use itertools::iproduct;

/// A matrix is treated as singular once an LU pivot falls to this fraction of its
/// largest entry or below.
pub const SINGULARITY_EPSILON: f64 = 1e-9;

/// Relative slack granted when a recombined product is compared against a threshold.
pub const DECISION_TOLERANCE: f64 = 1e-9;

/// Computes the matrix product `C = AB`.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if `A.cols != B.rows`.
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix, MatMaskError> {
    if a.cols() != b.rows() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Inner dimensions must match for matrix multiplication ({}x{} times {}x{})",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }

    let mut c = Matrix::zeros(a.rows(), b.cols());
    for (i, j) in iproduct!(0..a.rows(), 0..b.cols()) {
        let a_row = a.row(i);
        *c.get_mut(i, j) = (0..a.cols()).map(|k| a_row[k] * b[(k, j)]).sum();
    }
    Ok(c)
}

/// Computes the elementwise sum `C = A + B`.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if the shapes differ.
pub fn add(a: &Matrix, b: &Matrix) -> Result<Matrix, MatMaskError> {
    ensure_same_shape(a, b, "addition")?;
    Ok(Matrix::from_fn(a.rows(), a.cols(), |i, j| a[(i, j)] + b[(i, j)]))
}

/// Computes `det(A)` by LU decomposition with partial pivoting.
///
/// The determinant of the `0 × 0` matrix is 1. Large matrices can overflow to
/// infinity; use [`is_invertible`] to decide invertibility.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if `A` is not square.
pub fn determinant(a: &Matrix) -> Result<f64, MatMaskError> {
    ensure_square(a, "determinant")?;

    let (pivots, odd_swaps) = lu_pivots(a);
    let det: f64 = pivots.iter().product();
    Ok(if odd_swaps { -det } else { det })
}

/// Returns true when `A` is square, finite and every LU pivot exceeds
/// `SINGULARITY_EPSILON` times the largest absolute entry.
/// Scale-free; the determinant itself is never formed.
pub fn is_invertible(a: &Matrix) -> bool {
    if !a.is_square() || a.as_slice().iter().any(|v| !v.is_finite()) {
        return false;
    }

    let scale = a.as_slice().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return a.rows() == 0;
    }

    let (pivots, _) = lu_pivots(a);
    pivots.len() == a.rows() && pivots.iter().all(|p| p.abs() > SINGULARITY_EPSILON * scale)
}

/// Computes `A⁻¹` by Gauss–Jordan elimination with partial pivoting.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if `A` is not square and
/// `MatMaskError::Singular` if it is not invertible.
pub fn invert(a: &Matrix) -> Result<Matrix, MatMaskError> {
    ensure_square(a, "inversion")?;
    if !is_invertible(a) {
        return Err(MatMaskError::Singular(format!(
            "{}x{} matrix is numerically singular",
            a.rows(),
            a.cols()
        )));
    }

    let n = a.rows();
    let mut work = a.clone();
    let mut inv = Matrix::identity(n);

    for col in 0..n {
        let pivot = pivot_row(&work, col);
        if work[(pivot, col)] == 0.0 {
            return Err(MatMaskError::Singular(format!(
                "no usable pivot in column {} during inversion",
                col
            )));
        }
        work.swap_rows(pivot, col);
        inv.swap_rows(pivot, col);

        // normalize the pivot row
        let scale = 1.0 / work[(col, col)];
        for j in 0..n {
            *work.get_mut(col, j) *= scale;
            *inv.get_mut(col, j) *= scale;
        }

        // eliminate every other row
        for row in (0..n).filter(|&r| r != col) {
            let factor = work[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                let w = work[(col, j)];
                let v = inv[(col, j)];
                *work.get_mut(row, j) -= factor * w;
                *inv.get_mut(row, j) -= factor * v;
            }
        }
    }

    Ok(inv)
}

/// Splits `A` into its first `k` columns and the remaining ones.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if `k > A.cols`.
pub fn split_columns(a: &Matrix, k: usize) -> Result<(Matrix, Matrix), MatMaskError> {
    if k > a.cols() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Cannot split {} columns at {}",
            a.cols(),
            k
        )));
    }

    let left = Matrix::from_fn(a.rows(), k, |i, j| a[(i, j)]);
    let right = Matrix::from_fn(a.rows(), a.cols() - k, |i, j| a[(i, j + k)]);
    Ok((left, right))
}

/// Splits `A` into its first `k` rows and the remaining ones.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if `k > A.rows`.
pub fn split_rows(a: &Matrix, k: usize) -> Result<(Matrix, Matrix), MatMaskError> {
    if k > a.rows() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Cannot split {} rows at {}",
            a.rows(),
            k
        )));
    }

    let top = Matrix::from_fn(k, a.cols(), |i, j| a[(i, j)]);
    let bottom = Matrix::from_fn(a.rows() - k, a.cols(), |i, j| a[(i + k, j)]);
    Ok((top, bottom))
}

/// Places `right` next to `left`; the inverse of [`split_columns`].
pub fn join_columns(left: &Matrix, right: &Matrix) -> Result<Matrix, MatMaskError> {
    if left.rows() != right.rows() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Row counts must match to join columns ({} vs {})",
            left.rows(),
            right.rows()
        )));
    }

    let k = left.cols();
    Ok(Matrix::from_fn(left.rows(), k + right.cols(), |i, j| {
        if j < k { left[(i, j)] } else { right[(i, j - k)] }
    }))
}

/// Places `bottom` under `top`; the inverse of [`split_rows`].
pub fn join_rows(top: &Matrix, bottom: &Matrix) -> Result<Matrix, MatMaskError> {
    if top.cols() != bottom.cols() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Column counts must match to join rows ({} vs {})",
            top.cols(),
            bottom.cols()
        )));
    }

    let k = top.rows();
    Ok(Matrix::from_fn(k + bottom.rows(), top.cols(), |i, j| {
        if i < k { top[(i, j)] } else { bottom[(i - k, j)] }
    }))
}

/// Elementwise `A[i][j] >= B[i][j] ? 1 : 0`.
///
/// # Errors
///
/// Returns `MatMaskError::DimensionMismatch` if the shapes differ.
pub fn compare_ge(a: &Matrix, b: &Matrix) -> Result<Matrix, MatMaskError> {
    ensure_same_shape(a, b, "comparison")?;
    Ok(Matrix::from_fn(a.rows(), a.cols(), |i, j| {
        if a[(i, j)] >= b[(i, j)] { 1.0 } else { 0.0 }
    }))
}

/// Repeats `row` `rows` times, giving a `rows × row.len()` matrix.
pub fn broadcast_row(row: &[f64], rows: usize) -> Matrix {
    Matrix::from_fn(rows, row.len(), |_, j| row[j])
}

fn ensure_same_shape(a: &Matrix, b: &Matrix, op: &str) -> Result<(), MatMaskError> {
    if a.shape() != b.shape() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Shapes must match for {} ({}x{} vs {}x{})",
            op,
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    Ok(())
}

fn ensure_square(a: &Matrix, op: &str) -> Result<(), MatMaskError> {
    if !a.is_square() {
        return Err(MatMaskError::DimensionMismatch(format!(
            "{} requires a square matrix, got {}x{}",
            op,
            a.rows(),
            a.cols()
        )));
    }
    Ok(())
}

/// Pivots of the LU factorization of a square `A`, and whether an odd number of row
/// swaps was made. Stops after the first zero pivot, so a singular matrix may yield
/// fewer than `n` pivots (the last one being zero).
fn lu_pivots(a: &Matrix) -> (Vec<f64>, bool) {
    let n = a.rows();
    let mut lu = a.clone();
    let mut pivots = Vec::with_capacity(n);
    let mut odd_swaps = false;

    for col in 0..n {
        let pivot = pivot_row(&lu, col);
        let pivot_val = lu[(pivot, col)];
        pivots.push(pivot_val);
        if pivot_val == 0.0 {
            break;
        }
        if pivot != col {
            lu.swap_rows(pivot, col);
            odd_swaps = !odd_swaps;
        }

        for row in (col + 1)..n {
            let factor = lu[(row, col)] / pivot_val;
            if factor != 0.0 {
                for j in col..n {
                    let upper = lu[(col, j)];
                    *lu.get_mut(row, j) -= factor * upper;
                }
            }
        }
    }

    (pivots, odd_swaps)
}

/// Row index in `col..n` holding the largest absolute value of column `col`.
fn pivot_row(m: &Matrix, col: usize) -> usize {
    (col..m.rows())
        .max_by(|&x, &y| m[(x, col)].abs().total_cmp(&m[(y, col)].abs()))
        .unwrap_or(col)
}
