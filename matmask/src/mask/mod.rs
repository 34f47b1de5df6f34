//! # Mask Module
//!
//! Random invertible masks and the block views both parties derive from them.

use crate::errors::MatMaskError;
use crate::linalg::{Matrix, add, invert, is_invertible, multiply, split_columns, split_rows};

use log::{debug, warn};

use rand::Rng;

use std::ops::Range;

/// How many draws [`MaskGenerator::generate`] makes before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Default range entries are drawn from, `[0, 100)`.
pub const DEFAULT_ENTRY_RANGE: Range<f64> = 0.0..100.0;

/// Draws square matrices with independent uniform entries until one is invertible.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskGenerator {
    dimension: usize,
    max_attempts: usize,
    entries: Range<f64>,
}

impl MaskGenerator {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            entries: DEFAULT_ENTRY_RANGE,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Overrides the half-open range entries are sampled from.
    pub fn with_entry_range(mut self, entries: Range<f64>) -> Self {
        self.entries = entries;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the first invertible `m × m` draw.
    ///
    /// # Errors
    ///
    /// Returns `MatMaskError::InvalidParameters` for an empty entry range or a zero
    /// dimension, and `MatMaskError::MaskGenerationFailed` once `max_attempts` draws
    /// have all been singular.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Matrix, MatMaskError> {
        if self.dimension == 0 {
            return Err(MatMaskError::InvalidParameters(
                "Mask dimension must be > 0".to_string(),
            ));
        }
        if self.entries.is_empty() {
            return Err(MatMaskError::InvalidParameters(format!(
                "Mask entry range {:?} is empty",
                self.entries
            )));
        }

        let m = self.dimension;
        for attempt in 1..=self.max_attempts {
            let candidate = Matrix::from_fn(m, m, |_, _| rng.random_range(self.entries.clone()));
            if is_invertible(&candidate) {
                debug!("Generated invertible {}x{} mask after {} draw(s)", m, m, attempt);
                return Ok(candidate);
            }
        }

        warn!(
            "Gave up on an invertible {}x{} mask after {} draws",
            m, m, self.max_attempts
        );
        Err(MatMaskError::MaskGenerationFailed {
            dimension: m,
            attempts: self.max_attempts,
        })
    }
}

/// The column halves of a mask `M`, as held by the party that generated it.
#[derive(Debug, Clone)]
pub struct MaskColumns {
    /// Columns `[0, k)` of `M`.
    pub left: Matrix,
    /// Columns `[k, m)` of `M`.
    pub right: Matrix,
}

/// The row halves of `M⁻¹`, as held by the party that inverted the mask.
#[derive(Debug, Clone)]
pub struct InverseRows {
    /// Rows `[0, k)` of `M⁻¹`.
    pub top: Matrix,
    /// Rows `[k, m)` of `M⁻¹`.
    pub bottom: Matrix,
}

/// Split point used for a mask of dimension `m`.
pub fn split_point(m: usize) -> usize {
    m / 2
}

/// Splits `M` into `Mleft | Mright` at `k = m / 2`.
pub fn split_mask(mask: &Matrix) -> Result<MaskColumns, MatMaskError> {
    ensure_even_square(mask)?;
    let (left, right) = split_columns(mask, split_point(mask.cols()))?;
    Ok(MaskColumns { left, right })
}

/// Inverts `M` and splits the inverse into `Top / Bottom` at `k = m / 2`.
///
/// # Errors
///
/// Returns `MatMaskError::Singular` if the mask is not invertible.
pub fn invert_and_split(mask: &Matrix) -> Result<InverseRows, MatMaskError> {
    ensure_even_square(mask)?;
    let inverse = invert(mask)?;
    let (top, bottom) = split_rows(&inverse, split_point(inverse.rows()))?;
    Ok(InverseRows { top, bottom })
}

/// Computes `Mleft·Top + Mright·Bottom`, which equals `I_m` for any invertible mask.
pub fn recombine_identity(
    columns: &MaskColumns,
    rows: &InverseRows,
) -> Result<Matrix, MatMaskError> {
    add(
        &multiply(&columns.left, &rows.top)?,
        &multiply(&columns.right, &rows.bottom)?,
    )
}

fn ensure_even_square(mask: &Matrix) -> Result<(), MatMaskError> {
    if !mask.is_square() || mask.rows() < 2 || mask.rows() % 2 != 0 {
        return Err(MatMaskError::DimensionMismatch(format!(
            "Mask must be square with an even dimension >= 2, got {}x{}",
            mask.rows(),
            mask.cols()
        )));
    }
    Ok(())
}
