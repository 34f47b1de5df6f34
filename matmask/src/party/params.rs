use crate::errors::MatMaskError;
use crate::mask::{DEFAULT_MAX_ATTEMPTS, split_point};

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Mask dimension used by the admissions scenario.
pub const DEFAULT_MASK_DIMENSION: usize = 6;

/// How long a party waits for any single table before giving up.
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Parameters both parties agree on before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Mask dimension `m`; also the column count of the scores and row count of the weights.
    pub mask_dimension: usize,
    /// Number of subjects `n` (rows of the scores).
    pub subjects: usize,
    /// Number of criteria `p` (columns of the weights).
    pub criteria: usize,
    /// Bound on mask draws before the run fails.
    pub max_mask_attempts: usize,
    /// Per-receive timeout; `None` waits forever.
    pub round_timeout: Option<Duration>,
}

impl ProtocolParams {
    /// Creates parameters with the default retry bound and round timeout.
    ///
    /// # Errors
    ///
    /// Returns `MatMaskError::InvalidParameters` unless `m` is even and at least 2 and
    /// both `n` and `p` are positive.
    pub fn try_with(
        mask_dimension: usize,
        subjects: usize,
        criteria: usize,
    ) -> Result<Self, MatMaskError> {
        let params = Self {
            mask_dimension,
            subjects,
            criteria,
            max_mask_attempts: DEFAULT_MAX_ATTEMPTS,
            round_timeout: Some(DEFAULT_ROUND_TIMEOUT),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_max_mask_attempts(mut self, max_mask_attempts: usize) -> Self {
        self.max_mask_attempts = max_mask_attempts;
        self
    }

    pub fn with_round_timeout(mut self, round_timeout: Option<Duration>) -> Self {
        self.round_timeout = round_timeout;
        self
    }

    /// Re-checks the invariants; useful after deserializing.
    pub fn validate(&self) -> Result<(), MatMaskError> {
        if self.mask_dimension < 2 || self.mask_dimension % 2 != 0 {
            return Err(MatMaskError::InvalidParameters(format!(
                "Mask dimension m must be even and >= 2, got {}",
                self.mask_dimension
            )));
        }
        if self.subjects == 0 {
            return Err(MatMaskError::InvalidParameters(
                "Number of subjects n must be > 0".to_string(),
            ));
        }
        if self.criteria == 0 {
            return Err(MatMaskError::InvalidParameters(
                "Number of criteria p must be > 0".to_string(),
            ));
        }
        if self.max_mask_attempts == 0 {
            return Err(MatMaskError::InvalidParameters(
                "Mask attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The split point `k = m / 2`.
    pub fn split(&self) -> usize {
        split_point(self.mask_dimension)
    }
}
