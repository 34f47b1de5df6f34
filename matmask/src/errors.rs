use crate::transport::TransportError;

#[derive(thiserror::Error, Debug)]
pub enum MatMaskError {
    /// Operand shapes are incompatible for the requested operation.
    #[error("DimensionMismatch: {0}")]
    DimensionMismatch(String),
    /// An inverse was requested for a matrix whose determinant is (numerically) zero.
    #[error("Singular: {0}")]
    Singular(String),
    #[error("MaskGenerationFailed: no invertible {dimension}x{dimension} mask after {attempts} attempts")]
    MaskGenerationFailed { dimension: usize, attempts: usize },
    /// Non-numeric cell, missing row/column or otherwise unusable external input.
    #[error("MalformedInput: {0}")]
    MalformedInput(String),
    #[error("TransportFailure: {0}")]
    TransportFailure(#[from] TransportError),

    #[error("InvalidParameters: {0}")]
    InvalidParameters(String),

    #[error("Io: {0}")]
    Io(#[from] std::io::Error),
}

impl MatMaskError {
    /// True when the error only reports that the peer went away.
    ///
    /// Used to pick the more informative error when both sides of a local run fail.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, MatMaskError::TransportFailure(TransportError::Closed { .. }))
    }
}
