use crate::linalg::Matrix;
use crate::transport::{Phase, TransportError};

use serde::{Deserialize, Serialize};

/// One table on the wire, tagged with the exchange it belongs to.
///
/// Encoded as a single line of JSON: `{"phase":"Mask","table":[[...],...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub phase: Phase,
    pub table: Matrix,
}

impl Frame {
    pub fn new(phase: Phase, table: Matrix) -> Self {
        Self { phase, table }
    }

    /// Serializes the frame as JSON terminated by `\n`.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parses one frame, ignoring surrounding whitespace.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(bytes.trim_ascii())?)
    }

    /// Unwraps the table if the frame belongs to `expected`.
    pub fn into_table(self, expected: Phase) -> Result<Matrix, TransportError> {
        if self.phase != expected {
            return Err(TransportError::UnexpectedPhase {
                expected,
                received: self.phase,
            });
        }
        Ok(self.table)
    }
}
