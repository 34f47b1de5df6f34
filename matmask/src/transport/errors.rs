use crate::transport::Phase;

/// The specific reason a send or receive failed.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The peer hung up or the connection was lost.
    #[error("connection closed during {phase}")]
    Closed { phase: Phase },

    #[error("timed out waiting for {phase}")]
    TimedOut { phase: Phase },

    #[error("cancelled while handling {phase}")]
    Cancelled { phase: Phase },

    /// The peer sent more than `limit` bytes without ending the frame.
    #[error("frame for {phase} exceeds {limit} bytes")]
    FrameTooLarge { phase: Phase, limit: usize },

    /// A frame arrived for a different step of the exchange.
    #[error("expected {expected} but received {received}")]
    UnexpectedPhase { expected: Phase, received: Phase },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
