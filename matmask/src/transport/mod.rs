//! # Transport Module
//!
//! Blocking delivery of matrices between the two parties.
//!
//! Every table travels in a [`Frame`] tagged with the [`Phase`] of the exchange it
//! belongs to, so a receiver detects out-of-order or duplicated delivery. Every call
//! is bounded by a [`Deadline`].

pub mod errors;
pub mod frame;
pub mod memory;
pub mod tcp;

pub use errors::TransportError;
pub use frame::Frame;
pub use memory::MemoryTransport;
pub use tcp::{DEFAULT_MAX_FRAME_BYTES, TcpTransport};

use crate::linalg::Matrix;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Longest single wait before a blocked call re-checks its deadline and cancel token.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The five table exchanges of one protocol run, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Data Party → Criteria Party: the mask `M`.
    Mask,
    /// Data Party → Criteria Party: `A = S·Mleft`.
    MaskedData,
    /// Criteria Party → Data Party: `P1 = Bottom·W`.
    WeightContribution,
    /// Data Party → Criteria Party: `R = S·Mright·P1`.
    FinalShare,
    /// Criteria Party → Data Party: the decision matrix `G`.
    Decision,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Mask => "mask",
            Phase::MaskedData => "masked data",
            Phase::WeightContribution => "weight contribution",
            Phase::FinalShare => "final share",
            Phase::Decision => "decision",
        };
        f.write_str(name)
    }
}

/// A shared flag that aborts blocked transport calls once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounds a blocking send or receive by an optional expiry time and a cancel token.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancel: CancelToken,
}

impl Deadline {
    /// A deadline that never expires (it can still be cancelled).
    pub fn never() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
            cancel: CancelToken::default(),
        }
    }

    /// `Deadline::after(timeout)` when a timeout is given, `Deadline::never()` otherwise.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::never, Self::after)
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Time left until expiry; `None` when the deadline never expires.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fails with `Cancelled` or `TimedOut` once the call must stop waiting.
    pub fn check(&self, phase: Phase) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled { phase });
        }
        if self.remaining().is_some_and(|left| left.is_zero()) {
            return Err(TransportError::TimedOut { phase });
        }
        Ok(())
    }

    /// How long the next blocking wait may last; never zero.
    pub(crate) fn next_wait(&self) -> Duration {
        let wait = match self.remaining() {
            Some(left) => left.min(POLL_INTERVAL),
            None => POLL_INTERVAL,
        };
        wait.max(Duration::from_millis(1))
    }
}

/// A blocking, in-order, one-table-per-call channel to the other party.
pub trait Transport {
    /// Sends `table` as the frame for `phase`.
    fn send_table(
        &mut self,
        phase: Phase,
        table: &Matrix,
        deadline: &Deadline,
    ) -> Result<(), TransportError>;

    /// Blocks until the frame for `phase` arrives.
    ///
    /// Fails with `UnexpectedPhase` if the next frame belongs to another phase.
    fn receive_table(&mut self, phase: Phase, deadline: &Deadline)
    -> Result<Matrix, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_table(
        &mut self,
        phase: Phase,
        table: &Matrix,
        deadline: &Deadline,
    ) -> Result<(), TransportError> {
        (**self).send_table(phase, table, deadline)
    }

    fn receive_table(
        &mut self,
        phase: Phase,
        deadline: &Deadline,
    ) -> Result<Matrix, TransportError> {
        (**self).receive_table(phase, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_never_does_not_expire() {
        let deadline = Deadline::never();
        assert!(deadline.remaining().is_none());
        assert!(deadline.check(Phase::Mask).is_ok());
        assert_eq!(deadline.next_wait(), POLL_INTERVAL);
    }

    #[test]
    fn test_deadline_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(matches!(
            deadline.check(Phase::Decision),
            Err(TransportError::TimedOut {
                phase: Phase::Decision
            })
        ));
        assert_eq!(deadline.next_wait(), Duration::from_millis(1));
    }

    #[test]
    fn test_cancel_wins_over_expiry() {
        let token = CancelToken::new();
        let deadline = Deadline::after(Duration::ZERO).with_cancel(token.clone());
        token.cancel();
        assert!(matches!(
            deadline.check(Phase::FinalShare),
            Err(TransportError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_from_timeout() {
        assert!(Deadline::from_timeout(None).remaining().is_none());
        let left = Deadline::from_timeout(Some(Duration::from_secs(60)))
            .remaining()
            .unwrap();
        assert!(left > Duration::from_secs(59));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::WeightContribution.to_string(), "weight contribution");
    }
}
