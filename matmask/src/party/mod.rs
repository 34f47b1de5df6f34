//! # Party Module
//!
//! The two roles of the protocol. The Data Party holds the scores `S` and picks the
//! mask; the Criteria Party holds the weights `W` and the threshold `T`. Between them
//! they compute `G = [S·W ≥ T]` while each keeps its own matrix private.
//!
//! Wire order, per direction:
//!
//! ```text
//! data -> criteria : Mask, MaskedData, FinalShare
//! criteria -> data : WeightContribution, Decision
//! ```

pub mod criteria_party;
pub mod data_party;
pub mod outcome;
pub mod params;

pub use criteria_party::{CriteriaParty, CriteriaPartyState};
pub use data_party::{DataParty, DataPartyState};
pub use outcome::{Decision, Threshold};
pub use params::{DEFAULT_MASK_DIMENSION, DEFAULT_ROUND_TIMEOUT, ProtocolParams};

use crate::errors::MatMaskError;
use crate::linalg::Matrix;
use crate::transport::{CancelToken, Deadline, MemoryTransport};

use std::thread;

/// Result of [`run_local`]: the decision both parties agree on, plus the product
/// `S·W` recombined by the Criteria Party.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRun {
    pub decision: Decision,
    pub product: Matrix,
}

/// Runs both parties in one process, each on its own thread, joined by an in-memory
/// transport.
///
/// # Errors
///
/// Returns the first meaningful failure of either party. When one side fails, the
/// other usually sees its peer disappear; that secondary error is only reported if
/// nothing better is available.
///
/// # Example
///
/// ```
/// use matmask::linalg::Matrix;
/// use matmask::party::{ProtocolParams, Threshold, run_local};
///
/// let params = ProtocolParams::try_with(2, 1, 1).unwrap();
/// let scores = Matrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
/// let weights = Matrix::from_rows(vec![vec![5.0], vec![7.0]]).unwrap();
///
/// let run = run_local(params, scores, weights, Threshold::new(vec![18.0])).unwrap();
/// assert!(run.decision.passed(0, 0));
/// assert!((run.product[(0, 0)] - 19.0).abs() < 1e-6);
/// ```
pub fn run_local(
    params: ProtocolParams,
    scores: Matrix,
    weights: Matrix,
    threshold: Threshold,
) -> Result<LocalRun, MatMaskError> {
    let mut data = DataParty::try_with(params, scores)?;
    let mut criteria = CriteriaParty::try_with(params, weights, threshold)?;
    let (mut data_end, mut criteria_end) = MemoryTransport::pair();

    let (data_result, criteria_result) = thread::scope(|s| {
        let data_handle = s.spawn(move || data.run(&mut data_end));
        let criteria_handle = s.spawn(move || criteria.run_to_product(&mut criteria_end));

        let data_result = data_handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let criteria_result = criteria_handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (data_result, criteria_result)
    });

    match (data_result, criteria_result) {
        (Ok(decision), Ok((product, _))) => Ok(LocalRun { decision, product }),
        (Err(data_err), Err(criteria_err)) => {
            if data_err.is_peer_closed() {
                Err(criteria_err)
            } else {
                Err(data_err)
            }
        }
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    }
}

pub(crate) fn expect_shape(
    table: &Matrix,
    expected: (usize, usize),
    what: &str,
) -> Result<(), MatMaskError> {
    if table.shape() != expected {
        return Err(MatMaskError::DimensionMismatch(format!(
            "{} must be {}x{}, got {}x{}",
            what,
            expected.0,
            expected.1,
            table.rows(),
            table.cols()
        )));
    }
    Ok(())
}

/// A fresh deadline for one send or receive.
pub(crate) fn round_deadline(params: &ProtocolParams, cancel: &CancelToken) -> Deadline {
    Deadline::from_timeout(params.round_timeout).with_cancel(cancel.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::linalg::multiply;
    use crate::transport::{Phase, Transport, TransportError};

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays canned replies and records every table sent.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: VecDeque<(Phase, Matrix)>,
        sent: Vec<(Phase, Matrix)>,
    }

    impl ScriptedTransport {
        fn replying(replies: Vec<(Phase, Matrix)>) -> Self {
            Self {
                replies: replies.into(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send_table(
            &mut self,
            phase: Phase,
            table: &Matrix,
            _deadline: &Deadline,
        ) -> Result<(), TransportError> {
            self.sent.push((phase, table.clone()));
            Ok(())
        }

        fn receive_table(
            &mut self,
            phase: Phase,
            _deadline: &Deadline,
        ) -> Result<Matrix, TransportError> {
            match self.replies.pop_front() {
                Some((received, table)) if received == phase => Ok(table),
                Some((received, _)) => Err(TransportError::UnexpectedPhase {
                    expected: phase,
                    received,
                }),
                None => Err(TransportError::Closed { phase }),
            }
        }
    }

    fn m(rows: Vec<Vec<f64>>) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_identity_mask_scenario() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut data = DataParty::try_with(params, m(vec![vec![1.0, 2.0]]))?;
        let mut criteria = CriteriaParty::try_with(
            params,
            m(vec![vec![5.0], vec![7.0]]),
            Threshold::new(vec![18.0]),
        )?;
        let (mut data_end, mut criteria_end) = MemoryTransport::pair();

        let (data_result, criteria_result) = thread::scope(|s| {
            let c = s.spawn(|| criteria.run(&mut criteria_end));
            let d = data.run_with_mask(&mut data_end, Matrix::identity(2));
            (d, c.join().unwrap())
        });

        let decision = data_result?;
        assert_eq!(decision, criteria_result?);
        assert!(decision.passed(0, 0));

        assert_eq!(data.state(), DataPartyState::Done);
        assert_eq!(criteria.state(), CriteriaPartyState::Done);
        let product = criteria.product().unwrap();
        assert!((product[(0, 0)] - 19.0).abs() < 1e-9);
        assert_eq!(data.decision(), Some(&decision));
        Ok(())
    }

    #[test]
    fn test_run_local_matches_plain_product() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(4, 3, 2)?;
        let scores = m(vec![
            vec![10.0, 20.0, 30.0, 40.0],
            vec![1.0, 0.0, 3.0, 2.0],
            vec![50.0, 50.0, 50.0, 50.0],
        ]);
        let weights = m(vec![
            vec![1.0, 0.5],
            vec![1.0, 0.5],
            vec![1.0, 2.0],
            vec![1.0, 2.0],
        ]);
        let expected = multiply(&scores, &weights)?;

        let run = run_local(params, scores, weights, Threshold::new(vec![90.0, 150.0]))?;

        assert!(run.product.approx_eq(&expected, 1e-6));
        // rows: [100, 145], [6, 11], [200, 250]
        assert_eq!(
            run.decision.as_matrix().to_rows(),
            vec![vec![1.0, 0.0], vec![0.0, 0.0], vec![1.0, 1.0]]
        );
        Ok(())
    }

    #[test]
    fn test_product_equal_to_threshold_always_passes() -> Result<(), MatMaskError> {
        let scores = m(vec![
            vec![80.0, 70.0, 90.0, 60.0, 75.0, 4.0],
            vec![55.0, 85.0, 60.0, 90.0, 65.0, 3.0],
            vec![95.0, 90.0, 85.0, 88.0, 92.0, 5.0],
            vec![40.0, 50.0, 45.0, 55.0, 35.0, 2.0],
        ]);
        let weights = m(vec![
            vec![1.0, 0.5, 2.0, 1.0],
            vec![1.0, 2.0, 0.5, 1.0],
            vec![1.0, 0.5, 2.0, 1.0],
            vec![1.0, 2.0, 0.5, 1.0],
            vec![1.0, 0.5, 1.0, 1.0],
            vec![0.0, 0.0, 0.0, 10.0],
        ]);
        let plain = multiply(&scores, &weights)?;
        let params = ProtocolParams::try_with(6, 4, 4)?;

        for subject in 0..4 {
            let threshold = Threshold::new(plain.row(subject).to_vec());
            for _ in 0..10 {
                let run = run_local(params, scores.clone(), weights.clone(), threshold.clone())?;
                assert!((0..4).all(|j| run.decision.passed(subject, j)));
            }
        }
        Ok(())
    }

    #[test]
    fn test_run_local_rejects_wrong_shapes() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let result = run_local(
            params,
            m(vec![vec![1.0, 2.0, 3.0]]),
            m(vec![vec![5.0], vec![7.0]]),
            Threshold::new(vec![18.0]),
        );
        assert!(matches!(result, Err(MatMaskError::DimensionMismatch(_))));

        let result = run_local(
            params,
            m(vec![vec![1.0, 2.0]]),
            m(vec![vec![5.0], vec![7.0]]),
            Threshold::new(vec![18.0, 1.0]),
        );
        assert!(matches!(result, Err(MatMaskError::DimensionMismatch(_))));
        Ok(())
    }

    #[test]
    fn test_data_party_sends_only_masked_tables() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let scores = m(vec![vec![3.0, 4.0]]);
        let mask = m(vec![vec![2.0, 1.0], vec![1.0, 1.0]]);
        let mut transport = ScriptedTransport::replying(vec![
            (Phase::WeightContribution, m(vec![vec![7.0]])),
            (Phase::Decision, m(vec![vec![1.0]])),
        ]);

        let mut data = DataParty::try_with(params, scores)?;
        data.run_with_mask(&mut transport, mask.clone())?;

        let phases: Vec<Phase> = transport.sent.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            phases,
            vec![Phase::Mask, Phase::MaskedData, Phase::FinalShare]
        );
        assert_eq!(transport.sent[0].1, mask);
        // A = S·Mleft = [3*2 + 4*1]
        assert_eq!(transport.sent[1].1.to_rows(), vec![vec![10.0]]);
        // R = S·Mright·P1 = [3*1 + 4*1] * 7
        assert_eq!(transport.sent[2].1.to_rows(), vec![vec![49.0]]);
        Ok(())
    }

    #[test]
    fn test_data_party_refuses_singular_mask() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut transport = ScriptedTransport::default();
        let mut data = DataParty::try_with(params, m(vec![vec![1.0, 2.0]]))?;

        let result = data.run_with_mask(&mut transport, m(vec![vec![1.0, 2.0], vec![2.0, 4.0]]));
        assert!(matches!(result, Err(MatMaskError::Singular(_))));
        assert!(transport.sent.is_empty());
        assert_eq!(data.state(), DataPartyState::Aborted);
        assert!(data.decision().is_none());
        Ok(())
    }

    #[test]
    fn test_criteria_party_aborts_on_singular_mask() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut transport = ScriptedTransport::replying(vec![(
            Phase::Mask,
            m(vec![vec![1.0, 1.0], vec![1.0, 1.0]]),
        )]);
        let mut criteria = CriteriaParty::try_with(
            params,
            m(vec![vec![5.0], vec![7.0]]),
            Threshold::new(vec![18.0]),
        )?;

        let result = criteria.run(&mut transport);
        assert!(matches!(result, Err(MatMaskError::Singular(_))));
        assert_eq!(criteria.state(), CriteriaPartyState::Aborted);
        assert!(transport.sent.is_empty());
        assert!(criteria.product().is_none());
        Ok(())
    }

    #[test]
    fn test_criteria_party_rejects_misshapen_share() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut transport = ScriptedTransport::replying(vec![
            (Phase::Mask, Matrix::identity(2)),
            (Phase::MaskedData, m(vec![vec![1.0, 1.0]])),
        ]);
        let mut criteria = CriteriaParty::try_with(
            params,
            m(vec![vec![5.0], vec![7.0]]),
            Threshold::new(vec![18.0]),
        )?;

        let result = criteria.run(&mut transport);
        assert!(matches!(result, Err(MatMaskError::DimensionMismatch(_))));
        assert_eq!(criteria.state(), CriteriaPartyState::Aborted);
        Ok(())
    }

    #[test]
    fn test_out_of_order_frame_aborts() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut transport =
            ScriptedTransport::replying(vec![(Phase::Decision, m(vec![vec![1.0]]))]);
        let mut data = DataParty::try_with(params, m(vec![vec![1.0, 2.0]]))?;

        let result = data.run_with_mask(&mut transport, Matrix::identity(2));
        assert!(matches!(
            result,
            Err(MatMaskError::TransportFailure(
                TransportError::UnexpectedPhase {
                    expected: Phase::WeightContribution,
                    received: Phase::Decision,
                }
            ))
        ));
        assert_eq!(data.state(), DataPartyState::Aborted);
        Ok(())
    }

    #[test]
    fn test_party_runs_once() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut data = DataParty::try_with(params, m(vec![vec![1.0, 2.0]]))?;
        let mut transport = ScriptedTransport::default();

        assert!(data.run_with_mask(&mut transport, Matrix::identity(2)).is_err());
        let again = data.run_with_mask(&mut transport, Matrix::identity(2));
        assert!(matches!(again, Err(MatMaskError::InvalidParameters(_))));
        Ok(())
    }

    #[test]
    fn test_run_with_rng_sends_generated_mask() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(4, 1, 1)?;
        let mut data = DataParty::try_with(params, m(vec![vec![1.0, 2.0, 3.0, 4.0]]))?;
        let mut transport = ScriptedTransport::default();

        let mut rng = StdRng::seed_from_u64(7);
        let result = data.run_with_rng(&mut transport, &mut rng);
        assert!(result.unwrap_err().is_peer_closed());
        assert_eq!(data.state(), DataPartyState::Aborted);

        let (phase, mask) = &transport.sent[0];
        assert_eq!(*phase, Phase::Mask);
        assert_eq!(mask.shape(), (4, 4));
        assert!(crate::linalg::is_invertible(mask));
        assert!(mask.as_slice().iter().all(|v| (0.0..100.0).contains(v)));
        // A is n x k
        assert_eq!(transport.sent[1].1.shape(), (1, 2));
        Ok(())
    }

    #[test]
    fn test_cancelled_party_stops_waiting() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?.with_round_timeout(None);
        let cancel = CancelToken::new();
        let mut criteria = CriteriaParty::try_with(
            params,
            m(vec![vec![5.0], vec![7.0]]),
            Threshold::new(vec![18.0]),
        )?
        .with_cancel_token(cancel.clone());
        let (_data_end, mut criteria_end) = MemoryTransport::pair();

        let result = thread::scope(|s| {
            let handle = s.spawn(|| criteria.run(&mut criteria_end));
            thread::sleep(Duration::from_millis(100));
            cancel.cancel();
            handle.join().unwrap()
        });

        assert!(matches!(
            result,
            Err(MatMaskError::TransportFailure(TransportError::Cancelled {
                phase: Phase::Mask
            }))
        ));
        assert_eq!(criteria.state(), CriteriaPartyState::Aborted);
        Ok(())
    }

    #[test]
    fn test_peer_disappearing_is_reported() -> Result<(), MatMaskError> {
        let params = ProtocolParams::try_with(2, 1, 1)?;
        let mut data = DataParty::try_with(params, m(vec![vec![1.0, 2.0]]))?;
        let (mut data_end, criteria_end) = MemoryTransport::pair();
        drop(criteria_end);

        let err = data
            .run_with_mask(&mut data_end, Matrix::identity(2))
            .unwrap_err();
        assert!(err.is_peer_closed());
        Ok(())
    }
}
