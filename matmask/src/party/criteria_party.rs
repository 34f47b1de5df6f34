use crate::errors::MatMaskError;
use crate::linalg::{Matrix, add, multiply};
use crate::mask::invert_and_split;
use crate::party::outcome::{Decision, Threshold};
use crate::party::params::ProtocolParams;
use crate::party::{expect_shape, round_deadline};
use crate::transport::{CancelToken, Deadline, Phase, Transport};

use log::{debug, info, warn};

/// Progress of a [`CriteriaParty`] through one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaPartyState {
    Init,
    AwaitingMask,
    MaskInverted,
    AwaitingProjection,
    ProjectionSent,
    AwaitingFinalShare,
    Done,
    /// The run failed; nothing from it is exposed.
    Aborted,
}

/// The criteria holder: owns the private weights `W` (`m × p`) and threshold `T`.
///
/// It inverts the peer's mask, recombines the two partial products into `S·W` and
/// sends back only the decision. It never sees the raw scores.
#[derive(Debug)]
pub struct CriteriaParty {
    params: ProtocolParams,
    weights: Matrix,
    threshold: Threshold,
    state: CriteriaPartyState,
    cancel: CancelToken,
    product: Option<Matrix>,
    decision: Option<Decision>,
}

impl CriteriaParty {
    /// # Errors
    ///
    /// Returns `MatMaskError::DimensionMismatch` unless `weights` is `m × p` and the
    /// threshold has `p` entries.
    pub fn try_with(
        params: ProtocolParams,
        weights: Matrix,
        threshold: Threshold,
    ) -> Result<Self, MatMaskError> {
        params.validate()?;
        expect_shape(
            &weights,
            (params.mask_dimension, params.criteria),
            "private weights",
        )?;
        if threshold.len() != params.criteria {
            return Err(MatMaskError::DimensionMismatch(format!(
                "threshold has {} entries but there are {} criteria",
                threshold.len(),
                params.criteria
            )));
        }

        Ok(Self {
            params,
            weights,
            threshold,
            state: CriteriaPartyState::Init,
            cancel: CancelToken::default(),
            product: None,
            decision: None,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> CriteriaPartyState {
        self.state
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// The recombined product `S·W`, once the run is `Done`.
    pub fn product(&self) -> Option<&Matrix> {
        self.product.as_ref()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Decision, MatMaskError> {
        self.run_to_product(transport).map(|(_, decision)| decision)
    }

    /// Like [`CriteriaParty::run`], also returning the recombined product.
    pub(crate) fn run_to_product<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(Matrix, Decision), MatMaskError> {
        if self.state != CriteriaPartyState::Init {
            return Err(MatMaskError::InvalidParameters(format!(
                "a criteria party runs once; current state is {:?}",
                self.state
            )));
        }
        info!(
            "Criteria party starting: {} criteria, mask dimension {}",
            self.params.criteria, self.params.mask_dimension
        );

        match self.exchange(transport) {
            Ok((product, decision)) => {
                self.transition(CriteriaPartyState::Done);
                info!("Criteria party done: decision sent");
                self.product = Some(product.clone());
                self.decision = Some(decision.clone());
                Ok((product, decision))
            }
            Err(e) => {
                warn!("Criteria party aborted in {:?}: {}", self.state, e);
                self.state = CriteriaPartyState::Aborted;
                Err(e)
            }
        }
    }

    fn exchange<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(Matrix, Decision), MatMaskError> {
        let m = self.params.mask_dimension;
        let n = self.params.subjects;
        let p = self.params.criteria;
        let k = self.params.split();

        self.transition(CriteriaPartyState::AwaitingMask);
        let mask = transport.receive_table(Phase::Mask, &self.deadline())?;
        expect_shape(&mask, (m, m), "mask")?;
        let inverse = invert_and_split(&mask)?;
        self.transition(CriteriaPartyState::MaskInverted);

        // P1 = Bottom·W
        let contribution = multiply(&inverse.bottom, &self.weights)?;
        transport.send_table(Phase::WeightContribution, &contribution, &self.deadline())?;
        self.transition(CriteriaPartyState::AwaitingProjection);

        let masked_data = transport.receive_table(Phase::MaskedData, &self.deadline())?;
        expect_shape(&masked_data, (n, k), "masked data")?;
        self.transition(CriteriaPartyState::ProjectionSent);

        // FP2 = (A·Top)·W
        let partial = multiply(&multiply(&masked_data, &inverse.top)?, &self.weights)?;
        self.transition(CriteriaPartyState::AwaitingFinalShare);

        let final_share = transport.receive_table(Phase::FinalShare, &self.deadline())?;
        expect_shape(&final_share, (n, p), "final share")?;

        // S·W = S·Mleft·Top·W + S·Mright·Bottom·W
        let product = add(&partial, &final_share)?;
        let decision = self.threshold.decide(&product)?;

        transport.send_table(Phase::Decision, decision.as_matrix(), &self.deadline())?;
        Ok((product, decision))
    }

    fn deadline(&self) -> Deadline {
        round_deadline(&self.params, &self.cancel)
    }

    fn transition(&mut self, next: CriteriaPartyState) {
        debug!("Criteria party: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
