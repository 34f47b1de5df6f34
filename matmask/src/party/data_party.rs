use crate::errors::MatMaskError;
use crate::linalg::{Matrix, is_invertible, multiply};
use crate::mask::{MaskGenerator, split_mask};
use crate::party::outcome::Decision;
use crate::party::params::ProtocolParams;
use crate::party::{expect_shape, round_deadline};
use crate::transport::{CancelToken, Deadline, Phase, Transport};

use log::{debug, info, warn};

use rand::Rng;

/// Progress of a [`DataParty`] through one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPartyState {
    Init,
    MaskSent,
    AwaitingWeightContribution,
    ContributionSent,
    AwaitingDecision,
    Done,
    /// The run failed; nothing from it is exposed.
    Aborted,
}

/// The data holder: owns the private scores `S` (`n × m`) and generates the mask.
///
/// It never sees the weights, the threshold or the true product; the only things it
/// learns are the masked weight contribution `P1` and the final decision.
#[derive(Debug)]
pub struct DataParty {
    params: ProtocolParams,
    scores: Matrix,
    state: DataPartyState,
    cancel: CancelToken,
    decision: Option<Decision>,
}

impl DataParty {
    /// # Errors
    ///
    /// Returns `MatMaskError::DimensionMismatch` unless `scores` is `n × m`.
    pub fn try_with(params: ProtocolParams, scores: Matrix) -> Result<Self, MatMaskError> {
        params.validate()?;
        expect_shape(
            &scores,
            (params.subjects, params.mask_dimension),
            "private scores",
        )?;

        Ok(Self {
            params,
            scores,
            state: DataPartyState::Init,
            cancel: CancelToken::default(),
            decision: None,
        })
    }

    /// Makes every blocking call of the run abort once `cancel` is triggered.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> DataPartyState {
        self.state
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// The decision received from the peer, once the run is `Done`.
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    /// Runs the protocol with a freshly drawn mask from the thread-local RNG.
    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Decision, MatMaskError> {
        self.run_with_rng(transport, &mut rand::rng())
    }

    pub fn run_with_rng<T: Transport + ?Sized, R: Rng + ?Sized>(
        &mut self,
        transport: &mut T,
        rng: &mut R,
    ) -> Result<Decision, MatMaskError> {
        self.ensure_fresh()?;
        let generator = MaskGenerator::new(self.params.mask_dimension)
            .with_max_attempts(self.params.max_mask_attempts);

        match generator.generate(rng) {
            Ok(mask) => self.run_with_mask(transport, mask),
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Runs the protocol with a caller-chosen mask, which must be `m × m` and invertible.
    pub fn run_with_mask<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        mask: Matrix,
    ) -> Result<Decision, MatMaskError> {
        self.ensure_fresh()?;
        info!(
            "Data party starting: {} subjects, mask dimension {}",
            self.params.subjects, self.params.mask_dimension
        );

        match self.exchange(transport, &mask) {
            Ok(decision) => {
                self.transition(DataPartyState::Done);
                info!(
                    "Data party done: {} of {} outcomes passed",
                    decision.pass_count(),
                    self.params.subjects * self.params.criteria
                );
                self.decision = Some(decision.clone());
                Ok(decision)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn exchange<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        mask: &Matrix,
    ) -> Result<Decision, MatMaskError> {
        let m = self.params.mask_dimension;
        let n = self.params.subjects;
        let p = self.params.criteria;
        let k = self.params.split();

        expect_shape(mask, (m, m), "mask")?;
        if !is_invertible(mask) {
            return Err(MatMaskError::Singular(
                "refusing to send a non-invertible mask".to_string(),
            ));
        }

        transport.send_table(Phase::Mask, mask, &self.deadline())?;
        self.transition(DataPartyState::MaskSent);

        let columns = split_mask(mask)?;

        // A = S·Mleft
        let masked_data = multiply(&self.scores, &columns.left)?;
        transport.send_table(Phase::MaskedData, &masked_data, &self.deadline())?;
        self.transition(DataPartyState::AwaitingWeightContribution);

        let contribution = transport.receive_table(Phase::WeightContribution, &self.deadline())?;
        expect_shape(&contribution, (m - k, p), "weight contribution")?;
        self.transition(DataPartyState::ContributionSent);

        // R = (S·Mright)·P1
        let final_share = multiply(&multiply(&self.scores, &columns.right)?, &contribution)?;
        transport.send_table(Phase::FinalShare, &final_share, &self.deadline())?;
        self.transition(DataPartyState::AwaitingDecision);

        let decision = transport.receive_table(Phase::Decision, &self.deadline())?;
        expect_shape(&decision, (n, p), "decision")?;
        Decision::try_from(decision)
    }

    fn deadline(&self) -> Deadline {
        round_deadline(&self.params, &self.cancel)
    }

    fn transition(&mut self, next: DataPartyState) {
        debug!("Data party: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn abort(&mut self, error: MatMaskError) -> MatMaskError {
        warn!("Data party aborted in {:?}: {}", self.state, error);
        self.state = DataPartyState::Aborted;
        self.decision = None;
        error
    }

    fn ensure_fresh(&self) -> Result<(), MatMaskError> {
        if self.state != DataPartyState::Init {
            return Err(MatMaskError::InvalidParameters(format!(
                "a data party runs once; current state is {:?}",
                self.state
            )));
        }
        Ok(())
    }
}
