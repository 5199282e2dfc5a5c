//! Seam to the velocity-advection collaborator.
//!
//! Velocity advection computes the advective tendencies of `vn` and `w`
//! (`ddt_vn_apc_pc`, `ddt_w_adv_pc`) from the current winds. It is a
//! separate component; the solver only calls it at the start of each stage.

use super::SolverError;
use crate::state::{DiagnosticState, PrognosticState, VelocityFields};

/// Advective wind tendencies for the predictor and the corrector.
///
/// Implementations write the predictor tendencies into the `current()`
/// slots of [`DiagnosticState::ddt_vn_apc_pc`] and
/// [`DiagnosticState::ddt_w_adv_pc`], and the corrector tendencies into the
/// `next()` slots.
pub trait VelocityAdvection {
    /// Tendencies of the state at the start of the substep.
    ///
    /// With `vn_only` the `w` tendency is kept from the previous call.
    fn run_predictor_step(
        &mut self,
        vn_only: bool,
        state: &PrognosticState,
        diagnostic: &mut DiagnosticState,
        fields: &mut VelocityFields,
        dtime: f64,
    ) -> Result<(), SolverError>;

    /// Tendencies of the predicted state.
    fn run_corrector_step(
        &mut self,
        state: &PrognosticState,
        diagnostic: &mut DiagnosticState,
        fields: &mut VelocityFields,
        dtime: f64,
    ) -> Result<(), SolverError>;
}

/// Leaves the tendencies at whatever the caller stored.
///
/// With zero tendencies this is the collaborator of a resting atmosphere.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrescribedTendencies {
    /// Predictor calls so far, with their `vn_only` flag.
    pub predictor_calls: Vec<bool>,
    /// Corrector calls so far.
    pub corrector_calls: usize,
}

impl PrescribedTendencies {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VelocityAdvection for PrescribedTendencies {
    fn run_predictor_step(
        &mut self,
        vn_only: bool,
        _state: &PrognosticState,
        _diagnostic: &mut DiagnosticState,
        _fields: &mut VelocityFields,
        _dtime: f64,
    ) -> Result<(), SolverError> {
        self.predictor_calls.push(vn_only);
        Ok(())
    }

    fn run_corrector_step(
        &mut self,
        _state: &PrognosticState,
        _diagnostic: &mut DiagnosticState,
        _fields: &mut VelocityFields,
        _dtime: f64,
    ) -> Result<(), SolverError> {
        self.corrector_calls += 1;
        Ok(())
    }
}
