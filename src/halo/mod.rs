//! Halo communication between ranks.
//!
//! A substep exchanges halo data at four fixed points. Every field mutated
//! since the previous point and read in a neighbor's halo is exchanged
//! before any stencil reads halo-owned data:
//!
//! ```text
//! predictor:  vn update ──► PredictorWind ──► fluxes, implicit solve ──► PredictorFluxAverage
//! corrector:  vn update, damping, IAU ──► CorrectorWind ──► fluxes, implicit solve
//! finish:     boundary and halo stencils ──► Finalize
//! ```
//!
//! The transport itself sits behind [`HaloExchange`]. A call that never
//! happens is a silent correctness bug, so [`RecordingExchange`] keeps the
//! call order for tests.

pub mod decomposition;

use std::fmt;

use thiserror::Error;

use crate::grid::IconGrid;
use crate::state::Field;
use crate::types::EntityKind;

pub use decomposition::{DecompositionFlag, DecompositionInfo, HaloGenerator};

/// Fixed exchange points of one substep, in call order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommunicationPhase {
    /// After the predictor's normal wind update.
    PredictorWind,
    /// After the predictor's flux averaging and implicit solve.
    PredictorFluxAverage,
    /// After the corrector's normal wind update and divergence damping.
    CorrectorWind,
    /// After the finishing stencils of the substep.
    Finalize,
}

impl CommunicationPhase {
    /// All phases in the order they occur within a substep.
    pub const ALL: [CommunicationPhase; 4] = [
        CommunicationPhase::PredictorWind,
        CommunicationPhase::PredictorFluxAverage,
        CommunicationPhase::CorrectorWind,
        CommunicationPhase::Finalize,
    ];

    /// Fields exchanged in this phase.
    ///
    /// `z_dwdz_dd` travels with the flux average only when the divergence
    /// damping is three-dimensional.
    pub fn fields(self, three_dimensional_damping: bool) -> Vec<FieldId> {
        match self {
            CommunicationPhase::PredictorWind | CommunicationPhase::CorrectorWind => vec![FieldId::Vn],
            CommunicationPhase::PredictorFluxAverage => {
                let mut fields = vec![FieldId::Rho, FieldId::Exner, FieldId::W];
                if three_dimensional_damping {
                    fields.push(FieldId::DwdzDd);
                }
                fields
            }
            CommunicationPhase::Finalize => vec![FieldId::Rho, FieldId::Exner, FieldId::W, FieldId::ThetaV],
        }
    }
}

impl fmt::Display for CommunicationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommunicationPhase::PredictorWind => "predictor_wind",
            CommunicationPhase::PredictorFluxAverage => "predictor_flux_average",
            CommunicationPhase::CorrectorWind => "corrector_wind",
            CommunicationPhase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Fields that cross rank boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldId {
    Vn,
    W,
    Rho,
    Exner,
    ThetaV,
    /// Vertical wind divergence for three-dimensional damping.
    DwdzDd,
}

impl FieldId {
    /// Entity kind the field lives on.
    pub const fn kind(self) -> EntityKind {
        match self {
            FieldId::Vn => EntityKind::Edge,
            FieldId::W | FieldId::Rho | FieldId::Exner | FieldId::ThetaV | FieldId::DwdzDd => EntityKind::Cell,
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldId::Vn => "vn",
            FieldId::W => "w",
            FieldId::Rho => "rho",
            FieldId::Exner => "exner",
            FieldId::ThetaV => "theta_v",
            FieldId::DwdzDd => "z_dwdz_dd",
        };
        f.write_str(name)
    }
}

/// A field handed to the transport for one exchange.
#[derive(Debug)]
pub struct HaloField<'a> {
    pub id: FieldId,
    pub kind: EntityKind,
    pub data: &'a mut Field,
}

impl<'a> HaloField<'a> {
    pub fn new(id: FieldId, data: &'a mut Field) -> Self {
        Self {
            id,
            kind: id.kind(),
            data,
        }
    }
}

/// Errors of the halo transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// The transport failed; the run cannot continue.
    #[error("Halo exchange failed in phase {phase}: {reason}")]
    Transport {
        phase: CommunicationPhase,
        reason: String,
    },

    /// A field does not cover the local entities of its kind.
    #[error("Field {field} has {actual} entities, the grid has {expected} {kind}s")]
    ShapeMismatch {
        field: FieldId,
        kind: EntityKind,
        expected: usize,
        actual: usize,
    },
}

/// Blocking exchange of halo data.
///
/// Returns once every listed field is consistent across rank boundaries.
pub trait HaloExchange {
    fn exchange(&mut self, phase: CommunicationPhase, fields: &mut [HaloField<'_>]) -> Result<(), ExchangeError>;
}

/// Transport of a single-rank run: there is no halo to fill.
#[derive(Clone, Debug, Default)]
pub struct SingleNodeExchange {
    counts: Option<[usize; 3]>,
}

impl SingleNodeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also check that every exchanged field covers the entities of `grid`.
    pub fn for_grid(grid: &IconGrid) -> Self {
        Self {
            counts: Some(EntityKind::ALL.map(|kind| grid.count(kind))),
        }
    }
}

impl HaloExchange for SingleNodeExchange {
    fn exchange(&mut self, phase: CommunicationPhase, fields: &mut [HaloField<'_>]) -> Result<(), ExchangeError> {
        log::trace!("{phase}: {} fields, single rank", fields.len());
        let Some(counts) = self.counts else {
            return Ok(());
        };
        for field in fields.iter() {
            let expected = counts[field.kind as usize];
            let actual = field.data.n_entities();
            if actual != expected {
                return Err(ExchangeError::ShapeMismatch {
                    field: field.id,
                    kind: field.kind,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Records every exchange call, then delegates to an inner transport.
#[derive(Clone, Debug, Default)]
pub struct RecordingExchange<X = SingleNodeExchange> {
    inner: X,
    calls: Vec<(CommunicationPhase, Vec<FieldId>)>,
}

impl RecordingExchange {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<X: HaloExchange> RecordingExchange<X> {
    /// Record around an existing transport.
    pub fn wrapping(inner: X) -> Self {
        Self {
            inner,
            calls: Vec::new(),
        }
    }

    /// Calls so far, in order.
    pub fn calls(&self) -> &[(CommunicationPhase, Vec<FieldId>)] {
        &self.calls
    }

    /// Phases of the calls so far, in order.
    pub fn phases(&self) -> Vec<CommunicationPhase> {
        self.calls.iter().map(|(phase, _)| *phase).collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl<X: HaloExchange> HaloExchange for RecordingExchange<X> {
    fn exchange(&mut self, phase: CommunicationPhase, fields: &mut [HaloField<'_>]) -> Result<(), ExchangeError> {
        self.calls.push((phase, fields.iter().map(|f| f.id).collect()));
        self.inner.exchange(phase, fields)
    }
}
