//! Field state of the dynamical core.
//!
//! - [`Field`] / [`NeighborWeights`]: dense storage
//! - [`PrognosticState`] and the [`TimeLevels`] ring buffer
//! - [`DiagnosticState`] / [`PrepAdvection`]: persistent diagnostics and
//!   tracer-preparation fluxes
//! - [`IntermediateFields`] / [`VelocityFields`]: per-substep scratch

mod diagnostic;
mod field;
mod intermediate;
mod prognostic;

pub use diagnostic::{DiagnosticState, PrepAdvection};
pub use field::{Field, NeighborWeights};
pub use intermediate::{IntermediateFields, VelocityFields};
pub use prognostic::{PrognosticState, TimeLevels};
