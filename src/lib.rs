//! # nh-dycore
//!
//! The nonhydrostatic dynamical core of an icosahedral-triangular atmosphere
//! model: one predictor-corrector substep of the compressible Euler
//! equations, with vertically implicit sound waves.
//!
//! This crate provides:
//! - Unstructured C-grid connectivity with lateral-boundary, nudging and halo zones
//! - Vertical grid, reference atmosphere and flat-terrain metrics
//! - Interpolation coefficients derived from the horizontal geometry
//! - The stencils of the predictor and the corrector
//! - The vertically implicit tridiagonal solve and Klemp Rayleigh damping
//! - Second- and fourth-order divergence damping
//! - Halo communication phases and a halo generator for domain decomposition
//! - A time loop over advective steps and acoustic substeps
//!
//! ## Feature flags
//!
//! - `parallel`: column-parallel vertical sweeps via rayon

pub mod config;
pub mod constants;
pub mod driver;
pub mod geometry;
pub mod grid;
pub mod halo;
pub mod metrics;
pub mod solver;
pub mod state;
pub mod stencils;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::{ConfigError, NonHydrostaticConfig, NonHydrostaticParams};
pub use driver::{DriverError, RunConfig, RunSummary, TimeLoop};
pub use geometry::{CellGeometry, EdgeGeometry, InterpolationState};
pub use grid::{
    Connectivity, GridBuilder, GridError, IconGrid, IndexRange, NeighborTable, SyntheticMesh, VerticalGrid,
    VerticalParams, Zone,
};
pub use halo::{
    CommunicationPhase, DecompositionInfo, ExchangeError, FieldId, HaloExchange, HaloField, HaloGenerator,
    RecordingExchange, SingleNodeExchange,
};
pub use metrics::{MetricState, ReferenceAtmosphere};
pub use solver::{
    DivergenceDamping, PrescribedTendencies, SolveNonhydro, SolverError, SolverResult, SubstepContext,
    VelocityAdvection,
};
pub use state::{DiagnosticState, Field, PrepAdvection, PrognosticState, TimeLevels};
pub use types::EntityKind;
