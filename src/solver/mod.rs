//! The nonhydrostatic solver.
//!
//! # Submodules
//!
//! - [`implicit`]: vertically implicit solve for `w`, `rho`, `exner`, `theta_v`
//! - [`divergence_damping`]: second- and fourth-order damping of `vn`
//! - [`ranges`]: horizontal ranges of every stage, resolved once
//! - [`velocity`]: seam to the velocity-advection collaborator
//! - [`solve_nonhydro`]: [`SolveNonhydro`], one predictor-corrector substep
//!
//! The predictor and the corrector are private to this module and only run
//! through [`SolveNonhydro::time_step`].

mod corrector;
pub mod divergence_damping;
pub mod implicit;
mod predictor;
pub mod ranges;
pub mod solve_nonhydro;
pub mod velocity;

use thiserror::Error;

use crate::config::ConfigError;
use crate::grid::GridError;
use crate::halo::ExchangeError;

pub use divergence_damping::{DivergenceDamping, DivergenceDampingCoefficients};
pub use implicit::ColumnTridiagonal;
pub use ranges::StageRanges;
pub use solve_nonhydro::{SolveNonhydro, SubstepContext};
pub use velocity::{PrescribedTendencies, VelocityAdvection};

/// Errors of the solver.
///
/// Everything but [`SolverError::Exchange`] and [`SolverError::Velocity`]
/// surfaces at construction or at the first substep and is a configuration
/// error; no variant is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// A state field handed to the solver does not match the grid.
    #[error("State field {0} does not match the grid")]
    MissingState(&'static str),

    /// The velocity-advection collaborator failed.
    #[error("Velocity advection failed: {0}")]
    Velocity(String),
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;
