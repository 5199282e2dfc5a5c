//! Time loop over advective steps and their acoustic substeps.
//!
//! ```text
//! for step in 0..n_time_steps:
//!     for substep in 0..n_substeps:
//!         solver.time_step(flags(substep))      now ─► next
//!         check_finite(next)                    optional
//!         advance()                             next becomes now
//! ```
//!
//! `recompute` and `clean_mflx` are set on the first substep of every step
//! only, `first_in_simulation` on the very first substep of the run.
//!
//! # Example
//!
//! ```ignore
//! let mut time_loop = TimeLoop::new(RunConfig::default().with_dtime(60.0), solver, state)?;
//! let summary = time_loop.run(&mut diagnostic, &mut prep_adv, &mut velocity, &mut exchange)?;
//! ```

pub mod monitor;

use std::time::Instant;

use log::info;
use thiserror::Error;

use crate::halo::HaloExchange;
use crate::solver::{SolveNonhydro, SolverError, SubstepContext, VelocityAdvection};
use crate::state::{DiagnosticState, PrepAdvection, PrognosticState, TimeLevels};

pub use monitor::check_finite;

// =============================================================================
// Errors
// =============================================================================

/// Errors of a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// The new state holds a NaN or infinity.
    #[error("Non-finite {field} = {value} at entity {entity}, level {level}")]
    NonFinite {
        field: &'static str,
        entity: usize,
        level: usize,
        value: f64,
    },

    /// The run configuration is inconsistent.
    #[error("Invalid run configuration: {0}")]
    InvalidRun(String),
}

// =============================================================================
// Run configuration
// =============================================================================

/// Configuration of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Advective time step [s]; every substep is `dtime / n_substeps` long.
    pub dtime: f64,
    /// Acoustic substeps per advective step.
    pub n_substeps: usize,
    /// Advective steps of the run.
    pub n_time_steps: usize,
    /// Check the new state for non-finite values after every substep.
    pub check_finite: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dtime: 300.0,
            n_substeps: 5,
            n_time_steps: 1,
            check_finite: true,
        }
    }
}

impl RunConfig {
    /// Set the advective time step.
    pub fn with_dtime(mut self, dtime: f64) -> Self {
        self.dtime = dtime;
        self
    }

    /// Set the number of substeps per advective step.
    pub fn with_n_substeps(mut self, n_substeps: usize) -> Self {
        self.n_substeps = n_substeps;
        self
    }

    /// Set the number of advective steps.
    pub fn with_n_time_steps(mut self, n_time_steps: usize) -> Self {
        self.n_time_steps = n_time_steps;
        self
    }

    /// Switch the finite-value check on or off.
    pub fn with_check_finite(mut self, check_finite: bool) -> Self {
        self.check_finite = check_finite;
        self
    }

    /// Length of one substep [s].
    pub fn substep_dtime(&self) -> f64 {
        self.dtime / self.n_substeps as f64
    }
}

// =============================================================================
// Run summary
// =============================================================================

/// Statistics of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Advective steps taken.
    pub n_time_steps: usize,
    /// Substeps taken.
    pub n_substeps: usize,
    /// Simulated time [s].
    pub simulated_time: f64,
    /// Wall-clock time [s].
    pub wall_time: f64,
}

// =============================================================================
// Time loop
// =============================================================================

/// Owns the solver and the prognostic time levels of a run.
pub struct TimeLoop {
    config: RunConfig,
    solver: SolveNonhydro,
    prognostics: TimeLevels<PrognosticState>,
    substeps_done: usize,
}

impl TimeLoop {
    /// Start a run from `state`, copied into both time levels.
    pub fn new(config: RunConfig, solver: SolveNonhydro, state: PrognosticState) -> Result<Self, DriverError> {
        if config.n_substeps == 0 {
            return Err(DriverError::InvalidRun("n_substeps must be at least 1".into()));
        }
        if config.n_substeps != solver.config().ndyn_substeps {
            return Err(DriverError::InvalidRun(format!(
                "n_substeps = {} but the solver is configured for ndyn_substeps = {}",
                config.n_substeps,
                solver.config().ndyn_substeps
            )));
        }
        if !(config.dtime.is_finite() && config.dtime > 0.0) {
            return Err(DriverError::InvalidRun(format!(
                "dtime must be positive and finite, got {}",
                config.dtime
            )));
        }
        if !state.matches(solver.grid()) {
            return Err(SolverError::MissingState("initial prognostic state").into());
        }
        Ok(Self {
            config,
            solver,
            prognostics: TimeLevels::filled(state),
            substeps_done: 0,
        })
    }

    /// Run all configured steps.
    pub fn run(
        &mut self,
        diagnostic: &mut DiagnosticState,
        prep_adv: &mut PrepAdvection,
        velocity: &mut impl VelocityAdvection,
        exchange: &mut impl HaloExchange,
    ) -> Result<RunSummary, DriverError> {
        self.run_with_callback(diagnostic, prep_adv, velocity, exchange, |_, _| {})
    }

    /// Run all configured steps, calling `callback` with the state and the
    /// step number after every advective step.
    pub fn run_with_callback<F>(
        &mut self,
        diagnostic: &mut DiagnosticState,
        prep_adv: &mut PrepAdvection,
        velocity: &mut impl VelocityAdvection,
        exchange: &mut impl HaloExchange,
        mut callback: F,
    ) -> Result<RunSummary, DriverError>
    where
        F: FnMut(&PrognosticState, usize),
    {
        let start_wall = Instant::now();
        let n_substeps = self.config.n_substeps;
        let dtime = self.config.substep_dtime();

        for step in 0..self.config.n_time_steps {
            for substep in 0..n_substeps {
                let ctx = SubstepContext::for_substep(dtime, substep, n_substeps, self.substeps_done == 0);
                info!(
                    "step {step} substep {}/{n_substeps}: now = slot {}",
                    substep + 1,
                    self.prognostics.parity()
                );
                self.solver
                    .time_step(&ctx, diagnostic, &mut self.prognostics, prep_adv, velocity, exchange)?;
                if self.config.check_finite {
                    check_finite(self.prognostics.next())?;
                }
                self.prognostics.advance();
                diagnostic.advance();
                self.substeps_done += 1;
            }
            callback(self.prognostics.current(), step);
        }

        let n_time_steps = self.config.n_time_steps;
        Ok(RunSummary {
            n_time_steps,
            n_substeps: n_time_steps * n_substeps,
            simulated_time: n_time_steps as f64 * self.config.dtime,
            wall_time: start_wall.elapsed().as_secs_f64(),
        })
    }

    /// State at the current time level.
    pub fn prognostics(&self) -> &PrognosticState {
        self.prognostics.current()
    }

    pub fn solver(&self) -> &SolveNonhydro {
        &self.solver
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Substeps taken since the start of the run.
    pub fn substeps_done(&self) -> usize {
        self.substeps_done
    }
}
