//! One predictor-corrector substep of the nonhydrostatic equations.
//!
//! ```text
//! predictor:  velocity tendencies (now) ─► perturbations ─► rho/theta at edges
//!             ─► pressure gradient ─► vn(new) ─► [PredictorWind]
//!             ─► fluxes ─► implicit solve ─► [PredictorFluxAverage]
//! corrector:  velocity tendencies (new) ─► interface values ─► vn(new)
//!             ─► divergence damping, IAU ─► [CorrectorWind]
//!             ─► fluxes, tracer fluxes ─► implicit solve
//! finish:     boundary and halo theta/exner ─► [Finalize]
//! ```
//!
//! The solver owns the static inputs (grid, metrics, interpolation
//! coefficients) and the scratch fields. Prognostic and diagnostic state is
//! handed in per substep; the caller swaps time levels between substeps.

use log::debug;

use super::divergence_damping::DivergenceDamping;
use super::ranges::StageRanges;
use super::velocity::VelocityAdvection;
use super::{SolverError, SolverResult};
use crate::config::{ConfigError, NonHydrostaticConfig, NonHydrostaticParams, RhoThetaAdvection};
use crate::geometry::{CellGeometry, EdgeGeometry, InterpolationState};
use crate::grid::{Connectivity, GridError, IconGrid, VerticalGrid};
use crate::halo::{CommunicationPhase, FieldId, HaloExchange, HaloField};
use crate::metrics::MetricState;
use crate::state::{DiagnosticState, IntermediateFields, PrepAdvection, PrognosticState, TimeLevels, VelocityFields};
use crate::stencils::boundary::{theta_and_exner_from_boundary, update_theta_v_halo};

/// Neighbor tables every configuration dereferences.
const REQUIRED_CONNECTIVITIES: [Connectivity; 5] = [
    Connectivity::E2C,
    Connectivity::E2C2EO,
    Connectivity::E2C2E,
    Connectivity::C2E,
    Connectivity::C2E2CO,
];

/// Flags of one substep, set by the driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubstepContext {
    /// Substep length [s].
    pub dtime: f64,
    /// Recompute the velocity tendencies in the predictor.
    pub recompute: bool,
    /// Reset the tracer flux accumulators before accumulating.
    pub clean_mflx: bool,
    /// Very first substep of the run.
    pub first_in_simulation: bool,
    pub at_first_substep: bool,
    pub at_last_substep: bool,
}

impl SubstepContext {
    /// Flags of substep `index` (0-based) out of `n_substeps`.
    pub fn for_substep(dtime: f64, index: usize, n_substeps: usize, first_in_simulation: bool) -> Self {
        let at_first_substep = index == 0;
        Self {
            dtime,
            recompute: at_first_substep,
            clean_mflx: at_first_substep,
            first_in_simulation,
            at_first_substep,
            at_last_substep: index + 1 == n_substeps,
        }
    }
}

/// The nonhydrostatic solver of one domain.
pub struct SolveNonhydro {
    pub(super) grid: IconGrid,
    pub(super) config: NonHydrostaticConfig,
    pub(super) params: NonHydrostaticParams,
    pub(super) vertical: VerticalGrid,
    pub(super) metrics: MetricState,
    pub(super) interpolation: InterpolationState,
    pub(super) edges: EdgeGeometry,
    pub(super) cells: CellGeometry,
    pub(super) ranges: StageRanges,
    pub(super) damping: DivergenceDamping,
    pub(super) z: IntermediateFields,
    pub(super) velocity_fields: VelocityFields,
}

impl SolveNonhydro {
    /// Validate the configuration against the inputs and allocate scratch.
    ///
    /// Every configuration, shape and connectivity error surfaces here.
    pub fn new(
        grid: IconGrid,
        config: NonHydrostaticConfig,
        vertical: VerticalGrid,
        metrics: MetricState,
        interpolation: InterpolationState,
        edges: EdgeGeometry,
        cells: CellGeometry,
    ) -> SolverResult<Self> {
        let params = NonHydrostaticParams::new(&config)?;

        if vertical.n_levels() != grid.n_levels() {
            return Err(GridError::size_mismatch("vertical levels", grid.n_levels(), vertical.n_levels()).into());
        }
        config.check_vertical(&vertical)?;
        metrics.validate_shapes(&grid)?;
        interpolation.validate_shapes(&grid)?;
        edges.validate_shapes(&grid)?;
        cells.validate_shapes(&grid)?;

        for connectivity in REQUIRED_CONNECTIVITIES {
            grid.connectivity(connectivity)?;
        }
        if config.iadv_rhotheta == RhoThetaAdvection::SimplifiedMiura {
            grid.connectivity(Connectivity::V2C)?;
            grid.connectivity(Connectivity::E2V)?;
        }

        let ranges = StageRanges::new(&grid)?;
        ranges.check_connectivity(&grid, config.iadv_rhotheta)?;

        let damping = DivergenceDamping::new(&config, &params, &vertical, cells.mean_cell_area, grid.limited_area());
        let z = IntermediateFields::new(&grid);
        let velocity_fields = VelocityFields::new(&grid);

        debug!(
            "SolveNonhydro: {} cells, {} edges, {} levels, limited area {}, iadv_rhotheta {}, divdamp {:?}/{:?}",
            grid.n_cells(),
            grid.n_edges(),
            grid.n_levels(),
            grid.limited_area(),
            config.iadv_rhotheta,
            config.divdamp_order,
            config.divdamp_type
        );

        Ok(Self {
            grid,
            config,
            params,
            vertical,
            metrics,
            interpolation,
            edges,
            cells,
            ranges,
            damping,
            z,
            velocity_fields,
        })
    }

    /// Advance `prognostics` from `current()` to `next()` by one substep.
    ///
    /// `current()` is read only. Values of `next()` outside the updated ranges
    /// are left as they were.
    pub fn time_step(
        &mut self,
        ctx: &SubstepContext,
        diagnostic: &mut DiagnosticState,
        prognostics: &mut TimeLevels<PrognosticState>,
        prep_adv: &mut PrepAdvection,
        velocity: &mut impl VelocityAdvection,
        exchange: &mut impl HaloExchange,
    ) -> SolverResult<()> {
        self.check_state(ctx, diagnostic, prognostics, prep_adv)?;

        let (now, new) = prognostics.current_and_next_mut();
        self.run_predictor_step(ctx, diagnostic, now, new, velocity, exchange)?;
        self.run_corrector_step(ctx, diagnostic, now, new, prep_adv, velocity, exchange)?;
        self.finish_substep(now, new, exchange)
    }

    fn check_state(
        &self,
        ctx: &SubstepContext,
        diagnostic: &DiagnosticState,
        prognostics: &TimeLevels<PrognosticState>,
        prep_adv: &PrepAdvection,
    ) -> SolverResult<()> {
        if !(ctx.dtime.is_finite() && ctx.dtime > 0.0) {
            return Err(ConfigError::InvalidValue {
                option: "dtime",
                reason: format!("must be positive and finite, got {}", ctx.dtime),
            }
            .into());
        }
        if !prognostics.current().matches(&self.grid) {
            return Err(SolverError::MissingState("prognostic state (now)"));
        }
        if !prognostics.next().matches(&self.grid) {
            return Err(SolverError::MissingState("prognostic state (new)"));
        }
        if let Some(name) = diagnostic.first_mismatch(&self.grid) {
            return Err(SolverError::MissingState(name));
        }
        if !prep_adv.matches(&self.grid) {
            return Err(SolverError::MissingState("prep_adv"));
        }
        Ok(())
    }

    /// Boundary and halo values of theta and exner, then the final exchange.
    fn finish_substep(
        &self,
        now: &PrognosticState,
        new: &mut PrognosticState,
        exchange: &mut impl HaloExchange,
    ) -> SolverResult<()> {
        let metrics = &self.metrics;
        let ranges = &self.ranges;

        if self.grid.limited_area() {
            // the lateral-boundary exner slot holds theta_v until here
            let bdy_halo = ranges.cell_halo.into_iter().filter(|&c| metrics.bdy_halo_c[c]);
            theta_and_exner_from_boundary(&new.rho, &mut new.theta_v, &mut new.exner, bdy_halo);
            theta_and_exner_from_boundary(&new.rho, &mut new.theta_v, &mut new.exner, ranges.cell_lateral_boundary);
        }
        update_theta_v_halo(
            &now.rho,
            &now.theta_v,
            &now.exner,
            &new.rho,
            &new.exner,
            &mut new.theta_v,
            metrics.prognostic_halo_cells(ranges.cell_halo),
        );

        exchange.exchange(
            CommunicationPhase::Finalize,
            &mut [
                HaloField::new(FieldId::Rho, &mut new.rho),
                HaloField::new(FieldId::Exner, &mut new.exner),
                HaloField::new(FieldId::W, &mut new.w),
                HaloField::new(FieldId::ThetaV, &mut new.theta_v),
            ],
        )?;
        Ok(())
    }

    pub fn grid(&self) -> &IconGrid {
        &self.grid
    }

    pub fn config(&self) -> &NonHydrostaticConfig {
        &self.config
    }

    pub fn params(&self) -> &NonHydrostaticParams {
        &self.params
    }

    pub fn vertical(&self) -> &VerticalGrid {
        &self.vertical
    }

    pub fn metrics(&self) -> &MetricState {
        &self.metrics
    }

    pub fn interpolation(&self) -> &InterpolationState {
        &self.interpolation
    }

    pub fn edge_geometry(&self) -> &EdgeGeometry {
        &self.edges
    }

    pub fn cell_geometry(&self) -> &CellGeometry {
        &self.cells
    }

    pub fn ranges(&self) -> &StageRanges {
        &self.ranges
    }

    pub fn damping(&self) -> &DivergenceDamping {
        &self.damping
    }

    /// Scratch fields of the last substep.
    pub fn intermediate(&self) -> &IntermediateFields {
        &self.z
    }

    pub fn velocity_fields(&self) -> &VelocityFields {
        &self.velocity_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeScheme;
    use crate::halo::RecordingExchange;
    use crate::solver::PrescribedTendencies;
    use crate::testing::Fixture;
    use approx::assert_abs_diff_eq;

    fn solver(fixture: Fixture) -> SolveNonhydro {
        let Fixture {
            mesh,
            vertical,
            metrics,
            config,
        } = fixture;
        SolveNonhydro::new(
            mesh.grid,
            config,
            vertical,
            metrics,
            mesh.interpolation,
            mesh.edges,
            mesh.cells,
        )
        .unwrap()
    }

    fn resting(solver: &SolveNonhydro) -> (DiagnosticState, TimeLevels<PrognosticState>, PrepAdvection) {
        let grid = solver.grid();
        let state = PrognosticState::at_rest(grid, solver.metrics());
        (
            DiagnosticState::new(grid),
            TimeLevels::filled(state),
            PrepAdvection::new(grid),
        )
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let mut fixture = Fixture::torus(2);
        fixture.config.itime_scheme = TimeScheme::FullPredictorCorrector;
        let Fixture {
            mesh,
            vertical,
            metrics,
            config,
        } = fixture;
        let err = SolveNonhydro::new(
            mesh.grid,
            config,
            vertical,
            metrics,
            mesh.interpolation,
            mesh.edges,
            mesh.cells,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SolverError::Config(ConfigError::NotImplemented { .. })));
    }

    #[test]
    fn test_rejects_mismatched_vertical_grid() {
        let fixture = Fixture::torus(3);
        let other = Fixture::torus(4);
        let Fixture {
            mesh,
            metrics,
            config,
            ..
        } = fixture;
        let err = SolveNonhydro::new(
            mesh.grid,
            config,
            other.vertical,
            metrics,
            mesh.interpolation,
            mesh.edges,
            mesh.cells,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SolverError::Grid(GridError::SizeMismatch { .. })));
    }

    #[test]
    fn test_rejects_invalid_dtime() {
        let mut solver = solver(Fixture::torus(2));
        let (mut diagnostic, mut prognostics, mut prep_adv) = resting(&solver);
        let ctx = SubstepContext::for_substep(0.0, 0, 1, true);
        let err = solver
            .time_step(
                &ctx,
                &mut diagnostic,
                &mut prognostics,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap_err();
        assert!(matches!(err, SolverError::Config(ConfigError::InvalidValue { option: "dtime", .. })));
    }

    #[test]
    fn test_rejects_misshapen_state() {
        let mut solver = solver(Fixture::torus(2));
        let (mut diagnostic, mut prognostics, _) = resting(&solver);
        let mut prep_adv = PrepAdvection::new(solver.grid());
        prep_adv.mass_flx_ic = crate::state::Field::zeros(1, 1);
        let err = solver
            .time_step(
                &SubstepContext::for_substep(10.0, 0, 1, true),
                &mut diagnostic,
                &mut prognostics,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap_err();
        assert_eq!(err, SolverError::MissingState("prep_adv"));
    }

    #[test]
    fn test_resting_atmosphere_stays_at_rest() {
        let mut solver = solver(Fixture::torus(4));
        let (mut diagnostic, mut prognostics, mut prep_adv) = resting(&solver);
        let initial = prognostics.current().clone();

        solver
            .time_step(
                &SubstepContext::for_substep(10.0, 0, 1, true),
                &mut diagnostic,
                &mut prognostics,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap();

        let new = prognostics.next();
        assert!(new.vn.max_abs() < 1e-12);
        assert!(new.w.max_abs() < 1e-12);
        for (a, b) in new.rho.as_slice().iter().zip(initial.rho.as_slice()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        for (a, b) in new.exner.as_slice().iter().zip(initial.exner.as_slice()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        for (a, b) in new.theta_v.as_slice().iter().zip(initial.theta_v.as_slice()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
        assert!(prep_adv.mass_flx_me.max_abs() < 1e-12);
    }

    #[test]
    fn test_velocity_advection_calls() {
        let mut solver = solver(Fixture::torus(2));
        let (mut diagnostic, mut prognostics, mut prep_adv) = resting(&solver);
        let mut velocity = PrescribedTendencies::new();
        let mut exchange = RecordingExchange::new();

        for (index, first) in [(0, true), (1, false), (0, false)] {
            let ctx = SubstepContext::for_substep(10.0, index, 2, first);
            solver
                .time_step(
                    &ctx,
                    &mut diagnostic,
                    &mut prognostics,
                    &mut prep_adv,
                    &mut velocity,
                    &mut exchange,
                )
                .unwrap();
        }

        // first run computes w tendencies too; the second substep reuses them
        assert_eq!(velocity.predictor_calls, vec![false, true]);
        assert_eq!(velocity.corrector_calls, 3);
        assert_eq!(exchange.calls().len(), 3 * CommunicationPhase::ALL.len());
    }

    #[test]
    fn test_substep_flags() {
        let first = SubstepContext::for_substep(5.0, 0, 3, true);
        assert!(first.recompute && first.clean_mflx && first.at_first_substep);
        assert!(!first.at_last_substep);
        let last = SubstepContext::for_substep(5.0, 2, 3, false);
        assert!(!last.recompute && !last.clean_mflx && last.at_last_substep);
    }

    #[test]
    fn test_analysis_increment_of_wind() {
        let mut fixture = Fixture::torus(3);
        fixture.config = fixture.config.with_lhdiff_rcf(false).with_iau(0.5);
        let mut solver = solver(fixture);
        let (mut diagnostic, mut prognostics, mut prep_adv) = resting(&solver);
        let (n_edges, n_levels) = (solver.grid().n_edges(), solver.grid().n_levels());
        diagnostic.vn_incr = crate::state::Field::from_fn(n_edges, n_levels, |e, k| ((e + 2 * k) % 5) as f64 - 2.0);

        solver
            .time_step(
                &SubstepContext::for_substep(10.0, 0, 1, true),
                &mut diagnostic,
                &mut prognostics,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap();

        // the corrector rebuilds vn from the resting state before the increment
        let vn = &prognostics.next().vn;
        for e in 0..n_edges {
            for k in 0..n_levels {
                assert_abs_diff_eq!(vn[(e, k)], 0.5 * diagnostic.vn_incr[(e, k)], epsilon = 1e-12);
            }
        }
    }
}
