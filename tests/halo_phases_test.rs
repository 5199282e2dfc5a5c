//! Integration tests for the halo exchange points of a run.
//!
//! Every substep must call the transport at the four fixed points, in
//! order, with the fields each point requires. The order is the same on
//! global and limited-area grids and for every edge reconstruction.

use nh_dycore::config::{DivergenceDampingType, RhoThetaAdvection};
use nh_dycore::{
    CommunicationPhase, DiagnosticState, DriverError, ExchangeError, FieldId, HaloExchange, HaloField,
    MetricState, NonHydrostaticConfig, PrepAdvection, PrescribedTendencies, PrognosticState, RecordingExchange,
    ReferenceAtmosphere, RunConfig, SingleNodeExchange, SolveNonhydro, SolverError, SyntheticMesh, TimeLoop,
    VerticalGrid, VerticalParams,
};

fn time_loop(config: NonHydrostaticConfig, run: RunConfig) -> TimeLoop {
    time_loop_on(SyntheticMesh::torus(3, 10_000.0, 4).unwrap(), config, run)
}

fn time_loop_on(mesh: SyntheticMesh, config: NonHydrostaticConfig, run: RunConfig) -> TimeLoop {
    let vertical = VerticalGrid::uniform(4, 12_000.0, &VerticalParams::default()).unwrap();
    let metrics = MetricState::flat_terrain(
        &mesh.grid,
        &vertical,
        &ReferenceAtmosphere::default(),
        &mesh.interpolation,
        &config,
    )
    .unwrap();
    let state = PrognosticState::at_rest(&mesh.grid, &metrics);
    let solver = SolveNonhydro::new(
        mesh.grid,
        config,
        vertical,
        metrics,
        mesh.interpolation,
        mesh.edges,
        mesh.cells,
    )
    .unwrap();
    TimeLoop::new(run, solver, state).unwrap()
}

fn run<X: HaloExchange>(time_loop: &mut TimeLoop, exchange: &mut X) -> Result<(), DriverError> {
    let grid = time_loop.solver().grid().clone();
    let mut diagnostic = DiagnosticState::new(&grid);
    let mut prep_adv = PrepAdvection::new(&grid);
    time_loop
        .run(&mut diagnostic, &mut prep_adv, &mut PrescribedTendencies::new(), exchange)
        .map(|_| ())
}

/// Test the phase order and field lists with three-dimensional damping.
#[test]
fn test_phases_of_every_substep() {
    let config = NonHydrostaticConfig::default().with_ndyn_substeps(2);
    let mut time_loop = time_loop(config, RunConfig::default().with_dtime(30.0).with_n_substeps(2));
    let grid = time_loop.solver().grid().clone();
    let mut exchange = RecordingExchange::wrapping(SingleNodeExchange::for_grid(&grid));
    run(&mut time_loop, &mut exchange).unwrap();

    assert_phases_per_substep(&exchange, 2);
    for (phase, fields) in exchange.calls() {
        assert_eq!(fields, &phase.fields(true), "{phase}");
    }
    assert_eq!(exchange.calls()[1].1.last(), Some(&FieldId::DwdzDd));
}

fn assert_phases_per_substep(exchange: &RecordingExchange, n_substeps: usize) {
    let expected: Vec<_> = (0..n_substeps).flat_map(|_| CommunicationPhase::ALL).collect();
    assert_eq!(exchange.phases(), expected);
}

/// Test the phase order on a limited-area grid.
#[test]
fn test_phases_on_limited_area() {
    let config = NonHydrostaticConfig::default().with_ndyn_substeps(2);
    let mesh = SyntheticMesh::torus(6, 10_000.0, 4)
        .and_then(|mesh| mesh.with_lateral_boundary(1, config.nudge_max_coeff))
        .unwrap();
    assert!(mesh.grid.limited_area());
    let mut time_loop = time_loop_on(mesh, config, RunConfig::default().with_dtime(30.0).with_n_substeps(2));
    let mut exchange = RecordingExchange::new();
    run(&mut time_loop, &mut exchange).unwrap();

    assert_phases_per_substep(&exchange, 2);
}

/// Test the phase order with the centered rho/theta reconstruction.
#[test]
fn test_phases_with_centered_reconstruction() {
    let config = NonHydrostaticConfig::default()
        .with_ndyn_substeps(3)
        .with_iadv_rhotheta(RhoThetaAdvection::SimplifiedMiura);
    let mut time_loop = time_loop(config, RunConfig::default().with_dtime(30.0).with_n_substeps(3));
    let mut exchange = RecordingExchange::new();
    run(&mut time_loop, &mut exchange).unwrap();

    assert_phases_per_substep(&exchange, 3);
}

/// Test that two-dimensional damping leaves `z_dwdz_dd` out of the flux average.
#[test]
fn test_two_dimensional_damping_skips_dwdz() {
    let config = NonHydrostaticConfig::default()
        .with_ndyn_substeps(1)
        .with_divdamp_type(DivergenceDampingType::TwoDimensional);
    let mut time_loop = time_loop(config, RunConfig::default().with_dtime(10.0).with_n_substeps(1));
    let mut exchange = RecordingExchange::new();
    run(&mut time_loop, &mut exchange).unwrap();

    let (phase, fields) = &exchange.calls()[1];
    assert_eq!(*phase, CommunicationPhase::PredictorFluxAverage);
    assert_eq!(fields, &vec![FieldId::Rho, FieldId::Exner, FieldId::W]);
    assert!(exchange.calls().iter().all(|(_, fields)| !fields.contains(&FieldId::DwdzDd)));
}

/// Transport that fails at one phase.
struct FailingExchange {
    fail_at: CommunicationPhase,
    calls: usize,
}

impl HaloExchange for FailingExchange {
    fn exchange(&mut self, phase: CommunicationPhase, _fields: &mut [HaloField<'_>]) -> Result<(), ExchangeError> {
        self.calls += 1;
        if phase == self.fail_at {
            return Err(ExchangeError::Transport {
                phase,
                reason: "link down".into(),
            });
        }
        Ok(())
    }
}

/// Test that a transport failure aborts the substep.
#[test]
fn test_transport_failure_stops_the_run() {
    let config = NonHydrostaticConfig::default().with_ndyn_substeps(2);
    let mut time_loop = time_loop(config, RunConfig::default().with_dtime(30.0).with_n_substeps(2));
    let mut exchange = FailingExchange {
        fail_at: CommunicationPhase::CorrectorWind,
        calls: 0,
    };

    let err = run(&mut time_loop, &mut exchange).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Solver(SolverError::Exchange(ExchangeError::Transport {
            phase: CommunicationPhase::CorrectorWind,
            ..
        }))
    ));
    assert_eq!(exchange.calls, 3);
    assert_eq!(time_loop.substeps_done(), 0);
}
