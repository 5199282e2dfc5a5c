//! Integration tests for divergence damping on a periodic torus.
//!
//! These tests verify:
//! - Fourth-order damping reduces the divergence of a noisy wind
//! - Switching damping off leaves the wind untouched
//! - The fourth-order coefficient grows with height

use nh_dycore::config::{DivergenceDampingOrder, DivergenceDampingType};
use nh_dycore::solver::divergence_damping::{DampingOperands, DampingRanges};
use nh_dycore::{
    Connectivity, DivergenceDamping, Field, IndexRange, MetricState, NonHydrostaticConfig, NonHydrostaticParams,
    ReferenceAtmosphere, SyntheticMesh, VerticalGrid, VerticalParams,
};

struct Setup {
    mesh: SyntheticMesh,
    vertical: VerticalGrid,
    metrics: MetricState,
}

fn setup(config: &NonHydrostaticConfig) -> Setup {
    let mesh = SyntheticMesh::torus(4, 2_000.0, 3).unwrap();
    let vertical = VerticalGrid::uniform(3, 9_000.0, &VerticalParams::default()).unwrap();
    let metrics = MetricState::flat_terrain(
        &mesh.grid,
        &vertical,
        &ReferenceAtmosphere::default(),
        &mesh.interpolation,
        config,
    )
    .unwrap();
    Setup { mesh, vertical, metrics }
}

/// Divergence of `vn` at level 0, squared and summed over cells.
fn divergence_norm(mesh: &SyntheticMesh, vn: &Field) -> f64 {
    let c2e = mesh.grid.connectivity(Connectivity::C2E).unwrap();
    (0..mesh.grid.n_cells())
        .map(|c| {
            let div: f64 = c2e
                .row(c)
                .enumerate()
                .filter_map(|(j, e)| e.map(|e| mesh.interpolation.geofac_div[(c, j)] * vn[(e, 0)]))
                .sum();
            div * div
        })
        .sum()
}

/// Gradient of the divergence of `vn` on every edge and level.
fn graddiv(mesh: &SyntheticMesh, vn: &Field) -> Field {
    let e2c2eo = mesh.grid.connectivity(Connectivity::E2C2EO).unwrap();
    Field::from_fn(vn.n_entities(), vn.n_levels(), |e, k| {
        e2c2eo
            .row(e)
            .enumerate()
            .filter_map(|(j, n)| n.map(|n| mesh.interpolation.geofac_grdiv[(e, j)] * vn[(n, k)]))
            .sum()
    })
}

fn damp(setup: &Setup, damping: &DivergenceDamping, vn: &mut Field) {
    let grid = &setup.mesh.grid;
    let mut z_graddiv_vn = graddiv(&setup.mesh, vn);
    let mut z_graddiv2_vn = Field::zeros(grid.n_edges(), grid.n_levels());
    let z_dwdz_dd = Field::zeros(grid.n_cells(), grid.n_levels());
    let all = IndexRange::new(0, grid.n_edges());
    damping.apply(
        &DampingOperands {
            e2c: grid.connectivity(Connectivity::E2C).unwrap(),
            e2c2eo: grid.connectivity(Connectivity::E2C2EO).unwrap(),
            interpolation: &setup.mesh.interpolation,
            inv_dual_edge_length: &setup.mesh.edges.inverse_dual_edge_length,
            metrics: &setup.metrics,
            z_dwdz_dd: &z_dwdz_dd,
        },
        &mut z_graddiv_vn,
        &mut z_graddiv2_vn,
        vn,
        &DampingRanges {
            graddiv: all,
            interior: all,
            local: all,
        },
    );
}

fn noisy_wind(n_edges: usize, n_levels: usize) -> Field {
    Field::from_fn(n_edges, n_levels, |e, k| ((e * 7 + k * 3) % 11) as f64 / 5.0 - 1.0)
}

/// Test that repeated fourth-order damping reduces the divergence.
#[test]
fn test_fourth_order_reduces_divergence() {
    let config = NonHydrostaticConfig::default()
        .with_divdamp_order(DivergenceDampingOrder::Fourth)
        .with_divdamp_type(DivergenceDampingType::TwoDimensional)
        .with_uniform_divdamp_fac(0.004);
    let setup = setup(&config);
    let params = NonHydrostaticParams::new(&config).unwrap();
    let damping = DivergenceDamping::new(
        &config,
        &params,
        &setup.vertical,
        setup.mesh.cells.mean_cell_area,
        false,
    );

    let mut vn = noisy_wind(setup.mesh.grid.n_edges(), 3);
    let mut norm = divergence_norm(&setup.mesh, &vn);
    assert!(norm > 0.0);
    for _ in 0..3 {
        damp(&setup, &damping, &mut vn);
        let next = divergence_norm(&setup.mesh, &vn);
        assert!(next < norm, "divergence grew from {norm} to {next}");
        norm = next;
    }
}

/// Test that second-order damping reduces the divergence as well.
#[test]
fn test_second_order_reduces_divergence() {
    let config = NonHydrostaticConfig::default()
        .with_divdamp_order(DivergenceDampingOrder::Second)
        .with_divdamp_type(DivergenceDampingType::TwoDimensional)
        .with_divdamp_fac_o2(0.004);
    let setup = setup(&config);
    let params = NonHydrostaticParams::new(&config).unwrap();
    let damping = DivergenceDamping::new(
        &config,
        &params,
        &setup.vertical,
        setup.mesh.cells.mean_cell_area,
        false,
    );

    let mut vn = noisy_wind(setup.mesh.grid.n_edges(), 3);
    let before = divergence_norm(&setup.mesh, &vn);
    damp(&setup, &damping, &mut vn);
    assert!(divergence_norm(&setup.mesh, &vn) < before);
}

/// Test that `lhdiff_rcf = false` switches all damping off.
#[test]
fn test_disabled_damping_is_identity() {
    let config = NonHydrostaticConfig::default().with_lhdiff_rcf(false);
    let setup = setup(&config);
    let params = NonHydrostaticParams::new(&config).unwrap();
    let damping = DivergenceDamping::new(
        &config,
        &params,
        &setup.vertical,
        setup.mesh.cells.mean_cell_area,
        false,
    );
    assert!(!damping.is_enabled());
    assert!(!damping.is_three_dimensional());

    let mut vn = noisy_wind(setup.mesh.grid.n_edges(), 3);
    let original = vn.clone();
    damp(&setup, &damping, &mut vn);
    assert_eq!(vn, original);
}

/// Test that the fourth-order coefficient never weakens with height.
#[test]
fn test_coefficient_grows_with_height() {
    let config = NonHydrostaticConfig::default();
    let params = NonHydrostaticParams::new(&config).unwrap();
    let vertical = VerticalGrid::uniform(80, 80_000.0, &VerticalParams::default()).unwrap();
    let damping = DivergenceDamping::new(&config, &params, &vertical, 1.0e6, false);
    let scal = &damping.coefficients().scal_divdamp;

    // level 0 is the model top
    assert!(scal.iter().all(|&s| s <= 0.0));
    assert!(scal.windows(2).all(|w| w[0] <= w[1]), "{scal:?}");
    assert!(scal[0] < scal[79]);
}
