//! Benchmarks for the vertically implicit solver.
//!
//! Run with: `cargo bench --bench vertical_solver_bench`
//! Add `--features parallel` for the column-parallel sweeps.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nh_dycore::solver::ColumnTridiagonal;
use nh_dycore::solver::implicit::{ExplicitWind, ImplicitInputs, ImplicitScratch, solve_vertical};
use nh_dycore::{
    Field, IndexRange, MetricState, NonHydrostaticConfig, PrognosticState, ReferenceAtmosphere, SyntheticMesh,
    VerticalGrid, VerticalParams,
};

/// Benchmark a single column system.
fn bench_column_tridiagonal(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_tridiagonal");

    for n in [30, 60, 120] {
        let system = ColumnTridiagonal::new(
            vec![-1.0; n],
            (0..n).map(|k| 3.0 + (k as f64).cos()).collect(),
            vec![-1.0; n],
            (0..n).map(|k| (k as f64).sin()).collect(),
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("levels", n), &n, |b, _| {
            b.iter(|| black_box(&system).solve());
        });
    }

    group.finish();
}

/// Benchmark the full implicit update of all columns of a torus.
fn bench_solve_vertical(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_vertical");
    let n_levels = 60;

    for n in [16, 32] {
        let mesh = SyntheticMesh::torus(n, 5_000.0, n_levels).unwrap();
        let vertical = VerticalGrid::uniform(n_levels, 60_000.0, &VerticalParams::default()).unwrap();
        let metrics = MetricState::flat_terrain(
            &mesh.grid,
            &vertical,
            &ReferenceAtmosphere::default(),
            &mesh.interpolation,
            &NonHydrostaticConfig::default(),
        )
        .unwrap();
        let n_cells = mesh.grid.n_cells();
        let now = PrognosticState::at_rest(&mesh.grid, &metrics);
        let mut new = now.clone();

        let full = || Field::zeros(n_cells, n_levels);
        let half = || Field::zeros(n_cells, n_levels + 1);
        let rho_ic = Field::filled(n_cells, n_levels + 1, 1.0);
        let theta_v_ic = Field::filled(n_cells, n_levels + 1, 300.0);
        let ddt_w_adv = Field::filled(n_cells, n_levels + 1, 1.0e-3);
        let (w_concorr_c, z_th_ddz_exner_c) = (half(), half());
        let (exner_pr, ddt_exner_phy, flxdiv_mass, flxdiv_theta) = (full(), full(), full(), full());
        let inputs = ImplicitInputs {
            metrics: &metrics,
            now: &now,
            rho_ic: &rho_ic,
            theta_v_ic: &theta_v_ic,
            w_concorr_c: &w_concorr_c,
            exner_pr: &exner_pr,
            ddt_exner_phy: &ddt_exner_phy,
            z_th_ddz_exner_c: &z_th_ddz_exner_c,
            z_flxdiv_mass: &flxdiv_mass,
            z_flxdiv_theta: &flxdiv_theta,
            increments: None,
            rayleigh_w: vertical.rayleigh_w(),
            index_of_damping_layer: vertical.index_of_damping_layer(),
            dtime: 2.0,
        };
        let (mut z_w_expl, mut z_contr_w_fl_l, mut z_alpha, mut z_q) = (half(), half(), half(), full());
        let (mut z_beta, mut z_rho_expl, mut z_exner_expl) = (full(), full(), full());
        let mut scratch = ImplicitScratch {
            z_w_expl: &mut z_w_expl,
            z_contr_w_fl_l: &mut z_contr_w_fl_l,
            z_alpha: &mut z_alpha,
            z_beta: &mut z_beta,
            z_q: &mut z_q,
            z_rho_expl: &mut z_rho_expl,
            z_exner_expl: &mut z_exner_expl,
        };

        group.bench_with_input(BenchmarkId::new("torus", format!("{n_cells}_columns")), &n_cells, |b, _| {
            b.iter(|| {
                solve_vertical(
                    black_box(&inputs),
                    ExplicitWind::Predictor { ddt_w_adv: &ddt_w_adv },
                    &mut scratch,
                    &mut new,
                    IndexRange::new(0, n_cells),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_column_tridiagonal, bench_solve_vertical);
criterion_main!(benches);
