//! Shared setup for unit tests.

use crate::config::NonHydrostaticConfig;
use crate::grid::{IconGrid, SyntheticMesh, VerticalGrid, VerticalParams};
use crate::metrics::{MetricState, ReferenceAtmosphere};

/// A synthetic mesh with flat-terrain metrics on a uniform vertical grid.
pub(crate) struct Fixture {
    pub mesh: SyntheticMesh,
    pub vertical: VerticalGrid,
    pub metrics: MetricState,
    pub config: NonHydrostaticConfig,
}

impl Fixture {
    /// 3 × 3 periodic torus with 10 km edges under a 20 km top.
    pub fn torus(n_levels: usize) -> Self {
        let mesh = SyntheticMesh::torus(3, 10_000.0, n_levels).expect("torus mesh");
        Self::on(mesh, NonHydrostaticConfig::default())
    }

    /// The two-cell dihedron.
    pub fn dihedron(n_levels: usize) -> Self {
        let mesh = SyntheticMesh::dihedron(n_levels).expect("dihedron mesh");
        Self::on(mesh, NonHydrostaticConfig::default())
    }

    /// Torus with one entity per lateral boundary and nudging row.
    pub fn limited_area(n_levels: usize) -> Self {
        let config = NonHydrostaticConfig::default();
        let mesh = SyntheticMesh::torus(6, 10_000.0, n_levels)
            .and_then(|m| m.with_lateral_boundary(1, config.nudge_max_coeff))
            .expect("limited-area mesh");
        Self::on(mesh, config)
    }

    fn on(mesh: SyntheticMesh, config: NonHydrostaticConfig) -> Self {
        let n_levels = mesh.grid.n_levels();
        let vertical = VerticalGrid::uniform(n_levels, 20_000.0, &VerticalParams::default()).expect("vertical grid");
        let metrics = MetricState::flat_terrain(
            &mesh.grid,
            &vertical,
            &ReferenceAtmosphere::default(),
            &mesh.interpolation,
            &config,
        )
        .expect("metrics");
        Self {
            mesh,
            vertical,
            metrics,
            config,
        }
    }

    pub fn grid(&self) -> &IconGrid {
        &self.mesh.grid
    }
}
