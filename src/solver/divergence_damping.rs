//! Divergence damping of the normal wind.
//!
//! The divergent part of `vn` is damped with the gradient of its
//! divergence, once (second order) or twice (fourth order):
//!
//! ```text
//! second order:  vn += scal_divdamp_o2·∇(div vn)
//! fourth order:  vn += scal_divdamp(k)·∇(div ∇(div vn))
//! ```
//!
//! `scal_divdamp` is negative and grows with height. It is interpolated
//! from four reference heights: constant up to `divdamp_z`, linear up to
//! `divdamp_z2`, quadratic up to `divdamp_z4` and constant above:
//!
//! ```text
//! dzlin = clamp(z − divdamp_z,  0, divdamp_z2 − divdamp_z)
//! dzqdr = clamp(z − divdamp_z2, 0, divdamp_z4 − divdamp_z2)
//! enh   = divdamp_fac + alin·dzlin + dzqdr·(aqdr + bqdr·dzqdr)
//! ```
//!
//! On limited-area grids the fourth-order coefficient is enhanced towards
//! the lateral boundary with the nudging coefficient.
//!
//! With the three-dimensional damping type the vertical derivative of `w`
//! enters the damped divergence as well.

use std::ops::Range;

use crate::config::{DivergenceDampingOrder, NonHydrostaticConfig, NonHydrostaticParams};
use crate::constants::DBL_EPS;
use crate::geometry::InterpolationState;
use crate::grid::{IndexRange, NeighborTable, VerticalGrid};
use crate::metrics::MetricState;
use crate::state::{Field, NeighborWeights};

/// Second-order coefficients at or below this are treated as off.
const MIN_SCAL_DIVDAMP_O2: f64 = 1e-6;

/// Height-dependent damping coefficients, computed once per grid.
#[derive(Clone, Debug, PartialEq)]
pub struct DivergenceDampingCoefficients {
    /// Damping factor per full level.
    pub enh_divdamp_fac: Vec<f64>,
    /// Fourth-order coefficient per full level (non-positive).
    pub scal_divdamp: Vec<f64>,
    /// Additional fourth-order coefficient at the lateral boundary.
    pub bdy_divdamp: Vec<f64>,
    /// Second-order coefficient.
    pub scal_divdamp_o2: f64,
    order: DivergenceDampingOrder,
    divdamp_fac: f64,
    divdamp_fac_o2: f64,
}

impl DivergenceDampingCoefficients {
    /// Evaluate the damping profile at the full-level heights of `vertical`.
    ///
    /// `mean_cell_area` stands in for the squared grid spacing.
    pub fn new(
        config: &NonHydrostaticConfig,
        params: &NonHydrostaticParams,
        vertical: &VerticalGrid,
        mean_cell_area: f64,
    ) -> Self {
        let enh_divdamp_fac: Vec<f64> = (0..vertical.n_levels())
            .map(|k| damping_factor(config, params, vertical.full_level_height(k)))
            .collect();

        let area_sq = mean_cell_area * mean_cell_area;
        let scal_divdamp: Vec<f64> = enh_divdamp_fac
            .iter()
            .map(|&enh| match config.divdamp_order {
                DivergenceDampingOrder::Combined => -(enh - 0.25 * config.divdamp_fac_o2).max(0.0) * area_sq,
                _ => -enh * area_sq,
            })
            .collect();
        let bdy_divdamp = scal_divdamp
            .iter()
            .map(|s| 0.75 / (config.nudge_max_coeff + DBL_EPS) * s.abs())
            .collect();

        Self {
            enh_divdamp_fac,
            scal_divdamp,
            bdy_divdamp,
            scal_divdamp_o2: config.divdamp_fac_o2 * mean_cell_area,
            order: config.divdamp_order,
            divdamp_fac: config.divdamp_fac,
            divdamp_fac_o2: config.divdamp_fac_o2,
        }
    }

    /// Whether the second-order damping runs.
    pub fn applies_second_order(&self) -> bool {
        match self.order {
            DivergenceDampingOrder::Second => true,
            DivergenceDampingOrder::Combined => self.scal_divdamp_o2 > MIN_SCAL_DIVDAMP_O2,
            DivergenceDampingOrder::Fourth => false,
        }
    }

    /// Whether the fourth-order damping runs.
    pub fn applies_fourth_order(&self) -> bool {
        match self.order {
            DivergenceDampingOrder::Fourth => true,
            DivergenceDampingOrder::Combined => self.divdamp_fac_o2 <= 4.0 * self.divdamp_fac,
            DivergenceDampingOrder::Second => false,
        }
    }

    /// Whether the twice-applied gradient of divergence is needed.
    pub fn needs_graddiv2(&self) -> bool {
        matches!(self.order, DivergenceDampingOrder::Fourth | DivergenceDampingOrder::Combined)
    }
}

/// Damping factor at height `z`.
fn damping_factor(config: &NonHydrostaticConfig, params: &NonHydrostaticParams, z: f64) -> f64 {
    let dzlin = (z - config.divdamp_z).max(0.0).min(config.divdamp_z2 - config.divdamp_z);
    let dzqdr = (z - config.divdamp_z2).max(0.0).min(params.dz42);
    config.divdamp_fac + dzlin * params.alin + dzqdr * (params.aqdr + dzqdr * params.bqdr)
}

/// Add the horizontal gradient of the vertical wind divergence to the
/// divergence gradient (three-dimensional damping).
///
/// ```text
/// z_graddiv_vn += hmask_dd3d·scalfac_dd3d·inv_dual_edge_length·(dwdz(E2C[1]) − dwdz(E2C[0]))
/// ```
pub fn add_vertical_wind_derivative(
    e2c: &NeighborTable,
    inv_dual_edge_length: &[f64],
    metrics: &MetricState,
    z_dwdz_dd: &Field,
    z_graddiv_vn: &mut Field,
    edges: IndexRange,
    levels: Range<usize>,
) {
    for e in edges {
        let (c0, c1) = (e2c.neighbor(e, 0), e2c.neighbor(e, 1));
        let factor = metrics.hmask_dd3d[e] * inv_dual_edge_length[e];
        for k in levels.clone() {
            z_graddiv_vn[(e, k)] +=
                factor * metrics.scalfac_dd3d[k] * (z_dwdz_dd[(c1, k)] - z_dwdz_dd[(c0, k)]);
        }
    }
}

/// Gradient of the divergence of `z_graddiv_vn`.
///
/// ```text
/// z_graddiv2_vn = Σ_E2C2EO geofac_grdiv·z_graddiv_vn
/// ```
pub fn compute_graddiv2(
    e2c2eo: &NeighborTable,
    geofac_grdiv: &NeighborWeights,
    z_graddiv_vn: &Field,
    z_graddiv2_vn: &mut Field,
    edges: IndexRange,
) {
    let n_levels = z_graddiv_vn.n_levels();
    for e in edges {
        for k in 0..n_levels {
            z_graddiv2_vn[(e, k)] = e2c2eo
                .row(e)
                .enumerate()
                .filter_map(|(j, n)| n.map(|n| geofac_grdiv[(e, j)] * z_graddiv_vn[(n, k)]))
                .sum();
        }
    }
}

/// `vn += scal_divdamp_o2·z_graddiv_vn`
pub fn apply_second_order(scal_divdamp_o2: f64, z_graddiv_vn: &Field, vn: &mut Field, edges: IndexRange) {
    let n_levels = vn.n_levels();
    for e in edges {
        for k in 0..n_levels {
            vn[(e, k)] += scal_divdamp_o2 * z_graddiv_vn[(e, k)];
        }
    }
}

/// `vn += scal_divdamp(k)·z_graddiv2_vn`
pub fn apply_fourth_order(scal_divdamp: &[f64], z_graddiv2_vn: &Field, vn: &mut Field, edges: IndexRange) {
    let n_levels = vn.n_levels();
    for e in edges {
        for k in 0..n_levels {
            vn[(e, k)] += scal_divdamp[k] * z_graddiv2_vn[(e, k)];
        }
    }
}

/// Fourth-order damping enhanced towards the lateral boundary.
///
/// ```text
/// vn += (scal_divdamp(k) + bdy_divdamp(k)·nudgecoeff_e)·z_graddiv2_vn
/// ```
pub fn apply_fourth_order_limited_area(
    scal_divdamp: &[f64],
    bdy_divdamp: &[f64],
    nudgecoeff_e: &[f64],
    z_graddiv2_vn: &Field,
    vn: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn.n_levels();
    for e in edges {
        let nudge = nudgecoeff_e[e];
        for k in 0..n_levels {
            vn[(e, k)] += (scal_divdamp[k] + bdy_divdamp[k] * nudge) * z_graddiv2_vn[(e, k)];
        }
    }
}

/// Read-only operands of [`DivergenceDamping::apply`].
#[derive(Clone, Copy)]
pub struct DampingOperands<'a> {
    pub e2c: &'a NeighborTable,
    pub e2c2eo: &'a NeighborTable,
    pub interpolation: &'a InterpolationState,
    pub inv_dual_edge_length: &'a [f64],
    pub metrics: &'a MetricState,
    /// Vertical wind divergence, read when the damping is three-dimensional.
    pub z_dwdz_dd: &'a Field,
}

/// Edge ranges of the damping stencils.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DampingRanges {
    /// Where the divergence gradient is available.
    pub graddiv: IndexRange,
    /// Fourth-order damping.
    pub interior: IndexRange,
    /// Second-order damping.
    pub local: IndexRange,
}

/// The configured divergence damping, ready to run in the corrector.
#[derive(Clone, Debug)]
pub struct DivergenceDamping {
    coefficients: DivergenceDampingCoefficients,
    enabled: bool,
    three_dimensional: bool,
    limited_area: bool,
    kstart_dd3d: usize,
}

impl DivergenceDamping {
    pub fn new(
        config: &NonHydrostaticConfig,
        params: &NonHydrostaticParams,
        vertical: &VerticalGrid,
        mean_cell_area: f64,
        limited_area: bool,
    ) -> Self {
        Self {
            coefficients: DivergenceDampingCoefficients::new(config, params, vertical, mean_cell_area),
            enabled: config.lhdiff_rcf,
            three_dimensional: config.divdamp_type.is_three_dimensional(),
            limited_area,
            kstart_dd3d: vertical.kstart_dd3d(),
        }
    }

    pub fn coefficients(&self) -> &DivergenceDampingCoefficients {
        &self.coefficients
    }

    /// Whether any damping runs at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `z_dwdz_dd` is needed.
    pub fn is_three_dimensional(&self) -> bool {
        self.enabled && self.three_dimensional
    }

    /// Damp `vn` in place.
    ///
    /// `z_graddiv_vn` holds the divergence gradient of the predicted wind on
    /// entry; the vertical contribution is added to it first.
    pub fn apply(
        &self,
        operands: &DampingOperands<'_>,
        z_graddiv_vn: &mut Field,
        z_graddiv2_vn: &mut Field,
        vn: &mut Field,
        ranges: &DampingRanges,
    ) {
        if !self.enabled {
            return;
        }
        let n_levels = vn.n_levels();
        let coefficients = &self.coefficients;

        if self.three_dimensional {
            add_vertical_wind_derivative(
                operands.e2c,
                operands.inv_dual_edge_length,
                operands.metrics,
                operands.z_dwdz_dd,
                z_graddiv_vn,
                ranges.graddiv,
                self.kstart_dd3d..n_levels,
            );
        }
        if coefficients.needs_graddiv2() {
            compute_graddiv2(
                operands.e2c2eo,
                &operands.interpolation.geofac_grdiv,
                z_graddiv_vn,
                z_graddiv2_vn,
                ranges.interior,
            );
        }
        if coefficients.applies_second_order() {
            apply_second_order(coefficients.scal_divdamp_o2, z_graddiv_vn, vn, ranges.local);
        }
        if coefficients.applies_fourth_order() {
            if self.limited_area {
                apply_fourth_order_limited_area(
                    &coefficients.scal_divdamp,
                    &coefficients.bdy_divdamp,
                    &operands.interpolation.nudgecoeff_e,
                    z_graddiv2_vn,
                    vn,
                    ranges.interior,
                );
            } else {
                apply_fourth_order(&coefficients.scal_divdamp, z_graddiv2_vn, vn, ranges.interior);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DivergenceDampingType;
    use crate::grid::{Connectivity, VerticalParams};
    use crate::testing::Fixture;
    use approx::assert_relative_eq;

    fn tall_grid() -> VerticalGrid {
        VerticalGrid::uniform(100, 100_000.0, &VerticalParams::default()).unwrap()
    }

    fn coefficients(config: &NonHydrostaticConfig) -> DivergenceDampingCoefficients {
        let params = NonHydrostaticParams::new(config).unwrap();
        DivergenceDampingCoefficients::new(config, &params, &tall_grid(), 1.0)
    }

    #[test]
    fn test_profile_hits_reference_factors() {
        let config = NonHydrostaticConfig {
            divdamp_fac: 0.001,
            divdamp_fac2: 0.002,
            divdamp_fac3: 0.003,
            divdamp_fac4: 0.005,
            divdamp_order: DivergenceDampingOrder::Fourth,
            ..Default::default()
        };
        let params = NonHydrostaticParams::new(&config).unwrap();
        let at = |z| damping_factor(&config, &params, z);
        assert_relative_eq!(at(0.0), 0.001);
        assert_relative_eq!(at(config.divdamp_z), 0.001);
        assert_relative_eq!(at(0.5 * (config.divdamp_z + config.divdamp_z2)), 0.0015, epsilon = 1e-15);
        assert_relative_eq!(at(config.divdamp_z2), 0.002, epsilon = 1e-15);
        assert_relative_eq!(at(config.divdamp_z3), 0.003, epsilon = 1e-15);
        assert_relative_eq!(at(config.divdamp_z4), 0.005, epsilon = 1e-15);
        assert_relative_eq!(at(95_000.0), 0.005, epsilon = 1e-15);
    }

    #[test]
    fn test_fourth_order_coefficient_scales_with_area() {
        let config = NonHydrostaticConfig::default().with_divdamp_order(DivergenceDampingOrder::Fourth);
        let params = NonHydrostaticParams::new(&config).unwrap();
        let c = DivergenceDampingCoefficients::new(&config, &params, &tall_grid(), 10.0);
        for (enh, scal) in c.enh_divdamp_fac.iter().zip(&c.scal_divdamp) {
            assert_relative_eq!(*scal, -100.0 * enh, epsilon = 1e-15);
        }
        let expected_bdy = 0.75 / (config.nudge_max_coeff + DBL_EPS) * c.scal_divdamp[99].abs();
        assert_relative_eq!(c.bdy_divdamp[99], expected_bdy);
        assert!(c.applies_fourth_order());
        assert!(!c.applies_second_order());
    }

    #[test]
    fn test_combined_order_reduces_fourth_order_part() {
        let config = NonHydrostaticConfig::default()
            .with_uniform_divdamp_fac(0.004)
            .with_divdamp_fac_o2(0.008);
        let c = coefficients(&config);
        assert_relative_eq!(c.scal_divdamp[50], -(0.004 - 0.002), epsilon = 1e-15);
        assert_relative_eq!(c.scal_divdamp_o2, 0.008);
        assert!(c.applies_second_order());
        assert!(c.applies_fourth_order());

        let strong_o2 = config.with_divdamp_fac_o2(0.02);
        let c = coefficients(&strong_o2);
        assert_eq!(c.scal_divdamp[50], 0.0);
        assert!(!c.applies_fourth_order());
    }

    #[test]
    fn test_combined_without_second_order_factor() {
        let c = coefficients(&NonHydrostaticConfig::default());
        assert!(!c.applies_second_order());
        assert!(c.applies_fourth_order());
        assert!(c.needs_graddiv2());
    }

    #[test]
    fn test_zero_coefficients_leave_vn_unchanged() {
        let fx = Fixture::torus(3);
        let grid = fx.grid();
        let config = NonHydrostaticConfig::default()
            .with_uniform_divdamp_fac(0.0)
            .with_divdamp_fac_o2(0.0)
            .with_divdamp_order(DivergenceDampingOrder::Fourth)
            .with_divdamp_type(DivergenceDampingType::TwoDimensional);
        let params = NonHydrostaticParams::new(&config).unwrap();
        let damping = DivergenceDamping::new(&config, &params, &fx.vertical, fx.mesh.cells.mean_cell_area, false);

        let ne = grid.n_edges();
        let mut vn = Field::from_fn(ne, 3, |e, k| ((e * 7 + k * 3) % 11) as f64 - 5.0);
        let original = vn.clone();
        let mut graddiv = Field::from_fn(ne, 3, |e, _| e as f64);
        let mut graddiv2 = Field::zeros(ne, 3);
        let dwdz = Field::zeros(grid.n_cells(), 3);
        let all = IndexRange::new(0, ne);
        damping.apply(
            &DampingOperands {
                e2c: grid.connectivity(Connectivity::E2C).unwrap(),
                e2c2eo: grid.connectivity(Connectivity::E2C2EO).unwrap(),
                interpolation: &fx.mesh.interpolation,
                inv_dual_edge_length: &fx.mesh.edges.inverse_dual_edge_length,
                metrics: &fx.metrics,
                z_dwdz_dd: &dwdz,
            },
            &mut graddiv,
            &mut graddiv2,
            &mut vn,
            &DampingRanges {
                graddiv: all,
                interior: all,
                local: all,
            },
        );
        assert_eq!(vn, original);
    }

    #[test]
    fn test_second_order_damps_divergence() {
        let fx = Fixture::torus(2);
        let grid = fx.grid();
        let (nc, ne) = (grid.n_cells(), grid.n_edges());
        let c2e = grid.connectivity(Connectivity::C2E).unwrap();
        let e2c2eo = grid.connectivity(Connectivity::E2C2EO).unwrap();
        let interp = &fx.mesh.interpolation;

        let divergence_norm = |vn: &Field| -> f64 {
            (0..nc)
                .map(|c| {
                    let div: f64 = c2e
                        .row(c)
                        .enumerate()
                        .filter_map(|(j, e)| e.map(|e| interp.geofac_div[(c, j)] * vn[(e, 0)]))
                        .sum();
                    div * div
                })
                .sum()
        };

        let mut vn = Field::from_fn(ne, 2, |e, _| if e % 4 == 0 { 1.0 } else { -0.5 });
        let before = divergence_norm(&vn);
        let mut graddiv = Field::zeros(ne, 2);
        for e in 0..ne {
            graddiv[(e, 0)] = e2c2eo
                .row(e)
                .enumerate()
                .filter_map(|(j, n)| n.map(|n| interp.geofac_grdiv[(e, j)] * vn[(n, 0)]))
                .sum();
        }
        let scal = 0.004 * fx.mesh.cells.mean_cell_area;
        apply_second_order(scal, &graddiv, &mut vn, IndexRange::new(0, ne));
        let after = divergence_norm(&vn);
        assert!(before > 0.0);
        assert!(after < before, "divergence grew from {before} to {after}");
    }

    #[test]
    fn test_vertical_derivative_respects_mask_and_start_level() {
        let fx = Fixture::torus(3);
        let grid = fx.grid();
        let (nc, ne) = (grid.n_cells(), grid.n_edges());
        let e2c = grid.connectivity(Connectivity::E2C).unwrap();
        let dwdz = Field::from_fn(nc, 3, |c, _| c as f64);
        let mut graddiv = Field::zeros(ne, 3);
        add_vertical_wind_derivative(
            e2c,
            &fx.mesh.edges.inverse_dual_edge_length,
            &fx.metrics,
            &dwdz,
            &mut graddiv,
            IndexRange::new(0, ne),
            1..3,
        );
        let e = 5;
        let expected = fx.mesh.edges.inverse_dual_edge_length[e] * (e2c.neighbor(e, 1) as f64 - e2c.neighbor(e, 0) as f64);
        assert_eq!(graddiv[(e, 0)], 0.0);
        assert_relative_eq!(graddiv[(e, 2)], expected, epsilon = 1e-15);
    }

    #[test]
    fn test_boundary_enhancement_follows_nudging_coefficient() {
        let mut vn = Field::zeros(2, 1);
        let graddiv2 = Field::filled(2, 1, 1.0);
        apply_fourth_order_limited_area(&[-1.0], &[2.0], &[0.0, 0.5], &graddiv2, &mut vn, IndexRange::new(0, 2));
        assert_eq!(vn[(0, 0)], -1.0);
        assert_eq!(vn[(1, 0)], 0.0);
    }
}
