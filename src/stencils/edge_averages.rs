//! Edge averages of the normal wind and the fluxes built on them.

use crate::geometry::InterpolationState;
use crate::grid::{IndexRange, NeighborTable};
use crate::metrics::MetricState;
use crate::state::{Field, NeighborWeights};

/// Weighted sum of `field` over one neighbor row.
#[inline]
fn reduce(table: &NeighborTable, weights: &NeighborWeights, field: &Field, e: usize, k: usize) -> f64 {
    table
        .row(e)
        .enumerate()
        .filter_map(|(j, n)| n.map(|n| weights[(e, j)] * field[(n, k)]))
        .sum()
}

/// Flux-averaged normal wind, its divergence gradient and the tangential
/// wind, all from the predicted `vn`.
///
/// ```text
/// z_vn_avg     = Σ_E2C2EO e_flx_avg·vn
/// z_graddiv_vn = Σ_E2C2EO geofac_grdiv·vn
/// vt           = Σ_E2C2E  rbf_vec_coeff_e·vn
/// ```
#[allow(clippy::too_many_arguments)]
pub fn average_vn_and_graddiv(
    e2c2eo: &NeighborTable,
    e2c2e: &NeighborTable,
    interpolation: &InterpolationState,
    vn: &Field,
    z_vn_avg: &mut Field,
    z_graddiv_vn: &mut Field,
    vt: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn.n_levels();
    for e in edges {
        for k in 0..n_levels {
            z_vn_avg[(e, k)] = reduce(e2c2eo, &interpolation.e_flx_avg, vn, e, k);
            z_graddiv_vn[(e, k)] = reduce(e2c2eo, &interpolation.geofac_grdiv, vn, e, k);
            vt[(e, k)] = reduce(e2c2e, &interpolation.rbf_vec_coeff_e, vn, e, k);
        }
    }
}

/// Flux-averaged normal wind only.
pub fn average_vn(
    e2c2eo: &NeighborTable,
    e_flx_avg: &NeighborWeights,
    vn: &Field,
    z_vn_avg: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn.n_levels();
    for e in edges {
        for k in 0..n_levels {
            z_vn_avg[(e, k)] = reduce(e2c2eo, e_flx_avg, vn, e, k);
        }
    }
}

/// Horizontal mass and heat flux through each edge face.
///
/// ```text
/// mass_fl_e      = z_rho_e·z_vn_avg·ddqz_z_full_e
/// z_theta_v_fl_e = mass_fl_e·z_theta_v_e
/// ```
pub fn mass_and_heat_flux(
    metrics: &MetricState,
    z_rho_e: &Field,
    z_vn_avg: &Field,
    z_theta_v_e: &Field,
    mass_fl_e: &mut Field,
    z_theta_v_fl_e: &mut Field,
    edges: IndexRange,
) {
    let n_levels = z_rho_e.n_levels();
    for e in edges {
        for k in 0..n_levels {
            let flux = z_rho_e[(e, k)] * z_vn_avg[(e, k)] * metrics.ddqz_z_full_e[(e, k)];
            mass_fl_e[(e, k)] = flux;
            z_theta_v_fl_e[(e, k)] = flux * z_theta_v_e[(e, k)];
        }
    }
}

/// Contravariant correction at edges below `nflatlev`:
/// `z_w_concorr_me = vn·ddxn_z_full + vt·ddxt_z_full`.
pub fn contravariant_correction_edges(
    metrics: &MetricState,
    vn: &Field,
    vt: &Field,
    z_w_concorr_me: &mut Field,
    edges: IndexRange,
    nflatlev: usize,
) {
    let n_levels = vn.n_levels();
    for e in edges {
        for k in nflatlev..n_levels {
            z_w_concorr_me[(e, k)] = vn[(e, k)] * metrics.ddxn_z_full[(e, k)] + vt[(e, k)] * metrics.ddxt_z_full[(e, k)];
        }
    }
}

/// Normal and tangential wind at half levels and the horizontal kinetic
/// energy.
///
/// Interior interfaces are interpolated with `wgtfac_e`, the top interface
/// copies level 0, the surface interface of `vn_ie` is extrapolated with
/// `wgtfacq_e`.
#[allow(clippy::too_many_arguments)]
pub fn interpolate_to_half_levels_edges(
    metrics: &MetricState,
    vn: &Field,
    vt: &Field,
    vn_ie: &mut Field,
    z_vt_ie: &mut Field,
    z_kin_hor_e: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn.n_levels();
    let depth = n_levels.min(3);
    for e in edges {
        for k in 0..n_levels {
            z_kin_hor_e[(e, k)] = 0.5 * (vn[(e, k)] * vn[(e, k)] + vt[(e, k)] * vt[(e, k)]);
        }
        vn_ie[(e, 0)] = vn[(e, 0)];
        z_vt_ie[(e, 0)] = vt[(e, 0)];
        for k in 1..n_levels {
            let w = metrics.wgtfac_e[(e, k)];
            vn_ie[(e, k)] = w * vn[(e, k)] + (1.0 - w) * vn[(e, k - 1)];
            z_vt_ie[(e, k)] = w * vt[(e, k)] + (1.0 - w) * vt[(e, k - 1)];
        }
        vn_ie[(e, n_levels)] = (0..depth)
            .map(|i| metrics.wgtfacq_e[(e, i)] * vn[(e, n_levels - 1 - i)])
            .sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Connectivity;
    use crate::testing::Fixture;
    use approx::assert_relative_eq;

    /// Normal and tangential components of a uniform wind on every edge.
    fn uniform_wind(fx: &Fixture, u: [f64; 2], n_levels: usize) -> (Field, Field) {
        let edges = &fx.mesh.edges;
        let ne = fx.grid().n_edges();
        let dot = |a: [f64; 2]| a[0] * u[0] + a[1] * u[1];
        (
            Field::from_fn(ne, n_levels, |e, _| dot(edges.primal_normal[e])),
            Field::from_fn(ne, n_levels, |e, _| dot(edges.dual_normal[e])),
        )
    }

    #[test]
    fn test_uniform_wind_is_reproduced() {
        let fx = Fixture::torus(2);
        let grid = fx.grid();
        let ne = grid.n_edges();
        let (vn, vt_exact) = uniform_wind(&fx, [7.0, -3.0], 2);
        let (mut avg, mut graddiv, mut vt) = (Field::zeros(ne, 2), Field::zeros(ne, 2), Field::zeros(ne, 2));
        average_vn_and_graddiv(
            grid.connectivity(Connectivity::E2C2EO).unwrap(),
            grid.connectivity(Connectivity::E2C2E).unwrap(),
            &fx.mesh.interpolation,
            &vn,
            &mut avg,
            &mut graddiv,
            &mut vt,
            IndexRange::new(0, ne),
        );
        for e in 0..ne {
            assert_relative_eq!(avg[(e, 1)], vn[(e, 1)], epsilon = 1e-10);
            assert_relative_eq!(vt[(e, 0)], vt_exact[(e, 0)], epsilon = 1e-10);
            assert!(graddiv[(e, 0)].abs() < 1e-12, "graddiv of uniform wind: {}", graddiv[(e, 0)]);
        }
    }

    #[test]
    fn test_heat_flux_is_mass_flux_times_theta() {
        let fx = Fixture::torus(2);
        let ne = fx.grid().n_edges();
        let rho = Field::filled(ne, 2, 1.2);
        let vn = Field::filled(ne, 2, 10.0);
        let theta = Field::filled(ne, 2, 300.0);
        let (mut mass, mut heat) = (Field::zeros(ne, 2), Field::zeros(ne, 2));
        mass_and_heat_flux(&fx.metrics, &rho, &vn, &theta, &mut mass, &mut heat, IndexRange::new(0, ne));
        let dz = fx.metrics.ddqz_z_full_e[(0, 1)];
        assert_relative_eq!(mass[(0, 1)], 12.0 * dz, max_relative = 1e-14);
        assert_relative_eq!(heat[(0, 1)], 3600.0 * dz, max_relative = 1e-14);
    }

    #[test]
    fn test_half_level_profile_of_linear_wind() {
        let fx = Fixture::torus(4);
        let ne = fx.grid().n_edges();
        let vn = Field::from_fn(ne, 4, |_, k| 2.0 * k as f64);
        let vt = Field::filled(ne, 4, 1.0);
        let (mut vn_ie, mut vt_ie, mut kin) = (Field::zeros(ne, 5), Field::zeros(ne, 5), Field::zeros(ne, 4));
        interpolate_to_half_levels_edges(&fx.metrics, &vn, &vt, &mut vn_ie, &mut vt_ie, &mut kin, IndexRange::new(0, ne));
        assert_eq!(vn_ie[(3, 0)], 0.0);
        assert_relative_eq!(vn_ie[(3, 2)], 3.0, epsilon = 1e-12);
        assert_relative_eq!(vn_ie[(3, 4)], 7.0, epsilon = 1e-12);
        assert_relative_eq!(vt_ie[(3, 3)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(kin[(3, 1)], 0.5 * (4.0 + 1.0));
    }
}
