//! Cell reductions of edge quantities.

use crate::geometry::InterpolationState;
use crate::grid::{IndexRange, NeighborTable};
use crate::metrics::MetricState;
use crate::state::Field;

/// Contravariant correction at cells and half levels.
///
/// The edge correction is averaged to cells with `e_bln_c_s` over `C2E`,
/// then interpolated to interfaces `nflatlev + 1 .. n_levels`; the surface
/// interface is extrapolated with `wgtfacq_c`.
#[allow(clippy::too_many_arguments)]
pub fn contravariant_correction_cells(
    c2e: &NeighborTable,
    interpolation: &InterpolationState,
    metrics: &MetricState,
    z_w_concorr_me: &Field,
    z_w_concorr_mc: &mut Field,
    w_concorr_c: &mut Field,
    cells: IndexRange,
    nflatlev: usize,
) {
    let n_levels = z_w_concorr_me.n_levels();
    let depth = n_levels.min(3);
    for c in cells {
        for k in nflatlev..n_levels {
            z_w_concorr_mc[(c, k)] = c2e
                .row(c)
                .enumerate()
                .filter_map(|(j, e)| e.map(|e| interpolation.e_bln_c_s[(c, j)] * z_w_concorr_me[(e, k)]))
                .sum();
        }
        for k in (nflatlev + 1)..n_levels {
            let w = metrics.wgtfac_c[(c, k)];
            w_concorr_c[(c, k)] = w * z_w_concorr_mc[(c, k)] + (1.0 - w) * z_w_concorr_mc[(c, k - 1)];
        }
        w_concorr_c[(c, n_levels)] = (0..depth)
            .map(|i| metrics.wgtfacq_c[(c, i)] * z_w_concorr_mc[(c, n_levels - 1 - i)])
            .sum();
    }
}

/// Divergence of the mass and heat fluxes.
///
/// ```text
/// z_flxdiv_mass  = Σ_C2E geofac_div·mass_fl_e
/// z_flxdiv_theta = Σ_C2E geofac_div·z_theta_v_fl_e
/// ```
pub fn flux_divergence(
    c2e: &NeighborTable,
    interpolation: &InterpolationState,
    mass_fl_e: &Field,
    z_theta_v_fl_e: &Field,
    z_flxdiv_mass: &mut Field,
    z_flxdiv_theta: &mut Field,
    cells: IndexRange,
) {
    let n_levels = mass_fl_e.n_levels();
    for c in cells {
        for k in 0..n_levels {
            let (mut mass, mut theta) = (0.0, 0.0);
            for (j, e) in c2e.row(c).enumerate() {
                let Some(e) = e else { continue };
                let g = interpolation.geofac_div[(c, j)];
                mass += g * mass_fl_e[(e, k)];
                theta += g * z_theta_v_fl_e[(e, k)];
            }
            z_flxdiv_mass[(c, k)] = mass;
            z_flxdiv_theta[(c, k)] = theta;
        }
    }
}
