//! Substep-averaged fluxes handed to tracer transport.
//!
//! Each accumulator is zeroed at the first substep of a step and then
//! receives `r_nsubsteps` times the current substep's flux, so the result
//! after all substeps is the substep average.

use crate::grid::IndexRange;
use crate::state::Field;

/// Zero `vn_traj` and `mass_flx_me` on `edges`.
pub fn zero_edge_flux_accumulators(vn_traj: &mut Field, mass_flx_me: &mut Field, edges: IndexRange) {
    let n_levels = vn_traj.n_levels();
    vn_traj.fill_region(edges, 0..n_levels, 0.0);
    mass_flx_me.fill_region(edges, 0..n_levels, 0.0);
}

/// Accumulate the averaged normal wind and the mass flux.
///
/// ```text
/// vn_traj     += r_nsubsteps·z_vn_avg
/// mass_flx_me += r_nsubsteps·mass_fl_e
/// ```
pub fn accumulate_edge_fluxes(
    z_vn_avg: &Field,
    mass_fl_e: &Field,
    r_nsubsteps: f64,
    vn_traj: &mut Field,
    mass_flx_me: &mut Field,
    edges: IndexRange,
) {
    let n_levels = z_vn_avg.n_levels();
    for e in edges {
        for k in 0..n_levels {
            vn_traj[(e, k)] += r_nsubsteps * z_vn_avg[(e, k)];
            mass_flx_me[(e, k)] += r_nsubsteps * mass_fl_e[(e, k)];
        }
    }
}

/// Zero `mass_flx_ic` on `cells`.
pub fn zero_vertical_flux_accumulator(mass_flx_ic: &mut Field, cells: IndexRange) {
    let n_levels = mass_flx_ic.n_levels();
    mass_flx_ic.fill_region(cells, 0..n_levels, 0.0);
}

/// Accumulate the vertical mass flux of the implicit solve.
///
/// ```text
/// mass_flx_ic += r_nsubsteps·(z_contr_w_fl_l + rho_ic·vwind_impl_wgt·w)
/// ```
pub fn accumulate_vertical_flux(
    z_contr_w_fl_l: &Field,
    rho_ic: &Field,
    vwind_impl_wgt: &[f64],
    w: &Field,
    r_nsubsteps: f64,
    mass_flx_ic: &mut Field,
    cells: IndexRange,
) {
    let n_half = mass_flx_ic.n_levels();
    for c in cells {
        for k in 0..n_half {
            mass_flx_ic[(c, k)] +=
                r_nsubsteps * (z_contr_w_fl_l[(c, k)] + rho_ic[(c, k)] * vwind_impl_wgt[c] * w[(c, k)]);
        }
    }
}

/// Accumulate the vertical mass flux in the lateral boundary rows, where
/// no implicit solve has run and the flux is rebuilt from both winds.
///
/// ```text
/// mass_flx_ic += r_nsubsteps·rho_ic·(vwind_expl_wgt·w_now + vwind_impl_wgt·w_new − w_concorr_c)
/// ```
#[allow(clippy::too_many_arguments)]
pub fn accumulate_vertical_flux_boundary(
    rho_ic: &Field,
    vwind_expl_wgt: &[f64],
    vwind_impl_wgt: &[f64],
    w_now: &Field,
    w_new: &Field,
    w_concorr_c: &Field,
    r_nsubsteps: f64,
    mass_flx_ic: &mut Field,
    cells: IndexRange,
) {
    let n_half = mass_flx_ic.n_levels();
    for c in cells {
        for k in 0..n_half {
            let w_eff = vwind_expl_wgt[c] * w_now[(c, k)] + vwind_impl_wgt[c] * w_new[(c, k)] - w_concorr_c[(c, k)];
            mass_flx_ic[(c, k)] += r_nsubsteps * rho_ic[(c, k)] * w_eff;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accumulation_averages_substeps() {
        let n = 5;
        let r = 1.0 / n as f64;
        let (mut vn_traj, mut mass) = (Field::filled(2, 1, 9.0), Field::filled(2, 1, 9.0));
        zero_edge_flux_accumulators(&mut vn_traj, &mut mass, IndexRange::new(0, 2));
        for step in 0..n {
            let avg = Field::filled(2, 1, step as f64);
            let flux = Field::filled(2, 1, 2.0);
            accumulate_edge_fluxes(&avg, &flux, r, &mut vn_traj, &mut mass, IndexRange::new(0, 2));
        }
        assert_relative_eq!(vn_traj[(1, 0)], 2.0, epsilon = 1e-14);
        assert_relative_eq!(mass[(0, 0)], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_boundary_flux_matches_implicit_form() {
        let (expl_wgt, impl_wgt) = (vec![0.35], vec![0.65]);
        let rho_ic = Field::filled(1, 3, 1.1);
        let w_now = Field::filled(1, 3, 0.4);
        let w_new = Field::filled(1, 3, 0.6);
        let concorr = Field::filled(1, 3, 0.1);
        // z_contr_w_fl_l as built by the explicit part of the implicit solve
        let contr = Field::from_fn(1, 3, |_, _| 1.1 * (-0.1 + 0.35 * 0.4));

        let mut implicit = Field::zeros(1, 3);
        accumulate_vertical_flux(&contr, &rho_ic, &impl_wgt, &w_new, 1.0, &mut implicit, IndexRange::new(0, 1));
        let mut boundary = Field::zeros(1, 3);
        accumulate_vertical_flux_boundary(
            &rho_ic,
            &expl_wgt,
            &impl_wgt,
            &w_now,
            &w_new,
            &concorr,
            1.0,
            &mut boundary,
            IndexRange::new(0, 1),
        );
        assert_relative_eq!(implicit[(0, 1)], boundary[(0, 1)], epsilon = 1e-15);
    }
}
