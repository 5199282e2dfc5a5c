//! Perturbations from the reference state and their half-level values.
//!
//! Level `k` of a half-level field is the interface above full level `k`.
//! Values at the surface interface (`n_levels`) come from quadratic
//! extrapolation with `wgtfacq_c`, whose slot `i` weighs full level
//! `n_levels − 1 − i`.

use crate::grid::IndexRange;
use crate::metrics::MetricState;
use crate::state::Field;

/// Zero the density and theta perturbations on `cells`.
pub fn init_cell_kdim_zero(z_rth_pr_1: &mut Field, z_rth_pr_2: &mut Field, cells: IndexRange) {
    let n_levels = z_rth_pr_1.n_levels();
    z_rth_pr_1.fill_region(cells, 0..n_levels, 0.0);
    z_rth_pr_2.fill_region(cells, 0..n_levels, 0.0);
}

/// Exner perturbation and its time extrapolation.
///
/// ```text
/// z_exner_ex_pr = (1 + exner_exfac)·(exner − exner_ref) − exner_exfac·exner_pr
/// exner_pr      = exner − exner_ref
/// ```
///
/// `z_exner_ex_pr` is zero at the surface interface.
pub fn extrapolate_exner_perturbation(
    metrics: &MetricState,
    exner: &Field,
    exner_pr: &mut Field,
    z_exner_ex_pr: &mut Field,
    cells: IndexRange,
) {
    let n_levels = exner.n_levels();
    for c in cells {
        for k in 0..n_levels {
            let pr = exner[(c, k)] - metrics.exner_ref_mc[(c, k)];
            let exfac = metrics.exner_exfac[(c, k)];
            z_exner_ex_pr[(c, k)] = (1.0 + exfac) * pr - exfac * exner_pr[(c, k)];
            exner_pr[(c, k)] = pr;
        }
        z_exner_ex_pr[(c, n_levels)] = 0.0;
    }
}

/// Exner perturbation at half levels and its vertical derivative.
///
/// Interior interfaces from `nflatlev` (at least 1) are linear
/// interpolations, the surface interface is extrapolated. With
/// `nflatlev == 0` the model-top interface is extrapolated with `wgtfacq1_c`
/// and the derivative includes level 0.
pub fn interpolate_exner_to_half_levels(
    metrics: &MetricState,
    z_exner_ex_pr: &Field,
    z_exner_ic: &mut Field,
    z_dexner_dz_c_1: &mut Field,
    cells: IndexRange,
    nflatlev: usize,
) {
    let n_levels = z_dexner_dz_c_1.n_levels();
    let depth = n_levels.min(3);
    for c in cells {
        z_exner_ic[(c, n_levels)] = (0..depth)
            .map(|i| metrics.wgtfacq_c[(c, i)] * z_exner_ex_pr[(c, n_levels - 1 - i)])
            .sum();
        if nflatlev == 0 {
            z_exner_ic[(c, 0)] = (0..depth)
                .map(|i| metrics.wgtfacq1_c[(c, i)] * z_exner_ex_pr[(c, i)])
                .sum();
        }
        for k in nflatlev.max(1)..n_levels {
            let w = metrics.wgtfac_c[(c, k)];
            z_exner_ic[(c, k)] = w * z_exner_ex_pr[(c, k)] + (1.0 - w) * z_exner_ex_pr[(c, k - 1)];
        }
        for k in nflatlev..n_levels {
            z_dexner_dz_c_1[(c, k)] =
                (z_exner_ic[(c, k)] - z_exner_ic[(c, k + 1)]) * metrics.inv_ddqz_z_full[(c, k)];
        }
    }
}

/// Outputs of [`compute_perturbations_and_interface_values`].
pub struct InterfaceValues<'a> {
    pub z_rth_pr_1: &'a mut Field,
    pub z_rth_pr_2: &'a mut Field,
    pub rho_ic: &'a mut Field,
    pub z_theta_v_pr_ic: &'a mut Field,
    pub theta_v_ic: &'a mut Field,
    pub z_th_ddz_exner_c: &'a mut Field,
}

/// Density and theta perturbations, their interface values and the
/// explicit vertical pressure gradient term.
///
/// ```text
/// rho_ic           = wgtfac·rho(k) + (1 − wgtfac)·rho(k−1)
/// z_th_ddz_exner_c = vwind_expl_wgt·theta_v_ic·(exner_pr(k−1) − exner_pr(k))/ddqz_z_half
///                    + z_theta_v_pr_ic·d_exner_dz_ref_ic
/// ```
///
/// Interface values are computed for interior interfaces `1..n_levels`.
pub fn compute_perturbations_and_interface_values(
    metrics: &MetricState,
    rho: &Field,
    theta_v: &Field,
    exner_pr: &Field,
    out: InterfaceValues<'_>,
    cells: IndexRange,
) {
    let n_levels = rho.n_levels();
    for c in cells {
        for k in 0..n_levels {
            out.z_rth_pr_1[(c, k)] = rho[(c, k)] - metrics.rho_ref_mc[(c, k)];
            out.z_rth_pr_2[(c, k)] = theta_v[(c, k)] - metrics.theta_ref_mc[(c, k)];
        }
        let expl = metrics.vwind_expl_wgt[c];
        for k in 1..n_levels {
            let w = metrics.wgtfac_c[(c, k)];
            out.rho_ic[(c, k)] = w * rho[(c, k)] + (1.0 - w) * rho[(c, k - 1)];
            let pr_ic = w * out.z_rth_pr_2[(c, k)] + (1.0 - w) * out.z_rth_pr_2[(c, k - 1)];
            out.z_theta_v_pr_ic[(c, k)] = pr_ic;
            out.theta_v_ic[(c, k)] = w * theta_v[(c, k)] + (1.0 - w) * theta_v[(c, k - 1)];
            out.z_th_ddz_exner_c[(c, k)] = expl
                * out.theta_v_ic[(c, k)]
                * (exner_pr[(c, k - 1)] - exner_pr[(c, k)])
                / metrics.ddqz_z_half[(c, k)]
                + pr_ic * metrics.d_exner_dz_ref_ic[(c, k)];
        }
    }
}

/// Theta perturbation at the model top (zero) and at the surface
/// (extrapolated), plus the surface theta.
pub fn compute_interface_perturbation_top_bottom(
    metrics: &MetricState,
    z_rth_pr_2: &Field,
    z_theta_v_pr_ic: &mut Field,
    theta_v_ic: &mut Field,
    cells: IndexRange,
) {
    let n_levels = z_rth_pr_2.n_levels();
    let depth = n_levels.min(3);
    for c in cells {
        z_theta_v_pr_ic[(c, 0)] = 0.0;
        let surface: f64 = (0..depth)
            .map(|i| metrics.wgtfacq_c[(c, i)] * z_rth_pr_2[(c, n_levels - 1 - i)])
            .sum();
        z_theta_v_pr_ic[(c, n_levels)] = surface;
        theta_v_ic[(c, n_levels)] = metrics.theta_ref_ic[(c, n_levels)] + surface;
    }
}

/// Second vertical derivative of the Exner perturbation from the
/// hydrostatic approximation, for levels from `nflat_gradp`.
///
/// ```text
/// z_dexner_dz_c_2 = −½·((θ'_ic(k) − θ'_ic(k+1))·fac1 + θ'(k)·fac2)
/// ```
pub fn compute_second_exner_derivative(
    metrics: &MetricState,
    z_theta_v_pr_ic: &Field,
    z_rth_pr_2: &Field,
    z_dexner_dz_c_2: &mut Field,
    cells: IndexRange,
    nflat_gradp: usize,
) {
    let n_levels = z_rth_pr_2.n_levels();
    for c in cells {
        for k in nflat_gradp..n_levels {
            z_dexner_dz_c_2[(c, k)] = -0.5
                * ((z_theta_v_pr_ic[(c, k)] - z_theta_v_pr_ic[(c, k + 1)]) * metrics.d2dexdz2_fac1_mc[(c, k)]
                    + z_rth_pr_2[(c, k)] * metrics.d2dexdz2_fac2_mc[(c, k)]);
        }
    }
}

/// Density and theta perturbations only.
pub fn compute_perturbations(
    metrics: &MetricState,
    rho: &Field,
    theta_v: &Field,
    z_rth_pr_1: &mut Field,
    z_rth_pr_2: &mut Field,
    cells: IndexRange,
) {
    let n_levels = rho.n_levels();
    for c in cells {
        for k in 0..n_levels {
            z_rth_pr_1[(c, k)] = rho[(c, k)] - metrics.rho_ref_mc[(c, k)];
            z_rth_pr_2[(c, k)] = theta_v[(c, k)] - metrics.theta_ref_mc[(c, k)];
        }
    }
}

/// Time weights of the corrector interface values.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceWeights {
    pub dtime: f64,
    pub wgt_nnow_rth: f64,
    pub wgt_nnew_rth: f64,
}

/// Corrector interface values from the time-averaged density and theta,
/// with a vertical upwind correction along the backward trajectory.
///
/// ```text
/// z_w_backtraj = −(w − w_concorr_c)·dt/2 / ddqz_z_half
/// rho_ic       = wgtfac·ρ̄(k) + (1 − wgtfac)·ρ̄(k−1) + z_w_backtraj·(ρ̄(k−1) − ρ̄(k))
/// ```
///
/// where `ρ̄ = wgt_nnow_rth·rho_now + wgt_nnew_rth·rho_var`.
#[allow(clippy::too_many_arguments)]
pub fn compute_interface_values_corrector(
    metrics: &MetricState,
    w: &Field,
    w_concorr_c: &Field,
    rho_now: &Field,
    rho_var: &Field,
    theta_now: &Field,
    theta_var: &Field,
    exner_pr: &Field,
    weights: InterfaceWeights,
    rho_ic: &mut Field,
    z_theta_v_pr_ic: &mut Field,
    theta_v_ic: &mut Field,
    z_th_ddz_exner_c: &mut Field,
    cells: IndexRange,
) {
    let n_levels = rho_now.n_levels();
    let InterfaceWeights {
        dtime,
        wgt_nnow_rth,
        wgt_nnew_rth,
    } = weights;
    for c in cells {
        let expl = metrics.vwind_expl_wgt[c];
        for k in 1..n_levels {
            let dz_half = metrics.ddqz_z_half[(c, k)];
            let backtraj = -(w[(c, k)] - w_concorr_c[(c, k)]) * dtime * 0.5 / dz_half;
            let rho_m1 = wgt_nnow_rth * rho_now[(c, k - 1)] + wgt_nnew_rth * rho_var[(c, k - 1)];
            let theta_m1 = wgt_nnow_rth * theta_now[(c, k - 1)] + wgt_nnew_rth * theta_var[(c, k - 1)];
            let rho_k = wgt_nnow_rth * rho_now[(c, k)] + wgt_nnew_rth * rho_var[(c, k)];
            let theta_k = wgt_nnow_rth * theta_now[(c, k)] + wgt_nnew_rth * theta_var[(c, k)];
            let wgt = metrics.wgtfac_c[(c, k)];

            rho_ic[(c, k)] = wgt * rho_k + (1.0 - wgt) * rho_m1 + backtraj * (rho_m1 - rho_k);
            let pr_m1 = theta_m1 - metrics.theta_ref_mc[(c, k - 1)];
            let pr_k = theta_k - metrics.theta_ref_mc[(c, k)];
            let pr_ic = wgt * pr_k + (1.0 - wgt) * pr_m1;
            z_theta_v_pr_ic[(c, k)] = pr_ic;
            theta_v_ic[(c, k)] = wgt * theta_k + (1.0 - wgt) * theta_m1 + backtraj * (theta_m1 - theta_k);
            z_th_ddz_exner_c[(c, k)] = expl * theta_v_ic[(c, k)] * (exner_pr[(c, k - 1)] - exner_pr[(c, k)])
                / dz_half
                + pr_ic * metrics.d_exner_dz_ref_ic[(c, k)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use approx::assert_relative_eq;

    #[test]
    fn test_exner_extrapolation_uses_previous_perturbation() {
        let fx = Fixture::torus(4);
        let nc = fx.grid().n_cells();
        let exner = Field::from_fn(nc, 4, |c, k| fx.metrics.exner_ref_mc[(c, k)] + 0.01);
        let mut exner_pr = Field::filled(nc, 4, 0.004);
        let mut ex = Field::zeros(nc, 5);
        extrapolate_exner_perturbation(&fx.metrics, &exner, &mut exner_pr, &mut ex, IndexRange::new(0, nc));
        let exfac = fx.metrics.exner_exfac[(0, 0)];
        assert_relative_eq!(ex[(3, 2)], (1.0 + exfac) * 0.01 - exfac * 0.004, epsilon = 1e-12);
        assert_relative_eq!(exner_pr[(3, 2)], 0.01, epsilon = 1e-12);
        assert_eq!(ex[(3, 4)], 0.0);
    }

    #[test]
    fn test_linear_profile_has_constant_derivative() {
        let fx = Fixture::torus(4);
        let nc = fx.grid().n_cells();
        // linear in height: exact at interfaces and at the extrapolated surface
        let ex = Field::from_fn(nc, 5, |_, k| if k < 4 { 1.0 + 0.1 * k as f64 } else { 0.0 });
        let mut ic = Field::zeros(nc, 5);
        let mut dz = Field::zeros(nc, 4);
        interpolate_exner_to_half_levels(&fx.metrics, &ex, &mut ic, &mut dz, IndexRange::new(0, nc), 0);
        let thickness = 1.0 / fx.metrics.inv_ddqz_z_full[(0, 0)];
        for k in 0..4 {
            assert_relative_eq!(dz[(2, k)], -0.1 / thickness, epsilon = 1e-12);
        }
        assert_relative_eq!(ic[(2, 0)], 0.95, epsilon = 1e-12);
        assert_relative_eq!(ic[(2, 4)], 1.35, epsilon = 1e-12);
    }

    #[test]
    fn test_reference_state_has_no_perturbation() {
        let fx = Fixture::torus(4);
        let nc = fx.grid().n_cells();
        let z = &fx.metrics;
        let exner_pr = Field::zeros(nc, 4);
        let (mut p1, mut p2) = (Field::zeros(nc, 4), Field::zeros(nc, 4));
        let (mut rho_ic, mut pr_ic, mut th_ic, mut th_ddz) =
            (Field::zeros(nc, 5), Field::zeros(nc, 5), Field::zeros(nc, 5), Field::zeros(nc, 5));
        compute_perturbations_and_interface_values(
            z,
            &z.rho_ref_mc,
            &z.theta_ref_mc,
            &exner_pr,
            InterfaceValues {
                z_rth_pr_1: &mut p1,
                z_rth_pr_2: &mut p2,
                rho_ic: &mut rho_ic,
                z_theta_v_pr_ic: &mut pr_ic,
                theta_v_ic: &mut th_ic,
                z_th_ddz_exner_c: &mut th_ddz,
            },
            IndexRange::new(0, nc),
        );
        assert_eq!(p1.max_abs(), 0.0);
        assert_eq!(p2.max_abs(), 0.0);
        assert_eq!(th_ddz.max_abs(), 0.0);
        assert!(rho_ic[(0, 2)] < z.rho_ref_mc[(0, 2)] && rho_ic[(0, 2)] > z.rho_ref_mc[(0, 1)]);
    }
}
