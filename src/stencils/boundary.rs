//! Lateral-boundary updates and end-of-substep finishing.

use std::ops::Range;

use crate::constants::{CVD_O_RD, RD_O_CVD, RD_O_P0REF};
use crate::grid::IndexRange;
use crate::state::Field;

/// Prognostic cell variables of the boundary rows from the driving model's
/// tendencies.
///
/// `exner_new` temporarily receives theta:
/// [`theta_and_exner_from_boundary`] converts it once density is final.
#[allow(clippy::too_many_arguments)]
pub fn lateral_boundary_tendencies(
    rho_now: &Field,
    theta_v_now: &Field,
    w_now: &Field,
    grf_tend_rho: &Field,
    grf_tend_thv: &Field,
    grf_tend_w: &Field,
    dtime: f64,
    rho_new: &mut Field,
    exner_new: &mut Field,
    w_new: &mut Field,
    cells: IndexRange,
) {
    let n_levels = rho_now.n_levels();
    for c in cells {
        for k in 0..n_levels {
            rho_new[(c, k)] = rho_now[(c, k)] + dtime * grf_tend_rho[(c, k)];
            exner_new[(c, k)] = theta_v_now[(c, k)] + dtime * grf_tend_thv[(c, k)];
        }
        for k in 0..=n_levels {
            w_new[(c, k)] = w_now[(c, k)] + dtime * grf_tend_w[(c, k)];
        }
    }
}

/// Vertical wind divergence for three-dimensional divergence damping.
///
/// ```text
/// z_dwdz_dd = inv_ddqz·((w(k) − w(k+1)) − (w_concorr_c(k) − w_concorr_c(k+1)))
/// ```
pub fn dwdz_for_divergence_damping(
    inv_ddqz_z_full: &Field,
    w: &Field,
    w_concorr_c: &Field,
    z_dwdz_dd: &mut Field,
    cells: IndexRange,
    kstart_dd3d: usize,
) {
    let n_levels = inv_ddqz_z_full.n_levels();
    for c in cells {
        for k in kstart_dd3d..n_levels {
            z_dwdz_dd[(c, k)] = inv_ddqz_z_full[(c, k)]
                * ((w[(c, k)] - w[(c, k + 1)]) - (w_concorr_c[(c, k)] - w_concorr_c[(c, k + 1)]));
        }
    }
}

/// Store the Exner pressure at the start of the dynamical substeps.
pub fn snapshot_exner(exner_now: &Field, exner_dyn_incr: &mut Field, cells: IndexRange, levels: Range<usize>) {
    exner_dyn_incr.copy_region(exner_now, cells, levels);
}

/// Turn the stored Exner pressure into the dynamical increment over all
/// substeps, net of the physics tendency.
///
/// ```text
/// exner_dyn_incr = exner_new − (exner_dyn_incr + ndyn_substeps·dt·ddt_exner_phy)
/// ```
pub fn finalize_exner_dyn_incr(
    exner_new: &Field,
    ddt_exner_phy: &Field,
    substeps_dtime: f64,
    exner_dyn_incr: &mut Field,
    cells: IndexRange,
    levels: Range<usize>,
) {
    for c in cells {
        for k in levels.clone() {
            exner_dyn_incr[(c, k)] =
                exner_new[(c, k)] - (exner_dyn_incr[(c, k)] + substeps_dtime * ddt_exner_phy[(c, k)]);
        }
    }
}

/// Move theta out of the Exner slot and rebuild Exner from the equation of
/// state:
///
/// ```text
/// theta_v = exner
/// exner   = (rd/p0ref · rho · theta_v)^(rd/cvd)
/// ```
pub fn theta_and_exner_from_boundary(
    rho: &Field,
    theta_v: &mut Field,
    exner: &mut Field,
    cells: impl IntoIterator<Item = usize>,
) {
    let n_levels = rho.n_levels();
    for c in cells {
        for k in 0..n_levels {
            let theta = exner[(c, k)];
            theta_v[(c, k)] = theta;
            exner[(c, k)] = (RD_O_CVD * (RD_O_P0REF * rho[(c, k)] * theta).ln()).exp();
        }
    }
}

/// Theta in the prognostic halo from the Exner change, as in the implicit
/// update:
///
/// ```text
/// theta_new = rho_now·theta_now·((exner_new/exner_now − 1)·cvd/rd + 1) / rho_new
/// ```
pub fn update_theta_v_halo(
    rho_now: &Field,
    theta_v_now: &Field,
    exner_now: &Field,
    rho_new: &Field,
    exner_new: &Field,
    theta_v_new: &mut Field,
    cells: impl IntoIterator<Item = usize>,
) {
    let n_levels = rho_now.n_levels();
    for c in cells {
        for k in 0..n_levels {
            theta_v_new[(c, k)] = rho_now[(c, k)]
                * theta_v_now[(c, k)]
                * ((exner_new[(c, k)] / exner_now[(c, k)] - 1.0) * CVD_O_RD + 1.0)
                / rho_new[(c, k)];
        }
    }
}
