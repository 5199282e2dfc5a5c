//! Normal wind updates.

use crate::constants::CPD;
use crate::grid::IndexRange;
use crate::state::Field;

/// Predictor normal wind.
///
/// ```text
/// vn_new = vn_now + dt·(ddt_vn_apc + ddt_vn_phy − cpd·z_theta_v_e·z_gradh_exner)
/// ```
#[allow(clippy::too_many_arguments)]
pub fn advance_vn_predictor(
    vn_now: &Field,
    ddt_vn_apc: &Field,
    ddt_vn_phy: &Field,
    z_theta_v_e: &Field,
    z_gradh_exner: &Field,
    dtime: f64,
    vn_new: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn_now.n_levels();
    for e in edges {
        for k in 0..n_levels {
            vn_new[(e, k)] = vn_now[(e, k)]
                + dtime
                    * (ddt_vn_apc[(e, k)] + ddt_vn_phy[(e, k)]
                        - CPD * z_theta_v_e[(e, k)] * z_gradh_exner[(e, k)]);
        }
    }
}

/// Time weights of the two advective tendencies in the corrector.
#[derive(Clone, Copy, Debug)]
pub struct TendencyWeights {
    pub now: f64,
    pub new: f64,
}

/// Corrector normal wind, blending the advective tendencies of both stages.
///
/// ```text
/// vn_new = vn_now + dt·(w_now·ddt_1 + w_new·ddt_2 + ddt_vn_phy − cpd·z_theta_v_e·z_gradh_exner)
/// ```
#[allow(clippy::too_many_arguments)]
pub fn advance_vn_corrector(
    vn_now: &Field,
    ddt_vn_apc_ntl1: &Field,
    ddt_vn_apc_ntl2: &Field,
    weights: TendencyWeights,
    ddt_vn_phy: &Field,
    z_theta_v_e: &Field,
    z_gradh_exner: &Field,
    dtime: f64,
    vn_new: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn_now.n_levels();
    for e in edges {
        for k in 0..n_levels {
            let advective = weights.now * ddt_vn_apc_ntl1[(e, k)] + weights.new * ddt_vn_apc_ntl2[(e, k)];
            vn_new[(e, k)] = vn_now[(e, k)]
                + dtime
                    * (advective + ddt_vn_phy[(e, k)] - CPD * z_theta_v_e[(e, k)] * z_gradh_exner[(e, k)]);
        }
    }
}

/// Add the weighted analysis increment: `vn += iau_wgt_dyn·vn_incr`.
pub fn add_vn_increment(vn_incr: &Field, iau_wgt_dyn: f64, vn: &mut Field, edges: IndexRange) {
    let n_levels = vn.n_levels();
    for e in edges {
        for k in 0..n_levels {
            vn[(e, k)] += iau_wgt_dyn * vn_incr[(e, k)];
        }
    }
}

/// Normal wind in the lateral boundary rows from the driving model's
/// tendency: `vn_new = vn_now + dt·grf_tend_vn`.
pub fn advance_vn_lateral_boundary(
    vn_now: &Field,
    grf_tend_vn: &Field,
    dtime: f64,
    vn_new: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn_now.n_levels();
    for e in edges {
        for k in 0..n_levels {
            vn_new[(e, k)] = vn_now[(e, k)] + dtime * grf_tend_vn[(e, k)];
        }
    }
}
