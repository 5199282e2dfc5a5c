//! Horizontal Exner pressure gradient at edges.
//!
//! Three formulations cover the column from top to bottom:
//!
//! | levels                   | method                                        |
//! |--------------------------|-----------------------------------------------|
//! | `0..nflatlev`            | plain difference along the edge normal        |
//! | `nflatlev..nflat_gradp`  | difference with a terrain-slope correction    |
//! | `nflat_gradp..n_levels`  | second-order Taylor expansion to the edge level |
//!
//! Edges flagged in `ipeidx_dsl` additionally receive a hydrostatic
//! correction for pressure points below the lowest level of a neighbor.

use std::ops::Range;

use crate::constants::GRAV_O_CPD;
use crate::grid::{IndexRange, NeighborTable};
use crate::metrics::MetricState;
use crate::state::{Field, NeighborWeights};

/// Gradient on terrain-following levels above `nflatlev`.
///
/// ```text
/// z_gradh_exner = (ex(c1) − ex(c0)) / dual_edge_length
/// ```
pub fn horizontal_gradient_flat(
    e2c: &NeighborTable,
    inv_dual_edge_length: &[f64],
    z_exner_ex_pr: &Field,
    z_gradh_exner: &mut Field,
    edges: IndexRange,
    levels: Range<usize>,
) {
    for e in edges {
        let (c0, c1) = (e2c.neighbor(e, 0), e2c.neighbor(e, 1));
        let inv_dual = inv_dual_edge_length[e];
        for k in levels.clone() {
            z_gradh_exner[(e, k)] = inv_dual * (z_exner_ex_pr[(c1, k)] - z_exner_ex_pr[(c0, k)]);
        }
    }
}

/// Gradient with the terrain-slope correction.
///
/// ```text
/// z_gradh_exner = (ex(c1) − ex(c0))/dual_length − ddxn_z_full·Σ_i c_lin_e[i]·∂z ex(c_i)
/// ```
#[allow(clippy::too_many_arguments)]
pub fn horizontal_gradient_metric(
    e2c: &NeighborTable,
    inv_dual_edge_length: &[f64],
    c_lin_e: &NeighborWeights,
    metrics: &MetricState,
    z_exner_ex_pr: &Field,
    z_dexner_dz_c_1: &Field,
    z_gradh_exner: &mut Field,
    edges: IndexRange,
    levels: Range<usize>,
) {
    for e in edges {
        let (c0, c1) = (e2c.neighbor(e, 0), e2c.neighbor(e, 1));
        let inv_dual = inv_dual_edge_length[e];
        for k in levels.clone() {
            let vertical = c_lin_e[(e, 0)] * z_dexner_dz_c_1[(c0, k)] + c_lin_e[(e, 1)] * z_dexner_dz_c_1[(c1, k)];
            z_gradh_exner[(e, k)] = inv_dual * (z_exner_ex_pr[(c1, k)] - z_exner_ex_pr[(c0, k)])
                - metrics.ddxn_z_full[(e, k)] * vertical;
        }
    }
}

/// Gradient from a second-order Taylor expansion of each cell's Exner
/// profile to the height of the edge point.
///
/// For cell slot `i` with level `k_i = k + vertoffset_gradp[i]` and height
/// difference `dz = zdiff_gradp[i]`:
///
/// ```text
/// ex_i = ex(c_i, k_i) + dz·(∂z ex(c_i, k_i) + dz·∂²z ex(c_i, k_i))
/// z_gradh_exner = (ex_1 − ex_0) / dual_length
/// ```
#[allow(clippy::too_many_arguments)]
pub fn horizontal_gradient_taylor(
    e2c: &NeighborTable,
    inv_dual_edge_length: &[f64],
    metrics: &MetricState,
    z_exner_ex_pr: &Field,
    z_dexner_dz_c_1: &Field,
    z_dexner_dz_c_2: &Field,
    z_gradh_exner: &mut Field,
    edges: IndexRange,
    levels: Range<usize>,
) {
    for e in edges {
        let inv_dual = inv_dual_edge_length[e];
        for k in levels.clone() {
            let expanded = |i: usize| {
                let c = e2c.neighbor(e, i);
                let ki = shifted(k, metrics.vertoffset_gradp[i][(e, k)]);
                let dz = metrics.zdiff_gradp[i][(e, k)];
                z_exner_ex_pr[(c, ki)] + dz * (z_dexner_dz_c_1[(c, ki)] + dz * z_dexner_dz_c_2[(c, ki)])
            };
            z_gradh_exner[(e, k)] = inv_dual * (expanded(1) - expanded(0));
        }
    }
}

/// Hydrostatic correction at the lowest level.
///
/// Theta is extrapolated to the edge height in both cells; the correction
/// is the hydrostatic Exner gradient between the two:
///
/// ```text
/// θ_i = theta_v(c_i, k_i) + dz·(theta_v_ic(c_i, k_i) − theta_v_ic(c_i, k_i+1))·inv_ddqz(c_i, k_i)
/// z_hydro_corr = g/cpd · (θ_1 − θ_0)·4/(θ_0 + θ_1)² / dual_length
/// ```
pub fn hydrostatic_correction(
    e2c: &NeighborTable,
    inv_dual_edge_length: &[f64],
    metrics: &MetricState,
    theta_v: &Field,
    theta_v_ic: &Field,
    z_hydro_corr: &mut [f64],
    edges: IndexRange,
) {
    let k = theta_v.n_levels() - 1;
    for e in edges {
        let extrapolated = |i: usize| {
            let c = e2c.neighbor(e, i);
            let ki = shifted(k, metrics.vertoffset_gradp[i][(e, k)]);
            let dz = metrics.zdiff_gradp[i][(e, k)];
            theta_v[(c, ki)]
                + dz * (theta_v_ic[(c, ki)] - theta_v_ic[(c, ki + 1)]) * metrics.inv_ddqz_z_full[(c, ki)]
        };
        let (theta_0, theta_1) = (extrapolated(0), extrapolated(1));
        let sum = theta_0 + theta_1;
        z_hydro_corr[e] = GRAV_O_CPD * inv_dual_edge_length[e] * (theta_1 - theta_0) * 4.0 / (sum * sum);
    }
}

/// Add the hydrostatic correction where `ipeidx_dsl` is set.
///
/// ```text
/// z_gradh_exner += z_hydro_corr · pg_exdist
/// ```
pub fn apply_hydrostatic_correction(
    metrics: &MetricState,
    z_hydro_corr: &[f64],
    z_gradh_exner: &mut Field,
    edges: IndexRange,
) {
    let n_levels = z_gradh_exner.n_levels();
    for e in edges {
        for k in 0..n_levels {
            if metrics.ipeidx_dsl[(e, k)] {
                z_gradh_exner[(e, k)] += z_hydro_corr[e] * metrics.pg_exdist[(e, k)];
            }
        }
    }
}

/// Level `k` moved by a signed offset.
///
/// # Panics
///
/// Panics if the offset leaves the column, which metric preprocessing
/// rules out.
#[inline]
fn shifted(k: usize, offset: i32) -> usize {
    match k.checked_add_signed(offset as isize) {
        Some(level) => level,
        None => panic!("vertical offset {offset} at level {k} leaves the column"),
    }
}
