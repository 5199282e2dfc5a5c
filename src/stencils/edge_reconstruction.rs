//! Density and theta at edges.
//!
//! Two reconstructions are available:
//!
//! - Miura upwind (second order): the perturbation of the upwind cell is
//!   extrapolated to the barycenter of the back-trajectory with its
//!   Green-Gauss gradient.
//! - Simplified centred: the mean of both cells, corrected by the normal and
//!   tangential differences along the back-trajectory. Tangential
//!   differences use vertex values from area-weighted averages.

use crate::geometry::{EdgeGeometry, InterpolationState};
use crate::grid::{IndexRange, NeighborTable};
use crate::metrics::MetricState;
use crate::state::{Field, NeighborWeights};

/// Green-Gauss gradients of the density and theta perturbations.
///
/// `z_grad_rth` receives `[∂x ρ', ∂y ρ', ∂x θ', ∂y θ']`, each a weighted sum
/// over `C2E2CO`.
pub fn green_gauss_gradients(
    c2e2co: &NeighborTable,
    interpolation: &InterpolationState,
    z_rth_pr_1: &Field,
    z_rth_pr_2: &Field,
    z_grad_rth: &mut [Field; 4],
    cells: IndexRange,
) {
    let n_levels = z_rth_pr_1.n_levels();
    let [grad_rho_x, grad_rho_y, grad_theta_x, grad_theta_y] = z_grad_rth;
    for c in cells {
        for k in 0..n_levels {
            let (mut rx, mut ry, mut tx, mut ty) = (0.0, 0.0, 0.0, 0.0);
            for (j, n) in c2e2co.row(c).enumerate() {
                let Some(n) = n else { continue };
                let (gx, gy) = (interpolation.geofac_grg_x[(c, j)], interpolation.geofac_grg_y[(c, j)]);
                rx += gx * z_rth_pr_1[(n, k)];
                ry += gy * z_rth_pr_1[(n, k)];
                tx += gx * z_rth_pr_2[(n, k)];
                ty += gy * z_rth_pr_2[(n, k)];
            }
            grad_rho_x[(c, k)] = rx;
            grad_rho_y[(c, k)] = ry;
            grad_theta_x[(c, k)] = tx;
            grad_theta_y[(c, k)] = ty;
        }
    }
}

/// Zero the edge density and theta on `edges`.
pub fn zero_edge_fields(z_rho_e: &mut Field, z_theta_v_e: &mut Field, edges: IndexRange) {
    let n_levels = z_rho_e.n_levels();
    z_rho_e.fill_region(edges, 0..n_levels, 0.0);
    z_theta_v_e.fill_region(edges, 0..n_levels, 0.0);
}

/// Miura upwind reconstruction of density and theta at edges.
///
/// For the upwind cell `u` (slot 0 when `vn > 0`, else slot 1):
///
/// ```text
/// d_n = −(vn·dt/2 + pos_on_tplane_e_1[u])
/// d_t = −(vt·dt/2 + pos_on_tplane_e_2[u])
/// d1  = d_n·primal_normal_cell_1[u] + d_t·dual_normal_cell_1[u]
/// d2  = d_n·primal_normal_cell_2[u] + d_t·dual_normal_cell_2[u]
/// z_rho_e = rho_ref_me + ρ'(u) + d1·∂x ρ'(u) + d2·∂y ρ'(u)
/// ```
///
/// # Arguments
/// * `vn`, `vt` - Normal and tangential wind at edges
/// * `z_grad_rth` - Green-Gauss gradients from [`green_gauss_gradients`]
/// * `dtime` - Substep length
#[allow(clippy::too_many_arguments)]
pub fn upwind_rho_theta_miura(
    e2c: &NeighborTable,
    interpolation: &InterpolationState,
    metrics: &MetricState,
    vn: &Field,
    vt: &Field,
    z_rth_pr_1: &Field,
    z_rth_pr_2: &Field,
    z_grad_rth: &[Field; 4],
    dtime: f64,
    z_rho_e: &mut Field,
    z_theta_v_e: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn.n_levels();
    let dthalf = 0.5 * dtime;
    let ip = interpolation;
    for e in edges {
        for k in 0..n_levels {
            let u = if vn[(e, k)] > 0.0 { 0 } else { 1 };
            let c = e2c.neighbor(e, u);
            let dist_n = -(vn[(e, k)] * dthalf + ip.pos_on_tplane_e_1[(e, u)]);
            let dist_t = -(vt[(e, k)] * dthalf + ip.pos_on_tplane_e_2[(e, u)]);
            let d1 = dist_n * ip.primal_normal_cell_1[(e, u)] + dist_t * ip.dual_normal_cell_1[(e, u)];
            let d2 = dist_n * ip.primal_normal_cell_2[(e, u)] + dist_t * ip.dual_normal_cell_2[(e, u)];

            z_rho_e[(e, k)] = metrics.rho_ref_me[(e, k)]
                + z_rth_pr_1[(c, k)]
                + d1 * z_grad_rth[0][(c, k)]
                + d2 * z_grad_rth[1][(c, k)];
            z_theta_v_e[(e, k)] = metrics.theta_ref_me[(e, k)]
                + z_rth_pr_2[(c, k)]
                + d1 * z_grad_rth[2][(c, k)]
                + d2 * z_grad_rth[3][(c, k)];
        }
    }
}

/// Area-weighted average of a cell field at vertices over `V2C`.
pub fn cells_to_verts(
    v2c: &NeighborTable,
    cells_aw_verts: &NeighborWeights,
    cell_field: &Field,
    vertex_field: &mut Field,
    vertices: IndexRange,
) {
    let n_levels = cell_field.n_levels();
    for v in vertices {
        for k in 0..n_levels {
            vertex_field[(v, k)] = v2c
                .row(v)
                .enumerate()
                .filter_map(|(j, c)| c.map(|c| cells_aw_verts[(v, j)] * cell_field[(c, k)]))
                .sum();
        }
    }
}

/// Simplified centred reconstruction of density and theta at edges.
///
/// ```text
/// z_rho_e = rho_ref_me + ½(ρ'(c0) + ρ'(c1))
///           − dt/2·(vn·(ρ'(c1) − ρ'(c0))/dual_length
///                   + vt·tangent_orientation·(ρ'(v1) − ρ'(v0))/primal_length)
/// ```
///
/// Vertex values come from [`cells_to_verts`].
#[allow(clippy::too_many_arguments)]
pub fn centered_rho_theta_simplified(
    e2c: &NeighborTable,
    e2v: &NeighborTable,
    geometry: &EdgeGeometry,
    metrics: &MetricState,
    vn: &Field,
    vt: &Field,
    z_rth_pr_1: &Field,
    z_rth_pr_2: &Field,
    z_rho_v: &Field,
    z_theta_v_v: &Field,
    dtime: f64,
    z_rho_e: &mut Field,
    z_theta_v_e: &mut Field,
    edges: IndexRange,
) {
    let n_levels = vn.n_levels();
    let dthalf = 0.5 * dtime;
    for e in edges {
        let (c0, c1) = (e2c.neighbor(e, 0), e2c.neighbor(e, 1));
        let (v0, v1) = (e2v.neighbor(e, 0), e2v.neighbor(e, 1));
        let inv_dual = geometry.inverse_dual_edge_length[e];
        let tangential = geometry.inverse_primal_edge_length[e] * geometry.tangent_orientation[e];
        let reconstruct = |cell: &Field, vertex: &Field, k: usize, vn: f64, vt: f64| {
            0.5 * (cell[(c0, k)] + cell[(c1, k)])
                - dthalf
                    * (vn * inv_dual * (cell[(c1, k)] - cell[(c0, k)])
                        + vt * tangential * (vertex[(v1, k)] - vertex[(v0, k)]))
        };
        for k in 0..n_levels {
            let (vn_k, vt_k) = (vn[(e, k)], vt[(e, k)]);
            z_rho_e[(e, k)] = metrics.rho_ref_me[(e, k)] + reconstruct(z_rth_pr_1, z_rho_v, k, vn_k, vt_k);
            z_theta_v_e[(e, k)] =
                metrics.theta_ref_me[(e, k)] + reconstruct(z_rth_pr_2, z_theta_v_v, k, vn_k, vt_k);
        }
    }
}
