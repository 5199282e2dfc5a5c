//! Interpolation and reconstruction coefficients.
//!
//! All coefficients are derived from connectivity and edge/cell geometry:
//!
//! - `geofac_div`: flux divergence, `div(c) = Σ_j geofac_div[c,j] · vn[C2E[c,j]]`
//! - `geofac_grdiv`: gradient of divergence on `E2C2EO`
//! - `geofac_grg_{x,y}`: Green-Gauss cell gradient on `C2E2CO`
//! - `rbf_vec_coeff_e`: tangential wind from the normal winds on `E2C2E`
//! - `e_flx_avg`: flux-averaged normal wind on `E2C2EO`
//!
//! The last two are least-norm weights that reproduce any uniform wind
//! exactly. For weights `w` over neighbor normals `n_j` and a target unit
//! vector `t`:
//!
//! ```text
//! minimize |w|²  subject to  Σ_j w_j n_j = t
//! w = Aᵀ (A Aᵀ)⁻¹ t,   A = [n_1 … n_m]   (2 × m)
//! ```
//!
//! `E2C2E` lists the two other edges of `E2C[0]`, then the two other edges
//! of `E2C[1]`. `E2C2EO` prepends the edge itself.

use faer::{Mat, linalg::solvers::Solve};

use super::{CellGeometry, EdgeGeometry};
use crate::grid::{Connectivity, GridError, GridResult, IconGrid, NeighborTable, Zone};
use crate::state::NeighborWeights;
use crate::types::EntityKind;

/// e-folding width of the nudging coefficient, in edge rows.
const NUDGE_EFOLD_WIDTH: f64 = 2.0;

/// Relative determinant below which a least-norm system is singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Interpolation coefficient store.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolationState {
    /// Cell-to-edge linear interpolation weights on `E2C`.
    pub c_lin_e: NeighborWeights,
    /// Edge-to-cell bilinear averaging weights on `C2E`.
    pub e_bln_c_s: NeighborWeights,
    /// Flux-averaging weights on `E2C2EO`.
    pub e_flx_avg: NeighborWeights,
    /// Divergence weights on `C2E`.
    pub geofac_div: NeighborWeights,
    /// Gradient-of-divergence weights on `E2C2EO`.
    pub geofac_grdiv: NeighborWeights,
    /// Green-Gauss x-gradient weights on `C2E2CO`.
    pub geofac_grg_x: NeighborWeights,
    /// Green-Gauss y-gradient weights on `C2E2CO`.
    pub geofac_grg_y: NeighborWeights,
    /// Tangential wind reconstruction weights on `E2C2E`.
    pub rbf_vec_coeff_e: NeighborWeights,
    /// Nudging coefficient per edge.
    pub nudgecoeff_e: Vec<f64>,
    /// Area-weighted cell-to-vertex weights on `V2C`.
    pub cells_aw_verts: NeighborWeights,
    /// Normal coordinate of the adjacent cell centers, on `E2C`.
    pub pos_on_tplane_e_1: NeighborWeights,
    /// Tangential coordinate of the adjacent cell centers, on `E2C`.
    pub pos_on_tplane_e_2: NeighborWeights,
    /// x-component of the edge normal in the frame of each adjacent cell.
    pub primal_normal_cell_1: NeighborWeights,
    /// y-component of the edge normal in the frame of each adjacent cell.
    pub primal_normal_cell_2: NeighborWeights,
    /// x-component of the edge tangent in the frame of each adjacent cell.
    pub dual_normal_cell_1: NeighborWeights,
    /// y-component of the edge tangent in the frame of each adjacent cell.
    pub dual_normal_cell_2: NeighborWeights,
}

impl InterpolationState {
    /// Derive all coefficients from the grid and its geometry.
    ///
    /// Requires `C2E`, `E2C`, `C2E2C`, `E2C2E` and `V2C`.
    pub fn from_geometry(grid: &IconGrid, edges: &EdgeGeometry, cells: &CellGeometry) -> GridResult<Self> {
        edges.validate_shapes(grid)?;
        cells.validate_shapes(grid)?;

        let c2e = grid.connectivity(Connectivity::C2E)?;
        let e2c = grid.connectivity(Connectivity::E2C)?;
        let c2e2c = grid.connectivity(Connectivity::C2E2C)?;
        let e2c2e = grid.connectivity(Connectivity::E2C2E)?;
        let v2c = grid.connectivity(Connectivity::V2C)?;

        let n_cells = grid.n_cells();
        let n_edges = grid.n_edges();

        let geofac_div = NeighborWeights::from_fn(n_cells, c2e.width(), |c, j| match c2e.get(c, j) {
            Some(e) => edges.primal_edge_length[e] * orientation(e2c, c, e) / cells.area[c],
            None => 0.0,
        });

        let e_bln_c_s = NeighborWeights::from_fn(n_cells, c2e.width(), |c, _| {
            let present = c2e.row(c).flatten().count();
            if present == 0 { 0.0 } else { 1.0 / present as f64 }
        });

        let c_lin_e = NeighborWeights::from_fn(n_edges, 2, |e, i| {
            let [x0, x1] = edges.cell_offset[e];
            match (e2c.get(e, 0), e2c.get(e, 1)) {
                (Some(_), Some(_)) => {
                    let (d0, d1) = (norm(x0), norm(x1));
                    if i == 0 { d1 / (d0 + d1) } else { d0 / (d0 + d1) }
                }
                (Some(_), None) => [1.0, 0.0][i],
                (None, Some(_)) => [0.0, 1.0][i],
                (None, None) => 0.0,
            }
        });

        let (geofac_grg_x, geofac_grg_y) = green_gauss_weights(c2e, e2c, c2e2c, edges, cells);
        let geofac_grdiv = gradient_of_divergence_weights(e2c, e2c2e, c2e, &geofac_div, edges);
        let rbf_vec_coeff_e = least_norm_on_neighbors(e2c2e, edges, false, |e| edges.dual_normal[e])?;
        let e_flx_avg = least_norm_on_neighbors(e2c2e, edges, true, |e| edges.primal_normal[e])?;

        let cells_aw_verts = NeighborWeights::from_fn(grid.n_vertices(), v2c.width(), |v, j| {
            let total: f64 = v2c.row(v).flatten().map(|c| cells.area[c]).sum();
            match v2c.get(v, j) {
                Some(c) if total > 0.0 => cells.area[c] / total,
                _ => 0.0,
            }
        });

        let tangent_plane = |component: fn([f64; 2], [f64; 2], [f64; 2]) -> f64| {
            NeighborWeights::from_fn(n_edges, 2, |e, i| {
                component(edges.cell_offset[e][i], edges.primal_normal[e], edges.dual_normal[e])
            })
        };
        let pos_on_tplane_e_1 = tangent_plane(|x, n, _| dot(x, n));
        let pos_on_tplane_e_2 = tangent_plane(|x, _, t| dot(x, t));
        let primal_normal_cell_1 = tangent_plane(|_, n, _| n[0]);
        let primal_normal_cell_2 = tangent_plane(|_, n, _| n[1]);
        let dual_normal_cell_1 = tangent_plane(|_, _, t| t[0]);
        let dual_normal_cell_2 = tangent_plane(|_, _, t| t[1]);

        Ok(Self {
            c_lin_e,
            e_bln_c_s,
            e_flx_avg,
            geofac_div,
            geofac_grdiv,
            geofac_grg_x,
            geofac_grg_y,
            rbf_vec_coeff_e,
            nudgecoeff_e: vec![0.0; n_edges],
            cells_aw_verts,
            pos_on_tplane_e_1,
            pos_on_tplane_e_2,
            primal_normal_cell_1,
            primal_normal_cell_2,
            dual_normal_cell_1,
            dual_normal_cell_2,
        })
    }

    /// Set the nudging coefficients of the edge nudging rows.
    ///
    /// Row `r` receives `nudge_max_coeff · exp(−(r − 1) / 2)`; all other
    /// edges are reset to zero.
    pub fn with_nudging(mut self, grid: &IconGrid, nudge_max_coeff: f64) -> GridResult<Self> {
        self.nudgecoeff_e.fill(0.0);
        for row in 1..=EntityKind::Edge.nudging_rows() {
            let coeff = nudge_max_coeff * (-(f64::from(row) - 1.0) / NUDGE_EFOLD_WIDTH).exp();
            for e in grid.zone(EntityKind::Edge, Zone::Nudging(row))? {
                self.nudgecoeff_e[e] = coeff;
            }
        }
        Ok(self)
    }

    /// Check every coefficient array against the grid.
    pub fn validate_shapes(&self, grid: &IconGrid) -> GridResult<()> {
        let checks = [
            ("c_lin_e", &self.c_lin_e, EntityKind::Edge),
            ("e_bln_c_s", &self.e_bln_c_s, EntityKind::Cell),
            ("e_flx_avg", &self.e_flx_avg, EntityKind::Edge),
            ("geofac_div", &self.geofac_div, EntityKind::Cell),
            ("geofac_grdiv", &self.geofac_grdiv, EntityKind::Edge),
            ("geofac_grg_x", &self.geofac_grg_x, EntityKind::Cell),
            ("geofac_grg_y", &self.geofac_grg_y, EntityKind::Cell),
            ("rbf_vec_coeff_e", &self.rbf_vec_coeff_e, EntityKind::Edge),
            ("cells_aw_verts", &self.cells_aw_verts, EntityKind::Vertex),
            ("pos_on_tplane_e_1", &self.pos_on_tplane_e_1, EntityKind::Edge),
            ("pos_on_tplane_e_2", &self.pos_on_tplane_e_2, EntityKind::Edge),
            ("primal_normal_cell_1", &self.primal_normal_cell_1, EntityKind::Edge),
            ("primal_normal_cell_2", &self.primal_normal_cell_2, EntityKind::Edge),
            ("dual_normal_cell_1", &self.dual_normal_cell_1, EntityKind::Edge),
            ("dual_normal_cell_2", &self.dual_normal_cell_2, EntityKind::Edge),
        ];
        for (what, weights, kind) in checks {
            if weights.n_entities() != grid.count(kind) {
                return Err(GridError::size_mismatch(what, grid.count(kind), weights.n_entities()));
            }
        }
        if self.nudgecoeff_e.len() != grid.n_edges() {
            return Err(GridError::size_mismatch("nudgecoeff_e", grid.n_edges(), self.nudgecoeff_e.len()));
        }
        Ok(())
    }
}

/// +1 if `cell` is the first cell of `edge` (the normal points outward), else -1.
#[inline]
fn orientation(e2c: &NeighborTable, cell: usize, edge: usize) -> f64 {
    if e2c.get(edge, 0) == Some(cell) { 1.0 } else { -1.0 }
}

#[inline]
fn dot(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

#[inline]
fn norm(a: [f64; 2]) -> f64 {
    dot(a, a).sqrt()
}

fn green_gauss_weights(
    c2e: &NeighborTable,
    e2c: &NeighborTable,
    c2e2c: &NeighborTable,
    edges: &EdgeGeometry,
    cells: &CellGeometry,
) -> (NeighborWeights, NeighborWeights) {
    let n_cells = c2e.n_entities();
    let width = c2e.width() + 1;
    let mut gx = NeighborWeights::zeros(n_cells, width);
    let mut gy = NeighborWeights::zeros(n_cells, width);

    for c in 0..n_cells {
        for (j, edge) in c2e.row(c).enumerate() {
            let Some(e) = edge else { continue };
            let sign = orientation(e2c, c, e);
            let factor = 0.5 * edges.primal_edge_length[e] / cells.area[c];
            let [nx, ny] = edges.primal_normal[e];
            let (wx, wy) = (factor * sign * nx, factor * sign * ny);

            gx[(c, 0)] += wx;
            gy[(c, 0)] += wy;
            // Zero-gradient closure across an absent neighbor.
            let slot = if c2e2c.get(c, j).is_some() { j + 1 } else { 0 };
            gx[(c, slot)] += wx;
            gy[(c, slot)] += wy;
        }
    }
    (gx, gy)
}

fn gradient_of_divergence_weights(
    e2c: &NeighborTable,
    e2c2e: &NeighborTable,
    c2e: &NeighborTable,
    geofac_div: &NeighborWeights,
    edges: &EdgeGeometry,
) -> NeighborWeights {
    let n_edges = e2c.n_entities();
    let per_cell = e2c2e.width() / 2;
    let mut w = NeighborWeights::zeros(n_edges, e2c2e.width() + 1);

    for e in 0..n_edges {
        let (Some(c0), Some(c1)) = (e2c.get(e, 0), e2c.get(e, 1)) else {
            continue;
        };
        let inv_dual = edges.inverse_dual_edge_length[e];

        let own = |c: usize| c2e.slot_of(c, e).map_or(0.0, |j| geofac_div[(c, j)]);
        w[(e, 0)] = inv_dual * (own(c1) - own(c0));

        for (s, neighbor) in e2c2e.row(e).enumerate() {
            let Some(n) = neighbor else { continue };
            let (cell, sign) = if s < per_cell { (c0, -1.0) } else { (c1, 1.0) };
            if let Some(j) = c2e.slot_of(cell, n) {
                w[(e, s + 1)] = sign * inv_dual * geofac_div[(cell, j)];
            }
        }
    }
    w
}

/// Least-norm weights over `E2C2E` (or `E2C2EO` when `include_self`).
fn least_norm_on_neighbors(
    e2c2e: &NeighborTable,
    edges: &EdgeGeometry,
    include_self: bool,
    target: impl Fn(usize) -> [f64; 2],
) -> GridResult<NeighborWeights> {
    let offset = usize::from(include_self);
    let width = e2c2e.width() + offset;
    let mut weights = NeighborWeights::zeros(e2c2e.n_entities(), width);

    for e in 0..e2c2e.n_entities() {
        let mut slots = Vec::with_capacity(width);
        if include_self {
            slots.push((0, e));
        }
        slots.extend(
            e2c2e
                .row(e)
                .enumerate()
                .filter_map(|(s, n)| n.map(|n| (s + offset, n))),
        );
        let normals: Vec<[f64; 2]> = slots.iter().map(|&(_, n)| edges.primal_normal[n]).collect();

        let Some(w) = least_norm_weights(&normals, target(e)) else {
            return Err(GridError::InvalidGeometry(format!(
                "edge {e}: neighbor normals do not span the plane"
            )));
        };
        for (&(slot, _), value) in slots.iter().zip(w) {
            weights[(e, slot)] = value;
        }
    }
    Ok(weights)
}

/// Minimum-norm `w` with `Σ w_j n_j = target`, or `None` if the normals are collinear.
fn least_norm_weights(normals: &[[f64; 2]], target: [f64; 2]) -> Option<Vec<f64>> {
    let mut gram = Mat::<f64>::zeros(2, 2);
    for n in normals {
        for i in 0..2 {
            for j in 0..2 {
                gram[(i, j)] += n[i] * n[j];
            }
        }
    }
    let det = gram[(0, 0)] * gram[(1, 1)] - gram[(0, 1)] * gram[(1, 0)];
    let scale = gram[(0, 0)] + gram[(1, 1)];
    if !(det.abs() > SINGULAR_TOLERANCE * scale * scale) {
        return None;
    }

    let mut rhs = Mat::<f64>::zeros(2, 1);
    rhs[(0, 0)] = target[0];
    rhs[(1, 0)] = target[1];

    let lu = gram.as_ref().full_piv_lu();
    let y = lu.solve(&rhs);

    Some(normals.iter().map(|n| n[0] * y[(0, 0)] + n[1] * y[(1, 0)]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SyntheticMesh;
    use approx::assert_relative_eq;

    #[test]
    fn test_least_norm_reproduces_target() {
        let normals = [[1.0, 0.0], [0.0, 1.0], [0.6, 0.8]];
        let w = least_norm_weights(&normals, [0.3, -0.4]).unwrap();
        let x: f64 = normals.iter().zip(&w).map(|(n, w)| n[0] * w).sum();
        let y: f64 = normals.iter().zip(&w).map(|(n, w)| n[1] * w).sum();
        assert_relative_eq!(x, 0.3, epsilon = 1e-12);
        assert_relative_eq!(y, -0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_collinear_normals_rejected() {
        assert!(least_norm_weights(&[[1.0, 0.0], [-1.0, 0.0]], [0.0, 1.0]).is_none());
    }

    #[test]
    fn test_divergence_of_uniform_wind_vanishes() {
        let mesh = SyntheticMesh::torus(4, 1000.0, 2).unwrap();
        let interp = &mesh.interpolation;
        let c2e = mesh.grid.connectivity(Connectivity::C2E).unwrap();
        let u = [3.0, -1.5];
        for c in 0..mesh.grid.n_cells() {
            let div: f64 = c2e
                .row(c)
                .enumerate()
                .map(|(j, e)| {
                    let e = e.unwrap();
                    interp.geofac_div[(c, j)] * dot(u, mesh.edges.primal_normal[e])
                })
                .sum();
            assert!(div.abs() < 1e-12, "cell {c}: divergence {div}");
        }
    }

    #[test]
    fn test_tangential_reconstruction_of_uniform_wind() {
        let mesh = SyntheticMesh::torus(4, 1000.0, 2).unwrap();
        let e2c2e = mesh.grid.connectivity(Connectivity::E2C2E).unwrap();
        let u = [2.0, 0.5];
        for e in 0..mesh.grid.n_edges() {
            let vt: f64 = e2c2e
                .row(e)
                .enumerate()
                .map(|(s, n)| mesh.interpolation.rbf_vec_coeff_e[(e, s)] * dot(u, mesh.edges.primal_normal[n.unwrap()]))
                .sum();
            assert_relative_eq!(vt, dot(u, mesh.edges.dual_normal[e]), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_green_gauss_gradient_of_linear_field() {
        let mesh = SyntheticMesh::torus(4, 1000.0, 2).unwrap();
        let c2e = mesh.grid.connectivity(Connectivity::C2E).unwrap();
        let e2c = mesh.grid.connectivity(Connectivity::E2C).unwrap();
        // Linear field, zero at cell 0, sampled at its three neighbors.
        let c = 0;
        let slope = [0.01, -0.02];
        let mut gx = 0.0;
        let mut gy = 0.0;
        for j in 0..3 {
            let e = c2e.neighbor(c, j);
            let [x0, x1] = mesh.edges.cell_offset[e];
            let across = [x1[0] - x0[0], x1[1] - x0[1]];
            let value = orientation(e2c, c, e) * dot(slope, across);
            gx += mesh.interpolation.geofac_grg_x[(c, j + 1)] * value;
            gy += mesh.interpolation.geofac_grg_y[(c, j + 1)] * value;
        }
        assert_relative_eq!(gx, slope[0], epsilon = 1e-12);
        assert_relative_eq!(gy, slope[1], epsilon = 1e-12);
        assert!(mesh.interpolation.geofac_grg_x[(c, 0)].abs() < 1e-15);
    }

    #[test]
    fn test_cells_aw_verts_rows_sum_to_one() {
        let mesh = SyntheticMesh::torus(3, 500.0, 2).unwrap();
        for v in 0..mesh.grid.n_vertices() {
            let sum: f64 = mesh.interpolation.cells_aw_verts.row(v).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-14);
        }
    }
}
