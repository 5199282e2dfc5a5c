//! Per-substep scratch fields of the solver.
//!
//! Everything here is overwritten within a substep before it is read.
//! Nothing is carried from one substep to the next.

use super::field::Field;
use crate::grid::IconGrid;

/// Scratch fields shared by the predictor and the corrector.
///
/// Naming follows the quantities, with `_ic` for half levels, `_e` for edges
/// and `_pr` for perturbations from the reference state.
#[derive(Clone, Debug)]
pub struct IntermediateFields {
    // Cell perturbations
    pub z_rth_pr_1: Field,
    pub z_rth_pr_2: Field,
    pub z_exner_ex_pr: Field,
    pub z_exner_ic: Field,
    pub z_dexner_dz_c_1: Field,
    pub z_dexner_dz_c_2: Field,
    pub z_theta_v_pr_ic: Field,
    pub z_th_ddz_exner_c: Field,

    /// Green-Gauss gradients: `[d/dx rho', d/dy rho', d/dx theta', d/dy theta']`.
    pub z_grad_rth: [Field; 4],
    /// Perturbation density and theta at vertices.
    pub z_rho_v: Field,
    pub z_theta_v_v: Field,

    // Edge reconstructions
    pub z_rho_e: Field,
    pub z_theta_v_e: Field,
    pub z_gradh_exner: Field,
    /// Hydrostatic correction at the lowest level, one value per edge.
    pub z_hydro_corr: Vec<f64>,
    pub z_vn_avg: Field,
    pub z_theta_v_fl_e: Field,
    pub z_graddiv_vn: Field,
    pub z_graddiv2_vn: Field,

    // Cell divergences and contravariant correction
    pub z_flxdiv_mass: Field,
    pub z_flxdiv_theta: Field,
    pub z_w_concorr_mc: Field,
    pub z_dwdz_dd: Field,

    // Vertically implicit system
    pub z_w_expl: Field,
    pub z_contr_w_fl_l: Field,
    pub z_rho_expl: Field,
    pub z_exner_expl: Field,
    pub z_alpha: Field,
    pub z_beta: Field,
    pub z_q: Field,
}

impl IntermediateFields {
    /// Allocate every scratch field for `grid`.
    pub fn new(grid: &IconGrid) -> Self {
        let (nc, ne, nv, nl) = (grid.n_cells(), grid.n_edges(), grid.n_vertices(), grid.n_levels());
        let cell = || Field::zeros(nc, nl);
        let cell_ic = || Field::zeros(nc, nl + 1);
        let edge = || Field::zeros(ne, nl);
        Self {
            z_rth_pr_1: cell(),
            z_rth_pr_2: cell(),
            z_exner_ex_pr: cell_ic(),
            z_exner_ic: cell_ic(),
            z_dexner_dz_c_1: cell(),
            z_dexner_dz_c_2: cell(),
            z_theta_v_pr_ic: cell_ic(),
            z_th_ddz_exner_c: cell_ic(),
            z_grad_rth: [cell(), cell(), cell(), cell()],
            z_rho_v: Field::zeros(nv, nl),
            z_theta_v_v: Field::zeros(nv, nl),
            z_rho_e: edge(),
            z_theta_v_e: edge(),
            z_gradh_exner: edge(),
            z_hydro_corr: vec![0.0; ne],
            z_vn_avg: edge(),
            z_theta_v_fl_e: edge(),
            z_graddiv_vn: edge(),
            z_graddiv2_vn: edge(),
            z_flxdiv_mass: cell(),
            z_flxdiv_theta: cell(),
            z_w_concorr_mc: cell(),
            z_dwdz_dd: cell(),
            z_w_expl: cell_ic(),
            z_contr_w_fl_l: cell_ic(),
            z_rho_expl: cell(),
            z_exner_expl: cell(),
            z_alpha: cell_ic(),
            z_beta: cell(),
            z_q: cell(),
        }
    }
}

/// Fields the core computes for the velocity-advection collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct VelocityFields {
    /// Contravariant correction at edges.
    pub z_w_concorr_me: Field,
    /// Horizontal kinetic energy at edges.
    pub z_kin_hor_e: Field,
    /// Tangential wind at half levels.
    pub z_vt_ie: Field,
}

impl VelocityFields {
    /// All-zero fields shaped for `grid`.
    pub fn new(grid: &IconGrid) -> Self {
        let (ne, nl) = (grid.n_edges(), grid.n_levels());
        Self {
            z_w_concorr_me: Field::zeros(ne, nl),
            z_kin_hor_e: Field::zeros(ne, nl),
            z_vt_ie: Field::zeros(ne, nl + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SyntheticMesh;

    #[test]
    fn test_scratch_shapes() {
        let mesh = SyntheticMesh::torus(2, 1000.0, 3).unwrap();
        let z = IntermediateFields::new(&mesh.grid);
        assert_eq!(z.z_alpha.shape(), (8, 4));
        assert_eq!(z.z_beta.shape(), (8, 3));
        assert_eq!(z.z_rho_v.shape(), (4, 3));
        assert_eq!(z.z_hydro_corr.len(), 12);
        let v = VelocityFields::new(&mesh.grid);
        assert_eq!(v.z_vt_ie.shape(), (12, 4));
    }
}
