//! Vertical metric coefficients and the reference state on the grid.

use super::reference::ReferenceAtmosphere;
use crate::config::NonHydrostaticConfig;
use crate::geometry::InterpolationState;
use crate::grid::{Connectivity, GridError, GridResult, IconGrid, IndexRange, VerticalGrid, Zone};
use crate::state::Field;
use crate::types::EntityKind;

/// Metric coefficients of the terrain-following coordinate.
///
/// Half-level fields have `n_levels + 1` levels. Extrapolation weights
/// (`wgtfacq*`) hold three values per entity, ordered from the level next
/// to the boundary inward.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricState {
    // Reference state
    pub rho_ref_mc: Field,
    pub theta_ref_mc: Field,
    pub exner_ref_mc: Field,
    pub rho_ref_me: Field,
    pub theta_ref_me: Field,
    pub theta_ref_ic: Field,
    pub d_exner_dz_ref_ic: Field,
    pub d2dexdz2_fac1_mc: Field,
    pub d2dexdz2_fac2_mc: Field,

    // Vertical interpolation
    pub wgtfac_c: Field,
    pub wgtfac_e: Field,
    pub wgtfacq_c: Field,
    pub wgtfacq_e: Field,
    pub wgtfacq1_c: Field,

    // Layer thicknesses
    pub ddqz_z_full: Field,
    pub inv_ddqz_z_full: Field,
    pub ddqz_z_half: Field,
    pub ddqz_z_full_e: Field,

    // Terrain slopes
    pub ddxn_z_full: Field,
    pub ddxt_z_full: Field,

    // Off-centering and extrapolation
    pub exner_exfac: Field,
    pub vwind_impl_wgt: Vec<f64>,
    pub vwind_expl_wgt: Vec<f64>,

    // Taylor-expanded pressure gradient, one field per `E2C` slot
    pub zdiff_gradp: [Field; 2],
    pub vertoffset_gradp: [Field<i32>; 2],
    pub ipeidx_dsl: Field<bool>,
    pub pg_exdist: Field,

    // Three-dimensional divergence damping
    pub hmask_dd3d: Vec<f64>,
    pub scalfac_dd3d: Vec<f64>,

    // Halo masks
    pub mask_prog_halo_c: Vec<bool>,
    pub bdy_halo_c: Vec<bool>,
}

impl MetricState {
    /// Metric fields for flat terrain: coordinate surfaces are the half-level
    /// heights of `vertical` everywhere.
    pub fn flat_terrain(
        grid: &IconGrid,
        vertical: &VerticalGrid,
        reference: &ReferenceAtmosphere,
        interpolation: &InterpolationState,
        config: &NonHydrostaticConfig,
    ) -> GridResult<Self> {
        let n_levels = grid.n_levels();
        if vertical.n_levels() != n_levels {
            return Err(GridError::size_mismatch("vertical levels", n_levels, vertical.n_levels()));
        }
        let n_cells = grid.n_cells();
        let n_edges = grid.n_edges();
        let e2c = grid.connectivity(Connectivity::E2C)?;

        let z_ifc = vertical.vct_a();
        let z_mc: Vec<f64> = (0..n_levels).map(|k| vertical.full_level_height(k)).collect();

        let per_level = |n: usize, f: &dyn Fn(f64) -> f64| Field::from_fn(n, n_levels, |_, k| f(z_mc[k]));
        let per_half_level = |f: &dyn Fn(f64) -> f64| Field::from_fn(n_cells, n_levels + 1, |_, k| f(z_ifc[k]));

        let rho_ref_mc = per_level(n_cells, &|z| reference.density(z));
        let theta_ref_mc = per_level(n_cells, &|z| reference.theta_v(z));
        let exner_ref_mc = per_level(n_cells, &|z| reference.exner(z));
        let rho_ref_me = per_level(n_edges, &|z| reference.density(z));
        let theta_ref_me = per_level(n_edges, &|z| reference.theta_v(z));
        let theta_ref_ic = per_half_level(&|z| reference.theta_v(z));
        let d_exner_dz_ref_ic = per_half_level(&|z| reference.d_exner_dz(z));
        let d2dexdz2_fac1_mc = per_level(n_cells, &|z| reference.d2dexdz2_fac1(z));
        let d2dexdz2_fac2_mc = per_level(n_cells, &|z| reference.d2dexdz2_fac2(z));

        let ddqz: Vec<f64> = (0..n_levels).map(|k| z_ifc[k] - z_ifc[k + 1]).collect();
        let ddqz_half: Vec<f64> = (0..=n_levels)
            .map(|k| {
                if k == 0 {
                    2.0 * (z_ifc[0] - z_mc[0])
                } else if k == n_levels {
                    2.0 * (z_mc[n_levels - 1] - z_ifc[n_levels])
                } else {
                    z_mc[k - 1] - z_mc[k]
                }
            })
            .collect();
        let wgtfac: Vec<f64> = (0..=n_levels)
            .map(|k| {
                if k == 0 {
                    1.0
                } else if k == n_levels {
                    0.0
                } else {
                    (z_mc[k - 1] - z_ifc[k]) / (z_mc[k - 1] - z_mc[k])
                }
            })
            .collect();

        let depth = n_levels.min(3);
        let surface_nodes: Vec<f64> = (0..depth).map(|i| z_mc[n_levels - 1 - i]).collect();
        let top_nodes: Vec<f64> = z_mc[..depth].to_vec();
        let wgtfacq = padded(lagrange_weights(&surface_nodes, z_ifc[n_levels]));
        let wgtfacq1 = padded(lagrange_weights(&top_nodes, z_ifc[0]));

        let ddqz_z_full = Field::from_fn(n_cells, n_levels, |_, k| ddqz[k]);
        let inv_ddqz_z_full = Field::from_fn(n_cells, n_levels, |_, k| 1.0 / ddqz[k]);
        let ddqz_z_half = Field::from_fn(n_cells, n_levels + 1, |_, k| ddqz_half[k]);
        let wgtfac_c = Field::from_fn(n_cells, n_levels + 1, |_, k| wgtfac[k]);
        let wgtfacq_c = Field::from_fn(n_cells, 3, |_, i| wgtfacq[i]);
        let wgtfacq1_c = Field::from_fn(n_cells, 3, |_, i| wgtfacq1[i]);

        // Edge values: linear interpolation from the adjacent cells.
        let to_edges = |cells: &Field| {
            Field::from_fn(n_edges, cells.n_levels(), |e, k| {
                e2c.row(e)
                    .enumerate()
                    .filter_map(|(i, c)| c.map(|c| interpolation.c_lin_e[(e, i)] * cells[(c, k)]))
                    .sum::<f64>()
            })
        };
        let ddqz_z_full_e = to_edges(&ddqz_z_full);
        let wgtfac_e = to_edges(&wgtfac_c);
        let wgtfacq_e = to_edges(&wgtfacq_c);

        let vwind_impl_wgt = vec![0.5 + config.vwind_offctr; n_cells];
        let vwind_expl_wgt = vwind_impl_wgt.iter().map(|w| 1.0 - w).collect();

        let boundary_edges = grid.range(EntityKind::Edge, Zone::LateralBoundary(1), Zone::Nudging(1))?;
        let hmask_dd3d = (0..n_edges)
            .map(|e| if boundary_edges.contains(e) { 0.0 } else { 1.0 })
            .collect();
        let scalfac_dd3d = (0..n_levels)
            .map(|k| if k >= vertical.kstart_dd3d() { 1.0 } else { 0.0 })
            .collect();

        let prognostic_halo = grid.zone(EntityKind::Cell, Zone::Halo(1))?;
        let mask_prog_halo_c = (0..n_cells).map(|c| prognostic_halo.contains(c)).collect();

        Ok(Self {
            rho_ref_mc,
            theta_ref_mc,
            exner_ref_mc,
            rho_ref_me,
            theta_ref_me,
            theta_ref_ic,
            d_exner_dz_ref_ic,
            d2dexdz2_fac1_mc,
            d2dexdz2_fac2_mc,
            wgtfac_c,
            wgtfac_e,
            wgtfacq_c,
            wgtfacq_e,
            wgtfacq1_c,
            ddqz_z_full,
            inv_ddqz_z_full,
            ddqz_z_half,
            ddqz_z_full_e,
            ddxn_z_full: Field::zeros(n_edges, n_levels),
            ddxt_z_full: Field::zeros(n_edges, n_levels),
            exner_exfac: Field::filled(n_cells, n_levels, config.exner_expol),
            vwind_impl_wgt,
            vwind_expl_wgt,
            zdiff_gradp: [Field::zeros(n_edges, n_levels), Field::zeros(n_edges, n_levels)],
            vertoffset_gradp: [Field::zeros(n_edges, n_levels), Field::zeros(n_edges, n_levels)],
            ipeidx_dsl: Field::zeros(n_edges, n_levels),
            pg_exdist: Field::zeros(n_edges, n_levels),
            hmask_dd3d,
            scalfac_dd3d,
            mask_prog_halo_c,
            bdy_halo_c: vec![false; n_cells],
        })
    }

    /// Check every field against the grid.
    pub fn validate_shapes(&self, grid: &IconGrid) -> GridResult<()> {
        let (nc, ne, nl) = (grid.n_cells(), grid.n_edges(), grid.n_levels());
        let fields: [(&str, (usize, usize), (usize, usize)); 24] = [
            ("rho_ref_mc", self.rho_ref_mc.shape(), (nc, nl)),
            ("theta_ref_mc", self.theta_ref_mc.shape(), (nc, nl)),
            ("exner_ref_mc", self.exner_ref_mc.shape(), (nc, nl)),
            ("rho_ref_me", self.rho_ref_me.shape(), (ne, nl)),
            ("theta_ref_me", self.theta_ref_me.shape(), (ne, nl)),
            ("theta_ref_ic", self.theta_ref_ic.shape(), (nc, nl + 1)),
            ("d_exner_dz_ref_ic", self.d_exner_dz_ref_ic.shape(), (nc, nl + 1)),
            ("d2dexdz2_fac1_mc", self.d2dexdz2_fac1_mc.shape(), (nc, nl)),
            ("d2dexdz2_fac2_mc", self.d2dexdz2_fac2_mc.shape(), (nc, nl)),
            ("wgtfac_c", self.wgtfac_c.shape(), (nc, nl + 1)),
            ("wgtfac_e", self.wgtfac_e.shape(), (ne, nl + 1)),
            ("wgtfacq_c", self.wgtfacq_c.shape(), (nc, 3)),
            ("wgtfacq_e", self.wgtfacq_e.shape(), (ne, 3)),
            ("wgtfacq1_c", self.wgtfacq1_c.shape(), (nc, 3)),
            ("ddqz_z_full", self.ddqz_z_full.shape(), (nc, nl)),
            ("inv_ddqz_z_full", self.inv_ddqz_z_full.shape(), (nc, nl)),
            ("ddqz_z_half", self.ddqz_z_half.shape(), (nc, nl + 1)),
            ("ddqz_z_full_e", self.ddqz_z_full_e.shape(), (ne, nl)),
            ("ddxn_z_full", self.ddxn_z_full.shape(), (ne, nl)),
            ("ddxt_z_full", self.ddxt_z_full.shape(), (ne, nl)),
            ("exner_exfac", self.exner_exfac.shape(), (nc, nl)),
            ("zdiff_gradp", self.zdiff_gradp[0].shape(), (ne, nl)),
            ("ipeidx_dsl", self.ipeidx_dsl.shape(), (ne, nl)),
            ("pg_exdist", self.pg_exdist.shape(), (ne, nl)),
        ];
        for (what, actual, expected) in fields {
            if actual != expected {
                return Err(GridError::size_mismatch(
                    format!("{what} (entities × levels = {} × {})", expected.0, expected.1),
                    expected.0 * expected.1,
                    actual.0 * actual.1,
                ));
            }
        }
        for (what, len, expected) in [
            ("vwind_impl_wgt", self.vwind_impl_wgt.len(), nc),
            ("vwind_expl_wgt", self.vwind_expl_wgt.len(), nc),
            ("hmask_dd3d", self.hmask_dd3d.len(), ne),
            ("scalfac_dd3d", self.scalfac_dd3d.len(), nl),
            ("mask_prog_halo_c", self.mask_prog_halo_c.len(), nc),
            ("bdy_halo_c", self.bdy_halo_c.len(), nc),
        ] {
            if len != expected {
                return Err(GridError::size_mismatch(what, expected, len));
            }
        }
        Ok(())
    }

    /// Install the halo masks of a decomposed rank.
    ///
    /// Halo cells in `bdy_halo_c` are dropped from the prognostic mask.
    pub fn set_halo_masks(&mut self, mask_prog_halo_c: Vec<bool>, bdy_halo_c: Vec<bool>) -> GridResult<()> {
        let n_cells = self.mask_prog_halo_c.len();
        for (name, len) in [("mask_prog_halo_c", mask_prog_halo_c.len()), ("bdy_halo_c", bdy_halo_c.len())] {
            if len != n_cells {
                return Err(GridError::size_mismatch(name, n_cells, len));
            }
        }
        self.mask_prog_halo_c = mask_prog_halo_c
            .into_iter()
            .zip(&bdy_halo_c)
            .map(|(prognostic, &boundary)| prognostic && !boundary)
            .collect();
        self.bdy_halo_c = bdy_halo_c;
        Ok(())
    }

    /// Cells flagged in `mask_prog_halo_c` inside `range`.
    pub fn prognostic_halo_cells(&self, range: IndexRange) -> impl Iterator<Item = usize> + '_ {
        range.into_iter().filter(|&c| self.mask_prog_halo_c[c])
    }
}

/// Lagrange weights of the polynomial through `nodes`, evaluated at `at`.
fn lagrange_weights(nodes: &[f64], at: f64) -> Vec<f64> {
    (0..nodes.len())
        .map(|i| {
            nodes
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &zj)| (at - zj) / (nodes[i] - zj))
                .product()
        })
        .collect()
}

fn padded(weights: Vec<f64>) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (slot, w) in out.iter_mut().zip(weights) {
        *slot = w;
    }
    out
}
