//! Diagnostic fields kept across substeps and the tracer-preparation fluxes.

use super::field::Field;
use super::prognostic::TimeLevels;
use crate::grid::IconGrid;

/// Diagnostic fields of the nonhydrostatic solver.
///
/// Interface (`_ic`) and half-level fields carry `n_levels + 1` levels.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticState {
    /// Virtual potential temperature at half levels.
    pub theta_v_ic: Field,
    /// Density at half levels.
    pub rho_ic: Field,
    /// Exner pressure perturbation from the reference state.
    pub exner_pr: Field,
    /// Horizontal mass flux at edges.
    pub mass_fl_e: Field,
    /// Tangential wind at edges.
    pub vt: Field,
    /// Normal wind at half levels.
    pub vn_ie: Field,
    /// Contravariant vertical correction at half levels.
    pub w_concorr_c: Field,

    /// Exner tendency from physics.
    pub ddt_exner_phy: Field,
    /// Normal wind tendency from physics.
    pub ddt_vn_phy: Field,

    /// Lateral-boundary tendencies from the driving model.
    pub grf_tend_vn: Field,
    pub grf_tend_w: Field,
    pub grf_tend_rho: Field,
    pub grf_tend_thv: Field,

    /// Incremental analysis update increments.
    pub vn_incr: Field,
    pub rho_incr: Field,
    pub exner_incr: Field,

    /// Exner change over the dynamical substeps, seeded at the first substep.
    pub exner_dyn_incr: Field,

    /// Advective tendency of vn, swapped together with the prognostic levels.
    pub ddt_vn_apc_pc: TimeLevels<Field>,
    /// Advective tendency of w at half levels.
    pub ddt_w_adv_pc: TimeLevels<Field>,
}

impl DiagnosticState {
    /// All-zero diagnostics shaped for `grid`.
    pub fn new(grid: &IconGrid) -> Self {
        let (nc, ne, nl) = (grid.n_cells(), grid.n_edges(), grid.n_levels());
        Self {
            theta_v_ic: Field::zeros(nc, nl + 1),
            rho_ic: Field::zeros(nc, nl + 1),
            exner_pr: Field::zeros(nc, nl),
            mass_fl_e: Field::zeros(ne, nl),
            vt: Field::zeros(ne, nl),
            vn_ie: Field::zeros(ne, nl + 1),
            w_concorr_c: Field::zeros(nc, nl + 1),
            ddt_exner_phy: Field::zeros(nc, nl),
            ddt_vn_phy: Field::zeros(ne, nl),
            grf_tend_vn: Field::zeros(ne, nl),
            grf_tend_w: Field::zeros(nc, nl + 1),
            grf_tend_rho: Field::zeros(nc, nl),
            grf_tend_thv: Field::zeros(nc, nl),
            vn_incr: Field::zeros(ne, nl),
            rho_incr: Field::zeros(nc, nl),
            exner_incr: Field::zeros(nc, nl),
            exner_dyn_incr: Field::zeros(nc, nl),
            ddt_vn_apc_pc: TimeLevels::filled(Field::zeros(ne, nl)),
            ddt_w_adv_pc: TimeLevels::filled(Field::zeros(nc, nl + 1)),
        }
    }

    /// Shape of every field and the field name, for validation.
    pub fn shapes(&self) -> Vec<(&'static str, (usize, usize))> {
        vec![
            ("theta_v_ic", self.theta_v_ic.shape()),
            ("rho_ic", self.rho_ic.shape()),
            ("exner_pr", self.exner_pr.shape()),
            ("mass_fl_e", self.mass_fl_e.shape()),
            ("vt", self.vt.shape()),
            ("vn_ie", self.vn_ie.shape()),
            ("w_concorr_c", self.w_concorr_c.shape()),
            ("ddt_exner_phy", self.ddt_exner_phy.shape()),
            ("ddt_vn_phy", self.ddt_vn_phy.shape()),
            ("grf_tend_vn", self.grf_tend_vn.shape()),
            ("grf_tend_w", self.grf_tend_w.shape()),
            ("grf_tend_rho", self.grf_tend_rho.shape()),
            ("grf_tend_thv", self.grf_tend_thv.shape()),
            ("vn_incr", self.vn_incr.shape()),
            ("rho_incr", self.rho_incr.shape()),
            ("exner_incr", self.exner_incr.shape()),
            ("exner_dyn_incr", self.exner_dyn_incr.shape()),
            ("ddt_vn_apc_pc", self.ddt_vn_apc_pc.current().shape()),
            ("ddt_w_adv_pc", self.ddt_w_adv_pc.current().shape()),
        ]
    }

    /// First field whose shape differs from a freshly allocated one.
    pub fn first_mismatch(&self, grid: &IconGrid) -> Option<&'static str> {
        let reference = Self::new(grid).shapes();
        self.shapes()
            .into_iter()
            .zip(reference)
            .find(|((_, actual), (_, expected))| actual != expected)
            .map(|((name, _), _)| name)
    }

    /// Swap the tendency levels, in step with the prognostic levels.
    pub fn advance(&mut self) {
        self.ddt_vn_apc_pc.advance();
        self.ddt_w_adv_pc.advance();
    }
}

/// Fluxes accumulated over the substeps for tracer transport.
#[derive(Clone, Debug, PartialEq)]
pub struct PrepAdvection {
    /// Substep-averaged normal wind at edges.
    pub vn_traj: Field,
    /// Substep-averaged horizontal mass flux at edges.
    pub mass_flx_me: Field,
    /// Substep-averaged vertical mass flux at half levels.
    pub mass_flx_ic: Field,
}

impl PrepAdvection {
    /// All-zero fluxes shaped for `grid`.
    pub fn new(grid: &IconGrid) -> Self {
        let (nc, ne, nl) = (grid.n_cells(), grid.n_edges(), grid.n_levels());
        Self {
            vn_traj: Field::zeros(ne, nl),
            mass_flx_me: Field::zeros(ne, nl),
            mass_flx_ic: Field::zeros(nc, nl + 1),
        }
    }

    /// Whether every field has the shape `grid` implies.
    pub fn matches(&self, grid: &IconGrid) -> bool {
        let (nc, ne, nl) = (grid.n_cells(), grid.n_edges(), grid.n_levels());
        self.vn_traj.shape() == (ne, nl)
            && self.mass_flx_me.shape() == (ne, nl)
            && self.mass_flx_ic.shape() == (nc, nl + 1)
    }
}
