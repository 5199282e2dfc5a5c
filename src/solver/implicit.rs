//! Vertically implicit solve for `w`, `rho`, `exner` and `theta_v`.
//!
//! Sound waves propagating vertically are treated implicitly. Eliminating
//! `rho` and `exner` from the discrete equations leaves, per column, a
//! tridiagonal system for `w` on the interior half levels:
//!
//! ```text
//! a_k·w(k−1) + b_k·w(k) + c_k·w(k+1) = z_w_expl(k) − γ_k·(ex_expl(k−1) − ex_expl(k))
//!
//! γ_k = dt·cpd·vwind_impl_wgt·theta_v_ic(k) / ddqz_z_half(k)
//! a_k = −γ_k·β(k−1)·α(k−1)
//! b_k = 1 + γ_k·α(k)·(β(k−1) + β(k))
//! c_k = −γ_k·β(k)·α(k+1)
//! ```
//!
//! with `w(0) = 0` at the rigid lid and `w(n) = w_concorr_c(n)` at the
//! surface. The system is solved top-down by forward elimination and
//! bottom-up by back substitution (Thomas algorithm). Columns are
//! independent; with the `parallel` feature the sweeps run column-parallel.

use crate::constants::{CPD, CVD, CVD_O_RD, RD};
use crate::grid::{GridError, GridResult, IndexRange};
use crate::metrics::MetricState;
use crate::state::{Field, PrognosticState};

/// Explicit part of the vertical wind equation.
#[derive(Clone, Copy, Debug)]
pub enum ExplicitWind<'a> {
    /// `w + dt·(ddt_w_adv − cpd·z_th_ddz_exner_c)`
    Predictor { ddt_w_adv: &'a Field },
    /// `w + dt·(wgt_now·ddt_1 + wgt_new·ddt_2 − cpd·z_th_ddz_exner_c)`
    Corrector {
        ddt_w_adv_ntl1: &'a Field,
        ddt_w_adv_ntl2: &'a Field,
        wgt_nnow_vel: f64,
        wgt_nnew_vel: f64,
    },
}

/// Analysis increments added to the explicit density and Exner terms.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisIncrements<'a> {
    pub rho_incr: &'a Field,
    pub exner_incr: &'a Field,
    pub iau_wgt_dyn: f64,
}

/// Read-only inputs of one implicit solve.
#[derive(Clone, Copy)]
pub struct ImplicitInputs<'a> {
    pub metrics: &'a MetricState,
    pub now: &'a PrognosticState,
    pub rho_ic: &'a Field,
    pub theta_v_ic: &'a Field,
    pub w_concorr_c: &'a Field,
    pub exner_pr: &'a Field,
    pub ddt_exner_phy: &'a Field,
    pub z_th_ddz_exner_c: &'a Field,
    pub z_flxdiv_mass: &'a Field,
    pub z_flxdiv_theta: &'a Field,
    pub increments: Option<AnalysisIncrements<'a>>,
    /// Klemp damping rate per half level.
    pub rayleigh_w: &'a [f64],
    /// Lowest damped half level.
    pub index_of_damping_layer: usize,
    pub dtime: f64,
}

/// Scratch fields of the implicit solve.
pub struct ImplicitScratch<'a> {
    pub z_w_expl: &'a mut Field,
    pub z_contr_w_fl_l: &'a mut Field,
    pub z_alpha: &'a mut Field,
    pub z_beta: &'a mut Field,
    pub z_q: &'a mut Field,
    pub z_rho_expl: &'a mut Field,
    pub z_exner_expl: &'a mut Field,
}

/// Run the full implicit solve on `cells`, writing `w`, `rho`, `exner` and
/// `theta_v` of `new`.
pub fn solve_vertical(
    inputs: &ImplicitInputs<'_>,
    explicit_wind: ExplicitWind<'_>,
    scratch: &mut ImplicitScratch<'_>,
    new: &mut PrognosticState,
    cells: IndexRange,
) {
    explicit_vertical_terms(inputs, explicit_wind, scratch.z_w_expl, scratch.z_contr_w_fl_l, cells);
    implicit_coefficients(inputs, scratch.z_alpha, scratch.z_beta, scratch.z_q, cells);
    set_boundary_conditions(inputs.w_concorr_c, &mut new.w, scratch.z_contr_w_fl_l, cells);
    explicit_rho_exner(inputs, scratch, cells);
    if let Some(increments) = inputs.increments {
        add_analysis_increments(&increments, scratch.z_rho_expl, scratch.z_exner_expl, cells);
    }
    let system = ColumnSystem {
        theta_v_ic: inputs.theta_v_ic,
        ddqz_z_half: &inputs.metrics.ddqz_z_half,
        vwind_impl_wgt: &inputs.metrics.vwind_impl_wgt,
        z_alpha: &*scratch.z_alpha,
        z_beta: &*scratch.z_beta,
        z_w_expl: &*scratch.z_w_expl,
        z_exner_expl: &*scratch.z_exner_expl,
        dtime: inputs.dtime,
    };
    solve_tridiagonal_w(&system, &mut new.w, scratch.z_q, cells);
    rayleigh_damping_klemp(inputs.rayleigh_w, inputs.index_of_damping_layer, inputs.dtime, &mut new.w, cells);
    update_rho_exner_theta(inputs, scratch, new, cells);
}

/// Explicit vertical wind and explicit vertical mass flux on interior
/// half levels.
///
/// ```text
/// z_contr_w_fl_l = rho_ic·(−w_concorr_c + vwind_expl_wgt·w)
/// ```
pub fn explicit_vertical_terms(
    inputs: &ImplicitInputs<'_>,
    explicit_wind: ExplicitWind<'_>,
    z_w_expl: &mut Field,
    z_contr_w_fl_l: &mut Field,
    cells: IndexRange,
) {
    let w = &inputs.now.w;
    let n_levels = inputs.now.rho.n_levels();
    let dt = inputs.dtime;
    for c in cells {
        let expl = inputs.metrics.vwind_expl_wgt[c];
        for k in 1..n_levels {
            let advective = match explicit_wind {
                ExplicitWind::Predictor { ddt_w_adv } => ddt_w_adv[(c, k)],
                ExplicitWind::Corrector {
                    ddt_w_adv_ntl1,
                    ddt_w_adv_ntl2,
                    wgt_nnow_vel,
                    wgt_nnew_vel,
                } => wgt_nnow_vel * ddt_w_adv_ntl1[(c, k)] + wgt_nnew_vel * ddt_w_adv_ntl2[(c, k)],
            };
            z_w_expl[(c, k)] = w[(c, k)] + dt * (advective - CPD * inputs.z_th_ddz_exner_c[(c, k)]);
            z_contr_w_fl_l[(c, k)] = inputs.rho_ic[(c, k)] * (-inputs.w_concorr_c[(c, k)] + expl * w[(c, k)]);
        }
    }
}

/// Coefficients `z_alpha` (half levels) and `z_beta` (full levels) of the
/// tridiagonal system.
///
/// ```text
/// z_beta  = dt·rd·exner/(cvd·rho·theta_v)·inv_ddqz_z_full
/// z_alpha = vwind_impl_wgt·theta_v_ic·rho_ic,   z_alpha(n) = 0
/// ```
pub fn implicit_coefficients(
    inputs: &ImplicitInputs<'_>,
    z_alpha: &mut Field,
    z_beta: &mut Field,
    z_q: &mut Field,
    cells: IndexRange,
) {
    let now = inputs.now;
    let n_levels = now.rho.n_levels();
    let dt = inputs.dtime;
    let metrics = inputs.metrics;
    for c in cells {
        let impl_wgt = metrics.vwind_impl_wgt[c];
        for k in 0..n_levels {
            z_beta[(c, k)] = dt * RD * now.exner[(c, k)] / (CVD * now.rho[(c, k)] * now.theta_v[(c, k)])
                * metrics.inv_ddqz_z_full[(c, k)];
            z_alpha[(c, k)] = impl_wgt * inputs.theta_v_ic[(c, k)] * inputs.rho_ic[(c, k)];
        }
        z_alpha[(c, n_levels)] = 0.0;
        z_q[(c, 0)] = 0.0;
    }
}

/// Rigid lid at the top, terrain-following flow at the surface.
pub fn set_boundary_conditions(w_concorr_c: &Field, w: &mut Field, z_contr_w_fl_l: &mut Field, cells: IndexRange) {
    let n_levels = w.n_levels() - 1;
    for c in cells {
        w[(c, 0)] = 0.0;
        z_contr_w_fl_l[(c, 0)] = 0.0;
        w[(c, n_levels)] = w_concorr_c[(c, n_levels)];
        z_contr_w_fl_l[(c, n_levels)] = 0.0;
    }
}

/// Explicit parts of the density and Exner updates.
///
/// ```text
/// z_rho_expl   = rho − dt·inv_ddqz·(div_mass + contr(k) − contr(k+1))
/// z_exner_expl = exner_pr − β·(div_theta + θ_ic(k)·contr(k) − θ_ic(k+1)·contr(k+1)) + dt·ddt_exner_phy
/// ```
fn explicit_rho_exner(inputs: &ImplicitInputs<'_>, scratch: &mut ImplicitScratch<'_>, cells: IndexRange) {
    let n_levels = inputs.now.rho.n_levels();
    let dt = inputs.dtime;
    let contr = &*scratch.z_contr_w_fl_l;
    let theta_ic = inputs.theta_v_ic;
    for c in cells {
        for k in 0..n_levels {
            scratch.z_rho_expl[(c, k)] = inputs.now.rho[(c, k)]
                - dt * inputs.metrics.inv_ddqz_z_full[(c, k)]
                    * (inputs.z_flxdiv_mass[(c, k)] + contr[(c, k)] - contr[(c, k + 1)]);
            scratch.z_exner_expl[(c, k)] = inputs.exner_pr[(c, k)]
                - scratch.z_beta[(c, k)]
                    * (inputs.z_flxdiv_theta[(c, k)] + theta_ic[(c, k)] * contr[(c, k)]
                        - theta_ic[(c, k + 1)] * contr[(c, k + 1)])
                + dt * inputs.ddt_exner_phy[(c, k)];
        }
    }
}

/// Add the weighted analysis increments to the explicit terms.
pub fn add_analysis_increments(
    increments: &AnalysisIncrements<'_>,
    z_rho_expl: &mut Field,
    z_exner_expl: &mut Field,
    cells: IndexRange,
) {
    let n_levels = z_rho_expl.n_levels();
    let wgt = increments.iau_wgt_dyn;
    for c in cells {
        for k in 0..n_levels {
            z_rho_expl[(c, k)] += wgt * increments.rho_incr[(c, k)];
            z_exner_expl[(c, k)] += wgt * increments.exner_incr[(c, k)];
        }
    }
}

/// Fields defining the tridiagonal systems of all columns.
pub struct ColumnSystem<'a> {
    pub theta_v_ic: &'a Field,
    pub ddqz_z_half: &'a Field,
    pub vwind_impl_wgt: &'a [f64],
    pub z_alpha: &'a Field,
    pub z_beta: &'a Field,
    pub z_w_expl: &'a Field,
    pub z_exner_expl: &'a Field,
    pub dtime: f64,
}

impl ColumnSystem<'_> {
    /// Eliminate top-down, then substitute bottom-up, in one column.
    ///
    /// `w` holds the boundary values at `0` and `n_levels` on entry.
    fn sweep(&self, c: usize, w: &mut [f64], z_q: &mut [f64]) {
        let n_levels = z_q.len();
        let alpha = self.z_alpha.column(c);
        let beta = self.z_beta.column(c);
        let theta_ic = self.theta_v_ic.column(c);
        let dz_half = self.ddqz_z_half.column(c);
        let w_expl = self.z_w_expl.column(c);
        let ex_expl = self.z_exner_expl.column(c);
        let gamma_factor = self.dtime * CPD * self.vwind_impl_wgt[c];

        for k in 1..n_levels {
            let gamma = gamma_factor * theta_ic[k] / dz_half[k];
            let a = -gamma * beta[k - 1] * alpha[k - 1];
            let cc = -gamma * beta[k] * alpha[k + 1];
            let b = 1.0 + gamma * alpha[k] * (beta[k - 1] + beta[k]);
            let g = 1.0 / (b + a * z_q[k - 1]);
            z_q[k] = -cc * g;
            w[k] = ((w_expl[k] - gamma * (ex_expl[k - 1] - ex_expl[k])) - a * w[k - 1]) * g;
        }
        for k in (1..n_levels).rev() {
            w[k] += w[k + 1] * z_q[k];
        }
    }
}

/// Solve the tridiagonal systems of all columns in `cells` for `w`.
pub fn solve_tridiagonal_w(system: &ColumnSystem<'_>, w: &mut Field, z_q: &mut Field, cells: IndexRange) {
    let n_half = w.n_levels();
    let n_levels = z_q.n_levels();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        w.columns_mut(cells)
            .par_chunks_mut(n_half)
            .zip(z_q.columns_mut(cells).par_chunks_mut(n_levels))
            .enumerate()
            .for_each(|(i, (w_col, q_col))| system.sweep(cells.start + i, w_col, q_col));
    }

    #[cfg(not(feature = "parallel"))]
    {
        let (w_cols, q_cols) = (w.columns_mut(cells), z_q.columns_mut(cells));
        for (i, (w_col, q_col)) in w_cols.chunks_mut(n_half).zip(q_cols.chunks_mut(n_levels)).enumerate() {
            system.sweep(cells.start + i, w_col, q_col);
        }
    }
}

/// Klemp damping of `w` towards the lid value on half levels
/// `1..=index_of_damping_layer`.
///
/// ```text
/// w = z_raylfac·w + (1 − z_raylfac)·w(0),   z_raylfac = 1/(1 + dt·rayleigh_w)
/// ```
pub fn rayleigh_damping_klemp(
    rayleigh_w: &[f64],
    index_of_damping_layer: usize,
    dtime: f64,
    w: &mut Field,
    cells: IndexRange,
) {
    let last = index_of_damping_layer.min(w.n_levels().saturating_sub(2));
    for c in cells {
        let w_top = w[(c, 0)];
        for k in 1..=last {
            let raylfac = 1.0 / (1.0 + dtime * rayleigh_w[k]);
            w[(c, k)] = raylfac * w[(c, k)] + (1.0 - raylfac) * w_top;
        }
    }
}

/// New density, Exner pressure and theta from the solved `w`.
///
/// ```text
/// rho     = z_rho_expl − vwind_impl_wgt·dt·inv_ddqz·(rho_ic(k)·w(k) − rho_ic(k+1)·w(k+1))
/// exner   = z_exner_expl + exner_ref − β·(α(k)·w(k) − α(k+1)·w(k+1))
/// theta_v = rho_now·theta_now·((exner/exner_now − 1)·cvd/rd + 1)/rho
/// ```
fn update_rho_exner_theta(
    inputs: &ImplicitInputs<'_>,
    scratch: &ImplicitScratch<'_>,
    new: &mut PrognosticState,
    cells: IndexRange,
) {
    let now = inputs.now;
    let metrics = inputs.metrics;
    let n_levels = now.rho.n_levels();
    let dt = inputs.dtime;
    for c in cells {
        let impl_wgt = metrics.vwind_impl_wgt[c];
        for k in 0..n_levels {
            let (w_k, w_kp1) = (new.w[(c, k)], new.w[(c, k + 1)]);
            let rho = scratch.z_rho_expl[(c, k)]
                - impl_wgt * dt * metrics.inv_ddqz_z_full[(c, k)]
                    * (inputs.rho_ic[(c, k)] * w_k - inputs.rho_ic[(c, k + 1)] * w_kp1);
            let exner = scratch.z_exner_expl[(c, k)] + metrics.exner_ref_mc[(c, k)]
                - scratch.z_beta[(c, k)] * (scratch.z_alpha[(c, k)] * w_k - scratch.z_alpha[(c, k + 1)] * w_kp1);
            new.rho[(c, k)] = rho;
            new.exner[(c, k)] = exner;
            new.theta_v[(c, k)] = now.rho[(c, k)]
                * now.theta_v[(c, k)]
                * ((exner / now.exner[(c, k)] - 1.0) * CVD_O_RD + 1.0)
                / rho;
        }
    }
}

/// A tridiagonal system `a_k·x(k−1) + b_k·x(k) + c_k·x(k+1) = d_k`.
///
/// Solved with the same elimination order as the column solve: `q` holds
/// the negated normalized super-diagonal, back substitution runs
/// bottom-up. `a[0]` and `c[n−1]` are ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnTridiagonal {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub c: Vec<f64>,
    pub d: Vec<f64>,
}

impl ColumnTridiagonal {
    /// Build a system, checking that all diagonals have the same length.
    pub fn new(a: Vec<f64>, b: Vec<f64>, c: Vec<f64>, d: Vec<f64>) -> GridResult<Self> {
        let n = b.len();
        for (what, len) in [("sub-diagonal", a.len()), ("super-diagonal", c.len()), ("right-hand side", d.len())] {
            if len != n {
                return Err(GridError::size_mismatch(what, n, len));
            }
        }
        Ok(Self { a, b, c, d })
    }

    /// Number of unknowns.
    pub fn len(&self) -> usize {
        self.b.len()
    }

    /// Whether the system has no unknowns.
    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Solve by forward elimination and back substitution.
    ///
    /// A zero pivot yields non-finite values; no pivoting is attempted.
    pub fn solve(&self) -> Vec<f64> {
        let n = self.len();
        let mut x = vec![0.0; n];
        let mut q = vec![0.0; n];
        for k in 0..n {
            let (a, x_prev, q_prev) = if k == 0 { (0.0, 0.0, 0.0) } else { (self.a[k], x[k - 1], q[k - 1]) };
            let g = 1.0 / (self.b[k] + a * q_prev);
            q[k] = -self.c[k] * g;
            x[k] = (self.d[k] - a * x_prev) * g;
        }
        for k in (0..n.saturating_sub(1)).rev() {
            x[k] += x[k + 1] * q[k];
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diagonal_system() {
        let sys = ColumnTridiagonal::new(vec![0.0; 3], vec![2.0, 4.0, 8.0], vec![0.0; 3], vec![2.0, 2.0, 2.0]).unwrap();
        assert_eq!(sys.solve(), vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_residual_of_coupled_system() {
        let sys = ColumnTridiagonal::new(
            vec![0.0, -1.0, -1.0, -1.0],
            vec![4.0, 4.0, 4.0, 4.0],
            vec![-1.0, -1.0, -1.0, 0.0],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let x = sys.solve();
        for k in 0..4 {
            let left = if k > 0 { sys.a[k] * x[k - 1] } else { 0.0 };
            let right = if k < 3 { sys.c[k] * x[k + 1] } else { 0.0 };
            assert_relative_eq!(left + sys.b[k] * x[k] + right, sys.d[k], epsilon = 1e-14);
        }
    }

    #[test]
    fn test_length_mismatch() {
        let err = ColumnTridiagonal::new(vec![0.0; 2], vec![1.0; 3], vec![0.0; 3], vec![1.0; 3]);
        assert!(matches!(err, Err(GridError::SizeMismatch { .. })));
    }

    #[test]
    fn test_klemp_damping_relaxes_towards_lid() {
        let mut w = Field::filled(1, 5, 1.0);
        w[(0, 0)] = 0.0;
        let rayleigh_w = [0.0, 0.1, 0.05, 0.0, 0.0];
        rayleigh_damping_klemp(&rayleigh_w, 2, 10.0, &mut w, IndexRange::new(0, 1));
        assert_relative_eq!(w[(0, 1)], 0.5);
        assert_relative_eq!(w[(0, 2)], 1.0 / 1.5);
        assert_eq!(w[(0, 3)], 1.0);
        assert_eq!(w[(0, 4)], 1.0);
    }

    #[test]
    fn test_damping_never_touches_surface() {
        let mut w = Field::filled(1, 3, 1.0);
        w[(0, 0)] = 0.0;
        rayleigh_damping_klemp(&[1.0; 3], 10, 1.0, &mut w, IndexRange::new(0, 1));
        assert_eq!(w[(0, 1)], 0.5);
        assert_eq!(w[(0, 2)], 1.0);
    }
}
