//! Predictor stage: a first guess of the new state from `now` alone.

use log::debug;

use super::implicit::{solve_vertical, AnalysisIncrements, ExplicitWind, ImplicitInputs, ImplicitScratch};
use super::solve_nonhydro::{SolveNonhydro, SubstepContext};
use super::velocity::VelocityAdvection;
use super::SolverResult;
use crate::config::RhoThetaAdvection;
use crate::grid::Connectivity;
use crate::halo::{CommunicationPhase, FieldId, HaloExchange, HaloField};
use crate::state::{DiagnosticState, PrognosticState};
use crate::stencils::boundary::{dwdz_for_divergence_damping, lateral_boundary_tendencies, snapshot_exner};
use crate::stencils::cell_fluxes::{contravariant_correction_cells, flux_divergence};
use crate::stencils::cell_perturbation::{
    compute_interface_perturbation_top_bottom, compute_perturbations, compute_perturbations_and_interface_values,
    compute_second_exner_derivative, extrapolate_exner_perturbation, init_cell_kdim_zero,
    interpolate_exner_to_half_levels, InterfaceValues,
};
use crate::stencils::edge_averages::{
    average_vn_and_graddiv, contravariant_correction_edges, interpolate_to_half_levels_edges, mass_and_heat_flux,
};
use crate::stencils::edge_reconstruction::{
    cells_to_verts, centered_rho_theta_simplified, green_gauss_gradients, upwind_rho_theta_miura, zero_edge_fields,
};
use crate::stencils::pressure_gradient::{
    apply_hydrostatic_correction, horizontal_gradient_flat, horizontal_gradient_metric, horizontal_gradient_taylor,
    hydrostatic_correction,
};
use crate::stencils::wind_update::{add_vn_increment, advance_vn_lateral_boundary, advance_vn_predictor};

impl SolveNonhydro {
    /// Predictor: `vn`, `w`, `rho`, `exner` and `theta_v` of `new` from
    /// explicit tendencies of `now` and the implicit vertical solve.
    pub(super) fn run_predictor_step(
        &mut self,
        ctx: &SubstepContext,
        diagnostic: &mut DiagnosticState,
        now: &PrognosticState,
        new: &mut PrognosticState,
        velocity: &mut impl VelocityAdvection,
        exchange: &mut impl HaloExchange,
    ) -> SolverResult<()> {
        let dtime = ctx.dtime;
        let itime = self.config.itime_scheme.id();
        debug!("predictor: dtime {dtime}, recompute {}", ctx.recompute);

        if ctx.recompute || itime >= 6 || ctx.first_in_simulation {
            // scheme 4 keeps the w tendency of the previous corrector
            let vn_only = itime < 6 && !ctx.first_in_simulation;
            velocity.run_predictor_step(vn_only, now, diagnostic, &mut self.velocity_fields, dtime)?;
        }

        let Self {
            grid,
            config,
            params,
            vertical,
            metrics,
            interpolation,
            edges: edge_geometry,
            ranges,
            damping,
            z,
            velocity_fields,
            ..
        } = self;
        let limited_area = grid.limited_area();
        let n_levels = grid.n_levels();
        let nflatlev = vertical.nflatlev();
        let nflat_gradp = vertical.nflat_gradp();

        let e2c = grid.connectivity(Connectivity::E2C)?;
        let e2c2e = grid.connectivity(Connectivity::E2C2E)?;
        let e2c2eo = grid.connectivity(Connectivity::E2C2EO)?;
        let c2e = grid.connectivity(Connectivity::C2E)?;
        let c2e2co = grid.connectivity(Connectivity::C2E2CO)?;
        let inv_dual = &edge_geometry.inverse_dual_edge_length;

        // Perturbations and interface values on cells
        if limited_area {
            init_cell_kdim_zero(&mut z.z_rth_pr_1, &mut z.z_rth_pr_2, ranges.cell_lateral_boundary);
        }
        let cells = ranges.cell_perturbation;
        extrapolate_exner_perturbation(metrics, &now.exner, &mut diagnostic.exner_pr, &mut z.z_exner_ex_pr, cells);
        interpolate_exner_to_half_levels(
            metrics,
            &z.z_exner_ex_pr,
            &mut z.z_exner_ic,
            &mut z.z_dexner_dz_c_1,
            cells,
            nflatlev,
        );
        compute_perturbations_and_interface_values(
            metrics,
            &now.rho,
            &now.theta_v,
            &diagnostic.exner_pr,
            InterfaceValues {
                z_rth_pr_1: &mut z.z_rth_pr_1,
                z_rth_pr_2: &mut z.z_rth_pr_2,
                rho_ic: &mut diagnostic.rho_ic,
                z_theta_v_pr_ic: &mut z.z_theta_v_pr_ic,
                theta_v_ic: &mut diagnostic.theta_v_ic,
                z_th_ddz_exner_c: &mut z.z_th_ddz_exner_c,
            },
            cells,
        );
        compute_interface_perturbation_top_bottom(
            metrics,
            &z.z_rth_pr_2,
            &mut z.z_theta_v_pr_ic,
            &mut diagnostic.theta_v_ic,
            cells,
        );
        compute_second_exner_derivative(
            metrics,
            &z.z_theta_v_pr_ic,
            &z.z_rth_pr_2,
            &mut z.z_dexner_dz_c_2,
            cells,
            nflat_gradp,
        );
        compute_perturbations(
            metrics,
            &now.rho,
            &now.theta_v,
            &mut z.z_rth_pr_1,
            &mut z.z_rth_pr_2,
            ranges.cell_outer_halo,
        );

        // Density and theta at edges
        let centered = config.iadv_rhotheta == RhoThetaAdvection::SimplifiedMiura;
        if centered {
            let v2c = grid.connectivity(Connectivity::V2C)?;
            let weights = &interpolation.cells_aw_verts;
            cells_to_verts(v2c, weights, &z.z_rth_pr_1, &mut z.z_rho_v, ranges.vertex_reconstruction);
            cells_to_verts(v2c, weights, &z.z_rth_pr_2, &mut z.z_theta_v_v, ranges.vertex_reconstruction);
        } else {
            green_gauss_gradients(
                c2e2co,
                interpolation,
                &z.z_rth_pr_1,
                &z.z_rth_pr_2,
                &mut z.z_grad_rth,
                ranges.cell_perturbation,
            );
        }
        zero_edge_fields(&mut z.z_rho_e, &mut z.z_theta_v_e, ranges.edge_outer_halo);
        if limited_area {
            zero_edge_fields(&mut z.z_rho_e, &mut z.z_theta_v_e, ranges.edge_unreconstructed);
        }
        if centered {
            let e2v = grid.connectivity(Connectivity::E2V)?;
            centered_rho_theta_simplified(
                e2c,
                e2v,
                edge_geometry,
                metrics,
                &now.vn,
                &diagnostic.vt,
                &z.z_rth_pr_1,
                &z.z_rth_pr_2,
                &z.z_rho_v,
                &z.z_theta_v_v,
                dtime,
                &mut z.z_rho_e,
                &mut z.z_theta_v_e,
                ranges.edge_reconstruction,
            );
        } else {
            upwind_rho_theta_miura(
                e2c,
                interpolation,
                metrics,
                &now.vn,
                &diagnostic.vt,
                &z.z_rth_pr_1,
                &z.z_rth_pr_2,
                &z.z_grad_rth,
                dtime,
                &mut z.z_rho_e,
                &mut z.z_theta_v_e,
                ranges.edge_reconstruction,
            );
        }

        // Horizontal pressure gradient
        let edges = ranges.edge_interior;
        horizontal_gradient_flat(e2c, inv_dual, &z.z_exner_ex_pr, &mut z.z_gradh_exner, edges, 0..nflatlev);
        horizontal_gradient_metric(
            e2c,
            inv_dual,
            &interpolation.c_lin_e,
            metrics,
            &z.z_exner_ex_pr,
            &z.z_dexner_dz_c_1,
            &mut z.z_gradh_exner,
            edges,
            nflatlev..nflat_gradp,
        );
        horizontal_gradient_taylor(
            e2c,
            inv_dual,
            metrics,
            &z.z_exner_ex_pr,
            &z.z_dexner_dz_c_1,
            &z.z_dexner_dz_c_2,
            &mut z.z_gradh_exner,
            edges,
            nflat_gradp..n_levels,
        );
        hydrostatic_correction(
            e2c,
            inv_dual,
            metrics,
            &now.theta_v,
            &diagnostic.theta_v_ic,
            &mut z.z_hydro_corr,
            ranges.edge_local,
        );
        apply_hydrostatic_correction(metrics, &z.z_hydro_corr, &mut z.z_gradh_exner, ranges.edge_local);

        // Normal wind
        advance_vn_predictor(
            &now.vn,
            diagnostic.ddt_vn_apc_pc.current(),
            &diagnostic.ddt_vn_phy,
            &z.z_theta_v_e,
            &z.z_gradh_exner,
            dtime,
            &mut new.vn,
            edges,
        );
        if config.is_iau_active {
            add_vn_increment(&diagnostic.vn_incr, config.iau_wgt_dyn, &mut new.vn, edges);
        }
        if limited_area {
            advance_vn_lateral_boundary(
                &now.vn,
                &diagnostic.grf_tend_vn,
                dtime,
                &mut new.vn,
                ranges.edge_lateral_boundary,
            );
        }

        exchange.exchange(
            CommunicationPhase::PredictorWind,
            &mut [HaloField::new(FieldId::Vn, &mut new.vn)],
        )?;

        // Edge averages and fluxes of the predicted wind
        let edges = ranges.edge_flux;
        average_vn_and_graddiv(
            e2c2eo,
            e2c2e,
            interpolation,
            &new.vn,
            &mut z.z_vn_avg,
            &mut z.z_graddiv_vn,
            &mut diagnostic.vt,
            edges,
        );
        mass_and_heat_flux(
            metrics,
            &z.z_rho_e,
            &z.z_vn_avg,
            &z.z_theta_v_e,
            &mut diagnostic.mass_fl_e,
            &mut z.z_theta_v_fl_e,
            edges,
        );
        contravariant_correction_edges(
            metrics,
            &new.vn,
            &diagnostic.vt,
            &mut velocity_fields.z_w_concorr_me,
            edges,
            nflatlev,
        );
        interpolate_to_half_levels_edges(
            metrics,
            &new.vn,
            &diagnostic.vt,
            &mut diagnostic.vn_ie,
            &mut velocity_fields.z_vt_ie,
            &mut velocity_fields.z_kin_hor_e,
            edges,
        );
        contravariant_correction_cells(
            c2e,
            interpolation,
            metrics,
            &velocity_fields.z_w_concorr_me,
            &mut z.z_w_concorr_mc,
            &mut diagnostic.w_concorr_c,
            ranges.cell_perturbation,
            nflatlev,
        );

        let cells = ranges.cell_solve;
        flux_divergence(
            c2e,
            interpolation,
            &diagnostic.mass_fl_e,
            &z.z_theta_v_fl_e,
            &mut z.z_flxdiv_mass,
            &mut z.z_flxdiv_theta,
            cells,
        );

        // Vertically implicit solve
        let inputs = ImplicitInputs {
            metrics,
            now,
            rho_ic: &diagnostic.rho_ic,
            theta_v_ic: &diagnostic.theta_v_ic,
            w_concorr_c: &diagnostic.w_concorr_c,
            exner_pr: &diagnostic.exner_pr,
            ddt_exner_phy: &diagnostic.ddt_exner_phy,
            z_th_ddz_exner_c: &z.z_th_ddz_exner_c,
            z_flxdiv_mass: &z.z_flxdiv_mass,
            z_flxdiv_theta: &z.z_flxdiv_theta,
            increments: config.is_iau_active.then(|| AnalysisIncrements {
                rho_incr: &diagnostic.rho_incr,
                exner_incr: &diagnostic.exner_incr,
                iau_wgt_dyn: config.iau_wgt_dyn,
            }),
            rayleigh_w: vertical.rayleigh_w(),
            index_of_damping_layer: vertical.index_of_damping_layer(),
            dtime,
        };
        let mut scratch = ImplicitScratch {
            z_w_expl: &mut z.z_w_expl,
            z_contr_w_fl_l: &mut z.z_contr_w_fl_l,
            z_alpha: &mut z.z_alpha,
            z_beta: &mut z.z_beta,
            z_q: &mut z.z_q,
            z_rho_expl: &mut z.z_rho_expl,
            z_exner_expl: &mut z.z_exner_expl,
        };
        let explicit_wind = ExplicitWind::Predictor {
            ddt_w_adv: diagnostic.ddt_w_adv_pc.current(),
        };
        solve_vertical(&inputs, explicit_wind, &mut scratch, new, cells);

        let three_dimensional = damping.is_three_dimensional();
        if three_dimensional {
            dwdz_for_divergence_damping(
                &metrics.inv_ddqz_z_full,
                &new.w,
                &diagnostic.w_concorr_c,
                &mut z.z_dwdz_dd,
                cells,
                vertical.kstart_dd3d(),
            );
        }
        if ctx.at_first_substep {
            snapshot_exner(&now.exner, &mut diagnostic.exner_dyn_incr, cells, vertical.kstart_moist()..n_levels);
        }

        // Lateral boundary from the driving model
        if limited_area {
            let boundary = ranges.cell_lateral_boundary;
            lateral_boundary_tendencies(
                &now.rho,
                &now.theta_v,
                &now.w,
                &diagnostic.grf_tend_rho,
                &diagnostic.grf_tend_thv,
                &diagnostic.grf_tend_w,
                dtime,
                &mut new.rho,
                &mut new.exner,
                &mut new.w,
                boundary,
            );
            if three_dimensional {
                dwdz_for_divergence_damping(
                    &metrics.inv_ddqz_z_full,
                    &new.w,
                    &diagnostic.w_concorr_c,
                    &mut z.z_dwdz_dd,
                    boundary,
                    vertical.kstart_dd3d(),
                );
            }
        }

        let mut fields = vec![
            HaloField::new(FieldId::Rho, &mut new.rho),
            HaloField::new(FieldId::Exner, &mut new.exner),
            HaloField::new(FieldId::W, &mut new.w),
        ];
        if three_dimensional {
            fields.push(HaloField::new(FieldId::DwdzDd, &mut z.z_dwdz_dd));
        }
        exchange.exchange(CommunicationPhase::PredictorFluxAverage, &mut fields)?;

        debug!("predictor done, r_nsubsteps {}", params.r_nsubsteps);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halo::RecordingExchange;
    use crate::solver::PrescribedTendencies;
    use crate::state::TimeLevels;
    use crate::testing::Fixture;

    fn solver(fixture: Fixture) -> SolveNonhydro {
        let Fixture {
            mesh,
            vertical,
            metrics,
            config,
        } = fixture;
        SolveNonhydro::new(
            mesh.grid,
            config,
            vertical,
            metrics,
            mesh.interpolation,
            mesh.edges,
            mesh.cells,
        )
        .unwrap()
    }

    #[test]
    fn test_predictor_exchanges_wind_then_flux_average() {
        let mut solver = solver(Fixture::torus(3));
        let grid = solver.grid().clone();
        let mut diagnostic = DiagnosticState::new(&grid);
        let mut prognostics = TimeLevels::filled(PrognosticState::at_rest(&grid, solver.metrics()));
        let mut exchange = RecordingExchange::new();
        let (now, new) = prognostics.current_and_next_mut();

        solver
            .run_predictor_step(
                &SubstepContext::for_substep(10.0, 0, 2, true),
                &mut diagnostic,
                now,
                new,
                &mut PrescribedTendencies::new(),
                &mut exchange,
            )
            .unwrap();

        assert_eq!(
            exchange.phases(),
            vec![CommunicationPhase::PredictorWind, CommunicationPhase::PredictorFluxAverage]
        );
        // three-dimensional damping is the default
        assert_eq!(exchange.calls()[1].1.last(), Some(&FieldId::DwdzDd));
    }

    #[test]
    fn test_predictor_pushes_wind_along_physics_tendency() {
        let mut solver = solver(Fixture::torus(3));
        let grid = solver.grid().clone();
        let mut diagnostic = DiagnosticState::new(&grid);
        diagnostic.ddt_vn_phy.fill(1.0e-3);
        let mut prognostics = TimeLevels::filled(PrognosticState::at_rest(&grid, solver.metrics()));
        let (now, new) = prognostics.current_and_next_mut();

        solver
            .run_predictor_step(
                &SubstepContext::for_substep(10.0, 0, 1, true),
                &mut diagnostic,
                now,
                new,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap();

        for e in 0..grid.n_edges() {
            for k in 0..grid.n_levels() {
                approx::assert_abs_diff_eq!(new.vn[(e, k)], 1.0e-2, epsilon = 1e-12);
            }
        }
    }

    /// Predicted state of a resting torus with uniform density and Exner
    /// increments, with or without the analysis update.
    fn predict_with_increments(iau_wgt_dyn: Option<f64>) -> PrognosticState {
        let mut fixture = Fixture::torus(4);
        if let Some(wgt) = iau_wgt_dyn {
            fixture.config = fixture.config.with_iau(wgt);
        }
        let mut solver = solver(fixture);
        let grid = solver.grid().clone();
        let mut diagnostic = DiagnosticState::new(&grid);
        diagnostic.rho_incr.fill(1.0e-3);
        diagnostic.exner_incr.fill(2.0e-4);
        let mut prognostics = TimeLevels::filled(PrognosticState::at_rest(&grid, solver.metrics()));
        let (now, new) = prognostics.current_and_next_mut();

        solver
            .run_predictor_step(
                &SubstepContext::for_substep(10.0, 0, 1, true),
                &mut diagnostic,
                now,
                new,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap();
        prognostics.next().clone()
    }

    #[test]
    fn test_analysis_increments_shift_density_and_exner() {
        let reference = predict_with_increments(None);
        let updated = predict_with_increments(Some(0.5));

        // a vertically uniform Exner increment leaves the w system unchanged
        for (a, b) in updated.w.as_slice().iter().zip(reference.w.as_slice()) {
            approx::assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        for (a, b) in updated.rho.as_slice().iter().zip(reference.rho.as_slice()) {
            approx::assert_abs_diff_eq!(a - b, 0.5e-3, epsilon = 1e-12);
        }
        for (a, b) in updated.exner.as_slice().iter().zip(reference.exner.as_slice()) {
            approx::assert_abs_diff_eq!(a - b, 1.0e-4, epsilon = 1e-12);
        }
        assert_eq!(updated.vn, reference.vn);
    }
}
