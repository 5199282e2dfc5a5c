//! Corrector stage: the final new state from time-weighted tendencies of
//! `now` and the predicted state.

use log::debug;

use super::divergence_damping::{DampingOperands, DampingRanges};
use super::implicit::{solve_vertical, AnalysisIncrements, ExplicitWind, ImplicitInputs, ImplicitScratch};
use super::solve_nonhydro::{SolveNonhydro, SubstepContext};
use super::velocity::VelocityAdvection;
use super::SolverResult;
use crate::grid::Connectivity;
use crate::halo::{CommunicationPhase, FieldId, HaloExchange, HaloField};
use crate::state::{DiagnosticState, PrepAdvection, PrognosticState};
use crate::stencils::boundary::finalize_exner_dyn_incr;
use crate::stencils::cell_fluxes::flux_divergence;
use crate::stencils::cell_perturbation::{compute_interface_values_corrector, InterfaceWeights};
use crate::stencils::edge_averages::{average_vn, mass_and_heat_flux};
use crate::stencils::tracer_fluxes::{
    accumulate_edge_fluxes, accumulate_vertical_flux, accumulate_vertical_flux_boundary, zero_edge_flux_accumulators,
    zero_vertical_flux_accumulator,
};
use crate::stencils::wind_update::{add_vn_increment, advance_vn_corrector, TendencyWeights};

impl SolveNonhydro {
    /// Corrector: recompute `new` from `now` with the tendencies of the
    /// predicted state, damp divergence and accumulate the tracer fluxes.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn run_corrector_step(
        &mut self,
        ctx: &SubstepContext,
        diagnostic: &mut DiagnosticState,
        now: &PrognosticState,
        new: &mut PrognosticState,
        prep_adv: &mut PrepAdvection,
        velocity: &mut impl VelocityAdvection,
        exchange: &mut impl HaloExchange,
    ) -> SolverResult<()> {
        let dtime = ctx.dtime;
        debug!("corrector: dtime {dtime}, clean_mflx {}", ctx.clean_mflx);

        velocity.run_corrector_step(&*new, diagnostic, &mut self.velocity_fields, dtime)?;

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
            ..
        } = self;
        let limited_area = grid.limited_area();
        let n_levels = grid.n_levels();

        let e2c = grid.connectivity(Connectivity::E2C)?;
        let e2c2eo = grid.connectivity(Connectivity::E2C2EO)?;
        let c2e = grid.connectivity(Connectivity::C2E)?;

        // Interface values of the time-averaged state
        compute_interface_values_corrector(
            metrics,
            &new.w,
            &diagnostic.w_concorr_c,
            &now.rho,
            &new.rho,
            &now.theta_v,
            &new.theta_v,
            &diagnostic.exner_pr,
            InterfaceWeights {
                dtime,
                wgt_nnow_rth: params.wgt_nnow_rth,
                wgt_nnew_rth: params.wgt_nnew_rth,
            },
            &mut diagnostic.rho_ic,
            &mut z.z_theta_v_pr_ic,
            &mut diagnostic.theta_v_ic,
            &mut z.z_th_ddz_exner_c,
            ranges.cell_solve,
        );

        // Normal wind
        let edges = ranges.edge_interior;
        advance_vn_corrector(
            &now.vn,
            diagnostic.ddt_vn_apc_pc.current(),
            diagnostic.ddt_vn_apc_pc.next(),
            TendencyWeights {
                now: params.wgt_nnow_vel,
                new: params.wgt_nnew_vel,
            },
            &diagnostic.ddt_vn_phy,
            &z.z_theta_v_e,
            &z.z_gradh_exner,
            dtime,
            &mut new.vn,
            edges,
        );
        damping.apply(
            &DampingOperands {
                e2c,
                e2c2eo,
                interpolation,
                inv_dual_edge_length: &edge_geometry.inverse_dual_edge_length,
                metrics,
                z_dwdz_dd: &z.z_dwdz_dd,
            },
            &mut z.z_graddiv_vn,
            &mut z.z_graddiv2_vn,
            &mut new.vn,
            &DampingRanges {
                graddiv: ranges.edge_flux,
                interior: ranges.edge_interior,
                local: ranges.edge_local,
            },
        );
        if config.is_iau_active {
            add_vn_increment(&diagnostic.vn_incr, config.iau_wgt_dyn, &mut new.vn, edges);
        }

        exchange.exchange(
            CommunicationPhase::CorrectorWind,
            &mut [HaloField::new(FieldId::Vn, &mut new.vn)],
        )?;

        // Fluxes of the corrected wind
        let edges = ranges.edge_flux;
        average_vn(e2c2eo, &interpolation.e_flx_avg, &new.vn, &mut z.z_vn_avg, edges);
        mass_and_heat_flux(
            metrics,
            &z.z_rho_e,
            &z.z_vn_avg,
            &z.z_theta_v_e,
            &mut diagnostic.mass_fl_e,
            &mut z.z_theta_v_fl_e,
            edges,
        );
        if ctx.clean_mflx {
            zero_edge_flux_accumulators(&mut prep_adv.vn_traj, &mut prep_adv.mass_flx_me, ranges.edge_all);
        }
        accumulate_edge_fluxes(
            &z.z_vn_avg,
            &diagnostic.mass_fl_e,
            params.r_nsubsteps,
            &mut prep_adv.vn_traj,
            &mut prep_adv.mass_flx_me,
            edges,
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
        let explicit_wind = ExplicitWind::Corrector {
            ddt_w_adv_ntl1: diagnostic.ddt_w_adv_pc.current(),
            ddt_w_adv_ntl2: diagnostic.ddt_w_adv_pc.next(),
            wgt_nnow_vel: params.wgt_nnow_vel,
            wgt_nnew_vel: params.wgt_nnew_vel,
        };
        solve_vertical(&inputs, explicit_wind, &mut scratch, new, cells);

        // Vertical mass flux for tracer transport
        if ctx.clean_mflx {
            zero_vertical_flux_accumulator(&mut prep_adv.mass_flx_ic, cells);
        }
        accumulate_vertical_flux(
            &z.z_contr_w_fl_l,
            &diagnostic.rho_ic,
            &metrics.vwind_impl_wgt,
            &new.w,
            params.r_nsubsteps,
            &mut prep_adv.mass_flx_ic,
            cells,
        );
        if limited_area {
            let boundary = ranges.cell_lateral_boundary;
            if ctx.clean_mflx {
                zero_vertical_flux_accumulator(&mut prep_adv.mass_flx_ic, boundary);
            }
            accumulate_vertical_flux_boundary(
                &diagnostic.rho_ic,
                &metrics.vwind_expl_wgt,
                &metrics.vwind_impl_wgt,
                &now.w,
                &new.w,
                &diagnostic.w_concorr_c,
                params.r_nsubsteps,
                &mut prep_adv.mass_flx_ic,
                boundary,
            );
        }

        if ctx.at_last_substep {
            finalize_exner_dyn_incr(
                &new.exner,
                &diagnostic.ddt_exner_phy,
                config.ndyn_substeps as f64 * dtime,
                &mut diagnostic.exner_dyn_incr,
                cells,
                vertical.kstart_moist()..n_levels,
            );
        }

        debug!("corrector done");
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
    use approx::assert_abs_diff_eq;

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
    fn test_tracer_fluxes_accumulate_over_substeps() {
        let mut fixture = Fixture::torus(2);
        fixture.config = fixture.config.with_lhdiff_rcf(false);
        let mut solver = solver(fixture);
        let grid = solver.grid().clone();
        let mut diagnostic = DiagnosticState::new(&grid);
        let mut prognostics = TimeLevels::filled(PrognosticState::at_rest(&grid, solver.metrics()));
        prognostics.next_mut().vn.fill(3.0);
        let mut prep_adv = PrepAdvection::new(&grid);
        prep_adv.vn_traj.fill(100.0);
        let (now, new) = prognostics.current_and_next_mut();
        let mut exchange = RecordingExchange::new();
        let mut ctx = SubstepContext::for_substep(1.0, 0, 2, true);
        solver
            .run_corrector_step(
                &ctx,
                &mut diagnostic,
                now,
                new,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut exchange,
            )
            .unwrap();
        // vn(new) is recomputed from vn(now) = 0 without tendencies
        assert!(new.vn.max_abs() < 1e-12);
        // the stale value is cleaned before accumulating
        assert!(prep_adv.vn_traj.max_abs() < 1e-12);

        new.vn.fill(0.0);
        prep_adv.vn_traj.fill(2.0);
        ctx.clean_mflx = false;
        solver
            .run_corrector_step(
                &ctx,
                &mut diagnostic,
                now,
                new,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut exchange,
            )
            .unwrap();
        assert_abs_diff_eq!(prep_adv.vn_traj[(0, 0)], 2.0, epsilon = 1e-12);
        assert_eq!(exchange.phases(), vec![CommunicationPhase::CorrectorWind; 2]);
    }

    #[test]
    fn test_corrector_applies_physics_tendency() {
        let mut fixture = Fixture::torus(2);
        fixture.config = fixture.config.with_lhdiff_rcf(false);
        let mut solver = solver(fixture);
        let grid = solver.grid().clone();
        let mut diagnostic = DiagnosticState::new(&grid);
        diagnostic.ddt_vn_phy.fill(0.5);
        let mut prognostics = TimeLevels::filled(PrognosticState::at_rest(&grid, solver.metrics()));
        let mut prep_adv = PrepAdvection::new(&grid);
        let (now, new) = prognostics.current_and_next_mut();

        solver
            .run_corrector_step(
                &SubstepContext::for_substep(2.0, 1, 2, false),
                &mut diagnostic,
                now,
                new,
                &mut prep_adv,
                &mut PrescribedTendencies::new(),
                &mut RecordingExchange::new(),
            )
            .unwrap();

        for e in 0..grid.n_edges() {
            assert_abs_diff_eq!(new.vn[(e, 0)], 1.0, epsilon = 1e-12);
        }
        // not the first substep: accumulated onto the zero-initialized fluxes
        let r_nsubsteps = solver.params().r_nsubsteps;
        let z_vn_avg = &solver.intermediate().z_vn_avg;
        for e in 0..grid.n_edges() {
            assert_abs_diff_eq!(prep_adv.vn_traj[(e, 1)], r_nsubsteps * z_vn_avg[(e, 1)], epsilon = 1e-12);
        }
    }
}
