//! Horizontal ranges of the solver stages.
//!
//! All zone arithmetic of the predictor and corrector happens here, once,
//! when the solver is built. The stages only see [`IndexRange`]s.
//!
//! ```text
//! cells  | LB 1..4 | nudging | interior | halo 1 | halo 2 |
//!          boundary  <------- solve ------>
//!                 <--- perturbation ---------------->
//! edges  | LB 1..8 | nudging 1..2 | interior | halo 1 | halo 2 |
//!          boundary  <---- interior --->
//!                    <--------- local ------>
//!              <-------------- flux -------------->
//! ```

use crate::config::RhoThetaAdvection;
use crate::grid::{Connectivity, GridResult, IconGrid, IndexRange, Zone};
use crate::types::EntityKind;

/// Precomputed ranges, named after what runs on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageRanges {
    /// Cell lateral-boundary rows updated from the driving model.
    pub cell_lateral_boundary: IndexRange,
    /// Cells whose perturbations and interface values feed edge stencils.
    pub cell_perturbation: IndexRange,
    /// Outer halo line, where the perturbations feed the upwind gradients.
    pub cell_outer_halo: IndexRange,
    /// Cells of the implicit vertical solve.
    pub cell_solve: IndexRange,
    /// Both halo lines, filtered further by the halo masks.
    pub cell_halo: IndexRange,
    /// Edge lateral-boundary rows updated from the driving model.
    pub edge_lateral_boundary: IndexRange,
    /// Boundary edges without a reconstruction.
    pub edge_unreconstructed: IndexRange,
    /// Outer halo line of edges.
    pub edge_outer_halo: IndexRange,
    /// Edges with a rho/theta reconstruction.
    pub edge_reconstruction: IndexRange,
    /// Prognostic edges.
    pub edge_interior: IndexRange,
    /// Edges owned by this rank, from the second nudging row on. Halo edges
    /// are sorted after the owned ones, so this has the extent of
    /// `edge_interior`.
    pub edge_local: IndexRange,
    /// Edges whose fluxes enter the cell divergence.
    pub edge_flux: IndexRange,
    /// Edges of the tracer flux accumulators.
    pub edge_all: IndexRange,
    /// Vertices receiving cell perturbations for the centered reconstruction.
    pub vertex_reconstruction: IndexRange,
}

impl StageRanges {
    /// Resolve every stage range on `grid`.
    pub fn new(grid: &IconGrid) -> GridResult<Self> {
        use Zone::{Halo, Interior, LateralBoundary as Lb, Local, Nudging};

        let cell = |from, to| grid.range(EntityKind::Cell, from, to);
        let edge = |from, to| grid.range(EntityKind::Edge, from, to);

        let ranges = Self {
            cell_lateral_boundary: cell(Lb(1), Lb(4))?,
            cell_perturbation: cell(Lb(3), Halo(1))?,
            cell_outer_halo: grid.zone(EntityKind::Cell, Halo(2))?,
            cell_solve: cell(Nudging(1), Local)?,
            cell_halo: cell(Halo(1), Halo(2))?,
            edge_lateral_boundary: edge(Lb(1), Nudging(1))?,
            edge_unreconstructed: edge(Lb(1), Lb(6))?,
            edge_outer_halo: grid.zone(EntityKind::Edge, Halo(2))?,
            edge_reconstruction: edge(Lb(7), Halo(1))?,
            edge_interior: edge(Nudging(2), Interior)?,
            edge_local: edge(Nudging(2), Local)?,
            edge_flux: edge(Lb(5), Halo(1))?,
            edge_all: edge(Lb(1), Halo(1))?,
            vertex_reconstruction: grid.range(EntityKind::Vertex, Lb(2), Halo(1))?,
        };
        log::debug!(
            "stage ranges: cell_solve {}, edge_interior {}, edge_flux {}",
            ranges.cell_solve,
            ranges.edge_interior,
            ranges.edge_flux
        );
        Ok(ranges)
    }

    /// Check that every neighbor the stages dereference exists.
    pub fn check_connectivity(&self, grid: &IconGrid, iadv_rhotheta: RhoThetaAdvection) -> GridResult<()> {
        grid.require_complete(Connectivity::E2C, self.edge_reconstruction)?;
        grid.require_complete(Connectivity::E2C, self.edge_interior)?;
        grid.require_complete(Connectivity::E2C, self.edge_flux)?;
        if iadv_rhotheta == RhoThetaAdvection::SimplifiedMiura {
            grid.require_complete(Connectivity::E2V, self.edge_reconstruction)?;
        }
        Ok(())
    }
}
