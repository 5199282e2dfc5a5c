//! Per-entity geometric coefficients and interpolation weights.
//!
//! Geometry arrives precomputed from mesh preprocessing (or from the
//! synthetic generators in [`grid::synthetic`](crate::grid::synthetic)).
//! Everything here is read-only once the solver is constructed.
//!
//! All vectors live in one planar frame. Edge normals point from the first
//! to the second cell of `E2C`; the dual normal is the primal normal rotated
//! by +90°.

mod interpolation;

pub use interpolation::InterpolationState;

use crate::grid::{GridError, GridResult, IconGrid};

/// Geometric coefficients of the edges.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeGeometry {
    /// Length of the primal (triangle) edge [m].
    pub primal_edge_length: Vec<f64>,
    /// `1 / primal_edge_length`
    pub inverse_primal_edge_length: Vec<f64>,
    /// Distance between the two adjacent cell centers [m].
    pub dual_edge_length: Vec<f64>,
    /// `1 / dual_edge_length`
    pub inverse_dual_edge_length: Vec<f64>,
    /// +1 when the dual normal points from `E2V[0]` to `E2V[1]`, else -1.
    pub tangent_orientation: Vec<f64>,
    /// Unit normal, from `E2C[0]` towards `E2C[1]`.
    pub primal_normal: Vec<[f64; 2]>,
    /// Unit tangent, the primal normal rotated by +90°.
    pub dual_normal: Vec<[f64; 2]>,
    /// Area of the quadrilateral spanned by the edge and its two cells [m²].
    pub edge_area: Vec<f64>,
    /// Vectors from the edge midpoint to the centers of its two cells.
    pub cell_offset: Vec<[[f64; 2]; 2]>,
}

impl EdgeGeometry {
    /// Assemble edge geometry and derive the inverse lengths.
    pub fn new(
        primal_edge_length: Vec<f64>,
        dual_edge_length: Vec<f64>,
        tangent_orientation: Vec<f64>,
        primal_normal: Vec<[f64; 2]>,
        cell_offset: Vec<[[f64; 2]; 2]>,
    ) -> GridResult<Self> {
        let n = primal_edge_length.len();
        for (what, len) in [
            ("dual_edge_length", dual_edge_length.len()),
            ("tangent_orientation", tangent_orientation.len()),
            ("primal_normal", primal_normal.len()),
            ("cell_offset", cell_offset.len()),
        ] {
            if len != n {
                return Err(GridError::size_mismatch(what, n, len));
            }
        }
        if let Some(e) = primal_edge_length
            .iter()
            .zip(&dual_edge_length)
            .position(|(&p, &d)| !(p > 0.0 && d > 0.0))
        {
            return Err(GridError::InvalidGeometry(format!(
                "edge {e} has a non-positive primal or dual length"
            )));
        }

        let inverse_primal_edge_length = primal_edge_length.iter().map(|l| 1.0 / l).collect();
        let inverse_dual_edge_length = dual_edge_length.iter().map(|l| 1.0 / l).collect();
        let dual_normal = primal_normal.iter().map(|&[nx, ny]| [-ny, nx]).collect();
        let edge_area = primal_edge_length
            .iter()
            .zip(&dual_edge_length)
            .map(|(p, d)| 0.5 * p * d)
            .collect();

        Ok(Self {
            primal_edge_length,
            inverse_primal_edge_length,
            dual_edge_length,
            inverse_dual_edge_length,
            tangent_orientation,
            primal_normal,
            dual_normal,
            edge_area,
            cell_offset,
        })
    }

    /// Number of edges.
    #[inline]
    pub fn len(&self) -> usize {
        self.primal_edge_length.len()
    }

    /// Whether there are no edges.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primal_edge_length.is_empty()
    }

    /// Check the edge count against the grid.
    pub fn validate_shapes(&self, grid: &IconGrid) -> GridResult<()> {
        if self.len() != grid.n_edges() {
            return Err(GridError::size_mismatch("edge geometry", grid.n_edges(), self.len()));
        }
        Ok(())
    }
}

/// Geometric coefficients of the cells.
#[derive(Clone, Debug, PartialEq)]
pub struct CellGeometry {
    /// Cell area [m²].
    pub area: Vec<f64>,
    /// Mean cell area of the global domain [m²].
    ///
    /// Stands in for `Δx²` in the divergence-damping coefficients.
    pub mean_cell_area: f64,
}

impl CellGeometry {
    /// Cell geometry with the mean taken over the given areas.
    pub fn new(area: Vec<f64>) -> GridResult<Self> {
        if let Some(c) = area.iter().position(|&a| !(a > 0.0)) {
            return Err(GridError::InvalidGeometry(format!("cell {c} has a non-positive area")));
        }
        let mean_cell_area = if area.is_empty() {
            0.0
        } else {
            area.iter().sum::<f64>() / area.len() as f64
        };
        Ok(Self {
            area,
            mean_cell_area,
        })
    }

    /// Check the cell count against the grid.
    pub fn validate_shapes(&self, grid: &IconGrid) -> GridResult<()> {
        if self.area.len() != grid.n_cells() {
            return Err(GridError::size_mismatch("cell geometry", grid.n_cells(), self.area.len()));
        }
        Ok(())
    }
}
