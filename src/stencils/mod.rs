//! Single-purpose kernels of the nonhydrostatic solver.
//!
//! Every kernel loops over an [`IndexRange`](crate::grid::IndexRange) of
//! entities and a range of levels, reads its inputs and writes only its
//! outputs. No kernel reads its own output at a neighbor within one call, so
//! the entity loop can be reordered or split freely.
//!
//! Kernels take neighbor tables as arguments; fetching them (and checking
//! their completeness on the ranges used) is the caller's job.
//!
//! # Conventions
//!
//! - `_ic` fields live on half levels, `n_levels + 1` of them, with level
//!   `k` the interface above full level `k`
//! - `_e` fields live on edges, `_v` fields on vertices
//! - `_pr` marks a perturbation from the reference state

pub mod boundary;
pub mod cell_fluxes;
pub mod cell_perturbation;
pub mod edge_averages;
pub mod edge_reconstruction;
pub mod pressure_gradient;
pub mod tracer_fluxes;
pub mod wind_update;
