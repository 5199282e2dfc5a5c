//! Grid/connectivity store.
//!
//! - [`NeighborTable`] / [`Connectivity`]: validated neighbor tables, lookups
//!   return `Option<usize>` instead of the raw sentinel
//! - [`Zone`] / [`ZoneLayout`]: named horizontal bands and the
//!   `(start, end)` ranges built from them
//! - [`IconGrid`] / [`GridBuilder`]: the immutable per-rank grid
//! - [`VerticalGrid`]: half-level heights and derived level indices
//! - [`SyntheticMesh`]: torus and dihedron meshes with full geometry

mod connectivity;
mod error;
mod icon_grid;
pub mod synthetic;
mod vertical;
mod zones;

pub use connectivity::{Connectivity, NeighborTable, SKIP_VALUE};
pub use error::{GridError, GridResult};
pub use icon_grid::{GridBuilder, IconGrid, MIN_LEVELS};
pub use synthetic::SyntheticMesh;
pub use vertical::{VerticalGrid, VerticalParams};
pub use zones::{IndexRange, Zone, ZoneCounts, ZoneLayout};
