//! Immutable grid store and its builder.
//!
//! # Example
//!
//! ```
//! use nh_dycore::grid::{Connectivity, GridBuilder, NeighborTable, Zone};
//! use nh_dycore::types::EntityKind;
//!
//! let e2c = NeighborTable::from_rows(&[[0, 1], [0, 1], [0, 1]]).unwrap();
//! let grid = GridBuilder::new(2, 3, 3, 2)
//!     .with_connectivity(Connectivity::E2C, e2c)
//!     .build()
//!     .unwrap();
//!
//! let interior = grid.range(EntityKind::Edge, Zone::Nudging(2), Zone::Interior).unwrap();
//! assert_eq!((interior.start, interior.end), (0, 3));
//! ```

use std::collections::BTreeMap;

use super::connectivity::{Connectivity, NeighborTable};
use super::error::{GridError, GridResult};
use super::zones::{IndexRange, Zone, ZoneCounts, ZoneLayout};
use crate::types::EntityKind;

/// Minimum number of full vertical levels.
pub const MIN_LEVELS: usize = 2;

/// Per-rank horizontal mesh: entity counts, neighbor tables and zones.
///
/// Built once through [`GridBuilder`] and read-only afterwards.
#[derive(Clone, Debug)]
pub struct IconGrid {
    n_cells: usize,
    n_edges: usize,
    n_vertices: usize,
    n_levels: usize,
    limited_area: bool,
    connectivities: BTreeMap<Connectivity, NeighborTable>,
    zones: [ZoneLayout; 3],
}

impl IconGrid {
    /// Number of cells, halo included.
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Number of edges, halo included.
    #[inline]
    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    /// Number of vertices, halo included.
    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    /// Number of full vertical levels.
    #[inline]
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// Number of half levels (`n_levels + 1`).
    #[inline]
    pub fn n_half_levels(&self) -> usize {
        self.n_levels + 1
    }

    /// Number of entities of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Cell => self.n_cells,
            EntityKind::Edge => self.n_edges,
            EntityKind::Vertex => self.n_vertices,
        }
    }

    /// Whether this is a limited-area (nested or regional) domain.
    #[inline]
    pub fn limited_area(&self) -> bool {
        self.limited_area
    }

    /// Zone layout of one entity kind.
    pub fn zones(&self, kind: EntityKind) -> &ZoneLayout {
        &self.zones[kind_slot(kind)]
    }

    /// Band of a single zone.
    pub fn zone(&self, kind: EntityKind, zone: Zone) -> GridResult<IndexRange> {
        self.zones(kind).zone(zone)
    }

    /// Range from the start of `from` to the end of `to`.
    pub fn range(&self, kind: EntityKind, from: Zone, to: Zone) -> GridResult<IndexRange> {
        self.zones(kind).range(from, to)
    }

    /// Neighbor table of an offset.
    pub fn connectivity(&self, connectivity: Connectivity) -> GridResult<&NeighborTable> {
        self.connectivities
            .get(&connectivity)
            .ok_or(GridError::MissingConnectivity(connectivity))
    }

    /// Whether a connectivity was supplied.
    pub fn has_connectivity(&self, connectivity: Connectivity) -> bool {
        self.connectivities.contains_key(&connectivity)
    }

    /// Check that no entity in `range` has an absent neighbor in `connectivity`.
    pub fn require_complete(&self, connectivity: Connectivity, range: IndexRange) -> GridResult<()> {
        self.connectivity(connectivity)?
            .check_complete(connectivity, range)
    }
}

#[inline]
fn kind_slot(kind: EntityKind) -> usize {
    match kind {
        EntityKind::Cell => 0,
        EntityKind::Edge => 1,
        EntityKind::Vertex => 2,
    }
}

/// Builder for [`IconGrid`].
///
/// Zones default to a global layout where every entity is interior.
#[derive(Clone, Debug)]
pub struct GridBuilder {
    n_cells: usize,
    n_edges: usize,
    n_vertices: usize,
    n_levels: usize,
    limited_area: bool,
    connectivities: BTreeMap<Connectivity, NeighborTable>,
    zones: [Option<ZoneLayout>; 3],
}

impl GridBuilder {
    /// Start a grid with the given entity and level counts.
    pub fn new(n_cells: usize, n_edges: usize, n_vertices: usize, n_levels: usize) -> Self {
        Self {
            n_cells,
            n_edges,
            n_vertices,
            n_levels,
            limited_area: false,
            connectivities: BTreeMap::new(),
            zones: [None, None, None],
        }
    }

    /// Add a neighbor table.
    pub fn with_connectivity(mut self, connectivity: Connectivity, table: NeighborTable) -> Self {
        self.connectivities.insert(connectivity, table);
        self
    }

    /// Set the zone layout of one entity kind.
    pub fn with_zones(mut self, kind: EntityKind, layout: ZoneLayout) -> Self {
        self.zones[kind_slot(kind)] = Some(layout);
        self
    }

    /// Mark the domain as limited-area.
    pub fn limited_area(mut self, limited_area: bool) -> Self {
        self.limited_area = limited_area;
        self
    }

    fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Cell => self.n_cells,
            EntityKind::Edge => self.n_edges,
            EntityKind::Vertex => self.n_vertices,
        }
    }

    fn layout_for(&self, kind: EntityKind) -> GridResult<ZoneLayout> {
        let count = self.count(kind);
        match &self.zones[kind_slot(kind)] {
            Some(layout) => {
                if layout.kind() != kind {
                    return Err(GridError::invalid_zones(
                        kind,
                        format!("layout was built for {}s", layout.kind()),
                    ));
                }
                layout.check_entity_count(count)?;
                Ok(layout.clone())
            }
            None => ZoneLayout::from_counts(kind, &ZoneCounts::global(kind, count, [0, 0])),
        }
    }

    /// Validate all inputs and build the grid.
    pub fn build(self) -> GridResult<IconGrid> {
        if self.n_levels < MIN_LEVELS {
            return Err(GridError::TooFewLevels {
                n_levels: self.n_levels,
                minimum: MIN_LEVELS,
            });
        }

        for (&connectivity, table) in &self.connectivities {
            let expected = self.count(connectivity.source());
            if table.n_entities() != expected {
                return Err(GridError::size_mismatch(
                    format!("{connectivity} rows"),
                    expected,
                    table.n_entities(),
                ));
            }
            table.validate(connectivity, self.count(connectivity.target()))?;
        }

        let cells = self.layout_for(EntityKind::Cell)?;
        let edges = self.layout_for(EntityKind::Edge)?;
        let vertices = self.layout_for(EntityKind::Vertex)?;

        log::debug!(
            "Built grid: {} cells, {} edges, {} vertices, {} levels, limited_area={}",
            self.n_cells,
            self.n_edges,
            self.n_vertices,
            self.n_levels,
            self.limited_area
        );

        Ok(IconGrid {
            n_cells: self.n_cells,
            n_edges: self.n_edges,
            n_vertices: self.n_vertices,
            n_levels: self.n_levels,
            limited_area: self.limited_area,
            connectivities: self.connectivities,
            zones: [cells, edges, vertices],
        })
    }
}
