//! Neighbor tables between mesh entities.
//!
//! Tables are stored as dense `(n_entities × width)` integer arrays as they
//! come out of mesh preprocessing. Missing neighbors (pentagon points,
//! lateral boundary) carry [`SKIP_VALUE`]. The raw sentinel never leaves this
//! module: every lookup returns `Option<usize>`.

use std::fmt;

use super::error::{GridError, GridResult};
use super::zones::IndexRange;
use crate::types::EntityKind;

/// Sentinel marking an absent neighbor in raw tables.
pub const SKIP_VALUE: i32 = -1;

/// Named neighbor relations ("offsets").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Connectivity {
    /// Cell to its three edges.
    C2E,
    /// Edge to its two adjacent cells.
    E2C,
    /// Edge to its two end vertices.
    E2V,
    /// Cell to its three vertices.
    C2V,
    /// Vertex to its (up to six) edges.
    V2E,
    /// Vertex to its (up to six) cells.
    V2C,
    /// Cell to the cells across its edges.
    C2E2C,
    /// `C2E2C` with the cell itself first.
    C2E2CO,
    /// Edge to the other edges of its two adjacent cells.
    E2C2E,
    /// `E2C2E` with the edge itself first.
    E2C2EO,
    /// Edge to its two vertices followed by the opposite vertex of each adjacent cell.
    E2C2V,
}

impl Connectivity {
    /// All known connectivities.
    pub const ALL: [Connectivity; 11] = [
        Connectivity::C2E,
        Connectivity::E2C,
        Connectivity::E2V,
        Connectivity::C2V,
        Connectivity::V2E,
        Connectivity::V2C,
        Connectivity::C2E2C,
        Connectivity::C2E2CO,
        Connectivity::E2C2E,
        Connectivity::E2C2EO,
        Connectivity::E2C2V,
    ];

    /// Entity kind the table is indexed by.
    pub const fn source(self) -> EntityKind {
        match self {
            Connectivity::C2E | Connectivity::C2V | Connectivity::C2E2C | Connectivity::C2E2CO => {
                EntityKind::Cell
            }
            Connectivity::E2C
            | Connectivity::E2V
            | Connectivity::E2C2E
            | Connectivity::E2C2EO
            | Connectivity::E2C2V => EntityKind::Edge,
            Connectivity::V2E | Connectivity::V2C => EntityKind::Vertex,
        }
    }

    /// Entity kind the table entries refer to.
    pub const fn target(self) -> EntityKind {
        match self {
            Connectivity::C2E | Connectivity::V2E | Connectivity::E2C2E | Connectivity::E2C2EO => {
                EntityKind::Edge
            }
            Connectivity::E2C
            | Connectivity::V2C
            | Connectivity::C2E2C
            | Connectivity::C2E2CO => EntityKind::Cell,
            Connectivity::E2V | Connectivity::C2V | Connectivity::E2C2V => EntityKind::Vertex,
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Connectivity::C2E => "C2E",
            Connectivity::E2C => "E2C",
            Connectivity::E2V => "E2V",
            Connectivity::C2V => "C2V",
            Connectivity::V2E => "V2E",
            Connectivity::V2C => "V2C",
            Connectivity::C2E2C => "C2E2C",
            Connectivity::C2E2CO => "C2E2CO",
            Connectivity::E2C2E => "E2C2E",
            Connectivity::E2C2EO => "E2C2EO",
            Connectivity::E2C2V => "E2C2V",
        };
        f.write_str(name)
    }
}

/// Dense neighbor table with validated entries.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborTable {
    n_entities: usize,
    width: usize,
    data: Vec<i32>,
}

impl NeighborTable {
    /// Build a table from equally sized rows.
    pub fn from_rows<R: AsRef<[i32]>>(rows: &[R]) -> GridResult<Self> {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * width);
        for (row, r) in rows.iter().enumerate() {
            let r = r.as_ref();
            if r.len() != width {
                return Err(GridError::RaggedTable {
                    row,
                    expected: width,
                    actual: r.len(),
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Self {
            n_entities: rows.len(),
            width,
            data,
        })
    }

    /// Build a table from a flat row-major array.
    pub fn from_flat(n_entities: usize, width: usize, data: Vec<i32>) -> GridResult<Self> {
        if data.len() != n_entities * width {
            return Err(GridError::size_mismatch(
                "neighbor table",
                n_entities * width,
                data.len(),
            ));
        }
        Ok(Self {
            n_entities,
            width,
            data,
        })
    }

    /// Number of source entities.
    #[inline]
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Maximum number of neighbors per entity.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Neighbor in `slot` of `entity`, or `None` for an absent neighbor.
    #[inline]
    pub fn get(&self, entity: usize, slot: usize) -> Option<usize> {
        let v = self.data[entity * self.width + slot];
        if v < 0 { None } else { Some(v as usize) }
    }

    /// All neighbor slots of `entity` in table order.
    #[inline]
    pub fn row(&self, entity: usize) -> impl ExactSizeIterator<Item = Option<usize>> + '_ {
        self.data[entity * self.width..(entity + 1) * self.width]
            .iter()
            .map(|&v| if v < 0 { None } else { Some(v as usize) })
    }

    /// Neighbor that a validated stencil range guarantees to exist.
    ///
    /// # Panics
    ///
    /// Panics if the slot holds the sentinel. Ranges that dereference fixed
    /// slots are checked with [`IconGrid::require_complete`](super::IconGrid::require_complete)
    /// at solver construction, so reaching the panic is a programming error.
    #[inline]
    pub fn neighbor(&self, entity: usize, slot: usize) -> usize {
        match self.get(entity, slot) {
            Some(n) => n,
            None => panic!(
                "absent neighbor dereferenced: entity {entity} slot {slot} holds the sentinel"
            ),
        }
    }

    /// Slot of `target` in the row of `entity`, if present.
    pub fn slot_of(&self, entity: usize, target: usize) -> Option<usize> {
        self.row(entity).position(|n| n == Some(target))
    }

    /// Check all entries against the target entity count.
    pub(crate) fn validate(&self, connectivity: Connectivity, target_count: usize) -> GridResult<()> {
        for entity in 0..self.n_entities {
            for slot in 0..self.width {
                let value = self.data[entity * self.width + slot];
                if value == SKIP_VALUE {
                    continue;
                }
                if value < 0 || value as usize >= target_count {
                    return Err(GridError::NeighborOutOfRange {
                        connectivity,
                        entity,
                        slot,
                        value,
                        count: target_count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that every entity in `range` has all `width` neighbors.
    pub(crate) fn check_complete(&self, connectivity: Connectivity, range: IndexRange) -> GridResult<()> {
        for entity in range {
            if let Some(slot) = self.row(entity).position(|n| n.is_none()) {
                return Err(GridError::IncompleteNeighbors {
                    connectivity,
                    entity,
                    slot,
                });
            }
        }
        Ok(())
    }
}
