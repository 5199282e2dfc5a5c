//! Horizontal mesh entity kinds.

use std::fmt;

/// The three horizontal entity kinds of a triangular mesh.
///
/// Every horizontal field lives on exactly one kind; neighbor tables map
/// one kind onto another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Cell,
    Edge,
    Vertex,
}

impl EntityKind {
    /// All kinds in storage order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Cell, EntityKind::Edge, EntityKind::Vertex];

    /// Number of lateral boundary rows carried in the zone layout.
    pub const fn lateral_boundary_rows(self) -> u8 {
        match self {
            EntityKind::Edge => 8,
            EntityKind::Cell | EntityKind::Vertex => 4,
        }
    }

    /// Number of nudging rows carried in the zone layout.
    pub const fn nudging_rows(self) -> u8 {
        match self {
            EntityKind::Edge => 2,
            EntityKind::Cell | EntityKind::Vertex => 1,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Cell => "cell",
            EntityKind::Edge => "edge",
            EntityKind::Vertex => "vertex",
        };
        f.write_str(name)
    }
}
