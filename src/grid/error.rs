//! Error types for grid construction and lookup.

use thiserror::Error;

use super::{Connectivity, Zone};
use crate::types::EntityKind;

/// Errors raised while building or querying an [`IconGrid`](super::IconGrid).
///
/// All of these are configuration errors: they surface once, during
/// construction, and are never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// An array does not have the size implied by the entity counts.
    #[error("Size mismatch for {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// A neighbor table row has a different width than the first row.
    #[error("Ragged neighbor table: row {row} has {actual} entries, expected {expected}")]
    RaggedTable {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A neighbor index is neither the sentinel nor a valid target index.
    #[error("{connectivity}: entity {entity} slot {slot} refers to {value}, but only {count} targets exist")]
    NeighborOutOfRange {
        connectivity: Connectivity,
        entity: usize,
        slot: usize,
        value: i32,
        count: usize,
    },

    /// A stencil range contains an entity with a missing neighbor.
    #[error("{connectivity}: entity {entity} has no neighbor in slot {slot} but lies in a range that dereferences it")]
    IncompleteNeighbors {
        connectivity: Connectivity,
        entity: usize,
        slot: usize,
    },

    /// The requested connectivity was never supplied to the builder.
    #[error("Connectivity {0} is not available on this grid")]
    MissingConnectivity(Connectivity),

    /// The zone does not exist for this entity kind.
    #[error("Zone {zone} does not exist for {kind}s")]
    UnknownZone { kind: EntityKind, zone: Zone },

    /// Zone bands are out of bounds or out of order.
    #[error("Invalid zone layout for {kind}s: {reason}")]
    InvalidZoneLayout { kind: EntityKind, reason: String },

    /// A zone pair resolves to a range whose end precedes its start.
    #[error("Zone range {from}..{to} for {kind}s is inverted ({start} > {end})")]
    InvertedRange {
        kind: EntityKind,
        from: Zone,
        to: Zone,
        start: usize,
        end: usize,
    },

    /// Too few vertical levels for the vertical discretization.
    #[error("At least {minimum} full levels are required, got {n_levels}")]
    TooFewLevels { n_levels: usize, minimum: usize },

    /// A vertical index parameter is out of range.
    #[error("Vertical index {name} = {value} exceeds {max}")]
    InvalidVerticalIndex {
        name: &'static str,
        value: usize,
        max: usize,
    },

    /// Geometric coefficients are degenerate (zero length or area).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl GridError {
    /// Create a size mismatch error.
    pub fn size_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Create an invalid zone layout error.
    pub fn invalid_zones(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self::InvalidZoneLayout {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result type for grid operations.
pub type GridResult<T> = Result<T, GridError>;
