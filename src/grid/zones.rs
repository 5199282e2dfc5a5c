//! Horizontal zones and index ranges.
//!
//! Local entities are sorted by their distance from the lateral boundary of
//! a limited-area domain, then by halo line. Every zone therefore occupies a
//! contiguous band of local indices:
//!
//! ```text
//! | lateral 1 | lateral 2 | ... | nudging | interior | halo 1 | halo 2 |
//! 0                                         owned_end               n
//! ```
//!
//! Global grids simply have empty lateral boundary and nudging bands.
//! Stencils iterate over `(start of one zone, end of another)` pairs.
//! [`ZoneLayout::range`] is the only place where those pairs are formed.

use std::fmt;
use std::ops::Range;

use super::error::{GridError, GridResult};
use crate::types::EntityKind;

/// A named horizontal zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Zone {
    /// Lateral boundary row `n` (1-based, row 1 is the outermost).
    LateralBoundary(u8),
    /// Nudging row `n` (1-based).
    Nudging(u8),
    /// Prognostic interior of the local domain.
    Interior,
    /// Halo line `n` (1 or 2).
    Halo(u8),
    /// All locally owned entities.
    Local,
    /// Empty zone at the end of the index space.
    End,
}

impl Zone {
    /// Zones that own a band for `kind`, in memory order.
    pub fn ordered(kind: EntityKind) -> Vec<Zone> {
        let mut zones: Vec<Zone> = (1..=kind.lateral_boundary_rows())
            .map(Zone::LateralBoundary)
            .collect();
        zones.extend((1..=kind.nudging_rows()).map(Zone::Nudging));
        zones.push(Zone::Interior);
        zones.push(Zone::Halo(1));
        zones.push(Zone::Halo(2));
        zones
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::LateralBoundary(n) => write!(f, "lateral_boundary_{n}"),
            Zone::Nudging(n) => write!(f, "nudging_{n}"),
            Zone::Interior => f.write_str("interior"),
            Zone::Halo(n) => write!(f, "halo_{n}"),
            Zone::Local => f.write_str("local"),
            Zone::End => f.write_str("end"),
        }
    }
}

/// Half-open range `[start, end)` of local entity indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    /// Create a new range.
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of indices in the range.
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `index` lies in the range.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    /// Iterate over the indices.
    #[inline]
    pub fn iter(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl IntoIterator for IndexRange {
    type Item = usize;
    type IntoIter = Range<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.start..self.end
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Number of entities in each band of one entity kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneCounts {
    /// Entities per lateral boundary row (row 1 first).
    pub lateral_boundary: Vec<usize>,
    /// Entities per nudging row.
    pub nudging: Vec<usize>,
    /// Interior entities.
    pub interior: usize,
    /// Entities in halo lines 1 and 2.
    pub halo: [usize; 2],
}

impl ZoneCounts {
    /// Counts for a global domain: no lateral boundary, no nudging rows.
    pub fn global(kind: EntityKind, owned: usize, halo: [usize; 2]) -> Self {
        Self {
            lateral_boundary: vec![0; kind.lateral_boundary_rows() as usize],
            nudging: vec![0; kind.nudging_rows() as usize],
            interior: owned,
            halo,
        }
    }

    /// Total number of entities.
    pub fn total(&self) -> usize {
        self.lateral_boundary.iter().sum::<usize>()
            + self.nudging.iter().sum::<usize>()
            + self.interior
            + self.halo[0]
            + self.halo[1]
    }
}

/// Start/end bands of every zone for one entity kind.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneLayout {
    kind: EntityKind,
    n_entities: usize,
    owned_end: usize,
    bands: Vec<(Zone, IndexRange)>,
}

impl ZoneLayout {
    /// Build a layout from consecutive band sizes.
    pub fn from_counts(kind: EntityKind, counts: &ZoneCounts) -> GridResult<Self> {
        if counts.lateral_boundary.len() != kind.lateral_boundary_rows() as usize {
            return Err(GridError::invalid_zones(
                kind,
                format!(
                    "expected {} lateral boundary rows, got {}",
                    kind.lateral_boundary_rows(),
                    counts.lateral_boundary.len()
                ),
            ));
        }
        if counts.nudging.len() != kind.nudging_rows() as usize {
            return Err(GridError::invalid_zones(
                kind,
                format!(
                    "expected {} nudging rows, got {}",
                    kind.nudging_rows(),
                    counts.nudging.len()
                ),
            ));
        }

        let sizes = counts
            .lateral_boundary
            .iter()
            .chain(counts.nudging.iter())
            .chain(std::iter::once(&counts.interior))
            .chain(counts.halo.iter());

        let mut bands = Vec::new();
        let mut cursor = 0;
        for (zone, &size) in Zone::ordered(kind).into_iter().zip(sizes) {
            bands.push((zone, IndexRange::new(cursor, cursor + size)));
            cursor += size;
        }
        let owned_end = cursor - counts.halo[0] - counts.halo[1];

        Ok(Self {
            kind,
            n_entities: cursor,
            owned_end,
            bands,
        })
    }

    /// Build a layout from explicit start/end indices in [`Zone::ordered`] order.
    ///
    /// Bands must be non-decreasing and lie within `[0, n_entities]`.
    pub fn from_bounds(
        kind: EntityKind,
        n_entities: usize,
        starts: &[usize],
        ends: &[usize],
    ) -> GridResult<Self> {
        let zones = Zone::ordered(kind);
        if starts.len() != zones.len() || ends.len() != zones.len() {
            return Err(GridError::invalid_zones(
                kind,
                format!(
                    "expected {} start/end pairs, got {}/{}",
                    zones.len(),
                    starts.len(),
                    ends.len()
                ),
            ));
        }

        let mut bands = Vec::with_capacity(zones.len());
        let mut previous_start = 0;
        for ((zone, &start), &end) in zones.into_iter().zip(starts).zip(ends) {
            if start > end || end > n_entities {
                return Err(GridError::invalid_zones(
                    kind,
                    format!("{zone} band [{start}, {end}) outside [0, {n_entities}]"),
                ));
            }
            if start < previous_start {
                return Err(GridError::invalid_zones(
                    kind,
                    format!("{zone} starts at {start}, before the previous band ({previous_start})"),
                ));
            }
            previous_start = start;
            bands.push((zone, IndexRange::new(start, end)));
        }

        let owned_end = bands
            .iter()
            .find(|(z, _)| *z == Zone::Interior)
            .map_or(0, |(_, r)| r.end);

        Ok(Self {
            kind,
            n_entities,
            owned_end,
            bands,
        })
    }

    /// Entity kind of this layout.
    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Total number of local entities, halo included.
    #[inline]
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Band of a single zone.
    pub fn zone(&self, zone: Zone) -> GridResult<IndexRange> {
        match zone {
            Zone::Local => Ok(IndexRange::new(0, self.owned_end)),
            Zone::End => Ok(IndexRange::new(self.n_entities, self.n_entities)),
            _ => self
                .bands
                .iter()
                .find(|(z, _)| *z == zone)
                .map(|(_, r)| *r)
                .ok_or(GridError::UnknownZone {
                    kind: self.kind,
                    zone,
                }),
        }
    }

    /// Range from the start of `from` to the end of `to`.
    pub fn range(&self, from: Zone, to: Zone) -> GridResult<IndexRange> {
        let start = self.zone(from)?.start;
        let end = self.zone(to)?.end;
        if end < start {
            return Err(GridError::InvertedRange {
                kind: self.kind,
                from,
                to,
                start,
                end,
            });
        }
        Ok(IndexRange::new(start, end))
    }

    /// Iterate over all bands in memory order.
    pub fn bands(&self) -> impl Iterator<Item = (Zone, IndexRange)> + '_ {
        self.bands.iter().copied()
    }

    pub(crate) fn check_entity_count(&self, expected: usize) -> GridResult<()> {
        if self.n_entities != expected {
            return Err(GridError::size_mismatch(
                format!("{} zone layout", self.kind),
                expected,
                self.n_entities,
            ));
        }
        Ok(())
    }
}
