//! Domain decomposition: which entities a rank owns and which it mirrors.
//!
//! Cells are distributed by a `cell -> rank` map. A rank holds its owned
//! cells plus two halo lines of cells around them:
//!
//! ```text
//! first halo line  = C2E2C(owned) \ owned
//! second halo line = C2E2C(first) \ (owned ∪ first)
//! ```
//!
//! Edges and vertices follow their cells. An edge or vertex on the cutting
//! line between ranks belongs to the highest rank among its adjacent cells,
//! so every entity has exactly one owner.
//!
//! Local indices are ordered owned first, then by halo line, and by global
//! index within each group. That is the order [`ZoneCounts`] describes.

use std::collections::BTreeSet;

use crate::grid::{GridError, GridResult, IndexRange, NeighborTable, ZoneCounts, SKIP_VALUE};
use crate::types::EntityKind;

/// Halo level of a local entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DecompositionFlag {
    Owned = 0,
    FirstHaloLine = 1,
    SecondHaloLine = 2,
}

/// Local entities of one kind.
#[derive(Clone, Debug, Default, PartialEq)]
struct LocalEntities {
    global_index: Vec<usize>,
    halo_level: Vec<DecompositionFlag>,
}

impl LocalEntities {
    /// Sort `(global, level)` pairs into local order.
    fn from_levels(mut entries: Vec<(usize, DecompositionFlag)>) -> Self {
        entries.sort_by_key(|&(global, level)| (level, global));
        let (global_index, halo_level) = entries.into_iter().unzip();
        Self {
            global_index,
            halo_level,
        }
    }

    fn count(&self, level: DecompositionFlag) -> usize {
        self.halo_level.iter().filter(|&&l| l == level).count()
    }
}

/// Local view of the decomposition on one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct DecompositionInfo {
    rank: usize,
    cells: LocalEntities,
    edges: LocalEntities,
    vertices: LocalEntities,
}

impl DecompositionInfo {
    pub fn rank(&self) -> usize {
        self.rank
    }

    fn entities(&self, kind: EntityKind) -> &LocalEntities {
        match kind {
            EntityKind::Cell => &self.cells,
            EntityKind::Edge => &self.edges,
            EntityKind::Vertex => &self.vertices,
        }
    }

    /// Number of local entities, halos included.
    pub fn n_local(&self, kind: EntityKind) -> usize {
        self.entities(kind).global_index.len()
    }

    /// Global index of every local entity.
    pub fn global_index(&self, kind: EntityKind) -> &[usize] {
        &self.entities(kind).global_index
    }

    /// Halo level of every local entity.
    pub fn halo_levels(&self, kind: EntityKind) -> &[DecompositionFlag] {
        &self.entities(kind).halo_level
    }

    /// Whether this rank owns each local entity.
    pub fn owner_mask(&self, kind: EntityKind) -> Vec<bool> {
        self.halo_levels(kind)
            .iter()
            .map(|&level| level == DecompositionFlag::Owned)
            .collect()
    }

    /// Cells of the first halo line, which are integrated prognostically.
    pub fn mask_prog_halo_c(&self) -> Vec<bool> {
        self.halo_levels(EntityKind::Cell)
            .iter()
            .map(|&level| level == DecompositionFlag::FirstHaloLine)
            .collect()
    }

    /// Halo cells lying in the lateral boundary zone of a limited-area
    /// domain, `global_boundary` being that zone in global cell indices.
    ///
    /// Their theta and Exner come from boundary data, not from the
    /// prognostic halo update.
    pub fn bdy_halo_c(&self, global_boundary: IndexRange) -> Vec<bool> {
        self.cells
            .global_index
            .iter()
            .zip(&self.cells.halo_level)
            .map(|(&global, &level)| level != DecompositionFlag::Owned && global_boundary.contains(global))
            .collect()
    }

    /// Band sizes of a global-domain zone layout for this rank.
    pub fn zone_counts(&self, kind: EntityKind) -> ZoneCounts {
        let entities = self.entities(kind);
        ZoneCounts::global(
            kind,
            entities.count(DecompositionFlag::Owned),
            [
                entities.count(DecompositionFlag::FirstHaloLine),
                entities.count(DecompositionFlag::SecondHaloLine),
            ],
        )
    }

    /// Restrict a global table to the local entities of `source`, with
    /// entries renumbered to local `target` indices.
    ///
    /// Neighbors not present on this rank become [`SKIP_VALUE`].
    pub fn local_connectivity(
        &self,
        global: &NeighborTable,
        source: EntityKind,
        target: EntityKind,
    ) -> GridResult<NeighborTable> {
        let targets = self.global_index(target);
        let mut sorted: Vec<(usize, usize)> = targets.iter().enumerate().map(|(local, &g)| (g, local)).collect();
        sorted.sort_unstable();
        let to_local = |g: usize| {
            sorted
                .binary_search_by_key(&g, |&(global, _)| global)
                .map_or(SKIP_VALUE, |i| sorted[i].1 as i32)
        };

        let sources = self.global_index(source);
        let mut data = Vec::with_capacity(sources.len() * global.width());
        for &g in sources {
            if g >= global.n_entities() {
                return Err(GridError::size_mismatch("global neighbor table", g + 1, global.n_entities()));
            }
            data.extend(global.row(g).map(|n| n.map_or(SKIP_VALUE, to_local)));
        }
        NeighborTable::from_flat(sources.len(), global.width(), data)
    }
}

/// Builds the [`DecompositionInfo`] of one rank from global tables.
#[derive(Clone, Copy, Debug)]
pub struct HaloGenerator<'a> {
    rank: usize,
    cell_to_rank: &'a [usize],
    c2e2c: &'a NeighborTable,
    c2e: &'a NeighborTable,
    c2v: &'a NeighborTable,
}

impl<'a> HaloGenerator<'a> {
    pub fn new(
        rank: usize,
        cell_to_rank: &'a [usize],
        c2e2c: &'a NeighborTable,
        c2e: &'a NeighborTable,
        c2v: &'a NeighborTable,
    ) -> GridResult<Self> {
        for (what, table) in [("C2E2C", c2e2c), ("C2E", c2e), ("C2V", c2v)] {
            if table.n_entities() != cell_to_rank.len() {
                return Err(GridError::size_mismatch(what, cell_to_rank.len(), table.n_entities()));
            }
        }
        Ok(Self {
            rank,
            cell_to_rank,
            c2e2c,
            c2e,
            c2v,
        })
    }

    /// Global indices of the cells owned by this rank.
    pub fn owned_cells(&self) -> BTreeSet<usize> {
        (0..self.cell_to_rank.len())
            .filter(|&c| self.cell_to_rank[c] == self.rank)
            .collect()
    }

    /// Cells adjacent to `line` that are neither in `line` nor in `depot`.
    pub fn next_halo_line(&self, line: &BTreeSet<usize>, depot: &BTreeSet<usize>) -> BTreeSet<usize> {
        line.iter()
            .flat_map(|&c| self.c2e2c.row(c).flatten())
            .filter(|n| !line.contains(n) && !depot.contains(n))
            .collect()
    }

    /// Owned cells, both halo lines and the edges and vertices on them.
    pub fn build(&self) -> DecompositionInfo {
        let owned = self.owned_cells();
        let first = self.next_halo_line(&owned, &BTreeSet::new());
        let second = self.next_halo_line(&first, &owned);

        let cells = LocalEntities::from_levels(
            owned
                .iter()
                .map(|&c| (c, DecompositionFlag::Owned))
                .chain(first.iter().map(|&c| (c, DecompositionFlag::FirstHaloLine)))
                .chain(second.iter().map(|&c| (c, DecompositionFlag::SecondHaloLine)))
                .collect(),
        );
        let edges = self.follow_cells(self.c2e, &owned, &first, Some(&second));
        let vertices = self.follow_cells(self.c2v, &owned, &first, None);

        log::debug!(
            "rank {}: {} owned cells, halo lines of {} and {}",
            self.rank,
            owned.len(),
            first.len(),
            second.len()
        );
        DecompositionInfo {
            rank: self.rank,
            cells,
            edges,
            vertices,
        }
    }

    /// Local edges or vertices of the given cell lines, with ownership on the
    /// cutting line decided by the highest adjacent rank.
    fn follow_cells(
        &self,
        table: &NeighborTable,
        owned: &BTreeSet<usize>,
        first: &BTreeSet<usize>,
        second: Option<&BTreeSet<usize>>,
    ) -> LocalEntities {
        let on = |cells: &BTreeSet<usize>| -> BTreeSet<usize> {
            cells.iter().flat_map(|&c| table.row(c).flatten()).collect()
        };
        let on_owned = on(owned);
        let on_first = on(first);
        let on_second = second.map(on).unwrap_or_default();

        // highest rank of any cell touching each entity
        let mut max_rank = vec![0usize; table_targets(table)];
        for (c, &r) in self.cell_to_rank.iter().enumerate() {
            for n in table.row(c).flatten() {
                max_rank[n] = max_rank[n].max(r);
            }
        }

        let mut entries: Vec<(usize, DecompositionFlag)> = on_owned
            .iter()
            .map(|&n| {
                let level = if max_rank[n] > self.rank {
                    DecompositionFlag::FirstHaloLine
                } else {
                    DecompositionFlag::Owned
                };
                (n, level)
            })
            .collect();
        entries.extend(
            on_first
                .difference(&on_owned)
                .map(|&n| (n, DecompositionFlag::FirstHaloLine)),
        );
        entries.extend(
            on_second
                .iter()
                .filter(|n| !on_owned.contains(n) && !on_first.contains(n))
                .map(|&n| (n, DecompositionFlag::SecondHaloLine)),
        );
        LocalEntities::from_levels(entries)
    }
}

/// One past the largest entry of `table`.
fn table_targets(table: &NeighborTable) -> usize {
    (0..table.n_entities())
        .flat_map(|e| table.row(e).flatten())
        .max()
        .map_or(0, |m| m + 1)
}
