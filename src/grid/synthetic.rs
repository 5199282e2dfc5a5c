//! Synthetic meshes for tests, benchmarks and idealized runs.
//!
//! # Periodic torus
//!
//! An `n × n` rhombic lattice with `a1 = (L, 0)` and `a2 = (−L/2, L√3/2)`,
//! split into equilateral triangles and wrapped periodically:
//!
//! ```text
//!   v01 ─────── v11
//!     \  T_b  /  \
//!      \     / T_a\
//!       \   /      \
//!        v00 ─────── v10
//! ```
//!
//! Vertex `(i, j)` owns three edges (`h` along `a1`, `u` along `a2`, `d`
//! along `a1 + a2`) and two cells (`T_a`, `T_b`). Counts are `n²` vertices,
//! `3n²` edges and `2n²` cells.
//!
//! # Dihedron
//!
//! Two cells glued along all three edges: the smallest closed surface with
//! complete connectivity. Geometry is unit-sized.

use super::connectivity::{Connectivity, NeighborTable, SKIP_VALUE};
use super::error::{GridError, GridResult};
use super::icon_grid::{GridBuilder, IconGrid};
use super::zones::{ZoneCounts, ZoneLayout};
use crate::geometry::{CellGeometry, EdgeGeometry, InterpolationState};
use crate::types::EntityKind;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// A complete grid with geometry and interpolation coefficients.
#[derive(Clone, Debug)]
pub struct SyntheticMesh {
    pub grid: IconGrid,
    pub edges: EdgeGeometry,
    pub cells: CellGeometry,
    pub interpolation: InterpolationState,
    tables: BaseTables,
}

/// Primary connectivity from which all others are derived.
#[derive(Clone, Debug)]
struct BaseTables {
    n_cells: usize,
    n_edges: usize,
    n_vertices: usize,
    n_levels: usize,
    c2e: Vec<[usize; 3]>,
    c2v: Vec<[usize; 3]>,
    e2c: Vec<[usize; 2]>,
    e2v: Vec<[usize; 2]>,
}

impl SyntheticMesh {
    /// Periodic equilateral triangulation with `n × n` lattice points.
    pub fn torus(n: usize, edge_length: f64, n_levels: usize) -> GridResult<Self> {
        if n < 2 {
            return Err(GridError::InvalidGeometry(format!(
                "torus needs at least 2 lattice points per direction, got {n}"
            )));
        }
        if !(edge_length > 0.0) {
            return Err(GridError::InvalidGeometry(format!("edge length {edge_length}")));
        }

        let wrap = |i: isize| i.rem_euclid(n as isize) as usize;
        let vertex = |i: isize, j: isize| wrap(j) * n + wrap(i);
        let h = |i: isize, j: isize| 3 * vertex(i, j);
        let u = |i: isize, j: isize| 3 * vertex(i, j) + 1;
        let d = |i: isize, j: isize| 3 * vertex(i, j) + 2;
        let t_a = |i: isize, j: isize| 2 * vertex(i, j);
        let t_b = |i: isize, j: isize| 2 * vertex(i, j) + 1;

        let n_vertices = n * n;
        let mut c2e = vec![[0; 3]; 2 * n_vertices];
        let mut c2v = vec![[0; 3]; 2 * n_vertices];
        let mut e2c = vec![[0; 2]; 3 * n_vertices];
        let mut e2v = vec![[0; 2]; 3 * n_vertices];
        let mut tangent_orientation = vec![0.0; 3 * n_vertices];
        let mut primal_normal = vec![[0.0; 2]; 3 * n_vertices];

        let half = 0.5 * SQRT_3;
        for j in 0..n as isize {
            for i in 0..n as isize {
                c2e[t_a(i, j)] = [h(i, j), u(i + 1, j), d(i, j)];
                c2e[t_b(i, j)] = [d(i, j), h(i, j + 1), u(i, j)];
                c2v[t_a(i, j)] = [vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1)];
                c2v[t_b(i, j)] = [vertex(i, j), vertex(i + 1, j + 1), vertex(i, j + 1)];

                e2c[h(i, j)] = [t_b(i, j - 1), t_a(i, j)];
                e2c[u(i, j)] = [t_a(i - 1, j), t_b(i, j)];
                e2c[d(i, j)] = [t_a(i, j), t_b(i, j)];

                e2v[h(i, j)] = [vertex(i, j), vertex(i + 1, j)];
                e2v[u(i, j)] = [vertex(i, j), vertex(i, j + 1)];
                e2v[d(i, j)] = [vertex(i, j), vertex(i + 1, j + 1)];

                primal_normal[h(i, j)] = [0.0, 1.0];
                primal_normal[u(i, j)] = [half, 0.5];
                primal_normal[d(i, j)] = [-half, 0.5];

                // Sign of (dual normal) · (v1 − v0).
                tangent_orientation[h(i, j)] = -1.0;
                tangent_orientation[u(i, j)] = 1.0;
                tangent_orientation[d(i, j)] = -1.0;
            }
        }

        let dual_length = edge_length / SQRT_3;
        let n_edges = 3 * n_vertices;
        let cell_offset = primal_normal
            .iter()
            .map(|&[nx, ny]| {
                let r = 0.5 * dual_length;
                [[-r * nx, -r * ny], [r * nx, r * ny]]
            })
            .collect();
        let edges = EdgeGeometry::new(
            vec![edge_length; n_edges],
            vec![dual_length; n_edges],
            tangent_orientation,
            primal_normal,
            cell_offset,
        )?;
        let cells = CellGeometry::new(vec![0.25 * SQRT_3 * edge_length * edge_length; 2 * n_vertices])?;

        let tables = BaseTables {
            n_cells: 2 * n_vertices,
            n_edges,
            n_vertices,
            n_levels,
            c2e,
            c2v,
            e2c,
            e2v,
        };
        Self::assemble(tables, edges, cells, false, None)
    }

    /// Two cells sharing all three edges, with unit geometry.
    pub fn dihedron(n_levels: usize) -> GridResult<Self> {
        let half = 0.5 * SQRT_3;
        // Outward normals of an upward-pointing triangle with vertices v0, v1, v2.
        let primal_normal = vec![[0.0, -1.0], [half, 0.5], [-half, 0.5]];
        let cell_offset = primal_normal
            .iter()
            .map(|&[nx, ny]: &[f64; 2]| [[-0.5 * nx, -0.5 * ny], [0.5 * nx, 0.5 * ny]])
            .collect();
        let edges = EdgeGeometry::new(vec![1.0; 3], vec![1.0; 3], vec![1.0; 3], primal_normal, cell_offset)?;
        let cells = CellGeometry::new(vec![1.0; 2])?;

        let tables = BaseTables {
            n_cells: 2,
            n_edges: 3,
            n_vertices: 3,
            n_levels,
            c2e: vec![[0, 1, 2], [0, 1, 2]],
            c2v: vec![[0, 1, 2], [0, 1, 2]],
            e2c: vec![[0, 1]; 3],
            e2v: vec![[0, 1], [1, 2], [2, 0]],
        };
        Self::assemble(tables, edges, cells, false, None)
    }

    /// Turn the mesh into a limited-area domain.
    ///
    /// Consecutive bands of `band_width` entities at the start of the index
    /// space become the lateral boundary rows and the nudging rows of each
    /// entity kind. Connectivity is unchanged, so every stencil stays
    /// complete; the bands only steer which equations apply where.
    pub fn with_lateral_boundary(self, band_width: usize, nudge_max_coeff: f64) -> GridResult<Self> {
        let counts = [
            (EntityKind::Cell, self.tables.n_cells),
            (EntityKind::Edge, self.tables.n_edges),
            (EntityKind::Vertex, self.tables.n_vertices),
        ]
        .map(|(kind, count)| {
            let rows = kind.lateral_boundary_rows() as usize;
            let nudging = kind.nudging_rows() as usize;
            let banded = band_width * (rows + nudging);
            if banded >= count {
                return Err(GridError::invalid_zones(
                    kind,
                    format!("{banded} boundary entities leave no interior out of {count}"),
                ));
            }
            let layout = ZoneLayout::from_counts(
                kind,
                &ZoneCounts {
                    lateral_boundary: vec![band_width; rows],
                    nudging: vec![band_width; nudging],
                    interior: count - banded,
                    halo: [0, 0],
                },
            )?;
            Ok((kind, layout))
        });

        let mut layouts = Vec::with_capacity(3);
        for entry in counts {
            layouts.push(entry?);
        }

        let mut mesh = Self::assemble(self.tables, self.edges, self.cells, true, Some(layouts))?;
        mesh.interpolation = mesh.interpolation.with_nudging(&mesh.grid, nudge_max_coeff)?;
        Ok(mesh)
    }

    fn assemble(
        tables: BaseTables,
        edges: EdgeGeometry,
        cells: CellGeometry,
        limited_area: bool,
        layouts: Option<Vec<(EntityKind, ZoneLayout)>>,
    ) -> GridResult<Self> {
        let mut builder = GridBuilder::new(tables.n_cells, tables.n_edges, tables.n_vertices, tables.n_levels)
            .limited_area(limited_area);
        for (connectivity, table) in tables.derive()? {
            builder = builder.with_connectivity(connectivity, table);
        }
        for (kind, layout) in layouts.into_iter().flatten() {
            builder = builder.with_zones(kind, layout);
        }
        let grid = builder.build()?;
        let interpolation = InterpolationState::from_geometry(&grid, &edges, &cells)?;

        Ok(Self {
            grid,
            edges,
            cells,
            interpolation,
            tables,
        })
    }
}

impl BaseTables {
    /// All connectivities of the grid, derived from `C2E`, `C2V`, `E2C` and `E2V`.
    fn derive(&self) -> GridResult<Vec<(Connectivity, NeighborTable)>> {
        let to_rows = |rows: Vec<Vec<usize>>| -> Vec<Vec<i32>> {
            rows.into_iter()
                .map(|r| r.into_iter().map(|v| v as i32).collect())
                .collect()
        };

        let c2e2c: Vec<Vec<usize>> = (0..self.n_cells)
            .map(|c| {
                self.c2e[c]
                    .iter()
                    .map(|&e| {
                        let [c0, c1] = self.e2c[e];
                        if c0 == c { c1 } else { c0 }
                    })
                    .collect()
            })
            .collect();
        let c2e2co: Vec<Vec<usize>> = c2e2c
            .iter()
            .enumerate()
            .map(|(c, row)| std::iter::once(c).chain(row.iter().copied()).collect())
            .collect();

        let e2c2e: Vec<Vec<usize>> = (0..self.n_edges)
            .map(|e| {
                self.e2c[e]
                    .iter()
                    .flat_map(|&c| self.c2e[c].iter().copied().filter(move |&other| other != e))
                    .collect()
            })
            .collect();
        let e2c2eo: Vec<Vec<usize>> = e2c2e
            .iter()
            .enumerate()
            .map(|(e, row)| std::iter::once(e).chain(row.iter().copied()).collect())
            .collect();

        let e2c2v: Vec<Vec<usize>> = (0..self.n_edges)
            .map(|e| {
                let [v0, v1] = self.e2v[e];
                let mut row = vec![v0, v1];
                for &c in &self.e2c[e] {
                    let opposite = self.c2v[c]
                        .iter()
                        .copied()
                        .find(|&v| v != v0 && v != v1)
                        .unwrap_or(v0);
                    row.push(opposite);
                }
                row
            })
            .collect();

        let v2e = invert(self.n_vertices, self.e2v.iter().map(|r| r.as_slice()));
        let v2c = invert(self.n_vertices, self.c2v.iter().map(|r| r.as_slice()));

        Ok(vec![
            (Connectivity::C2E, NeighborTable::from_rows(&to_rows(self.c2e.iter().map(|r| r.to_vec()).collect()))?),
            (Connectivity::C2V, NeighborTable::from_rows(&to_rows(self.c2v.iter().map(|r| r.to_vec()).collect()))?),
            (Connectivity::E2C, NeighborTable::from_rows(&to_rows(self.e2c.iter().map(|r| r.to_vec()).collect()))?),
            (Connectivity::E2V, NeighborTable::from_rows(&to_rows(self.e2v.iter().map(|r| r.to_vec()).collect()))?),
            (Connectivity::C2E2C, NeighborTable::from_rows(&to_rows(c2e2c))?),
            (Connectivity::C2E2CO, NeighborTable::from_rows(&to_rows(c2e2co))?),
            (Connectivity::E2C2E, NeighborTable::from_rows(&to_rows(e2c2e))?),
            (Connectivity::E2C2EO, NeighborTable::from_rows(&to_rows(e2c2eo))?),
            (Connectivity::E2C2V, NeighborTable::from_rows(&to_rows(e2c2v))?),
            (Connectivity::V2E, NeighborTable::from_rows(&v2e)?),
            (Connectivity::V2C, NeighborTable::from_rows(&v2c)?),
        ])
    }
}

/// Invert a source→vertex table into vertex→source rows of width 6,
/// padded with the sentinel. Repeated entries are kept once.
fn invert<'a>(n_vertices: usize, rows: impl Iterator<Item = &'a [usize]>) -> Vec<Vec<i32>> {
    const WIDTH: usize = 6;
    let mut inverse: Vec<Vec<i32>> = vec![Vec::with_capacity(WIDTH); n_vertices];
    for (source, row) in rows.enumerate() {
        for &v in row {
            let entry = source as i32;
            if !inverse[v].contains(&entry) && inverse[v].len() < WIDTH {
                inverse[v].push(entry);
            }
        }
    }
    for row in &mut inverse {
        row.resize(WIDTH, SKIP_VALUE);
    }
    inverse
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{IndexRange, Zone};

    #[test]
    fn test_torus_counts() {
        let mesh = SyntheticMesh::torus(3, 1000.0, 4).unwrap();
        assert_eq!(mesh.grid.n_cells(), 18);
        assert_eq!(mesh.grid.n_edges(), 27);
        assert_eq!(mesh.grid.n_vertices(), 9);
        assert_eq!(mesh.grid.n_levels(), 4);
    }

    #[test]
    fn test_torus_edges_belong_to_both_cells() {
        let mesh = SyntheticMesh::torus(4, 1000.0, 2).unwrap();
        let c2e = mesh.grid.connectivity(Connectivity::C2E).unwrap();
        let e2c = mesh.grid.connectivity(Connectivity::E2C).unwrap();
        for e in 0..mesh.grid.n_edges() {
            for slot in 0..2 {
                let c = e2c.neighbor(e, slot);
                assert!(c2e.slot_of(c, e).is_some(), "edge {e} missing from cell {c}");
            }
        }
    }

    #[test]
    fn test_torus_vertices_have_six_neighbors() {
        let mesh = SyntheticMesh::torus(4, 1000.0, 2).unwrap();
        let v2c = mesh.grid.connectivity(Connectivity::V2C).unwrap();
        let v2e = mesh.grid.connectivity(Connectivity::V2E).unwrap();
        for v in 0..mesh.grid.n_vertices() {
            assert_eq!(v2c.row(v).flatten().count(), 6);
            assert_eq!(v2e.row(v).flatten().count(), 6);
        }
    }

    #[test]
    fn test_torus_complete_everywhere() {
        let mesh = SyntheticMesh::torus(3, 1000.0, 2).unwrap();
        for connectivity in Connectivity::ALL {
            let n = mesh.grid.count(connectivity.source());
            assert!(
                mesh.grid.require_complete(connectivity, IndexRange::new(0, n)).is_ok(),
                "{connectivity} incomplete"
            );
        }
    }

    #[test]
    fn test_dihedron_shape() {
        let mesh = SyntheticMesh::dihedron(2).unwrap();
        assert_eq!(
            (mesh.grid.n_cells(), mesh.grid.n_edges(), mesh.grid.n_vertices()),
            (2, 3, 3)
        );
        let c2e2c = mesh.grid.connectivity(Connectivity::C2E2C).unwrap();
        assert_eq!(c2e2c.row(0).collect::<Vec<_>>(), vec![Some(1); 3]);
    }

    #[test]
    fn test_lateral_boundary_bands() {
        let mesh = SyntheticMesh::torus(6, 1000.0, 2)
            .unwrap()
            .with_lateral_boundary(2, 0.02)
            .unwrap();
        assert!(mesh.grid.limited_area());
        assert_eq!(
            mesh.grid.range(EntityKind::Edge, Zone::LateralBoundary(1), Zone::Nudging(1)).unwrap(),
            IndexRange::new(0, 18)
        );
        assert_eq!(mesh.grid.zone(EntityKind::Cell, Zone::Interior).unwrap(), IndexRange::new(10, 72));
        assert!(mesh.interpolation.nudgecoeff_e[18] > 0.0);
        assert_eq!(mesh.interpolation.nudgecoeff_e[20], 0.0);
    }

    #[test]
    fn test_lateral_boundary_too_wide() {
        let mesh = SyntheticMesh::torus(2, 1000.0, 2).unwrap();
        assert!(mesh.with_lateral_boundary(1, 0.02).is_err());
    }
}
