//! Dense storage for horizontal × vertical fields.
//!
//! # Memory layout
//!
//! Fields are entity-major with contiguous levels: `data[entity * n_levels + k]`.
//! A column is a contiguous slice, which keeps the vertical sweeps of the
//! implicit solver cache-friendly and lets them run column-parallel.

use std::ops::{Index, IndexMut, Range};

use crate::grid::{GridError, GridResult, IndexRange};

/// Dense `(n_entities × n_levels)` field.
///
/// Half-level fields are allocated with `n_levels + 1` levels.
#[derive(Clone, Debug, PartialEq)]
pub struct Field<T = f64> {
    n_entities: usize,
    n_levels: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Field<T> {
    /// Field filled with `T::default()`.
    pub fn zeros(n_entities: usize, n_levels: usize) -> Self {
        Self::filled(n_entities, n_levels, T::default())
    }

    /// Field filled with a constant.
    pub fn filled(n_entities: usize, n_levels: usize, value: T) -> Self {
        Self {
            n_entities,
            n_levels,
            data: vec![value; n_entities * n_levels],
        }
    }

    /// Field from a function of `(entity, level)`.
    pub fn from_fn(n_entities: usize, n_levels: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(n_entities * n_levels);
        for i in 0..n_entities {
            for k in 0..n_levels {
                data.push(f(i, k));
            }
        }
        Self {
            n_entities,
            n_levels,
            data,
        }
    }

    /// Field from entity-major data.
    pub fn from_vec(n_entities: usize, n_levels: usize, data: Vec<T>) -> GridResult<Self> {
        if data.len() != n_entities * n_levels {
            return Err(GridError::size_mismatch("field data", n_entities * n_levels, data.len()));
        }
        Ok(Self {
            n_entities,
            n_levels,
            data,
        })
    }

    /// Number of horizontal entities.
    #[inline]
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Number of levels.
    #[inline]
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// `(n_entities, n_levels)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_entities, self.n_levels)
    }

    /// Raw entity-major data.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Raw entity-major data, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// All levels of one entity.
    #[inline]
    pub fn column(&self, entity: usize) -> &[T] {
        &self.data[entity * self.n_levels..(entity + 1) * self.n_levels]
    }

    /// All levels of one entity, mutable.
    #[inline]
    pub fn column_mut(&mut self, entity: usize) -> &mut [T] {
        &mut self.data[entity * self.n_levels..(entity + 1) * self.n_levels]
    }

    /// Columns of a contiguous entity range, mutable.
    #[inline]
    pub fn columns_mut(&mut self, range: IndexRange) -> &mut [T] {
        &mut self.data[range.start * self.n_levels..range.end * self.n_levels]
    }

    /// Set every value.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Set `levels` of every entity in `range`.
    pub fn fill_region(&mut self, range: IndexRange, levels: Range<usize>, value: T) {
        for i in range {
            self.column_mut(i)[levels.clone()].fill(value);
        }
    }

    /// Copy all values from a field of the same shape.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn copy_from(&mut self, other: &Field<T>) {
        assert_eq!(self.shape(), other.shape(), "field shape mismatch in copy_from");
        self.data.copy_from_slice(&other.data);
    }

    /// Copy `levels` of every entity in `range` from another field.
    pub fn copy_region(&mut self, other: &Field<T>, range: IndexRange, levels: Range<usize>) {
        for i in range {
            self.column_mut(i)[levels.clone()].copy_from_slice(&other.column(i)[levels.clone()]);
        }
    }
}

impl Field<f64> {
    /// Largest absolute value.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }

    /// First NaN or infinity as `(entity, level, value)`.
    pub fn first_non_finite(&self) -> Option<(usize, usize, f64)> {
        self.data
            .iter()
            .position(|v| !v.is_finite())
            .map(|idx| (idx / self.n_levels, idx % self.n_levels, self.data[idx]))
    }
}

impl<T> Index<(usize, usize)> for Field<T> {
    type Output = T;

    #[inline]
    fn index(&self, (entity, level): (usize, usize)) -> &T {
        debug_assert!(level < self.n_levels, "level {level} out of {}", self.n_levels);
        &self.data[entity * self.n_levels + level]
    }
}

impl<T> IndexMut<(usize, usize)> for Field<T> {
    #[inline]
    fn index_mut(&mut self, (entity, level): (usize, usize)) -> &mut T {
        debug_assert!(level < self.n_levels, "level {level} out of {}", self.n_levels);
        &mut self.data[entity * self.n_levels + level]
    }
}

/// Per-entity coefficient rows shaped like a neighbor table.
///
/// Slot `j` of entity `i` weighs neighbor `j` of the matching connectivity.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborWeights {
    n_entities: usize,
    width: usize,
    data: Vec<f64>,
}

impl NeighborWeights {
    /// All-zero weights.
    pub fn zeros(n_entities: usize, width: usize) -> Self {
        Self {
            n_entities,
            width,
            data: vec![0.0; n_entities * width],
        }
    }

    /// Weights from a function of `(entity, slot)`.
    pub fn from_fn(n_entities: usize, width: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(n_entities * width);
        for i in 0..n_entities {
            for j in 0..width {
                data.push(f(i, j));
            }
        }
        Self {
            n_entities,
            width,
            data,
        }
    }

    /// Number of entities.
    #[inline]
    pub fn n_entities(&self) -> usize {
        self.n_entities
    }

    /// Weights per entity.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Weight row of one entity.
    #[inline]
    pub fn row(&self, entity: usize) -> &[f64] {
        &self.data[entity * self.width..(entity + 1) * self.width]
    }

    /// Weight row of one entity, mutable.
    #[inline]
    pub fn row_mut(&mut self, entity: usize) -> &mut [f64] {
        &mut self.data[entity * self.width..(entity + 1) * self.width]
    }
}

impl Index<(usize, usize)> for NeighborWeights {
    type Output = f64;

    #[inline]
    fn index(&self, (entity, slot): (usize, usize)) -> &f64 {
        &self.data[entity * self.width + slot]
    }
}

impl IndexMut<(usize, usize)> for NeighborWeights {
    #[inline]
    fn index_mut(&mut self, (entity, slot): (usize, usize)) -> &mut f64 {
        &mut self.data[entity * self.width + slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_layout() {
        let f = Field::from_fn(3, 2, |i, k| (10 * i + k) as f64);
        assert_eq!(f.column(1), &[10.0, 11.0]);
        assert_eq!(f[(2, 1)], 21.0);
    }

    #[test]
    fn test_fill_region() {
        let mut f: Field = Field::zeros(4, 3);
        f.fill_region(IndexRange::new(1, 3), 1..3, 5.0);
        assert_eq!(f.column(0), &[0.0, 0.0, 0.0]);
        assert_eq!(f.column(1), &[0.0, 5.0, 5.0]);
        assert_eq!(f.column(3), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_first_non_finite() {
        let mut f: Field = Field::zeros(2, 3);
        assert_eq!(f.first_non_finite(), None);
        f[(1, 2)] = f64::INFINITY;
        assert_eq!(f.first_non_finite(), Some((1, 2, f64::INFINITY)));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Field::from_vec(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_neighbor_weights_rows() {
        let w = NeighborWeights::from_fn(2, 3, |i, j| (i * 3 + j) as f64);
        assert_eq!(w.row(1), &[3.0, 4.0, 5.0]);
        assert_eq!(w[(0, 2)], 2.0);
    }
}
