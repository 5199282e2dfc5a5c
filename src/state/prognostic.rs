//! Prognostic variables and the two-slot time-level buffer.

use super::field::Field;
use crate::grid::IconGrid;
use crate::metrics::MetricState;

/// Prognostic variables of one time level.
///
/// `vn` lives on edges, everything else on cells. `w` is a half-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct PrognosticState {
    /// Normal wind at edges [m/s]
    pub vn: Field,
    /// Vertical wind at half levels [m/s]
    pub w: Field,
    /// Density [kg/m³]
    pub rho: Field,
    /// Virtual potential temperature [K]
    pub theta_v: Field,
    /// Exner pressure
    pub exner: Field,
}

impl PrognosticState {
    /// All-zero state shaped for `grid`.
    pub fn new(grid: &IconGrid) -> Self {
        let (nc, ne, nl) = (grid.n_cells(), grid.n_edges(), grid.n_levels());
        Self {
            vn: Field::zeros(ne, nl),
            w: Field::zeros(nc, nl + 1),
            rho: Field::zeros(nc, nl),
            theta_v: Field::zeros(nc, nl),
            exner: Field::zeros(nc, nl),
        }
    }

    /// Atmosphere at rest in the reference state of `metrics`.
    pub fn at_rest(grid: &IconGrid, metrics: &MetricState) -> Self {
        let mut state = Self::new(grid);
        state.rho.copy_from(&metrics.rho_ref_mc);
        state.theta_v.copy_from(&metrics.theta_ref_mc);
        state.exner.copy_from(&metrics.exner_ref_mc);
        state
    }

    /// Whether every field has the shape `grid` implies.
    pub fn matches(&self, grid: &IconGrid) -> bool {
        let (nc, ne, nl) = (grid.n_cells(), grid.n_edges(), grid.n_levels());
        self.vn.shape() == (ne, nl)
            && self.w.shape() == (nc, nl + 1)
            && self.rho.shape() == (nc, nl)
            && self.theta_v.shape() == (nc, nl)
            && self.exner.shape() == (nc, nl)
    }

    /// Fields with their names, in a fixed order.
    pub fn named_fields(&self) -> [(&'static str, &Field); 5] {
        [
            ("vn", &self.vn),
            ("w", &self.w),
            ("rho", &self.rho),
            ("theta_v", &self.theta_v),
            ("exner", &self.exner),
        ]
    }

    /// First NaN or infinity as `(field, entity, level, value)`.
    pub fn first_non_finite(&self) -> Option<(&'static str, usize, usize, f64)> {
        self.named_fields().into_iter().find_map(|(name, field)| {
            field
                .first_non_finite()
                .map(|(entity, level, value)| (name, entity, level, value))
        })
    }
}

/// Two time levels, `now` and `new`, swapped by [`advance`](Self::advance).
///
/// Swapping exchanges the slot roles without moving the data.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeLevels<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> TimeLevels<T> {
    /// Buffer with `current` in the current slot.
    pub fn new(current: T, next: T) -> Self {
        Self {
            slots: [current, next],
            current: 0,
        }
    }

    /// The current time level.
    #[inline]
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// The next time level.
    #[inline]
    pub fn next(&self) -> &T {
        &self.slots[1 - self.current]
    }

    /// The current time level, mutable.
    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    /// The next time level, mutable.
    #[inline]
    pub fn next_mut(&mut self) -> &mut T {
        &mut self.slots[1 - self.current]
    }

    /// Split borrow: current read-only, next mutable.
    pub fn current_and_next_mut(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        if self.current == 0 { (a, b) } else { (b, a) }
    }

    /// Swap the roles of the two slots.
    #[inline]
    pub fn advance(&mut self) {
        self.current = 1 - self.current;
    }

    /// Index of the slot that is currently `current` (0 or 1).
    #[inline]
    pub fn parity(&self) -> usize {
        self.current
    }
}

impl<T: Clone> TimeLevels<T> {
    /// Buffer with both slots initialized to `value`.
    pub fn filled(value: T) -> Self {
        Self::new(value.clone(), value)
    }
}
