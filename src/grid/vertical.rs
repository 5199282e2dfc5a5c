//! Height-based vertical grid with derived level indices.
//!
//! Levels are numbered from the model top downward. Half levels (interfaces)
//! carry index `0..=n_levels`, full levels (layer centers) `0..n_levels`, and
//! full level `k` lies between half levels `k` and `k + 1`.
//!
//! ```text
//! half 0        ─────────  z = vct_a[0]  (model top)
//! full 0           ·
//! half 1        ─────────
//!  ...
//! half n_levels ─────────  z = vct_a[n_levels]  (surface)
//! ```
//!
//! # Rayleigh damping
//!
//! The Klemp damping profile acts on vertical wind above
//! `rayleigh_damping_height`:
//!
//! ```text
//! rayleigh_w(z) = coeff · sin²(π/2 · (z − h_d) / (z_top − h_d))   for z ≥ h_d
//! ```
//!
//! # Example
//!
//! ```
//! use nh_dycore::grid::{VerticalGrid, VerticalParams};
//!
//! let params = VerticalParams::default().with_rayleigh_damping_height(6000.0);
//! let vertical = VerticalGrid::uniform(10, 10_000.0, &params).unwrap();
//!
//! assert_eq!(vertical.n_levels(), 10);
//! assert_eq!(vertical.index_of_damping_layer(), 4);
//! assert_eq!(vertical.rayleigh_w()[vertical.n_levels()], 0.0);
//! ```

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use super::error::{GridError, GridResult};
use super::icon_grid::MIN_LEVELS;

/// Parameters that turn half-level heights into level indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalParams {
    /// Height above which coordinate surfaces are flat [m].
    pub flat_height: f64,
    /// Override for the first level of the Taylor-expanded pressure
    /// gradient. Defaults to `nflatlev`.
    pub nflat_gradp: Option<usize>,
    /// Lower edge of the Rayleigh damping layer [m].
    pub rayleigh_damping_height: f64,
    /// Klemp damping coefficient [1/s].
    pub rayleigh_coeff: f64,
    /// Top of moist physics [m].
    pub htop_moist_proc: f64,
    /// First full level of three-dimensional divergence damping.
    pub kstart_dd3d: usize,
}

impl Default for VerticalParams {
    fn default() -> Self {
        Self {
            flat_height: 16_000.0,
            nflat_gradp: None,
            rayleigh_damping_height: 45_000.0,
            rayleigh_coeff: 0.05,
            htop_moist_proc: 22_500.0,
            kstart_dd3d: 0,
        }
    }
}

impl VerticalParams {
    /// Set the flat height.
    pub fn with_flat_height(mut self, flat_height: f64) -> Self {
        self.flat_height = flat_height;
        self
    }

    /// Set the damping layer height.
    pub fn with_rayleigh_damping_height(mut self, height: f64) -> Self {
        self.rayleigh_damping_height = height;
        self
    }

    /// Set the Klemp damping coefficient.
    pub fn with_rayleigh_coeff(mut self, coeff: f64) -> Self {
        self.rayleigh_coeff = coeff;
        self
    }

    /// Set the first level of three-dimensional divergence damping.
    pub fn with_kstart_dd3d(mut self, kstart_dd3d: usize) -> Self {
        self.kstart_dd3d = kstart_dd3d;
        self
    }
}

/// Vertical grid: half-level heights and the indices derived from them.
#[derive(Clone, Debug, PartialEq)]
pub struct VerticalGrid {
    vct_a: Vec<f64>,
    nflatlev: usize,
    nflat_gradp: usize,
    kstart_moist: usize,
    kstart_dd3d: usize,
    index_of_damping_layer: usize,
    rayleigh_damping_height: f64,
    rayleigh_coeff: f64,
    htop_moist_proc: f64,
    rayleigh_w: Vec<f64>,
}

impl VerticalGrid {
    /// Build from half-level heights, top first.
    ///
    /// Heights must be strictly decreasing.
    pub fn new(vct_a: Vec<f64>, params: &VerticalParams) -> GridResult<Self> {
        if vct_a.len() < MIN_LEVELS + 1 {
            return Err(GridError::TooFewLevels {
                n_levels: vct_a.len().saturating_sub(1),
                minimum: MIN_LEVELS,
            });
        }
        if let Some(k) = vct_a.windows(2).position(|w| !(w[0] > w[1])) {
            return Err(GridError::InvalidGeometry(format!(
                "half-level heights must decrease strictly, vct_a[{k}] = {} vct_a[{}] = {}",
                vct_a[k],
                k + 1,
                vct_a[k + 1]
            )));
        }
        let n_levels = vct_a.len() - 1;

        let nflatlev = vct_a
            .iter()
            .rposition(|&z| z >= params.flat_height)
            .unwrap_or(0)
            .min(n_levels - 1);

        let nflat_gradp = params.nflat_gradp.unwrap_or(nflatlev);
        if nflat_gradp < nflatlev || nflat_gradp > n_levels {
            return Err(GridError::InvalidVerticalIndex {
                name: "nflat_gradp",
                value: nflat_gradp,
                max: n_levels,
            });
        }
        if params.kstart_dd3d >= n_levels {
            return Err(GridError::InvalidVerticalIndex {
                name: "kstart_dd3d",
                value: params.kstart_dd3d,
                max: n_levels - 1,
            });
        }

        let kstart_moist = (0..n_levels)
            .find(|&k| 0.5 * (vct_a[k] + vct_a[k + 1]) < params.htop_moist_proc)
            .unwrap_or(n_levels);

        let index_of_damping_layer = vct_a
            .iter()
            .filter(|&&z| z >= params.rayleigh_damping_height)
            .count()
            .saturating_sub(1);

        let rayleigh_w = klemp_profile(&vct_a, params.rayleigh_damping_height, params.rayleigh_coeff);

        log::debug!(
            "Vertical grid: {n_levels} levels, nflatlev={nflatlev}, nflat_gradp={nflat_gradp}, \
             kstart_moist={kstart_moist}, damping layer down to half level {index_of_damping_layer}"
        );

        Ok(Self {
            vct_a,
            nflatlev,
            nflat_gradp,
            kstart_moist,
            kstart_dd3d: params.kstart_dd3d,
            index_of_damping_layer,
            rayleigh_damping_height: params.rayleigh_damping_height,
            rayleigh_coeff: params.rayleigh_coeff,
            htop_moist_proc: params.htop_moist_proc,
            rayleigh_w,
        })
    }

    /// Equidistant levels between `top` and the surface.
    pub fn uniform(n_levels: usize, top: f64, params: &VerticalParams) -> GridResult<Self> {
        let dz = top / n_levels as f64;
        let vct_a = (0..=n_levels)
            .map(|k| top - k as f64 * dz)
            .collect();
        Self::new(vct_a, params)
    }

    /// Number of full levels.
    #[inline]
    pub fn n_levels(&self) -> usize {
        self.vct_a.len() - 1
    }

    /// Half-level heights, top first.
    #[inline]
    pub fn vct_a(&self) -> &[f64] {
        &self.vct_a
    }

    /// Height of full level `k` (layer center).
    #[inline]
    pub fn full_level_height(&self, k: usize) -> f64 {
        0.5 * (self.vct_a[k] + self.vct_a[k + 1])
    }

    /// Thickness of full level `k`.
    #[inline]
    pub fn layer_thickness(&self, k: usize) -> f64 {
        self.vct_a[k] - self.vct_a[k + 1]
    }

    /// Model top height.
    #[inline]
    pub fn top_height(&self) -> f64 {
        self.vct_a[0]
    }

    /// Last half level at or above the flat height.
    #[inline]
    pub fn nflatlev(&self) -> usize {
        self.nflatlev
    }

    /// First full level of the Taylor-expanded pressure gradient.
    #[inline]
    pub fn nflat_gradp(&self) -> usize {
        self.nflat_gradp
    }

    /// First full level below the top of moist physics.
    #[inline]
    pub fn kstart_moist(&self) -> usize {
        self.kstart_moist
    }

    /// First full level of three-dimensional divergence damping.
    #[inline]
    pub fn kstart_dd3d(&self) -> usize {
        self.kstart_dd3d
    }

    /// Lowest half level inside the Rayleigh damping layer.
    #[inline]
    pub fn index_of_damping_layer(&self) -> usize {
        self.index_of_damping_layer
    }

    /// Lower edge of the Rayleigh damping layer [m].
    #[inline]
    pub fn rayleigh_damping_height(&self) -> f64 {
        self.rayleigh_damping_height
    }

    /// Klemp damping coefficient the profile was built with.
    #[inline]
    pub fn rayleigh_coeff(&self) -> f64 {
        self.rayleigh_coeff
    }

    /// Top of moist physics [m].
    #[inline]
    pub fn htop_moist_proc(&self) -> f64 {
        self.htop_moist_proc
    }

    /// Klemp damping rate on half levels.
    #[inline]
    pub fn rayleigh_w(&self) -> &[f64] {
        &self.rayleigh_w
    }
}

fn klemp_profile(vct_a: &[f64], damping_height: f64, coeff: f64) -> Vec<f64> {
    let top = vct_a[0];
    if top <= damping_height {
        return vec![0.0; vct_a.len()];
    }
    vct_a
        .iter()
        .map(|&z| {
            if z >= damping_height {
                coeff * (FRAC_PI_2 * (z - damping_height) / (top - damping_height)).sin().powi(2)
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_heights() {
        let v = VerticalGrid::uniform(4, 2000.0, &VerticalParams::default()).unwrap();
        assert_eq!(v.vct_a(), &[2000.0, 1500.0, 1000.0, 500.0, 0.0]);
        assert_relative_eq!(v.full_level_height(0), 1750.0);
        assert_relative_eq!(v.layer_thickness(3), 500.0);
    }

    #[test]
    fn test_klemp_profile_zero_below_damping_height() {
        let params = VerticalParams::default().with_rayleigh_damping_height(5000.0);
        let v = VerticalGrid::uniform(10, 10_000.0, &params).unwrap();
        for (k, &z) in v.vct_a().iter().enumerate() {
            if z < 5000.0 {
                assert_eq!(v.rayleigh_w()[k], 0.0, "half level {k} at {z} m");
            }
        }
        assert_relative_eq!(v.rayleigh_w()[0], params.rayleigh_coeff, epsilon = 1e-14);
        assert_eq!(v.index_of_damping_layer(), 5);
    }

    #[test]
    fn test_damping_layer_above_top() {
        let v = VerticalGrid::uniform(5, 1000.0, &VerticalParams::default()).unwrap();
        assert!(v.rayleigh_w().iter().all(|&r| r == 0.0));
        assert_eq!(v.index_of_damping_layer(), 0);
    }

    #[test]
    fn test_nflatlev_from_flat_height() {
        let params = VerticalParams::default().with_flat_height(700.0);
        let v = VerticalGrid::uniform(10, 1000.0, &params).unwrap();
        // half levels at 1000, 900, 800, 700, 600, ...
        assert_eq!(v.nflatlev(), 3);
        assert_eq!(v.nflat_gradp(), 3);
    }

    #[test]
    fn test_rejects_single_level() {
        assert!(matches!(
            VerticalGrid::new(vec![100.0, 0.0], &VerticalParams::default()),
            Err(GridError::TooFewLevels { n_levels: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_non_monotonic_heights() {
        assert!(VerticalGrid::new(vec![100.0, 100.0, 0.0], &VerticalParams::default()).is_err());
    }

    #[test]
    fn test_rejects_nflat_gradp_above_nflatlev() {
        let params = VerticalParams {
            flat_height: 500.0,
            nflat_gradp: Some(1),
            ..VerticalParams::default()
        };
        assert!(matches!(
            VerticalGrid::uniform(4, 2000.0, &params),
            Err(GridError::InvalidVerticalIndex { name: "nflat_gradp", .. })
        ));
    }
}
