//! Configuration of the nonhydrostatic solver.
//!
//! [`NonHydrostaticConfig`] mirrors the `nonhydrostatic_nml` namelist: scheme
//! switches are enums that (de)serialize as their integer namelist ids, the
//! remaining options are plain scalars and flags. Only a subset of switch
//! combinations is implemented; [`NonHydrostaticConfig::validate`] rejects all
//! others once, before any field is allocated.
//!
//! # Example
//!
//! ```
//! use nh_dycore::config::{NonHydrostaticConfig, RhoThetaAdvection};
//!
//! let config = NonHydrostaticConfig::default()
//!     .with_ndyn_substeps(3)
//!     .with_iadv_rhotheta(RhoThetaAdvection::SimplifiedMiura);
//! assert!(config.validate().is_ok());
//! ```

mod params;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{VerticalGrid, VerticalParams};

pub use params::NonHydrostaticParams;

/// Configuration errors. All of them are raised before the first substep.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A known option value whose discretization is not implemented.
    #[error("{option} = {value} is not implemented: {reason}")]
    NotImplemented {
        option: &'static str,
        value: String,
        reason: &'static str,
    },

    /// An integer id that does not name any scheme.
    #[error("Unknown value {value} for {option}")]
    UnknownOption { option: &'static str, value: i32 },

    /// A scalar outside its admissible range.
    #[error("Invalid value for {option}: {reason}")]
    InvalidValue { option: &'static str, reason: String },
}

impl ConfigError {
    fn not_implemented(option: &'static str, value: impl fmt::Display, reason: &'static str) -> Self {
        Self::NotImplemented {
            option,
            value: value.to_string(),
            reason,
        }
    }

    fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            option,
            reason: reason.into(),
        }
    }
}

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Scheme switch stored as its namelist integer id.
macro_rules! namelist_switch {
    (
        $(#[$meta:meta])*
        $name:ident, $option:literal {
            $($(#[$vmeta:meta])* $variant:ident = $id:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i32", into = "i32")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $id),+
        }

        impl $name {
            /// Namelist option name.
            pub const OPTION: &'static str = $option;

            /// Namelist integer id.
            pub fn id(self) -> i32 {
                self as i32
            }
        }

        impl TryFrom<i32> for $name {
            type Error = ConfigError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($id => Ok(Self::$variant),)+
                    _ => Err(ConfigError::UnknownOption { option: $option, value }),
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                value.id()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} ({:?})", self.id(), self)
            }
        }
    };
}

namelist_switch! {
    /// Time integration scheme of the dynamical core.
    TimeScheme, "itime_scheme" {
        /// Contravariant correction in the predictor only, velocity
        /// tendencies in the corrector only.
        MostEfficient = 4,
        /// As 4, with the contravariant correction recomputed in the corrector.
        CorrectorContravariant = 5,
        /// As 5, with velocity tendencies in both stages.
        FullPredictorCorrector = 6,
    }
}

namelist_switch! {
    /// Horizontal reconstruction of density and theta at edges.
    RhoThetaAdvection, "iadv_rhotheta" {
        /// Centered differences with a vertex-based tangential term.
        SimplifiedMiura = 1,
        /// Miura second-order upwind with Green-Gauss gradients.
        Miura = 2,
        /// Miura with third-order reconstruction.
        Miura3 = 3,
    }
}

namelist_switch! {
    /// Discretization of the horizontal pressure gradient.
    PressureGradientMethod, "igradp_method" {
        /// Conventional metric correction.
        Conventional = 1,
        /// Taylor-expansion-based reconstruction.
        Taylor = 2,
        /// Taylor expansion with hydrostatic downward extrapolation.
        TaylorHydro = 3,
        /// Cubic or quadratic polynomial interpolation.
        Polynomial = 4,
        /// Polynomial interpolation with hydrostatic downward extrapolation.
        PolynomialHydro = 5,
    }
}

namelist_switch! {
    /// Rayleigh damping of vertical wind.
    RayleighType, "rayleigh_type" {
        /// Damping towards a reference profile.
        Classic = 1,
        /// Klemp damping towards the top-level value.
        Klemp = 2,
    }
}

namelist_switch! {
    /// Order of the divergence damping.
    DivergenceDampingOrder, "divdamp_order" {
        Second = 2,
        Fourth = 4,
        /// Second order combined with fourth order.
        Combined = 24,
    }
}

namelist_switch! {
    /// Dimensionality of the divergence used for damping.
    DivergenceDampingType, "divdamp_type" {
        TwoDimensional = 2,
        ThreeDimensional = 3,
        /// Three-dimensional below a height, two-dimensional above.
        Combined = 32,
    }
}

namelist_switch! {
    /// Computation of the mass and heat flux divergence.
    DivergenceMethod, "idiv_method" {
        FluxDivergence = 1,
        AveragedDivergence = 2,
    }
}

impl DivergenceDampingType {
    /// Whether the vertical wind derivative enters the damped divergence.
    pub fn is_three_dimensional(self) -> bool {
        matches!(self, Self::ThreeDimensional | Self::Combined)
    }
}

/// Options of the nonhydrostatic solver.
///
/// Defaults follow the ICON namelist defaults for the supported schemes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonHydrostaticConfig {
    pub itime_scheme: TimeScheme,
    pub iadv_rhotheta: RhoThetaAdvection,
    pub igradp_method: PressureGradientMethod,
    pub rayleigh_type: RayleighType,
    pub divdamp_order: DivergenceDampingOrder,
    pub divdamp_type: DivergenceDampingType,
    pub idiv_method: DivergenceMethod,

    /// Acoustic substeps per advective step.
    pub ndyn_substeps: usize,

    /// Off-centering of the vertically implicit solve.
    pub vwind_offctr: f64,
    /// Off-centering of density and theta at interfaces (corrector).
    pub rhotheta_offctr: f64,
    /// Off-centering of the velocity tendencies (corrector).
    pub veladv_offctr: f64,

    /// Fourth-order damping factors at the four reference heights.
    pub divdamp_fac: f64,
    pub divdamp_fac2: f64,
    pub divdamp_fac3: f64,
    pub divdamp_fac4: f64,
    /// Reference heights of the damping factors [m].
    pub divdamp_z: f64,
    pub divdamp_z2: f64,
    pub divdamp_z3: f64,
    pub divdamp_z4: f64,
    /// Second-order damping factor.
    pub divdamp_fac_o2: f64,

    /// Maximum nudging coefficient in the boundary zone.
    pub nudge_max_coeff: f64,

    /// Lower edge of the Rayleigh damping layer [m].
    pub rayleigh_damping_height: f64,
    /// Klemp damping coefficient.
    pub rayleigh_coeff: f64,
    /// Top of moist physics [m].
    pub htop_moist_proc: f64,
    /// First full level of three-dimensional divergence damping.
    pub kstart_dd3d: usize,

    /// Time extrapolation weight of the Exner perturbation.
    pub exner_expol: f64,

    pub is_iau_active: bool,
    /// Weight of the analysis increments per substep.
    pub iau_wgt_dyn: f64,

    /// Divergence damping on/off.
    pub lhdiff_rcf: bool,
    /// Open upper boundary.
    pub l_open_ubc: bool,
    /// Vertical nesting.
    pub l_vert_nested: bool,
}

impl Default for NonHydrostaticConfig {
    fn default() -> Self {
        Self {
            itime_scheme: TimeScheme::MostEfficient,
            iadv_rhotheta: RhoThetaAdvection::Miura,
            igradp_method: PressureGradientMethod::TaylorHydro,
            rayleigh_type: RayleighType::Klemp,
            divdamp_order: DivergenceDampingOrder::Combined,
            divdamp_type: DivergenceDampingType::ThreeDimensional,
            idiv_method: DivergenceMethod::FluxDivergence,
            ndyn_substeps: 5,
            vwind_offctr: 0.2,
            rhotheta_offctr: -0.1,
            veladv_offctr: 0.25,
            divdamp_fac: 0.0025,
            divdamp_fac2: 0.004,
            divdamp_fac3: 0.004,
            divdamp_fac4: 0.004,
            divdamp_z: 32_500.0,
            divdamp_z2: 40_000.0,
            divdamp_z3: 60_000.0,
            divdamp_z4: 80_000.0,
            divdamp_fac_o2: 0.0,
            nudge_max_coeff: 0.02,
            rayleigh_damping_height: 45_000.0,
            rayleigh_coeff: 0.05,
            htop_moist_proc: 22_500.0,
            kstart_dd3d: 0,
            exner_expol: 0.333,
            is_iau_active: false,
            iau_wgt_dyn: 0.0,
            lhdiff_rcf: true,
            l_open_ubc: false,
            l_vert_nested: false,
        }
    }
}

impl NonHydrostaticConfig {
    /// Set the number of acoustic substeps.
    pub fn with_ndyn_substeps(mut self, ndyn_substeps: usize) -> Self {
        self.ndyn_substeps = ndyn_substeps;
        self
    }

    /// Set the rho/theta edge reconstruction.
    pub fn with_iadv_rhotheta(mut self, iadv_rhotheta: RhoThetaAdvection) -> Self {
        self.iadv_rhotheta = iadv_rhotheta;
        self
    }

    /// Set the divergence damping order.
    pub fn with_divdamp_order(mut self, order: DivergenceDampingOrder) -> Self {
        self.divdamp_order = order;
        self
    }

    /// Set the divergence damping type.
    pub fn with_divdamp_type(mut self, divdamp_type: DivergenceDampingType) -> Self {
        self.divdamp_type = divdamp_type;
        self
    }

    /// Set the fourth-order damping factor at all reference heights.
    pub fn with_uniform_divdamp_fac(mut self, fac: f64) -> Self {
        self.divdamp_fac = fac;
        self.divdamp_fac2 = fac;
        self.divdamp_fac3 = fac;
        self.divdamp_fac4 = fac;
        self
    }

    /// Set the second-order damping factor.
    pub fn with_divdamp_fac_o2(mut self, fac: f64) -> Self {
        self.divdamp_fac_o2 = fac;
        self
    }

    /// Switch divergence damping on or off.
    pub fn with_lhdiff_rcf(mut self, lhdiff_rcf: bool) -> Self {
        self.lhdiff_rcf = lhdiff_rcf;
        self
    }

    /// Activate the incremental analysis update with the given weight.
    pub fn with_iau(mut self, iau_wgt_dyn: f64) -> Self {
        self.is_iau_active = true;
        self.iau_wgt_dyn = iau_wgt_dyn;
        self
    }

    /// Set the Rayleigh damping layer.
    pub fn with_rayleigh(mut self, damping_height: f64, coeff: f64) -> Self {
        self.rayleigh_damping_height = damping_height;
        self.rayleigh_coeff = coeff;
        self
    }

    /// Set the first level of three-dimensional divergence damping.
    pub fn with_kstart_dd3d(mut self, kstart_dd3d: usize) -> Self {
        self.kstart_dd3d = kstart_dd3d;
        self
    }

    /// Set the implicit off-centering.
    pub fn with_vwind_offctr(mut self, vwind_offctr: f64) -> Self {
        self.vwind_offctr = vwind_offctr;
        self
    }

    /// Vertical grid parameters implied by this configuration.
    pub fn vertical_params(&self, flat_height: f64) -> VerticalParams {
        VerticalParams {
            flat_height,
            nflat_gradp: None,
            rayleigh_damping_height: self.rayleigh_damping_height,
            rayleigh_coeff: self.rayleigh_coeff,
            htop_moist_proc: self.htop_moist_proc,
            kstart_dd3d: self.kstart_dd3d,
        }
    }

    /// Check that `vertical` was built from the vertical options of this
    /// configuration. The solver reads these values from the grid only.
    pub fn check_vertical(&self, vertical: &VerticalGrid) -> ConfigResult<()> {
        fn mismatch(option: &'static str, configured: impl fmt::Display, grid: impl fmt::Display) -> ConfigResult<()> {
            Err(ConfigError::invalid(
                option,
                format!("configured {configured} but the vertical grid was built with {grid}"),
            ))
        }
        if self.kstart_dd3d != vertical.kstart_dd3d() {
            return mismatch("kstart_dd3d", self.kstart_dd3d, vertical.kstart_dd3d());
        }
        if self.rayleigh_damping_height != vertical.rayleigh_damping_height() {
            return mismatch(
                "rayleigh_damping_height",
                self.rayleigh_damping_height,
                vertical.rayleigh_damping_height(),
            );
        }
        if self.rayleigh_coeff != vertical.rayleigh_coeff() {
            return mismatch("rayleigh_coeff", self.rayleigh_coeff, vertical.rayleigh_coeff());
        }
        if self.htop_moist_proc != vertical.htop_moist_proc() {
            return mismatch("htop_moist_proc", self.htop_moist_proc, vertical.htop_moist_proc());
        }
        Ok(())
    }

    /// Check that every option is supported and every scalar admissible.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.itime_scheme != TimeScheme::MostEfficient {
            return Err(ConfigError::not_implemented(
                TimeScheme::OPTION,
                self.itime_scheme,
                "only the predictor-contravariant scheme 4 is available",
            ));
        }
        if self.iadv_rhotheta == RhoThetaAdvection::Miura3 {
            return Err(ConfigError::not_implemented(
                RhoThetaAdvection::OPTION,
                self.iadv_rhotheta,
                "third-order Miura reconstruction is not available",
            ));
        }
        if self.igradp_method != PressureGradientMethod::TaylorHydro {
            return Err(ConfigError::not_implemented(
                PressureGradientMethod::OPTION,
                self.igradp_method,
                "only the Taylor expansion with hydrostatic extrapolation is available",
            ));
        }
        if self.rayleigh_type != RayleighType::Klemp {
            return Err(ConfigError::not_implemented(
                RayleighType::OPTION,
                self.rayleigh_type,
                "only Klemp damping is available",
            ));
        }
        if self.divdamp_type == DivergenceDampingType::Combined {
            return Err(ConfigError::not_implemented(
                DivergenceDampingType::OPTION,
                self.divdamp_type,
                "the height-dependent 3D/2D blend is not available",
            ));
        }
        if self.idiv_method != DivergenceMethod::FluxDivergence {
            return Err(ConfigError::not_implemented(
                DivergenceMethod::OPTION,
                self.idiv_method,
                "averaged divergence is not available",
            ));
        }
        if self.l_open_ubc {
            return Err(ConfigError::not_implemented(
                "l_open_ubc",
                true,
                "open upper boundary conditions are not supported",
            ));
        }
        if self.l_vert_nested {
            return Err(ConfigError::not_implemented(
                "l_vert_nested",
                true,
                "vertical nesting is not supported",
            ));
        }

        if self.ndyn_substeps == 0 {
            return Err(ConfigError::invalid("ndyn_substeps", "must be at least 1"));
        }
        let heights = [self.divdamp_z, self.divdamp_z2, self.divdamp_z3, self.divdamp_z4];
        if heights.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ConfigError::invalid(
                "divdamp_z",
                format!("reference heights must increase strictly, got {heights:?}"),
            ));
        }
        if !(self.nudge_max_coeff >= 0.0) {
            return Err(ConfigError::invalid(
                "nudge_max_coeff",
                format!("must be non-negative, got {}", self.nudge_max_coeff),
            ));
        }
        if !self.iau_wgt_dyn.is_finite() {
            return Err(ConfigError::invalid("iau_wgt_dyn", "must be finite"));
        }
        let scalars = [
            ("vwind_offctr", self.vwind_offctr),
            ("rhotheta_offctr", self.rhotheta_offctr),
            ("veladv_offctr", self.veladv_offctr),
            ("divdamp_fac", self.divdamp_fac),
            ("divdamp_fac2", self.divdamp_fac2),
            ("divdamp_fac3", self.divdamp_fac3),
            ("divdamp_fac4", self.divdamp_fac4),
            ("divdamp_fac_o2", self.divdamp_fac_o2),
            ("exner_expol", self.exner_expol),
        ];
        if let Some(&(name, _)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::invalid(name, "must be finite"));
        }
        Ok(())
    }
}
