//! Quantities derived once from the configuration.

use super::{ConfigResult, NonHydrostaticConfig};

/// Derived parameters of the nonhydrostatic solver.
///
/// The divergence-damping profile is linear between `divdamp_z` and
/// `divdamp_z2` and quadratic between `divdamp_z2` and `divdamp_z4`:
///
/// ```text
/// alin = (fac2 − fac) / (z2 − z)
/// bqdr = (df42·dz32 − df32·dz42) / (dz32·dz42·(dz42 − dz32))
/// aqdr = df32/dz32 − bqdr·dz32
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NonHydrostaticParams {
    pub alin: f64,
    pub df32: f64,
    pub dz32: f64,
    pub df42: f64,
    pub dz42: f64,
    pub bqdr: f64,
    pub aqdr: f64,
    /// Weight of the `now` velocity tendency in the corrector.
    pub wgt_nnow_vel: f64,
    /// Weight of the `new` velocity tendency in the corrector.
    pub wgt_nnew_vel: f64,
    /// Weight of the `now` density and theta at interfaces.
    pub wgt_nnow_rth: f64,
    /// Weight of the predicted density and theta at interfaces.
    pub wgt_nnew_rth: f64,
    /// Inverse number of substeps, for flux averaging.
    pub r_nsubsteps: f64,
}

impl NonHydrostaticParams {
    /// Validate `config` and derive the parameters.
    pub fn new(config: &NonHydrostaticConfig) -> ConfigResult<Self> {
        config.validate()?;

        let alin = (config.divdamp_fac2 - config.divdamp_fac) / (config.divdamp_z2 - config.divdamp_z);
        let df32 = config.divdamp_fac3 - config.divdamp_fac2;
        let dz32 = config.divdamp_z3 - config.divdamp_z2;
        let df42 = config.divdamp_fac4 - config.divdamp_fac2;
        let dz42 = config.divdamp_z4 - config.divdamp_z2;
        let bqdr = (df42 * dz32 - df32 * dz42) / (dz32 * dz42 * (dz42 - dz32));
        let aqdr = df32 / dz32 - bqdr * dz32;

        Ok(Self {
            alin,
            df32,
            dz32,
            df42,
            dz42,
            bqdr,
            aqdr,
            wgt_nnow_vel: 0.5 - config.veladv_offctr,
            wgt_nnew_vel: 0.5 + config.veladv_offctr,
            wgt_nnow_rth: 0.5 - config.rhotheta_offctr,
            wgt_nnew_rth: 0.5 + config.rhotheta_offctr,
            r_nsubsteps: 1.0 / config.ndyn_substeps as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use approx::assert_relative_eq;

    #[test]
    fn test_quadratic_passes_through_reference_factors() {
        let config = NonHydrostaticConfig {
            divdamp_fac3: 0.006,
            divdamp_fac4: 0.01,
            ..Default::default()
        };
        let p = NonHydrostaticParams::new(&config).unwrap();
        let quad = |dz: f64| config.divdamp_fac2 + dz * (p.aqdr + dz * p.bqdr);
        assert_relative_eq!(quad(p.dz32), config.divdamp_fac3, epsilon = 1e-15);
        assert_relative_eq!(quad(p.dz42), config.divdamp_fac4, epsilon = 1e-15);
    }

    #[test]
    fn test_offcentering_weights_sum_to_one() {
        let p = NonHydrostaticParams::new(&NonHydrostaticConfig::default()).unwrap();
        assert_relative_eq!(p.wgt_nnow_vel + p.wgt_nnew_vel, 1.0);
        assert_relative_eq!(p.wgt_nnow_rth, 0.6);
        assert_relative_eq!(p.r_nsubsteps, 0.2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = NonHydrostaticConfig {
            l_open_ubc: true,
            ..Default::default()
        };
        assert!(matches!(
            NonHydrostaticParams::new(&config),
            Err(ConfigError::NotImplemented { option: "l_open_ubc", .. })
        ));
    }
}
