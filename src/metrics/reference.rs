//! Analytic reference atmosphere.
//!
//! The dynamical core integrates perturbations from a hydrostatically
//! balanced reference state. The profile has a temperature that decays
//! exponentially from `t0sl_bg` at sea level towards `t0sl_bg − del_t_bg`
//! aloft:
//!
//! ```text
//! T(z)   = (t0 − Δt) + Δt · exp(−z / H)
//! p(z)   = p0sl · exp(−g/rd · H/(t0 − Δt) · ln((exp(z/H)(t0 − Δt) + Δt) / t0))
//! π(z)   = (p / p0ref)^(rd/cpd)
//! ρ(z)   = p / (rd · T)
//! θ(z)   = T / π
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::{CPD, GRAV, P0REF, RD, RD_O_CPD};

/// Parameters of the reference atmosphere.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceAtmosphere {
    /// Sea-level temperature [K].
    pub t0sl_bg: f64,
    /// Temperature difference between sea level and the stratosphere [K].
    pub del_t_bg: f64,
    /// Scale height of the temperature decay [m].
    pub h_scal_bg: f64,
    /// Sea-level pressure [Pa].
    pub p0sl_bg: f64,
}

impl Default for ReferenceAtmosphere {
    fn default() -> Self {
        Self {
            t0sl_bg: 288.15,
            del_t_bg: 75.0,
            h_scal_bg: 10_000.0,
            p0sl_bg: 101_325.0,
        }
    }
}

impl ReferenceAtmosphere {
    /// Temperature [K].
    pub fn temperature(&self, z: f64) -> f64 {
        (self.t0sl_bg - self.del_t_bg) + self.del_t_bg * (-z / self.h_scal_bg).exp()
    }

    /// Pressure [Pa].
    pub fn pressure(&self, z: f64) -> f64 {
        let t_strat = self.t0sl_bg - self.del_t_bg;
        let arg = ((z / self.h_scal_bg).exp() * t_strat + self.del_t_bg) / self.t0sl_bg;
        self.p0sl_bg * (-GRAV / RD * self.h_scal_bg / t_strat * arg.ln()).exp()
    }

    /// Exner pressure.
    pub fn exner(&self, z: f64) -> f64 {
        (self.pressure(z) / P0REF).powf(RD_O_CPD)
    }

    /// Density [kg/m³].
    pub fn density(&self, z: f64) -> f64 {
        self.pressure(z) / (RD * self.temperature(z))
    }

    /// Virtual potential temperature [K].
    pub fn theta_v(&self, z: f64) -> f64 {
        self.temperature(z) / self.exner(z)
    }

    /// Vertical derivative of the Exner pressure, `−g / (cpd θ)`.
    pub fn d_exner_dz(&self, z: f64) -> f64 {
        -GRAV / (CPD * self.theta_v(z))
    }

    /// First factor of the second Exner derivative, `−g / (cpd θ²)`.
    pub fn d2dexdz2_fac1(&self, z: f64) -> f64 {
        let theta = self.theta_v(z);
        -GRAV / (CPD * theta * theta)
    }

    /// Second factor of the second Exner derivative.
    pub fn d2dexdz2_fac2(&self, z: f64) -> f64 {
        let theta = self.theta_v(z);
        2.0 * GRAV / (CPD * theta.powi(3))
            * (GRAV / RD - self.del_t_bg / self.h_scal_bg * (-z / self.h_scal_bg).exp())
            / self.exner(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sea_level_values() {
        let r = ReferenceAtmosphere::default();
        assert_relative_eq!(r.temperature(0.0), 288.15);
        assert_relative_eq!(r.pressure(0.0), 101_325.0, max_relative = 1e-12);
        assert!(r.density(0.0) > 1.2 && r.density(0.0) < 1.3);
    }

    #[test]
    fn test_hydrostatic_balance() {
        // dp/dz = -rho g, checked with a centered difference.
        let r = ReferenceAtmosphere::default();
        for z in [500.0, 5000.0, 20_000.0] {
            let dz = 1.0;
            let dpdz = (r.pressure(z + dz) - r.pressure(z - dz)) / (2.0 * dz);
            assert_relative_eq!(dpdz, -r.density(z) * GRAV, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_exner_derivative() {
        let r = ReferenceAtmosphere::default();
        let z = 3000.0;
        let dz = 0.5;
        let numeric = (r.exner(z + dz) - r.exner(z - dz)) / (2.0 * dz);
        assert_relative_eq!(numeric, r.d_exner_dz(z), max_relative = 1e-6);
    }

    #[test]
    fn test_theta_increases_with_height() {
        let r = ReferenceAtmosphere::default();
        assert!(r.theta_v(10_000.0) > r.theta_v(0.0));
    }
}
