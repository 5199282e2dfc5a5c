//! Physical constants of the dry atmosphere.
//!
//! Values follow the ICON model conventions.

/// Gas constant of dry air [J/(kg K)].
pub const RD: f64 = 287.04;

/// Specific heat of dry air at constant pressure [J/(kg K)].
pub const CPD: f64 = 1004.64;

/// Specific heat of dry air at constant volume [J/(kg K)].
pub const CVD: f64 = CPD - RD;

/// `cvd / rd`
pub const CVD_O_RD: f64 = CVD / RD;

/// `rd / cpd`
pub const RD_O_CPD: f64 = RD / CPD;

/// `rd / cvd`
pub const RD_O_CVD: f64 = RD / CVD;

/// Gas constant of water vapour [J/(kg K)].
pub const RV: f64 = 461.51;

/// Gravitational acceleration [m/s^2].
pub const GRAV: f64 = 9.80665;

/// `grav / cpd`
pub const GRAV_O_CPD: f64 = GRAV / CPD;

/// Reference pressure for the Exner function [Pa].
pub const P0REF: f64 = 100_000.0;

/// `rd / p0ref`
pub const RD_O_P0REF: f64 = RD / P0REF;

/// Machine epsilon for double precision.
pub const DBL_EPS: f64 = f64::EPSILON;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants_consistent() {
        assert!((CVD_O_RD * RD_O_CVD - 1.0).abs() < 1e-14);
        assert!((CVD + RD - CPD).abs() < 1e-12);
        assert!(RD_O_CPD > 0.28 && RD_O_CPD < 0.29);
    }
}
