//! Instrumental flux to calibrated magnitude conversion.

use std::f64::consts::LN_10;

/// Zeropoint of the HSC coadds in the current deployment.
pub const DEFAULT_ZEROPOINT: f64 = 27.0;

/// `mag = -2.5 * log10(flux) + zeropoint`.
///
/// Only meaningful for positive flux; callers filter first.
pub fn flux_to_mag(flux: f64, zeropoint: f64) -> f64 {
    -2.5 * flux.log10() + zeropoint
}

/// First-order propagated magnitude error, `|-2.5 / (ln(10) * flux) * flux_err|`.
pub fn flux_err_to_mag_err(flux: f64, flux_err: f64) -> f64 {
    (-2.5 / (LN_10 * flux) * flux_err).abs()
}

/// Whether a flux value can be converted to a magnitude.
pub fn is_usable_flux(flux: f64) -> bool {
    flux.is_finite() && flux > 0.0
}
