//! Angular geometry on the celestial sphere.
//!
//! All positions are (RA, Dec) in degrees. Separations use the haversine
//! form, which stays accurate at the sub-arcsecond scales used for
//! crossmatching and is exactly symmetric in its two arguments.

/// Arcseconds per degree.
pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Convert arcseconds to degrees.
pub fn arcsec_to_deg(arcsec: f64) -> f64 {
    arcsec / ARCSEC_PER_DEG
}

/// Convert degrees to arcseconds.
pub fn deg_to_arcsec(deg: f64) -> f64 {
    deg * ARCSEC_PER_DEG
}

/// Wrap an RA difference in degrees into `[-180, 180)`.
pub fn wrap_ra_delta(delta: f64) -> f64 {
    (delta + 180.0).rem_euclid(360.0) - 180.0
}

/// Great-circle separation between two sky positions, in degrees.
pub fn angular_separation_deg(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let dec1_rad = dec1.to_radians();
    let dec2_rad = dec2.to_radians();
    let half_ddec = ((dec2 - dec1).abs().to_radians() / 2.0).sin();
    let half_dra = ((ra2 - ra1).abs().to_radians() / 2.0).sin();

    let hav = half_ddec * half_ddec + dec1_rad.cos() * dec2_rad.cos() * half_dra * half_dra;
    (2.0 * hav.clamp(0.0, 1.0).sqrt().asin()).to_degrees()
}

/// Great-circle separation between two sky positions, in arcseconds.
pub fn angular_separation_arcsec(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    deg_to_arcsec(angular_separation_deg(ra1, dec1, ra2, dec2))
}

/// Declination-corrected bounding box around a sky position.
///
/// Half-width is `radius / cos(dec)` in RA and `radius` in Dec. This is a
/// cheap superset test only: anything inside still needs an exact
/// separation check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreselectBox {
    pub ra: f64,
    pub dec: f64,
    /// Half-width in RA (degrees). `None` when the box spans all RA.
    pub ra_half_width: Option<f64>,
    /// Half-width in Dec (degrees).
    pub dec_half_width: f64,
}

impl PreselectBox {
    /// Build the box of angular `radius` (degrees) around `(ra, dec)`.
    pub fn new(ra: f64, dec: f64, radius: f64) -> Self {
        let cos_dec = dec.to_radians().cos();
        // Near a pole the circle wraps every meridian.
        let ra_half_width = if dec.abs() + radius >= 90.0 || cos_dec <= 0.0 {
            None
        } else {
            let width = radius / cos_dec;
            (width < 180.0).then_some(width)
        };

        Self {
            ra,
            dec,
            ra_half_width,
            dec_half_width: radius,
        }
    }

    /// Lowest declination covered by the box.
    pub fn dec_min(&self) -> f64 {
        self.dec - self.dec_half_width
    }

    /// Highest declination covered by the box.
    pub fn dec_max(&self) -> f64 {
        self.dec + self.dec_half_width
    }

    /// Whether `(ra, dec)` falls strictly inside the box.
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        if dec <= self.dec_min() || dec >= self.dec_max() {
            return false;
        }
        match self.ra_half_width {
            None => true,
            Some(width) => wrap_ra_delta(ra - self.ra).abs() < width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn separation_of_identical_points_is_zero() {
        assert_eq!(angular_separation_deg(10.0, 20.0, 10.0, 20.0), 0.0);
        assert_eq!(angular_separation_deg(359.9, -89.0, 359.9, -89.0), 0.0);
    }

    #[rstest]
    #[case(10.0, 20.0, 10.0002, 20.0001)]
    #[case(0.0, 0.0, 359.9999, 0.0001)]
    #[case(123.4, -45.6, 200.0, 30.0)]
    #[case(0.0, 89.9999, 180.0, 89.9999)]
    fn separation_is_symmetric(
        #[case] ra1: f64,
        #[case] dec1: f64,
        #[case] ra2: f64,
        #[case] dec2: f64,
    ) {
        assert_eq!(
            angular_separation_deg(ra1, dec1, ra2, dec2),
            angular_separation_deg(ra2, dec2, ra1, dec1)
        );
    }

    #[test]
    fn known_separations() {
        assert_relative_eq!(angular_separation_deg(0.0, 0.0, 90.0, 0.0), 90.0, epsilon = 1e-10);
        assert_relative_eq!(angular_separation_deg(0.0, 0.0, 180.0, 0.0), 180.0, epsilon = 1e-10);
        assert_relative_eq!(angular_separation_deg(0.0, -90.0, 0.0, 90.0), 180.0, epsilon = 1e-10);
        // One arcsecond along the equator
        assert_relative_eq!(
            angular_separation_arcsec(0.0, 0.0, 1.0 / 3600.0, 0.0),
            1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn separation_across_ra_zero() {
        let sep = angular_separation_arcsec(359.9999, 0.0, 0.0001, 0.0);
        assert_relative_eq!(sep, 0.72, epsilon = 1e-6);
    }

    #[test]
    fn ra_offsets_shrink_with_declination() {
        let at_equator = angular_separation_arcsec(10.0, 0.0, 10.001, 0.0);
        let at_sixty = angular_separation_arcsec(10.0, 60.0, 10.001, 60.0);
        assert_relative_eq!(at_sixty, at_equator * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn wrap_ra_delta_range() {
        assert_relative_eq!(wrap_ra_delta(359.0), -1.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_ra_delta(-359.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_ra_delta(10.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn box_width_corrects_for_declination() {
        let radius = arcsec_to_deg(1.0);
        let b = PreselectBox::new(10.0, 60.0, radius);
        let width = b.ra_half_width.unwrap();
        assert_relative_eq!(width, 2.0 * radius, epsilon = 1e-12);
        assert!(b.contains(10.0 + 1.5 * radius, 60.0));
        assert!(!b.contains(10.0 + 2.5 * radius, 60.0));
        assert!(!b.contains(10.0, 60.0 + 1.5 * radius));
    }

    #[test]
    fn box_handles_ra_wraparound() {
        let radius = arcsec_to_deg(1.0);
        let b = PreselectBox::new(0.0, 0.0, radius);
        assert!(b.contains(360.0 - 0.5 * radius, 0.0));
        assert!(!b.contains(180.0, 0.0));
    }

    #[test]
    fn box_at_pole_spans_all_ra() {
        let radius = arcsec_to_deg(1.0);
        let b = PreselectBox::new(42.0, 90.0 - 0.5 * radius, radius);
        assert!(b.ra_half_width.is_none());
        assert!(b.contains(222.0, 90.0 - 0.2 * radius));
    }

    #[test]
    fn box_contains_everything_within_radius() {
        let radius = arcsec_to_deg(1.0);
        let (ra0, dec0) = (150.0, -30.0);
        let b = PreselectBox::new(ra0, dec0, radius);
        for i in 0..36 {
            let angle = (i as f64 * 10.0).to_radians();
            let r = 0.99 * radius;
            let ra = ra0 + r * angle.cos() / dec0.to_radians().cos();
            let dec = dec0 + r * angle.sin();
            assert!(angular_separation_deg(ra0, dec0, ra, dec) < radius);
            assert!(b.contains(ra, dec), "point at {i}0 deg escaped the box");
        }
    }
}
