//! Crossmatch of injected stars against detected sources.
//!
//! A star counts as recovered when at least one detection with a compatible
//! magnitude and the fake-center flag lies strictly within the separation
//! radius. Matching is permissive: a detection may recover any number of
//! stars, and a star is counted once no matter how many detections qualify.

use log::{debug, info};
use rayon::prelude::*;

use crate::catalog::{
    detected_catalog_path, injected_catalog_path, read_detected_sources, read_injected_stars,
    DetectedSource, InjectedStar,
};
use crate::config::{FilterConfig, MatchingConfig, RunConfig};
use crate::error::{ArtestError, Result};
use crate::results::RunRecord;
use crate::run_key::RunKey;
use crate::sky::{angular_separation_arcsec, arcsec_to_deg, PreselectBox};

/// Recovery statistics of one filter in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRunStats {
    pub filter: String,
    /// Injected magnitude of the run in this filter
    pub mag: f64,
    pub matches: usize,
    pub total: usize,
    /// `matches / total`
    pub ratio: f64,
    /// `sqrt(matches) / total`
    pub ratio_err: f64,
}

impl FilterRunStats {
    /// Derive ratio and Poisson-style uncertainty from raw counts.
    ///
    /// # Errors
    /// [`ArtestError::DivisionByZero`] when `total` is zero.
    pub fn compute(filter: &str, mag: f64, matches: usize, total: usize) -> Result<Self> {
        if total == 0 {
            return Err(ArtestError::DivisionByZero {
                filter: filter.to_string(),
            });
        }
        let n = total as f64;
        Ok(Self {
            filter: filter.to_string(),
            mag,
            matches,
            total,
            ratio: matches as f64 / n,
            ratio_err: (matches as f64).sqrt() / n,
        })
    }
}

/// Detections eligible for matching at `target_mag`, sorted by declination.
fn candidates<'a>(
    sources: &'a [DetectedSource],
    target_mag: f64,
    max_mag_offset: f64,
) -> Vec<&'a DetectedSource> {
    let mut kept: Vec<&DetectedSource> = sources
        .iter()
        .filter(|s| s.flag && (s.mag - target_mag).abs() < max_mag_offset)
        .filter(|s| s.ra.is_finite() && s.dec.is_finite())
        .collect();
    kept.sort_by(|a, b| a.dec.total_cmp(&b.dec));
    kept
}

/// Whether any candidate (sorted by dec) lies within `max_sep_arcsec` of `star`.
fn is_recovered(star: &InjectedStar, sorted: &[&DetectedSource], max_sep_arcsec: f64) -> bool {
    let window = PreselectBox::new(star.ra, star.dec, arcsec_to_deg(max_sep_arcsec));
    let start = sorted.partition_point(|s| s.dec <= window.dec_min());

    sorted[start..]
        .iter()
        .take_while(|s| s.dec < window.dec_max())
        .filter(|s| window.contains(s.ra, s.dec))
        .any(|s| angular_separation_arcsec(star.ra, star.dec, s.ra, s.dec) < max_sep_arcsec)
}

/// Number of `stars` recovered by `sources` at injected magnitude `target_mag`.
pub fn count_matches(
    stars: &[InjectedStar],
    sources: &[DetectedSource],
    target_mag: f64,
    matching: &MatchingConfig,
) -> usize {
    let sorted = candidates(sources, target_mag, matching.max_mag_offset);
    if sorted.is_empty() {
        return 0;
    }
    stars
        .iter()
        .filter(|star| is_recovered(star, &sorted, matching.max_separation_arcsec))
        .count()
}

/// Load both catalogs of one filter and compute its statistics.
pub fn crossmatch_filter(
    config: &RunConfig,
    filter: &FilterConfig,
    target_mag: f64,
    run_key: &RunKey,
) -> Result<FilterRunStats> {
    let input = injected_catalog_path(&config.dirs.input, &filter.name, run_key.as_str());
    let output = detected_catalog_path(&config.dirs.output, &filter.name, run_key.as_str());

    let stars = read_injected_stars(&input)?;
    let sources = read_detected_sources(&output)?;
    debug!(
        "{}: {} injected stars from {}, {} detections from {}",
        filter.name,
        stars.len(),
        input.display(),
        sources.len(),
        output.display()
    );

    let matches = count_matches(&stars, &sources, target_mag, &config.matching);
    let stats = FilterRunStats::compute(&filter.name, target_mag, matches, stars.len())?;
    info!(
        "{} at mag {}: recovered {}/{} (ratio {:.4} +/- {:.4})",
        stats.filter, stats.mag, stats.matches, stats.total, stats.ratio, stats.ratio_err
    );
    Ok(stats)
}

/// Crossmatch every configured filter of one run.
///
/// Filters run in parallel; the record keeps configuration order. Any
/// failing filter fails the whole run.
pub fn run_crossmatch(config: &RunConfig, run_key: &RunKey) -> Result<RunRecord> {
    if run_key.magnitudes().len() != config.filters.len() {
        return Err(ArtestError::InvalidRunKey {
            key: run_key.to_string(),
            reason: format!(
                "{} magnitudes given for {} configured filters",
                run_key.magnitudes().len(),
                config.filters.len()
            ),
        });
    }

    let stats = config
        .filters
        .par_iter()
        .zip(run_key.magnitudes().par_iter())
        .map(|(filter, &mag)| crossmatch_filter(config, filter, mag, run_key))
        .collect::<Result<Vec<_>>>()?;

    Ok(RunRecord::new(run_key.as_str(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn source(id: i64, ra: f64, dec: f64, mag: f64, flag: bool) -> DetectedSource {
        DetectedSource {
            id,
            ra,
            dec,
            mag,
            mag_err: 0.02,
            flag,
        }
    }

    fn stats_for(stars: &[InjectedStar], sources: &[DetectedSource], mag: f64) -> FilterRunStats {
        let matches = count_matches(stars, sources, mag, &MatchingConfig::default());
        FilterRunStats::compute("g", mag, matches, stars.len()).unwrap()
    }

    #[test]
    fn close_detection_with_matching_magnitude_is_recovered() {
        let stars = [InjectedStar::new(10.0, 20.0, 24.0)];
        let sources = [source(1, 10.0002, 20.0001, 24.05, true)];

        let stats = stats_for(&stars, &sources, 24.0);
        assert_eq!(stats.matches, 1);
        assert_eq!(stats.total, 1);
        assert_relative_eq!(stats.ratio, 1.0);
        assert_relative_eq!(stats.ratio_err, 1.0);
    }

    #[test]
    fn distant_detection_is_not_recovered() {
        let stars = [InjectedStar::new(10.0, 20.0, 24.0)];
        // ~34 arcsec away
        let sources = [source(1, 10.01, 20.0, 24.0, true)];

        let stats = stats_for(&stars, &sources, 24.0);
        assert_eq!(stats.matches, 0);
        assert_eq!(stats.ratio, 0.0);
        assert_eq!(stats.ratio_err, 0.0);
    }

    #[rstest]
    #[case::magnitude_outside_window(24.1, true)]
    #[case::magnitude_far_off(25.0, true)]
    #[case::flag_unset(24.0, false)]
    fn ineligible_detections_never_match(#[case] mag: f64, #[case] flag: bool) {
        let stars = [InjectedStar::new(10.0, 20.0, 24.0)];
        let sources = [source(1, 10.0, 20.0, mag, flag)];
        assert_eq!(count_matches(&stars, &sources, 24.0, &MatchingConfig::default()), 0);
    }

    #[test]
    fn star_counts_once_with_several_detections() {
        let stars = [InjectedStar::new(10.0, 20.0, 24.0)];
        let sources = [
            source(1, 10.0, 20.0, 24.0, true),
            source(2, 10.0001, 20.0, 24.01, true),
            source(3, 10.0, 20.0001, 23.99, true),
        ];
        assert_eq!(count_matches(&stars, &sources, 24.0, &MatchingConfig::default()), 1);
    }

    #[test]
    fn one_detection_may_recover_several_stars() {
        let stars = [
            InjectedStar::new(10.0, 20.0, 24.0),
            InjectedStar::new(10.0, 20.0001, 24.0),
        ];
        let sources = [source(1, 10.0, 20.00005, 24.0, true)];
        assert_eq!(count_matches(&stars, &sources, 24.0, &MatchingConfig::default()), 2);
    }

    #[test]
    fn separation_limit_is_exclusive() {
        let stars = [InjectedStar::new(0.0, 0.0, 24.0)];
        // Exactly one arcsecond north along a meridian
        let sources = [source(1, 0.0, 1.0 / 3600.0, 24.0, true)];
        let sep = angular_separation_arcsec(0.0, 0.0, 0.0, 1.0 / 3600.0);

        let at_limit = MatchingConfig {
            max_separation_arcsec: sep,
            ..MatchingConfig::default()
        };
        assert_eq!(count_matches(&stars, &sources, 24.0, &at_limit), 0);

        let wider = MatchingConfig {
            max_separation_arcsec: sep * 1.01,
            ..MatchingConfig::default()
        };
        assert_eq!(count_matches(&stars, &sources, 24.0, &wider), 1);
    }

    #[test]
    fn matches_across_ra_wrap() {
        let stars = [InjectedStar::new(359.99995, 5.0, 24.0)];
        let sources = [source(1, 0.00005, 5.0, 24.0, true)];
        assert_eq!(count_matches(&stars, &sources, 24.0, &MatchingConfig::default()), 1);
    }

    #[test]
    fn matches_near_pole() {
        let stars = [InjectedStar::new(0.0, 89.99999, 24.0)];
        let sources = [source(1, 180.0, 89.99999, 24.0, true)];
        assert_eq!(count_matches(&stars, &sources, 24.0, &MatchingConfig::default()), 1);
    }

    #[test]
    fn high_declination_uses_widened_ra_window() {
        // 0.5 arcsec on the sky at dec 80 is ~2.9 arcsec of RA
        let dra = 0.5 / 3600.0 / 80f64.to_radians().cos();
        let stars = [InjectedStar::new(50.0, 80.0, 24.0)];
        let sources = [source(1, 50.0 + dra, 80.0, 24.0, true)];
        assert_eq!(count_matches(&stars, &sources, 24.0, &MatchingConfig::default()), 1);
    }

    #[test]
    fn tighter_thresholds_never_increase_matches() {
        let stars: Vec<InjectedStar> = (0..50)
            .map(|i| InjectedStar::new(10.0 + i as f64 * 0.01, 20.0, 24.0))
            .collect();
        let sources: Vec<DetectedSource> = (0..50)
            .map(|i| {
                let offset = i as f64 * 0.04 / 3600.0;
                source(i, 10.0 + i as f64 * 0.01 + offset, 20.0, 24.0 + i as f64 * 0.003, true)
            })
            .collect();

        let mut previous = usize::MAX;
        for sep in [3.0, 1.5, 1.0, 0.5, 0.1] {
            let matching = MatchingConfig {
                max_separation_arcsec: sep,
                max_mag_offset: 0.2,
            };
            let matches = count_matches(&stars, &sources, 24.0, &matching);
            assert!(matches <= previous, "sep {sep}: {matches} > {previous}");
            previous = matches;
        }

        let mut previous = usize::MAX;
        for offset in [0.5, 0.1, 0.05, 0.01] {
            let matching = MatchingConfig {
                max_separation_arcsec: 3.0,
                max_mag_offset: offset,
            };
            let matches = count_matches(&stars, &sources, 24.0, &matching);
            assert!(matches <= previous, "offset {offset}: {matches} > {previous}");
            previous = matches;
        }
    }

    #[rstest]
    #[case(0, 10)]
    #[case(3, 10)]
    #[case(10, 10)]
    #[case(1, 1)]
    fn ratio_stays_in_unit_interval(#[case] matches: usize, #[case] total: usize) {
        let stats = FilterRunStats::compute("g", 24.0, matches, total).unwrap();
        assert!((0.0..=1.0).contains(&stats.ratio));
        assert!(stats.ratio_err >= 0.0);
        assert_relative_eq!(stats.ratio_err, (matches as f64).sqrt() / total as f64);
    }

    #[test]
    fn zero_injected_stars_is_division_by_zero() {
        let err = FilterRunStats::compute("HSC-G", 24.0, 0, 0).unwrap_err();
        assert!(matches!(err, ArtestError::DivisionByZero { filter } if filter == "HSC-G"));
    }

    #[test]
    fn no_candidates_means_no_matches() {
        let stars = [InjectedStar::new(10.0, 20.0, 24.0)];
        assert_eq!(count_matches(&stars, &[], 24.0, &MatchingConfig::default()), 0);
    }
}
