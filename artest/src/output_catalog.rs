//! Output catalog builder.
//!
//! Converts the pipeline's per-patch forced photometry into the flat
//! `id,ra,dec,mag,mag_err,flag` table the crossmatch engine reads. Only
//! detections with positive flux whose footprint is centred on an injected
//! star are kept.

use std::path::PathBuf;

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::catalog::detected::write_detected_sources_to;
use crate::catalog::{detected_catalog_path, DetectedSource};
use crate::config::RunConfig;
use crate::error::{ArtestError, Result};
use crate::photometry::{flux_err_to_mag_err, flux_to_mag, is_usable_flux};
use crate::pipeline::{DataId, PipelineStore};
use crate::run_key::RunKey;

/// Per-filter bookkeeping from one builder pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    pub filter: String,
    pub patches: usize,
    /// Rows read from the pipeline
    pub total_sources: usize,
    /// Rows dropped for non-positive or non-finite flux
    pub rejected_flux: usize,
    /// Rows dropped because the fake-center flag was unset
    pub rejected_not_fake: usize,
    /// Rows written
    pub kept: usize,
}

/// Collect the detected-source table for one filter/tract.
///
/// Patches are visited in sorted order so the result does not depend on the
/// store's listing order.
pub fn build_detected_sources<S: PipelineStore + ?Sized>(
    store: &S,
    filter: &str,
    tract: i64,
    zeropoint: f64,
) -> Result<(Vec<DetectedSource>, BuildSummary)> {
    let mut patches = store.patches(filter, tract)?;
    if patches.is_empty() {
        return Err(ArtestError::DataAccess {
            what: format!("tract={tract} filter={filter}"),
            reason: "no patches available".to_string(),
        });
    }
    patches.sort();

    let mut summary = BuildSummary {
        filter: filter.to_string(),
        patches: patches.len(),
        total_sources: 0,
        rejected_flux: 0,
        rejected_not_fake: 0,
        kept: 0,
    };
    let mut sources = Vec::new();

    for patch in &patches {
        let data_id = DataId::new(tract, patch.as_str(), filter);
        let forced = store.forced_sources(&data_id)?;
        let meas = store.measurements(&data_id)?;

        if forced.len() != meas.len() {
            return Err(ArtestError::DataAccess {
                what: data_id.to_string(),
                reason: format!(
                    "forced source table has {} rows but measurement table has {}",
                    forced.len(),
                    meas.len()
                ),
            });
        }

        let before = sources.len();
        for (src, m) in forced.iter().zip(&meas) {
            if src.id != m.id {
                return Err(ArtestError::DataAccess {
                    what: data_id.to_string(),
                    reason: format!("source id {} paired with measurement id {}", src.id, m.id),
                });
            }
            summary.total_sources += 1;

            if !is_usable_flux(src.psf_flux) {
                summary.rejected_flux += 1;
                continue;
            }
            if !m.fake_center {
                summary.rejected_not_fake += 1;
                continue;
            }

            sources.push(DetectedSource {
                id: src.id,
                ra: src.coord_ra,
                dec: src.coord_dec,
                mag: flux_to_mag(src.psf_flux, zeropoint),
                mag_err: flux_err_to_mag_err(src.psf_flux, src.psf_flux_err),
                flag: m.fake_center,
            });
        }
        debug!(
            "{data_id}: {} rows, {} injected sources kept",
            forced.len(),
            sources.len() - before
        );
    }

    summary.kept = sources.len();
    if sources.is_empty() {
        return Err(ArtestError::EmptyResult {
            filter: filter.to_string(),
            tract,
        });
    }
    Ok((sources, summary))
}

/// Build and write the output catalog of every configured filter.
///
/// All filters are built and staged in temp files before any catalog is put
/// in place. If placing one fails, catalogs this call newly created are
/// removed again.
pub fn write_output_catalogs<S: PipelineStore + ?Sized>(
    store: &S,
    config: &RunConfig,
    run_key: &RunKey,
) -> Result<Vec<(PathBuf, BuildSummary)>> {
    let mut built = Vec::with_capacity(config.filters.len());
    for filter in &config.filters {
        let zeropoint = config.zeropoint_for(filter);
        built.push(build_detected_sources(store, &filter.name, config.tract, zeropoint)?);
    }

    let out_dir = &config.dirs.output;
    std::fs::create_dir_all(out_dir).map_err(|e| ArtestError::io(out_dir, e))?;

    let mut staged = Vec::with_capacity(built.len());
    for (sources, summary) in built {
        let path = detected_catalog_path(out_dir, &summary.filter, run_key.as_str());
        let mut tmp = NamedTempFile::new_in(out_dir).map_err(|e| ArtestError::io(out_dir, e))?;
        write_detected_sources_to(tmp.as_file_mut(), &path, &sources)?;
        staged.push((tmp, path, summary));
    }

    let mut created: Vec<PathBuf> = Vec::new();
    let mut written = Vec::with_capacity(staged.len());
    for (tmp, path, summary) in staged {
        let existed = path.exists();
        if let Err(e) = tmp.persist(&path) {
            for stale in &created {
                if let Err(rm) = std::fs::remove_file(stale) {
                    warn!("Could not remove {}: {rm}", stale.display());
                }
            }
            return Err(ArtestError::io(&path, e.error));
        }
        if !existed {
            created.push(path.clone());
        }
        info!(
            "{}: kept {}/{} sources from {} patches ({} bad flux, {} not injected) -> {}",
            summary.filter,
            summary.kept,
            summary.total_sources,
            summary.patches,
            summary.rejected_flux,
            summary.rejected_not_fake,
            path.display()
        );
        written.push((path, summary));
    }
    Ok(written)
}
