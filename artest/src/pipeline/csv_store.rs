use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use super::{DataId, ForcedSource, Measurement, PipelineStore};
use crate::error::{ArtestError, Result};

/// Pipeline store backed by per-patch CSV exports of the rerun tables.
///
/// Layout under `root`:
/// ```text
/// deepCoadd-results/{filter}/{tract}/{patch}/forced_src-{filter}-{tract}-{patch}.csv
/// deepCoadd-results/{filter}/{tract}/{patch}/meas-{filter}-{tract}-{patch}.csv
/// ```
#[derive(Debug, Clone)]
pub struct CsvPatchStore {
    root: PathBuf,
}

impl CsvPatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory listing the patches of one filter/tract.
    pub fn tract_dir(&self, filter: &str, tract: i64) -> PathBuf {
        self.root
            .join("deepCoadd-results")
            .join(filter)
            .join(tract.to_string())
    }

    pub fn forced_src_path(&self, data_id: &DataId) -> PathBuf {
        self.patch_file(data_id, "forced_src")
    }

    pub fn meas_path(&self, data_id: &DataId) -> PathBuf {
        self.patch_file(data_id, "meas")
    }

    fn patch_file(&self, data_id: &DataId, dataset: &str) -> PathBuf {
        self.tract_dir(&data_id.filter, data_id.tract)
            .join(&data_id.patch)
            .join(format!(
                "{dataset}-{}-{}-{}.csv",
                data_id.filter, data_id.tract, data_id.patch
            ))
    }
}

fn read_table<T: DeserializeOwned>(path: &Path, data_id: &DataId) -> Result<Vec<T>> {
    let unavailable = |reason: String| ArtestError::DataAccess {
        what: data_id.to_string(),
        reason,
    };

    if !path.exists() {
        return Err(unavailable(format!("{} does not exist", path.display())));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;

    reader
        .deserialize()
        .map(|row| row.map_err(|e| unavailable(format!("{}: {e}", path.display()))))
        .collect()
}

impl PipelineStore for CsvPatchStore {
    fn patches(&self, filter: &str, tract: i64) -> Result<Vec<String>> {
        let dir = self.tract_dir(filter, tract);
        let entries = std::fs::read_dir(&dir).map_err(|e| ArtestError::DataAccess {
            what: format!("tract={tract} filter={filter}"),
            reason: format!("{}: {e}", dir.display()),
        })?;

        let mut patches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArtestError::io(&dir, e))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    patches.push(name.to_string());
                }
            }
        }
        patches.sort();
        Ok(patches)
    }

    fn forced_sources(&self, data_id: &DataId) -> Result<Vec<ForcedSource>> {
        read_table(&self.forced_src_path(data_id), data_id)
    }

    fn measurements(&self, data_id: &DataId) -> Result<Vec<Measurement>> {
        read_table(&self.meas_path(data_id), data_id)
    }
}
