//! Run configuration for an artificial star test workspace.
//!
//! Loaded from `config.json` in the workspace directory and validated as a
//! whole at load time, so a missing filter or directory is reported before
//! any catalog is touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArtestError, Result};
use crate::photometry::DEFAULT_ZEROPOINT;

/// Default config file name inside a workspace.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default results table name inside a workspace.
pub const RESULTS_FILE_NAME: &str = "matches.csv";

/// One configured filter band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Pipeline filter name, e.g. `HSC-G`
    pub name: String,
    /// Per-filter zeropoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zeropoint: Option<f64>,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zeropoint: None,
        }
    }
}

/// Where the flat catalogs live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirsConfig {
    /// Directory holding `input_{filter}_{runkey}.txt` injected-star lists
    pub input: PathBuf,
    /// Directory holding `output_{filter}_{runkey}.csv` detection tables
    pub output: PathBuf,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input"),
            output: PathBuf::from("output"),
        }
    }
}

/// Requirements for an acceptable match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Maximum (exclusive) angular separation in arcseconds
    pub max_separation_arcsec: f64,
    /// Maximum (exclusive) |detected - injected| magnitude difference
    pub max_mag_offset: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_separation_arcsec: 1.0,
            max_mag_offset: 0.1,
        }
    }
}

/// Complete configuration for one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Tract holding the injected stars
    pub tract: i64,
    /// Original pipeline rerun directory
    pub rerun: PathBuf,
    /// Root of the artificial-star rerun. Defaults to `artest` next to `rerun`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_root: Option<PathBuf>,
    /// Photometric zeropoint applied unless a filter overrides it
    #[serde(default = "default_zeropoint")]
    pub zeropoint: f64,
    /// Filters in run-key order
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub dirs: DirsConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

fn default_zeropoint() -> f64 {
    DEFAULT_ZEROPOINT
}

impl RunConfig {
    /// Load and validate `path`.
    ///
    /// Relative `dirs` entries are resolved against `workdir`.
    pub fn load(path: &Path, workdir: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ArtestError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        let json = std::fs::read_to_string(path).map_err(|e| ArtestError::io(path, e))?;
        let mut config: RunConfig = serde_json::from_str(&json)
            .map_err(|e| ArtestError::Config(format!("{}: {e}", path.display())))?;
        config.resolve_paths(workdir);
        config.validate()?;
        Ok(config)
    }

    /// Load `config.json` from a workspace directory.
    pub fn load_from_workdir(workdir: &Path) -> Result<Self> {
        Self::load(&workdir.join(CONFIG_FILE_NAME), workdir)
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ArtestError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, json).map_err(|e| ArtestError::io(path, e))
    }

    fn resolve_paths(&mut self, workdir: &Path) {
        for dir in [&mut self.dirs.input, &mut self.dirs.output] {
            if dir.is_relative() {
                *dir = workdir.join(&*dir);
            }
        }
    }

    /// Check every invariant the builder and the engine rely on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ArtestError::Config(msg));

        if self.filters.is_empty() {
            return invalid("at least one filter must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for filter in &self.filters {
            let name = filter.name.as_str();
            if name.is_empty() {
                return invalid("filter names must not be empty".to_string());
            }
            // Names end up in file names, column names and run-key positions.
            if name.contains(['/', '\\', '_', ',', '"']) || name.chars().any(char::is_whitespace) {
                return invalid(format!(
                    "filter name '{name}' may not contain '/', '\\', '_', ',', quotes or whitespace"
                ));
            }
            if !seen.insert(name) {
                return invalid(format!("filter '{name}' is listed twice"));
            }
            if let Some(zp) = filter.zeropoint {
                if !zp.is_finite() {
                    return invalid(format!("zeropoint for filter '{name}' is not finite"));
                }
            }
        }

        if !self.zeropoint.is_finite() {
            return invalid("zeropoint is not finite".to_string());
        }
        if !(self.matching.max_separation_arcsec > 0.0) {
            return invalid("matching.max_separation_arcsec must be positive".to_string());
        }
        if !(self.matching.max_mag_offset > 0.0) {
            return invalid("matching.max_mag_offset must be positive".to_string());
        }
        Ok(())
    }

    /// Filter names in run-key order.
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name.as_str()).collect()
    }

    /// Zeropoint for `filter`, honouring per-filter overrides.
    pub fn zeropoint_for(&self, filter: &FilterConfig) -> f64 {
        filter.zeropoint.unwrap_or(self.zeropoint)
    }

    /// Root of the pipeline store holding the artificial-star rerun.
    pub fn store_root(&self) -> PathBuf {
        match &self.store_root {
            Some(root) => root.clone(),
            None => self
                .rerun
                .parent()
                .map(|parent| parent.join("artest"))
                .unwrap_or_else(|| PathBuf::from("artest")),
        }
    }
}
