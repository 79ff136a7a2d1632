//! Fixture workspaces for artificial star test suites.
//!
//! A [`FixtureWorkspace`] is a scratch directory laid out the way the
//! `output-catalog` and `crossmatch` tools expect:
//!
//! ```text
//! <root>/
//! ├── config.json
//! ├── input/             # input_{filter}_{runkey}.txt
//! ├── output/            # output_{filter}_{runkey}.csv
//! └── store/deepCoadd-results/{filter}/{tract}/{patch}/
//!     ├── forced_src-{filter}-{tract}-{patch}.csv
//!     └── meas-{filter}-{tract}-{patch}.csv
//! ```
//!
//! Files are written as plain text so fixtures do not depend on the code
//! under test.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Errors raised while setting up fixtures.
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Fixture I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fixture text could not be formatted: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Fixture config could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of a detected-source fixture: `id, ra, dec, mag, mag_err, flag`.
pub type DetectedRow = (i64, f64, f64, f64, f64, bool);

/// One row of a patch export: `id, ra, dec, flux, flux_err, fake_center`.
pub type PatchRow = (i64, f64, f64, f64, f64, bool);

/// Scratch workspace removed on drop.
pub struct FixtureWorkspace {
    dir: TempDir,
    tract: i64,
}

impl FixtureWorkspace {
    /// Create a workspace for `filters` in `tract` and write its `config.json`.
    ///
    /// The pipeline store lives in `<root>/store`.
    pub fn new(filters: &[&str], tract: i64) -> Result<Self, TestHelperError> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("input"))?;
        std::fs::create_dir_all(dir.path().join("output"))?;

        let workspace = Self { dir, tract };
        let filters: Vec<_> = filters
            .iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect();
        workspace.write_config(serde_json::json!({
            "tract": tract,
            "rerun": workspace.root().join("rerun").join("m31"),
            "store_root": workspace.store_root(),
            "filters": filters,
        }))?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("config.json")
    }

    pub fn store_root(&self) -> PathBuf {
        self.root().join("store")
    }

    pub fn results_path(&self) -> PathBuf {
        self.root().join("matches.csv")
    }

    pub fn input_path(&self, filter: &str, run_key: &str) -> PathBuf {
        self.root()
            .join("input")
            .join(format!("input_{filter}_{run_key}.txt"))
    }

    pub fn output_path(&self, filter: &str, run_key: &str) -> PathBuf {
        self.root()
            .join("output")
            .join(format!("output_{filter}_{run_key}.csv"))
    }

    /// Overwrite `config.json` with `config`.
    pub fn write_config(&self, config: serde_json::Value) -> Result<(), TestHelperError> {
        std::fs::write(self.config_path(), serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    /// Write an injected-star list (`ra dec mag` per line).
    pub fn write_injected(
        &self,
        filter: &str,
        run_key: &str,
        stars: &[(f64, f64, f64)],
    ) -> Result<PathBuf, TestHelperError> {
        let mut text = String::new();
        for (ra, dec, mag) in stars {
            writeln!(text, "{ra} {dec} {mag}")?;
        }
        let path = self.input_path(filter, run_key);
        std::fs::write(&path, text)?;
        Ok(path)
    }

    /// Write a detected-source CSV with header.
    pub fn write_detected(
        &self,
        filter: &str,
        run_key: &str,
        rows: &[DetectedRow],
    ) -> Result<PathBuf, TestHelperError> {
        let mut text = String::from("id,ra,dec,mag,mag_err,flag\n");
        for (id, ra, dec, mag, mag_err, flag) in rows {
            writeln!(text, "{id},{ra},{dec},{mag},{mag_err},{flag}")?;
        }
        let path = self.output_path(filter, run_key);
        std::fs::write(&path, text)?;
        Ok(path)
    }

    /// Write the forced-source and measurement exports of one patch.
    pub fn write_patch(
        &self,
        filter: &str,
        patch: &str,
        rows: &[PatchRow],
    ) -> Result<PathBuf, TestHelperError> {
        let tract = self.tract;
        let dir = self
            .store_root()
            .join("deepCoadd-results")
            .join(filter)
            .join(tract.to_string())
            .join(patch);
        std::fs::create_dir_all(&dir)?;

        let mut forced =
            String::from("id,coord_ra,coord_dec,base_PsfFlux_instFlux,base_PsfFlux_instFluxErr\n");
        let mut meas = String::from("id,base_PixelFlags_flag_fakeCenter\n");
        for (id, ra, dec, flux, flux_err, fake) in rows {
            writeln!(forced, "{id},{ra},{dec},{flux},{flux_err}")?;
            writeln!(meas, "{id},{}", if *fake { "True" } else { "False" })?;
        }
        std::fs::write(dir.join(format!("forced_src-{filter}-{tract}-{patch}.csv")), forced)?;
        std::fs::write(dir.join(format!("meas-{filter}-{tract}-{patch}.csv")), meas)?;
        Ok(dir)
    }
}
