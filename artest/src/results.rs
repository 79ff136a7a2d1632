//! Cumulative results table with a schema-drift guard.
//!
//! One CSV row per run: a `run` label followed by five stat columns per
//! filter. Every row of a table shares the same column set. A record whose
//! columns differ from an existing table never lands in it; it is written to
//! a table named after its own filter set instead, and the existing table is
//! backed up and left untouched.

use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{info, warn};
use tempfile::NamedTempFile;

use crate::config::RESULTS_FILE_NAME;
use crate::crossmatch::FilterRunStats;
use crate::error::{ArtestError, Result};

/// Column holding the run key of each row.
pub const RUN_COLUMN: &str = "run";

/// Per-filter suffixes, in record column order.
pub const STAT_SUFFIXES: [&str; 5] = ["mag", "matches", "total", "ratio", "ratio_err"];

/// Results of one run: per-filter stats in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_key: String,
    pub stats: Vec<FilterRunStats>,
}

impl RunRecord {
    pub fn new(run_key: impl Into<String>, stats: Vec<FilterRunStats>) -> Self {
        Self {
            run_key: run_key.into(),
            stats,
        }
    }

    /// Stat column names, `{filter}_{suffix}` for each filter in order.
    pub fn columns(&self) -> Vec<String> {
        self.stats
            .iter()
            .flat_map(|s| STAT_SUFFIXES.iter().map(move |suffix| format!("{}_{suffix}", s.filter)))
            .collect()
    }

    /// Formatted values aligned with [`Self::columns`].
    pub fn values(&self) -> Vec<String> {
        self.stats
            .iter()
            .flat_map(|s| {
                [
                    format_float(s.mag),
                    s.matches.to_string(),
                    s.total.to_string(),
                    format_float(s.ratio),
                    format_float(s.ratio_err),
                ]
            })
            .collect()
    }

    /// Filter names sorted, as used to name a diverted table.
    pub fn sorted_filters(&self) -> Vec<&str> {
        let mut filters: Vec<&str> = self.stats.iter().map(|s| s.filter.as_str()).collect();
        filters.sort_unstable();
        filters
    }

    /// Full header: `run` followed by the stat columns.
    fn header(&self) -> Vec<String> {
        std::iter::once(RUN_COLUMN.to_string())
            .chain(self.columns())
            .collect()
    }

    /// Row laid out along `header`. Columns absent from the record stay empty.
    fn row_for(&self, header: &[String]) -> Vec<String> {
        let values: HashMap<String, String> =
            self.columns().into_iter().zip(self.values()).collect();
        header
            .iter()
            .map(|column| {
                if column == RUN_COLUMN {
                    self.run_key.clone()
                } else {
                    values.get(column).cloned().unwrap_or_default()
                }
            })
            .collect()
    }
}

/// Shortest representation that reads back to the same `f64`.
fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// In-memory copy of a results table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultsTable {
    /// Read a table from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(false)
            .from_path(path)
            .map_err(|e| ArtestError::csv(path, e))?;
        let header = reader
            .headers()
            .map_err(|e| ArtestError::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ArtestError::csv(path, e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { header, rows })
    }

    /// Columns compared by the schema guard: everything except `run`.
    pub fn stat_columns(&self) -> BTreeSet<&str> {
        self.header
            .iter()
            .map(String::as_str)
            .filter(|c| *c != RUN_COLUMN)
            .collect()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.header.iter().position(|c| c == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace `path` with this table through a temp file in the same directory.
    fn write_atomic(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.header)
            .map_err(|e| ArtestError::csv(path, e))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| ArtestError::csv(path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ArtestError::io(path, std::io::Error::other(e.to_string())))?;

        let dir = parent_dir(path);
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArtestError::io(dir, e))?;
        tmp.write_all(&bytes).map_err(|e| ArtestError::io(path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| ArtestError::io(path, e))?;
        tmp.persist(path)
            .map_err(|e| ArtestError::io(path, e.error))?;
        Ok(())
    }
}

/// Where a record ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// A new table was started with this record.
    Created { path: PathBuf },
    /// The record was appended to an existing table that now has `rows` rows.
    Appended { path: PathBuf, rows: usize },
    /// The existing table has a different column set and was left untouched.
    Diverted {
        /// Table that rejected the record
        legacy: PathBuf,
        /// Copy of `legacy` taken before diverting
        backup: PathBuf,
        /// Columns present only in `legacy`
        only_in_table: Vec<String>,
        /// Columns present only in the record
        only_in_record: Vec<String>,
        /// What happened in the table named after the record's filters
        target: Box<AppendOutcome>,
    },
}

impl AppendOutcome {
    /// Table now holding the record.
    pub fn table_path(&self) -> &Path {
        match self {
            AppendOutcome::Created { path } | AppendOutcome::Appended { path, .. } => path,
            AppendOutcome::Diverted { target, .. } => target.table_path(),
        }
    }
}

/// Default results table of a workspace.
pub fn results_table_path(workdir: &Path) -> PathBuf {
    workdir.join(RESULTS_FILE_NAME)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "matches".to_string())
}

/// Exclusive lock on `{table}.lock`, held until the returned file is dropped.
fn lock_table(path: &Path) -> Result<File> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    let lock_path = path.with_file_name(name);

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| ArtestError::io(&lock_path, e))?;
    file.lock().map_err(|e| ArtestError::io(&lock_path, e))?;
    Ok(file)
}

/// `{stem}_backup_{YYYYmmdd_HHMMSS}.csv`, suffixed if that name is taken.
fn backup_path(path: &Path) -> PathBuf {
    let dir = parent_dir(path);
    let base = format!(
        "{}_backup_{}",
        file_stem(path),
        Local::now().format("%Y%m%d_%H%M%S")
    );

    let mut candidate = dir.join(format!("{base}.csv"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{base}_{n}.csv"));
        n += 1;
    }
    candidate
}

/// Table a record is diverted to: `{stem}_{filters sorted, '-'-joined}.csv`.
pub fn diverted_table_path(path: &Path, record: &RunRecord) -> PathBuf {
    parent_dir(path).join(format!(
        "{}_{}.csv",
        file_stem(path),
        record.sorted_filters().join("-")
    ))
}

/// Append `record` to the results table at `path`.
///
/// The whole read-compare-write sequence runs under an exclusive lock on
/// `{path}.lock`.
///
/// # Errors
/// I/O and CSV failures, and [`ArtestError::SchemaConflict`] for a record
/// without filters or when the filter-named table a record is diverted to
/// rejects it as well.
pub fn append_record(path: &Path, record: &RunRecord) -> Result<AppendOutcome> {
    if record.stats.is_empty() {
        return Err(ArtestError::SchemaConflict {
            path: path.to_path_buf(),
            reason: "record has no filters".to_string(),
        });
    }

    let _lock = lock_table(path)?;
    match append_locked(path, record)? {
        Placement::Placed(outcome) => Ok(outcome),
        Placement::Rejected(mismatch) => divert(path, record, mismatch),
    }
}

enum Placement {
    Placed(AppendOutcome),
    Rejected(Mismatch),
}

struct Mismatch {
    only_in_table: Vec<String>,
    only_in_record: Vec<String>,
}

/// Create or extend `path`; hand back the column difference on mismatch.
fn append_locked(path: &Path, record: &RunRecord) -> Result<Placement> {
    if !path.exists() {
        let header = record.header();
        let table = ResultsTable {
            rows: vec![record.row_for(&header)],
            header,
        };
        table.write_atomic(path)?;
        info!("Started results table {}", path.display());
        return Ok(Placement::Placed(AppendOutcome::Created {
            path: path.to_path_buf(),
        }));
    }

    let mut table = ResultsTable::read(path)?;
    let record_columns = record.columns();
    let record_set: BTreeSet<&str> = record_columns.iter().map(String::as_str).collect();
    let table_set = table.stat_columns();

    if table_set != record_set {
        return Ok(Placement::Rejected(Mismatch {
            only_in_table: table_set.difference(&record_set).map(|c| c.to_string()).collect(),
            only_in_record: record_set.difference(&table_set).map(|c| c.to_string()).collect(),
        }));
    }

    let row = record.row_for(&table.header);
    table.rows.push(row);
    table.write_atomic(path)?;
    info!(
        "Appended run {} to {} ({} rows)",
        record.run_key,
        path.display(),
        table.len()
    );
    Ok(Placement::Placed(AppendOutcome::Appended {
        path: path.to_path_buf(),
        rows: table.len(),
    }))
}

/// Append to the filter-named table, rejecting a second column mismatch.
fn append_diverted(target_path: &Path, record: &RunRecord) -> Result<AppendOutcome> {
    let _lock = lock_table(target_path)?;
    match append_locked(target_path, record)? {
        Placement::Placed(outcome) => Ok(outcome),
        Placement::Rejected(second) => Err(ArtestError::SchemaConflict {
            path: target_path.to_path_buf(),
            reason: format!(
                "columns only in table {:?}, only in run {:?}",
                second.only_in_table, second.only_in_record
            ),
        }),
    }
}

fn divert(path: &Path, record: &RunRecord, mismatch: Mismatch) -> Result<AppendOutcome> {
    let backup = backup_path(path);
    std::fs::copy(path, &backup).map_err(|e| ArtestError::io(&backup, e))?;

    let target_path = diverted_table_path(path, record);
    let target = match append_diverted(&target_path, record) {
        Ok(outcome) => outcome,
        Err(e) => {
            // A failed run leaves no backup behind.
            if let Err(rm) = std::fs::remove_file(&backup) {
                warn!("Could not remove backup {}: {rm}", backup.display());
            }
            return Err(e);
        }
    };

    warn!(
        "Results table {} does not match run {}: columns only in table {:?}, only in run {:?}. \
         Left it unchanged (backup {}), recorded the run in {}",
        path.display(),
        record.run_key,
        mismatch.only_in_table,
        mismatch.only_in_record,
        backup.display(),
        target_path.display()
    );

    Ok(AppendOutcome::Diverted {
        legacy: path.to_path_buf(),
        backup,
        only_in_table: mismatch.only_in_table,
        only_in_record: mismatch.only_in_record,
        target: Box::new(target),
    })
}
