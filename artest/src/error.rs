//! Error types shared by the catalog builder and the crossmatch engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building catalogs, crossmatching, or persisting results.
///
/// Every variant aborts processing of the current filter/run. Schema drift in
/// the results table is not an error: it is reported through
/// [`crate::results::AppendOutcome::Diverted`] and never fails a run.
#[derive(Error, Debug)]
pub enum ArtestError {
    /// The pipeline store could not supply a table for a tract/patch.
    #[error("Pipeline data unavailable for {what}: {reason}")]
    DataAccess { what: String, reason: String },

    /// An expected flat catalog file is absent.
    #[error("Missing catalog file: {}", .0.display())]
    MissingCatalog(PathBuf),

    /// The builder filtered every source away.
    #[error("No sources survived filtering for filter {filter} in tract {tract}")]
    EmptyResult { filter: String, tract: i64 },

    /// A filter has no injected stars, so a match ratio is undefined.
    #[error("No injected stars for filter {filter}; cannot compute match ratio")]
    DivisionByZero { filter: String },

    /// A row in a flat catalog file could not be parsed.
    #[error("Malformed catalog {} line {line}: {reason}", .path.display())]
    MalformedCatalog {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The magnitude string does not fit the configured filters.
    #[error("Invalid run key '{key}': {reason}")]
    InvalidRunKey { key: String, reason: String },

    /// A run record cannot be placed in any results table for its filter set.
    #[error("Results table {} cannot take this record: {reason}", .path.display())]
    SchemaConflict { path: PathBuf, reason: String },

    /// Run configuration is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtestError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ArtestError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArtestError>;
