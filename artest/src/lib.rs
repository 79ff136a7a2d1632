//! Artificial star test crossmatching.
//!
//! Injection runs place synthetic stars of known position and magnitude into
//! coadded images. This crate turns the pipeline's detections into flat
//! catalogs, matches them back against the injection lists and accumulates
//! per-filter recovery ratios into a results table.
//!
//! - [`output_catalog`] builds `output_{filter}_{runkey}.csv` from a
//!   [`pipeline::PipelineStore`]
//! - [`crossmatch`] computes [`crossmatch::FilterRunStats`] for every
//!   configured filter of a run
//! - [`results`] appends the run's [`results::RunRecord`] to the results
//!   table, guarding against schema drift

pub mod catalog;
pub mod config;
pub mod crossmatch;
pub mod error;
pub mod output_catalog;
pub mod photometry;
pub mod pipeline;
pub mod results;
pub mod run_key;
pub mod sky;

pub use config::RunConfig;
pub use crossmatch::{count_matches, run_crossmatch, FilterRunStats};
pub use error::{ArtestError, Result};
pub use output_catalog::{build_detected_sources, write_output_catalogs};
pub use results::{append_record, AppendOutcome, ResultsTable, RunRecord};
pub use run_key::RunKey;
