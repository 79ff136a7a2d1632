//! Access to pipeline-native detection tables.
//!
//! The surrounding system owns the pipeline data store; this module only
//! defines the accessor the catalog builder consumes, plus a file-backed
//! implementation over per-patch CSV exports.

mod csv_store;

pub use csv_store::CsvPatchStore;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// Key of one per-patch table in the pipeline store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataId {
    pub tract: i64,
    pub patch: String,
    pub filter: String,
}

impl DataId {
    pub fn new(tract: i64, patch: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            tract,
            patch: patch.into(),
            filter: filter.into(),
        }
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tract={} patch={} filter={}",
            self.tract, self.patch, self.filter
        )
    }
}

/// One row of the forced-photometry source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedSource {
    pub id: i64,
    /// Right ascension in degrees
    pub coord_ra: f64,
    /// Declination in degrees
    pub coord_dec: f64,
    #[serde(rename = "base_PsfFlux_instFlux", deserialize_with = "nullable_f64")]
    pub psf_flux: f64,
    #[serde(rename = "base_PsfFlux_instFluxErr", deserialize_with = "nullable_f64")]
    pub psf_flux_err: f64,
}

/// Failed photometry is exported as an empty cell; read it as NaN.
fn nullable_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// One row of the per-patch measurement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    #[serde(
        rename = "base_PixelFlags_flag_fakeCenter",
        deserialize_with = "crate::catalog::detected::deserialize_flag"
    )]
    pub fake_center: bool,
}

/// Key/value accessor over the pipeline's per-patch catalogs.
///
/// Implementations report unavailable data as
/// [`crate::error::ArtestError::DataAccess`].
pub trait PipelineStore {
    /// Patches holding results for `filter` in `tract`.
    fn patches(&self, filter: &str, tract: i64) -> Result<Vec<String>>;

    /// Forced-photometry sources for one patch.
    fn forced_sources(&self, data_id: &DataId) -> Result<Vec<ForcedSource>>;

    /// Measurements for one patch, row-aligned with [`Self::forced_sources`].
    fn measurements(&self, data_id: &DataId) -> Result<Vec<Measurement>>;
}
