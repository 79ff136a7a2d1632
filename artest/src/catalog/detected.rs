use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ArtestError, Result};

/// A pipeline detection that survived flux-positivity and is-fake filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSource {
    pub id: i64,
    /// Right ascension in degrees
    pub ra: f64,
    /// Declination in degrees
    pub dec: f64,
    /// Calibrated magnitude
    pub mag: f64,
    /// Magnitude uncertainty
    pub mag_err: f64,
    /// Pipeline fake-center hint: footprint centre coincides with an injected star
    #[serde(deserialize_with = "deserialize_flag")]
    pub flag: bool,
}

/// Accepts `true/false` as well as the `True/False` and `1/0` spellings
/// written by other table tools.
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "true" | "True" | "TRUE" | "1" => Ok(true),
        "false" | "False" | "FALSE" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean flag '{other}'"
        ))),
    }
}

/// Read a detected-source CSV (with header).
pub fn read_detected_sources(path: &Path) -> Result<Vec<DetectedSource>> {
    if !path.exists() {
        return Err(ArtestError::MissingCatalog(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ArtestError::csv(path, e))?;

    let mut sources = Vec::new();
    for (index, record) in reader.deserialize::<DetectedSource>().enumerate() {
        let source = record.map_err(|e| ArtestError::MalformedCatalog {
            path: path.to_path_buf(),
            // Header is line 1
            line: e
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 2),
            reason: e.to_string(),
        })?;
        sources.push(source);
    }
    Ok(sources)
}

/// Write a detected-source CSV with header `id,ra,dec,mag,mag_err,flag`.
///
/// Output is a pure function of `sources`, so rewriting unchanged data is
/// byte-identical.
pub fn write_detected_sources(path: &Path, sources: &[DetectedSource]) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| ArtestError::io(path, e))?;
    write_detected_sources_to(file, path, sources)
}

/// Like [`write_detected_sources`] into any writer. `path` only labels errors.
pub fn write_detected_sources_to<W: Write>(
    out: W,
    path: &Path,
    sources: &[DetectedSource],
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for source in sources {
        writer
            .serialize(source)
            .map_err(|e| ArtestError::csv(path, e))?;
    }
    writer.flush().map_err(|e| ArtestError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<DetectedSource> {
        vec![
            DetectedSource {
                id: 1,
                ra: 10.0002,
                dec: 20.0001,
                mag: 24.05,
                mag_err: 0.02,
                flag: true,
            },
            DetectedSource {
                id: 42,
                ra: 10.01,
                dec: -20.0,
                mag: 23.9,
                mag_err: 0.1,
                flag: false,
            },
        ]
    }

    #[test]
    fn header_and_rows_are_written_in_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output_g_24.0.csv");
        write_detected_sources(&path, &sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,ra,dec,mag,mag_err,flag"));
        assert_eq!(lines.next(), Some("1,10.0002,20.0001,24.05,0.02,true"));
        assert_eq!(lines.next(), Some("42,10.01,-20.0,23.9,0.1,false"));

        assert_eq!(read_detected_sources(&path).unwrap(), sample());
    }

    #[test]
    fn accepts_capitalised_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pandas.csv");
        std::fs::write(
            &path,
            "id,ra,dec,mag,mag_err,flag\n7,1.0,2.0,24.0,0.01,True\n8,1.0,2.0,24.0,0.01,False\n",
        )
        .unwrap();

        let sources = read_detected_sources(&path).unwrap();
        assert!(sources[0].flag);
        assert!(!sources[1].flag);
    }

    #[test]
    fn header_only_file_is_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "id,ra,dec,mag,mag_err,flag\n").unwrap();
        assert!(read_detected_sources(&path).unwrap().is_empty());
    }

    #[test]
    fn bad_flag_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "id,ra,dec,mag,mag_err,flag\n7,1.0,2.0,24.0,0.01,maybe\n",
        )
        .unwrap();

        match read_detected_sources(&path).unwrap_err() {
            ArtestError::MalformedCatalog { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_missing_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_detected_sources(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, ArtestError::MissingCatalog(_)));
    }
}
