use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ArtestError, Result};

/// A synthetic star placed into one filter's coadd.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectedStar {
    /// Right ascension in degrees
    pub ra: f64,
    /// Declination in degrees
    pub dec: f64,
    /// Injected magnitude
    pub mag: f64,
}

impl InjectedStar {
    pub fn new(ra: f64, dec: f64, mag: f64) -> Self {
        Self { ra, dec, mag }
    }
}

/// Read an injected-star list.
///
/// Each non-empty line holds `ra dec mag` separated by any whitespace.
/// Lines starting with `#` are skipped. Extra trailing columns are an error
/// so a swapped file is caught instead of silently misread.
pub fn read_injected_stars(path: &Path) -> Result<Vec<InjectedStar>> {
    if !path.exists() {
        return Err(ArtestError::MissingCatalog(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| ArtestError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut stars = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ArtestError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let malformed = |reason: String| ArtestError::MalformedCatalog {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(malformed(format!(
                "expected 3 columns (ra dec mag), found {}",
                fields.len()
            )));
        }

        let mut values = [0.0f64; 3];
        for (value, (field, name)) in values
            .iter_mut()
            .zip(fields.iter().zip(["ra", "dec", "mag"]))
        {
            *value = field
                .parse::<f64>()
                .map_err(|_| malformed(format!("invalid {name} value '{field}'")))?;
        }

        stars.push(InjectedStar::new(values[0], values[1], values[2]));
    }

    Ok(stars)
}
