//! Flat catalog files exchanged between the pipeline and the crossmatch engine.
//!
//! Two formats are involved:
//! - injected-star lists: whitespace-delimited `ra dec mag`, no header
//! - detected-source tables: CSV with header `id,ra,dec,mag,mag_err,flag`

pub mod detected;
pub mod injected;

pub use detected::{read_detected_sources, write_detected_sources, DetectedSource};
pub use injected::{read_injected_stars, InjectedStar};

use std::path::{Path, PathBuf};

/// Input file for one filter of a run: `input_{filter}_{runkey}.txt`.
pub fn injected_catalog_path(input_dir: &Path, filter: &str, run_key: &str) -> PathBuf {
    input_dir.join(format!("input_{filter}_{run_key}.txt"))
}

/// Output file for one filter of a run: `output_{filter}_{runkey}.csv`.
pub fn detected_catalog_path(output_dir: &Path, filter: &str, run_key: &str) -> PathBuf {
    output_dir.join(format!("output_{filter}_{run_key}.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_filter_and_run_key() {
        let dir = Path::new("/work/input");
        assert_eq!(
            injected_catalog_path(dir, "HSC-G", "24.00_24.50"),
            PathBuf::from("/work/input/input_HSC-G_24.00_24.50.txt")
        );
        assert_eq!(
            detected_catalog_path(Path::new("out"), "HSC-I2", "25.0"),
            PathBuf::from("out/output_HSC-I2_25.0.csv")
        );
    }
}
