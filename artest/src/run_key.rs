//! Run keys ("magnitude strings") such as `24.00_24.50`.

use std::fmt;

use crate::error::{ArtestError, Result};

/// Identifies one injection run: one target magnitude per filter, `_`-joined.
///
/// The token is kept verbatim since it names files and labels
/// results rows; `24.0` and `24.00` are different runs as far as file
/// lookup is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct RunKey {
    token: String,
    magnitudes: Vec<f64>,
}

impl RunKey {
    /// Parse a magnitude string without checking it against a filter list.
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = |reason: String| ArtestError::InvalidRunKey {
            key: token.to_string(),
            reason,
        };

        if token.trim().is_empty() {
            return Err(invalid("empty magnitude string".to_string()));
        }
        if token.contains(['/', '\\']) || token.chars().any(char::is_whitespace) {
            return Err(invalid("must not contain path separators or whitespace".to_string()));
        }

        let magnitudes = token
            .split('_')
            .map(|part| {
                part.parse::<f64>()
                    .ok()
                    .filter(|m| m.is_finite())
                    .ok_or_else(|| invalid(format!("'{part}' is not a magnitude")))
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(Self {
            token: token.to_string(),
            magnitudes,
        })
    }

    /// Parse a magnitude string and require one magnitude per filter.
    pub fn parse_for_filters(token: &str, filter_count: usize) -> Result<Self> {
        let key = Self::parse(token)?;
        if key.magnitudes.len() != filter_count {
            return Err(ArtestError::InvalidRunKey {
                key: token.to_string(),
                reason: format!(
                    "{} magnitudes given for {} configured filters",
                    key.magnitudes.len(),
                    filter_count
                ),
            });
        }
        Ok(key)
    }

    /// Build a key from magnitudes, formatted with two decimals.
    pub fn from_magnitudes(magnitudes: &[f64]) -> Self {
        let token = magnitudes
            .iter()
            .map(|m| format!("{m:.2}"))
            .collect::<Vec<_>>()
            .join("_");
        Self {
            token,
            magnitudes: magnitudes.to_vec(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_filter_key() {
        let key = RunKey::parse_for_filters("24.00_24.50", 2).unwrap();
        assert_eq!(key.magnitudes(), &[24.0, 24.5]);
        assert_eq!(key.as_str(), "24.00_24.50");
        assert_eq!(key.to_string(), "24.00_24.50");
    }

    #[test]
    fn single_filter_key() {
        let key = RunKey::parse("25").unwrap();
        assert_eq!(key.magnitudes(), &[25.0]);
    }

    #[test]
    fn count_must_match_filters() {
        let err = RunKey::parse_for_filters("24.00_24.50", 3).unwrap_err();
        assert!(matches!(err, ArtestError::InvalidRunKey { .. }));
    }

    #[test]
    fn rejects_garbage() {
        for token in ["", "24.0_", "abc", "24.0__24.5", "nan", "24.0/../x", "24 25"] {
            assert!(RunKey::parse(token).is_err(), "accepted '{token}'");
        }
    }

    #[test]
    fn from_magnitudes_formats_two_decimals() {
        let key = RunKey::from_magnitudes(&[24.0, 24.5]);
        assert_eq!(key.as_str(), "24.00_24.50");
        assert_eq!(RunKey::parse(key.as_str()).unwrap(), key);
    }
}
