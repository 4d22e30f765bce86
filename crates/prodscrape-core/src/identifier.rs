//! Product identifier accepted by the scrape endpoint.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Length of every Amazon Standard Identification Number.
pub const ASIN_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier must be {ASIN_LEN} characters, got {len}")]
    InvalidLength { len: usize },

    #[error("identifier contains invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },
}

/// A validated ASIN: exactly ten ASCII alphanumerics, stored upper-case.
///
/// Surrounding whitespace is trimmed before validation. Once constructed the
/// value never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Asin(String);

impl Asin {
    /// Validates `raw` and returns the normalized identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] if the trimmed input is empty, not
    /// [`ASIN_LEN`] characters long, or contains a non-alphanumeric character.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if let Some((position, ch)) = trimmed
            .chars()
            .enumerate()
            .find(|(_, c)| !c.is_ascii_alphanumeric())
        {
            return Err(IdentifierError::InvalidCharacter { ch, position });
        }

        // All ASCII at this point, so byte length equals char count.
        if trimmed.len() != ASIN_LEN {
            return Err(IdentifierError::InvalidLength { len: trimmed.len() });
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Asin {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Asin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Asin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
