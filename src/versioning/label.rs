//! Canonical version labels
//!
//! Labels are kept as strings so that non-numeric schemes (`beta`, `2024-01`)
//! can be routed. Numeric labels are canonicalised on parse so `"03"` and `"3"`
//! name the same version, and [`VersionLabel::numeric`] is the only place where
//! a label is turned into an integer.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Set of version labels supported by an operation. Duplicates collapse.
pub type VersionSet = BTreeSet<VersionLabel>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("version label is empty")]
    Empty,

    #[error("version label contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A single version identifier, usable as a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionLabel(String);

impl VersionLabel {
    /// The label reported as "latest" when no numeric version is registered.
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, LabelError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LabelError::Empty);
        }

        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(LabelError::InvalidCharacter(c));
        }

        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = raw.trim_start_matches('0');
            let canonical = if trimmed.is_empty() { "0" } else { trimmed };
            return Ok(Self(canonical.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the label is made of digits only.
    pub fn is_numeric(&self) -> bool {
        self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// Integer value of a numeric label, when it fits in a `u64`.
    pub fn numeric(&self) -> Option<u64> {
        if self.is_numeric() {
            self.0.parse().ok()
        } else {
            None
        }
    }
}

// Numeric labels order by value and sort before every non-numeric label.
// Canonical numeric labels have no leading zeros, so comparing length first
// and then digits orders them by value whatever their size.
impl Ord for VersionLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_numeric(), other.is_numeric()) {
            (true, true) => self
                .0
                .len()
                .cmp(&other.0.len())
                .then_with(|| self.0.cmp(&other.0)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for VersionLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
