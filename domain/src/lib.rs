use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod query;
pub mod record;

pub use query::{Criterion, Logic, Operator, SearchQuery, matches};
pub use record::{ID_FIELD, Record, Table, text_from_value};

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid record id: '{0}'")]
    InvalidId(String),
    #[error("Table header has no 'id' column")]
    MissingIdColumn,
    #[error("Row {row} has {found} values but the header has {expected} fields")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Field '{0}' must be a text, number, boolean or null value")]
    NonScalarValue(String),
    #[error("No id left after {0}")]
    IdOverflow(RecordId),
}

// --- Record ID ---

/// Store-assigned identifier of a record. Persisted as decimal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The id that follows this one, `None` past `u64::MAX`.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| DomainError::InvalidId(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_parses_decimal_text() {
        assert_eq!("7".parse::<RecordId>(), Ok(RecordId::new(7)));
        assert_eq!(" 12 ".parse::<RecordId>(), Ok(RecordId::new(12)));
    }

    #[test]
    fn record_id_rejects_non_numeric_text() {
        assert_eq!(
            "abc".parse::<RecordId>(),
            Err(DomainError::InvalidId("abc".to_string()))
        );
        assert!("".parse::<RecordId>().is_err());
        assert!("-1".parse::<RecordId>().is_err());
    }

    #[test]
    fn record_id_displays_as_plain_number() {
        assert_eq!(RecordId::new(42).to_string(), "42");
        assert_eq!(RecordId::new(41).next(), Some(RecordId::new(42)));
        assert_eq!(RecordId::new(u64::MAX).next(), None);
    }
}
