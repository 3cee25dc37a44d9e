use crate::record::{Record, text_from_value};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use std::fmt;

// --- Operators ---

/// Comparison applied by one criterion.
///
/// Parsing is lenient: names are matched case-insensitively and anything
/// unrecognised becomes `Unsupported`, which never matches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equal,
    NotEqual,
    #[default]
    Contains,
    LessThan,
    MoreThan,
    LessThanOrEqual,
    MoreThanOrEqual,
    Unsupported(String),
}

impl Operator {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "EQUAL" => Operator::Equal,
            "NOT_EQUAL" => Operator::NotEqual,
            "CONTAINS" => Operator::Contains,
            "LESS_THAN" => Operator::LessThan,
            "MORE_THAN" => Operator::MoreThan,
            "LESS_THAN_OR_EQUAL" => Operator::LessThanOrEqual,
            "MORE_THAN_OR_EQUAL" => Operator::MoreThanOrEqual,
            _ => Operator::Unsupported(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equal => "EQUAL",
            Operator::NotEqual => "NOT_EQUAL",
            Operator::Contains => "CONTAINS",
            Operator::LessThan => "LESS_THAN",
            Operator::MoreThan => "MORE_THAN",
            Operator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Operator::MoreThanOrEqual => "MORE_THAN_OR_EQUAL",
            Operator::Unsupported(name) => name,
        }
    }
}

impl From<String> for Operator {
    fn from(name: String) -> Self {
        Operator::parse(&name)
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluates one comparison between a stored value and a criterion value.
///
/// Text operators are case-insensitive. Ordering operators compare both sides
/// as `f64` and are false whenever either side is not a number.
pub fn matches(record_value: &str, operator: &Operator, criterion_value: &str) -> bool {
    match operator {
        Operator::Equal => record_value.to_lowercase() == criterion_value.to_lowercase(),
        Operator::NotEqual => record_value.to_lowercase() != criterion_value.to_lowercase(),
        Operator::Contains => record_value
            .to_lowercase()
            .contains(&criterion_value.to_lowercase()),
        Operator::Unsupported(_) => false,
        ordering => {
            let (Some(left), Some(right)) =
                (parse_number(record_value), parse_number(criterion_value))
            else {
                return false;
            };
            match ordering {
                Operator::LessThan => left < right,
                Operator::MoreThan => left > right,
                Operator::LessThanOrEqual => left <= right,
                Operator::MoreThanOrEqual => left >= right,
                _ => false,
            }
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

// --- Logic ---

/// How the criteria of one query combine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Logic {
    #[default]
    And,
    Or,
    /// Unrecognised combination rule; a query using it matches nothing.
    Unsupported(String),
}

impl Logic {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "AND" => Logic::And,
            "OR" => Logic::Or,
            _ => Logic::Unsupported(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
            Logic::Unsupported(name) => name,
        }
    }
}

impl From<String> for Logic {
    fn from(name: String) -> Self {
        Logic::parse(&name)
    }
}

impl From<Logic> for String {
    fn from(logic: Logic) -> Self {
        logic.as_str().to_string()
    }
}

// --- Criteria & Queries ---

/// One `{key, operator, value}` test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub key: String,
    #[serde(default)]
    pub operator: Operator,
    /// Scalars are accepted and compared as text; a missing value is empty text.
    #[serde(default, deserialize_with = "scalar_as_text")]
    pub value: String,
}

impl Criterion {
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            value: value.into(),
        }
    }

    /// Whether `record` satisfies this criterion. Absent fields read as "".
    pub fn holds(&self, record: &Record) -> bool {
        let record_value = record.get(&self.key).unwrap_or_default();
        matches(record_value, &self.operator, &self.value)
    }
}

fn scalar_as_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    text_from_value(&value).ok_or_else(|| de::Error::custom("criterion value must be a scalar"))
}

/// A multi-criteria search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl SearchQuery {
    pub fn new(logic: Logic) -> Self {
        Self {
            logic,
            criteria: Vec::new(),
        }
    }

    /// Builder-style helper to append a criterion.
    pub fn with(
        mut self,
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        self.criteria.push(Criterion::new(key, operator, value));
        self
    }

    /// Whether any criterion tests `key`.
    pub fn references(&self, key: &str) -> bool {
        self.criteria.iter().any(|criterion| criterion.key == key)
    }

    /// An empty query matches nothing, so a malformed request never dumps the
    /// whole table.
    pub fn matches(&self, record: &Record) -> bool {
        if self.criteria.is_empty() {
            return false;
        }
        match self.logic {
            Logic::And => self.criteria.iter().all(|c| c.holds(record)),
            Logic::Or => self.criteria.iter().any(|c| c.holds(record)),
            Logic::Unsupported(_) => false,
        }
    }

    /// Keeps the matching records, in their original order.
    pub fn filter(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        records
            .into_iter()
            .filter(|record| self.matches(record))
            .collect()
    }
}
