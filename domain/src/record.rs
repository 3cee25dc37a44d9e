use crate::{DomainError, RecordId};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// The reserved, store-managed field.
pub const ID_FIELD: &str = "id";

// --- Record ---

/// One stored entity: an ordered mapping of field name to text value.
///
/// Insertion order is preserved, and re-setting an existing field keeps its
/// position. Numbers and dates are stored as text and interpreted by whoever
/// reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    /// Sets a field, replacing the value in place if it already exists.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        let position = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(position).1)
    }

    /// Overlays `other` on top of this record. Fields of `other` win; fields
    /// absent from `other` are kept.
    pub fn merge(&mut self, other: &Record) {
        for (field, value) in other.iter() {
            self.set(field, value);
        }
    }

    /// The raw `id` text, if the record carries one.
    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Re-shapes the record onto `header`: header order, empty text for
    /// missing fields, and fields outside the header dropped.
    pub fn project(&self, header: &[String]) -> Record {
        header
            .iter()
            .map(|field| (field.clone(), self.get(field).unwrap_or_default().to_string()))
            .collect()
    }

    /// Builds a record from a JSON object. Scalars become text; nested
    /// objects and arrays are rejected.
    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self, DomainError> {
        object
            .iter()
            .map(|(field, value)| {
                text_from_value(value)
                    .map(|text| (field.clone(), text))
                    .ok_or_else(|| DomainError::NonScalarValue(field.clone()))
            })
            .collect()
    }

    /// JSON object view of the record, every value as a JSON string.
    pub fn to_json_object(&self) -> Map<String, Value> {
        self.iter()
            .map(|(field, value)| (field.to_string(), Value::String(value.to_string())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.set(field, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Text form of a JSON scalar: strings verbatim, numbers and booleans via
/// their JSON spelling, null as empty text. `None` for arrays and objects.
pub fn text_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

// --- Table ---

/// The full ordered set of records of one collection, sharing a fixed header.
///
/// An empty header means the table has never been written; the first insert
/// fixes it. Every held record is kept projected onto the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    header: Vec<String>,
    records: Vec<Record>,
}

impl Table {
    /// Creates an empty table with a provisioned header. `id` is added as the
    /// first column when the header does not name it.
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut header: Vec<String> = header
            .into_iter()
            .map(|field| field.into().trim().to_string())
            .collect();
        if !header.is_empty() && !header.iter().any(|field| field == ID_FIELD) {
            header.insert(0, ID_FIELD.to_string());
        }
        Self {
            header,
            records: Vec::new(),
        }
    }

    /// Rebuilds a table from persisted rows. Header names are trimmed; every
    /// row must have exactly one value per header field.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, DomainError> {
        let header: Vec<String> = header.into_iter().map(|f| f.trim().to_string()).collect();
        if header.is_empty() {
            if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| !r.is_empty()) {
                return Err(DomainError::RowLength {
                    row: index + 1,
                    expected: 0,
                    found: row.len(),
                });
            }
            return Ok(Self::default());
        }
        if !header.iter().any(|field| field == ID_FIELD) {
            return Err(DomainError::MissingIdColumn);
        }

        let mut records: Vec<Record> = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != header.len() {
                return Err(DomainError::RowLength {
                    row: index + 1,
                    expected: header.len(),
                    found: row.len(),
                });
            }
            records.push(header.iter().cloned().zip(row).collect());
        }
        Ok(Self { header, records })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest id in the table, 0 when empty.
    pub fn last_id(&self) -> Result<u64, DomainError> {
        self.records.iter().try_fold(0u64, |max, record| -> Result<u64, DomainError> {
            let id: RecordId = record.id().unwrap_or_default().parse()?;
            Ok(max.max(id.value()))
        })
    }

    pub fn next_id(&self) -> Result<RecordId, DomainError> {
        let last = RecordId::new(self.last_id()?);
        last.next().ok_or(DomainError::IdOverflow(last))
    }

    /// Appends `fields` under a freshly assigned id and returns that id.
    /// Any `id` already present in `fields` is overwritten.
    pub fn insert(&mut self, mut fields: Record) -> Result<RecordId, DomainError> {
        let id = self.next_id()?;
        fields.set(ID_FIELD, id.to_string());
        if self.header.is_empty() {
            // First-ever write fixes the header: id first, then the fields as given.
            self.header = std::iter::once(ID_FIELD.to_string())
                .chain(fields.keys().filter(|f| *f != ID_FIELD).map(str::to_string))
                .collect();
        }
        self.records.push(fields.project(&self.header));
        Ok(id)
    }

    /// First record whose `id` text equals `id`.
    pub fn find(&self, id: RecordId) -> Option<&Record> {
        let wanted = id.to_string();
        self.records.iter().find(|record| record.id() == Some(wanted.as_str()))
    }

    /// Merges `partial` over the record with `id`. Returns false if absent.
    pub fn merge(&mut self, id: RecordId, partial: &Record) -> bool {
        let wanted = id.to_string();
        let header = &self.header;
        match self
            .records
            .iter_mut()
            .find(|record| record.id() == Some(wanted.as_str()))
        {
            Some(record) => {
                record.merge(partial);
                *record = record.project(header);
                true
            }
            None => false,
        }
    }

    /// Removes every record with `id`. Returns false if none matched.
    pub fn remove(&mut self, id: RecordId) -> bool {
        let wanted = id.to_string();
        let before = self.records.len();
        self.records.retain(|record| record.id() != Some(wanted.as_str()));
        self.records.len() != before
    }

    /// Rows in header order, ready to be written out.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        self.records.iter().map(|record| {
            self.header
                .iter()
                .map(|field| record.get(field).unwrap_or_default())
                .collect()
        })
    }
}
