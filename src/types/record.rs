//! Request records.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Stable ordinal of a record within the caller's input list.
pub type RecordId = usize;

/// Ordered field → value mapping for one input record.
///
/// Field order is preserved so query strings and echoed inputs match what the
/// caller supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow(Vec<(String, String)>);

impl InputRow {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set a field, replacing the value in place if the field already exists.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.0.push((field, value)),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for InputRow
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = InputRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for InputRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (f, v) in &self.0 {
            map.serialize_entry(f, v)?;
        }
        map.end()
    }
}

/// One prepared lookup. Immutable once built; the `id` is carried through every retry.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: RecordId,
    pub inputs: InputRow,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RequestRecord {
    pub fn new(id: RecordId, url: impl Into<String>, inputs: InputRow) -> Self {
        Self {
            id,
            inputs,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
