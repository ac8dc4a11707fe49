//! Dynamic rows.
//!
//! A [`Row`] is an ordered mapping from column name to [`Value`] with no fixed
//! schema. Column names compare ASCII case-insensitively; insertion order is
//! preserved so results render in the order columns were selected or supplied.

use crate::value::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// An ordered, case-insensitive column-to-value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value, replacing any existing value for the same column
    /// (case-insensitive) while keeping its original position.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.position(&column) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Get a column value by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|idx| &self.entries[idx].1)
    }

    /// Check whether the row contains a column.
    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Remove a column, returning its value if present.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.position(column).map(|idx| self.entries.remove(idx).1)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over (column, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another row into this one. Columns present in `other` overwrite
    /// existing values; new columns append in `other`'s order.
    pub fn merge(&mut self, other: Row) {
        for (column, value) in other.entries {
            self.set(column, value);
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(column))
    }
}

impl<C: Into<String>, V: Into<Value>> FromIterator<(C, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
