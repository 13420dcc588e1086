//! Untyped rows returned by raw table queries, and pluck results.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use lightrepo_core::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, FromRow, Row, TypeInfo, ValueRef};

/// One row as ordered `(column, value)` pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Record { fields }
    }

    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Value at a zero-based column position.
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

/// Decodes each column by the storage class SQLite reports for the value.
impl<'r> FromRow<'r, SqliteRow> for Record {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut fields = Vec::with_capacity(row.len());

        for column in row.columns() {
            let index = column.ordinal();
            let raw = row.try_get_raw(index)?;

            let value = if raw.is_null() {
                Value::Null
            } else {
                let type_name = raw.type_info().name().to_string();
                match type_name.as_str() {
                    "INTEGER" | "INT8" | "BIGINT" => Value::Int(row.try_get_unchecked(index)?),
                    "BOOLEAN" => Value::Bool(row.try_get_unchecked(index)?),
                    "REAL" | "FLOAT" | "DOUBLE" => Value::Float(row.try_get_unchecked(index)?),
                    "BLOB" => Value::Blob(row.try_get_unchecked(index)?),
                    _ => Value::Text(row.try_get_unchecked(index)?),
                }
            };

            fields.push((column.name().to_string(), value));
        }

        Ok(Record { fields })
    }
}

/// Result of a pluck.
#[derive(Debug, Clone, PartialEq)]
pub enum Plucked {
    /// Column values in row order.
    Values(Vec<Value>),
    /// `(key, value)` pairs in first-seen key order; a repeated key keeps the
    /// last value read.
    Keyed(Vec<(Value, Value)>),
}

impl Plucked {
    pub(crate) fn from_records(records: Vec<Record>, keyed: bool) -> Self {
        if !keyed {
            return Plucked::Values(
                records
                    .into_iter()
                    .map(|r| r.value_at(0).cloned().unwrap_or_default())
                    .collect(),
            );
        }

        let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(records.len());
        // Value has floats so it isn't Hash; index on the Debug form, which
        // distinguishes variants the same way PartialEq does
        let mut slots: HashMap<String, usize> = HashMap::with_capacity(records.len());
        for record in records {
            let value = record.value_at(0).cloned().unwrap_or_default();
            let key = record.value_at(1).cloned().unwrap_or_default();

            match slots.entry(format!("{:?}", key)) {
                Entry::Occupied(slot) => pairs[*slot.get()].1 = value,
                Entry::Vacant(slot) => {
                    slot.insert(pairs.len());
                    pairs.push((key, value));
                }
            }
        }
        Plucked::Keyed(pairs)
    }

    pub fn len(&self) -> usize {
        match self {
            Plucked::Values(values) => values.len(),
            Plucked::Keyed(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The plucked values, dropping keys.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Plucked::Values(values) => values.iter().collect(),
            Plucked::Keyed(pairs) => pairs.iter().map(|(_, v)| v).collect(),
        }
    }

    /// Value stored under `key`. Always `None` for unkeyed results.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Plucked::Values(_) => None,
            Plucked::Keyed(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
        }
    }
}
