// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Raw field values, field addressing, and row value containers.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

/// A single raw field value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// Missing or explicitly empty.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    Text(String),
}

impl Value {
    /// Converts the value to a number.
    ///
    /// Text is parsed after trimming; anything that is not a finite-looking
    /// number converts to `NaN`. Booleans convert to `1` and `0`.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => f64::NAN,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string form used by string-keyed indexes.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Addresses a field of a row: a column index or a field name.
///
/// Indexes and names are interchangeable across row shapes: `Index(2)` on an
/// object row reads the field named `"2"`, and `Name("2")` on an array row
/// reads column 2. Use [`FieldKey::canonical`] to map numeric names to indexes
/// so that both spellings hash equally.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    /// Positional column.
    Index(usize),
    /// Named field.
    Name(String),
}

impl FieldKey {
    /// Returns `Index` for names that are plain non-negative integers.
    #[must_use]
    pub fn canonical(name: &str) -> Self {
        match name.parse::<usize>() {
            Ok(i) if i.to_string() == name => Self::Index(i),
            _ => Self::Name(name.into()),
        }
    }
}

impl From<usize> for FieldKey {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        Self::canonical(name)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(n) => f.write_str(n),
        }
    }
}

/// Raw values of one row: positional or keyed.
#[derive(Clone, Debug, PartialEq)]
pub enum RowValues {
    /// Positional values.
    Array(Vec<Value>),
    /// Named values.
    Object(HashMap<String, Value>),
}

impl Default for RowValues {
    fn default() -> Self {
        Self::Array(Vec::new())
    }
}

impl RowValues {
    /// Builds an object row from `(name, value)` pairs.
    pub fn object<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds an array row.
    pub fn array<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }

    /// Returns the value at `field`, if present.
    #[must_use]
    pub fn get(&self, field: &FieldKey) -> Option<&Value> {
        match (self, field) {
            (Self::Array(v), FieldKey::Index(i)) => v.get(*i),
            (Self::Array(v), FieldKey::Name(n)) => n.parse::<usize>().ok().and_then(|i| v.get(i)),
            (Self::Object(m), FieldKey::Name(n)) => m.get(n.as_str()),
            (Self::Object(m), FieldKey::Index(i)) => m.get(i.to_string().as_str()),
        }
    }

    /// Returns the numeric value at `field`, or `NaN`.
    #[must_use]
    pub fn number(&self, field: &FieldKey) -> f64 {
        self.get(field).map_or(f64::NAN, Value::to_number)
    }

    /// Returns the array length, or `None` for object rows.
    #[must_use]
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Self::Array(v) => Some(v.len()),
            Self::Object(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_from_values() {
        assert_eq!(Value::from(3.5).to_number(), 3.5);
        assert_eq!(Value::from(" 12 ").to_number(), 12.0);
        assert_eq!(Value::from(true).to_number(), 1.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert!(Value::Null.to_number().is_nan());
    }

    #[test]
    fn cross_shape_lookup() {
        let arr = RowValues::array([1.0, 2.0, 3.0]);
        assert_eq!(arr.number(&FieldKey::Index(1)), 2.0);
        assert_eq!(arr.number(&FieldKey::Name("2".into())), 3.0);
        assert!(arr.number(&FieldKey::Index(7)).is_nan());

        let obj = RowValues::object([("open", 1.0), ("0", 9.0)]);
        assert_eq!(obj.number(&"open".into()), 1.0);
        assert_eq!(obj.number(&FieldKey::Index(0)), 9.0);
        assert_eq!(obj.array_len(), None);
    }

    #[test]
    fn canonical_keys() {
        assert_eq!(FieldKey::canonical("3"), FieldKey::Index(3));
        assert_eq!(FieldKey::canonical("03"), FieldKey::Name("03".into()));
        assert_eq!(FieldKey::canonical("high"), FieldKey::Name("high".into()));
    }

    #[test]
    fn display_matches_index_text() {
        assert_eq!(Value::from(5.0).to_text(), "5");
        assert_eq!(Value::from(2.5).to_text(), "2.5");
        assert_eq!(FieldKey::Index(4).to_string(), "4");
    }
}
