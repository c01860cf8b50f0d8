// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Named fields over the columns of a table.
//!
//! A [`TableMapping`] gives names like `"open"` or `"close"` to table columns.
//! Each name resolves to a raw field on main-storage rows and to the
//! aggregator column holding its grouped value on aggregated rows, so series
//! and computers read the same name whichever storage they are looking at.

use alloc::string::String;
use core::fmt;

use chartwell_consistency::ComponentId;
use hashbrown::HashMap;

use crate::aggregator::AggregationType;
use crate::row::TableRow;
use crate::selection::Selection;
use crate::value::FieldKey;

/// Where a mapped field reads its values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MappedColumn {
    /// A raw field, grouped by `kind` into aggregator column `aggregate`.
    Source {
        /// Field of the main-storage rows.
        source: FieldKey,
        /// How buckets combine the field.
        kind: AggregationType,
        /// Column of the aggregated rows.
        aggregate: usize,
    },
    /// A computed column, read from every storage alike.
    Computed(usize),
}

impl MappedColumn {
    /// Returns the field to read from raw rows (`aggregated == false`) or
    /// bucket rows. `None` for computed columns.
    #[must_use]
    pub fn field_key(&self, aggregated: bool) -> Option<FieldKey> {
        match self {
            Self::Source { aggregate, .. } if aggregated => Some(FieldKey::Index(*aggregate)),
            Self::Source { source, .. } => Some(source.clone()),
            Self::Computed(_) => None,
        }
    }

    /// Returns the numeric value in `row`, or `NaN`.
    #[must_use]
    pub fn number(&self, row: &TableRow, aggregated: bool) -> f64 {
        match self.field_key(aggregated) {
            Some(key) => row.number(&key),
            None => self.computed_value(row),
        }
    }

    /// Returns the selection minimum, or `NaN`.
    #[must_use]
    pub fn min(&self, selection: &Selection, aggregated: bool) -> f64 {
        match (self.field_key(aggregated), self) {
            (Some(key), _) => selection.min(&key),
            (None, Self::Computed(column)) => selection.calc_min(*column),
            (None, Self::Source { .. }) => f64::NAN,
        }
    }

    /// Returns the selection maximum, or `NaN`.
    #[must_use]
    pub fn max(&self, selection: &Selection, aggregated: bool) -> f64 {
        match (self.field_key(aggregated), self) {
            (Some(key), _) => selection.max(&key),
            (None, Self::Computed(column)) => selection.calc_max(*column),
            (None, Self::Source { .. }) => f64::NAN,
        }
    }

    fn computed_value(&self, row: &TableRow) -> f64 {
        match self {
            Self::Computed(column) => row.computed(*column).unwrap_or(f64::NAN),
            Self::Source { .. } => f64::NAN,
        }
    }
}

/// Settings for one mapped field.
///
/// Without an explicit kind, the field name picks one: `open` takes the
/// first value, `high` the maximum, `low` the minimum, `volume` the sum, and
/// everything else the last value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Source field of the raw rows.
    pub column: FieldKey,
    /// Grouping, or `None` to derive it from the field name.
    pub kind: Option<AggregationType>,
    /// Weights field for [`AggregationType::WeightedAverage`].
    pub weights: Option<FieldKey>,
}

impl FieldSpec {
    /// Reads `column`, grouping by field name.
    #[must_use]
    pub const fn new(column: FieldKey) -> Self {
        Self {
            column,
            kind: None,
            weights: None,
        }
    }

    /// Groups with `kind`.
    #[must_use]
    pub fn kind(mut self, kind: AggregationType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Weighs by `weights`.
    #[must_use]
    pub fn weights(mut self, weights: FieldKey) -> Self {
        self.weights = Some(weights);
        self
    }
}

impl From<FieldKey> for FieldSpec {
    fn from(column: FieldKey) -> Self {
        Self::new(column)
    }
}

impl From<usize> for FieldSpec {
    fn from(column: usize) -> Self {
        Self::new(FieldKey::Index(column))
    }
}

impl From<&str> for FieldSpec {
    fn from(column: &str) -> Self {
        Self::new(FieldKey::canonical(column))
    }
}

/// Grouping used for a field when none is given.
pub(crate) fn kind_for_name(name: &str) -> AggregationType {
    match name.to_ascii_lowercase().as_str() {
        "open" => AggregationType::First,
        "high" => AggregationType::Max,
        "low" => AggregationType::Min,
        "volume" => AggregationType::Sum,
        _ => AggregationType::Last,
    }
}

/// Named fields of one [`Table`](crate::Table).
///
/// Created by [`Table::map_as`](crate::Table::map_as); more fields are added
/// with [`Table::add_mapped_field`](crate::Table::add_mapped_field), which
/// registers their aggregators with the table. A mapping remembers the table
/// it belongs to and is rejected by any other.
///
/// # Example
///
/// ```
/// use chartwell_data::{
///     DateTimeInterval, FieldKey, IntervalUnit, RemoveFromStart, RowValues, Table, TableStorage,
/// };
///
/// let mut table = Table::default();
/// let ohlc = table.map_as([
///     ("open", FieldKey::Index(1)),
///     ("high", FieldKey::Index(2)),
///     ("low", FieldKey::Index(3)),
///     ("close", FieldKey::Index(4)),
/// ]);
/// table.add_data(
///     [
///         RowValues::array([0.0, 10.0, 12.0, 9.0, 11.0]),
///         RowValues::array([400.0, 11.0, 15.0, 10.0, 14.0]),
///     ],
///     RemoveFromStart::Keep,
/// );
///
/// let seconds = DateTimeInterval::new(IntervalUnit::Second, 1);
/// let grouped = table.storage(Some(&seconds));
/// let bucket = ohlc.row(&grouped.rows()[0], true);
/// assert_eq!(bucket.get("open"), 10.0);
/// assert_eq!(bucket.get("high"), 15.0);
/// assert_eq!(bucket.get("low"), 9.0);
/// assert_eq!(bucket.get("close"), 14.0);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct TableMapping {
    table: ComponentId,
    fields: HashMap<String, MappedColumn>,
}

impl fmt::Debug for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableMapping")
            .field("table", &self.table)
            .field("fields", &self.fields)
            .finish()
    }
}

impl TableMapping {
    pub(crate) fn new(table: ComponentId) -> Self {
        Self {
            table,
            fields: HashMap::new(),
        }
    }

    /// Returns the id of the table this mapping belongs to.
    #[must_use]
    pub const fn table(&self) -> ComponentId {
        self.table
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the field names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns how `name` is read.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&MappedColumn> {
        self.fields.get(name)
    }

    /// Returns the raw field behind `name`.
    #[must_use]
    pub fn source_column(&self, name: &str) -> Option<&FieldKey> {
        match self.fields.get(name)? {
            MappedColumn::Source { source, .. } => Some(source),
            MappedColumn::Computed(_) => None,
        }
    }

    /// Returns the aggregator column behind `name`.
    #[must_use]
    pub fn aggregate_column(&self, name: &str) -> Option<usize> {
        match self.fields.get(name)? {
            MappedColumn::Source { aggregate, .. } => Some(*aggregate),
            MappedColumn::Computed(_) => None,
        }
    }

    /// Returns the field to read for `name` from raw or bucket rows.
    #[must_use]
    pub fn field_column(&self, name: &str, aggregated: bool) -> Option<FieldKey> {
        self.fields.get(name)?.field_key(aggregated)
    }

    /// Returns the value of `name` in `row`, or `NaN`.
    #[must_use]
    pub fn number(&self, row: &TableRow, name: &str, aggregated: bool) -> f64 {
        self.fields
            .get(name)
            .map_or(f64::NAN, |column| column.number(row, aggregated))
    }

    /// Returns the minimum of `name` over `selection`, or `NaN`.
    #[must_use]
    pub fn min(&self, selection: &Selection, name: &str, aggregated: bool) -> f64 {
        self.fields
            .get(name)
            .map_or(f64::NAN, |column| column.min(selection, aggregated))
    }

    /// Returns the maximum of `name` over `selection`, or `NaN`.
    #[must_use]
    pub fn max(&self, selection: &Selection, name: &str, aggregated: bool) -> f64 {
        self.fields
            .get(name)
            .map_or(f64::NAN, |column| column.max(selection, aggregated))
    }

    /// Views `row` through this mapping.
    #[must_use]
    pub const fn row<'a>(&'a self, row: &'a TableRow, aggregated: bool) -> RowProxy<'a> {
        RowProxy {
            row,
            mapping: self,
            aggregated,
        }
    }

    /// Maps `name` to computed column `column`, replacing any previous
    /// field of that name.
    pub fn add_computed(&mut self, name: impl Into<String>, column: usize) {
        self.fields.insert(name.into(), MappedColumn::Computed(column));
    }

    pub(crate) fn insert(&mut self, name: String, column: MappedColumn) {
        self.fields.insert(name, column);
    }
}

/// A row read through a [`TableMapping`].
#[derive(Copy, Clone)]
pub struct RowProxy<'a> {
    row: &'a TableRow,
    mapping: &'a TableMapping,
    aggregated: bool,
}

impl fmt::Debug for RowProxy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowProxy")
            .field("key", &self.row.key())
            .field("aggregated", &self.aggregated)
            .finish_non_exhaustive()
    }
}

impl<'a> RowProxy<'a> {
    /// Returns the row key.
    #[must_use]
    pub const fn key(&self) -> f64 {
        self.row.key()
    }

    /// Returns the value of field `name`, or `NaN`.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.mapping.number(self.row, name, self.aggregated)
    }

    /// Returns the underlying row.
    #[must_use]
    pub const fn row(&self) -> &'a TableRow {
        self.row
    }
}
