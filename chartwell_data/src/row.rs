// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Table rows.

use alloc::vec::Vec;

use crate::value::{FieldKey, RowValues, Value};

/// Identity of a row.
///
/// Ids are assigned once when a row is created and survive every commit that
/// keeps the row, so they can be used to observe whether a row was rebuilt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub(crate) u64);

impl RowId {
    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// One row of a table storage.
///
/// Rows live in a dense, key-sorted vector owned by their storage. Neighbour
/// links are implicit: the previous and next rows are the adjacent entries of
/// that vector (see [`RowStore::prev`](crate::RowStore::prev)), so removing or
/// splicing rows can never leave a dangling link behind.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub(crate) id: RowId,
    pub(crate) key: f64,
    pub(crate) values: RowValues,
    pub(crate) computed_values: Vec<Option<f64>>,
    pub(crate) removed: bool,
}

impl TableRow {
    pub(crate) fn new(id: RowId, key: f64, values: RowValues) -> Self {
        Self {
            id,
            key,
            values,
            computed_values: Vec::new(),
            removed: false,
        }
    }

    /// Returns the row identity.
    #[must_use]
    pub const fn id(&self) -> RowId {
        self.id
    }

    /// Returns the sort key.
    #[must_use]
    pub const fn key(&self) -> f64 {
        self.key
    }

    /// Returns the raw values.
    #[must_use]
    pub const fn values(&self) -> &RowValues {
        &self.values
    }

    /// Returns the raw value of `field`.
    #[must_use]
    pub fn get(&self, field: &FieldKey) -> Option<&Value> {
        self.values.get(field)
    }

    /// Returns the numeric value of `field`, or `NaN`.
    #[must_use]
    pub fn number(&self, field: &FieldKey) -> f64 {
        self.values.number(field)
    }

    /// Returns the value of computed column `column`, if calculated.
    #[must_use]
    pub fn computed(&self, column: usize) -> Option<f64> {
        self.computed_values.get(column).copied().flatten()
    }

    /// Returns every computed value slot.
    #[must_use]
    pub fn computed_values(&self) -> &[Option<f64>] {
        &self.computed_values
    }

    /// Returns `true` if the row is marked for removal by a pending transaction.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }
}
