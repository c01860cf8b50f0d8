// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Computed columns: user calculations that write derived values into rows.
//!
//! A [`ColumnComputer`] owns zero or more output columns, allocated from a
//! table-wide pool by [`Table::register_computed_column`]. Every storage of
//! the table (the main storage and each aggregated storage) runs the
//! computers over its own rows, so indicators such as moving averages are
//! computed at every aggregation level.
//!
//! [`Table::register_computed_column`]: crate::Table::register_computed_column

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::mapping::TableMapping;
use crate::row::TableRow;
use crate::table::TableError;
use crate::value::{FieldKey, Value};

/// A calculation over the rows of a storage.
///
/// [`start`](Self::start) is called once before every pass, then
/// [`calculate`](Self::calculate) once per row in key order. Passes happen
/// whenever a storage's computed columns are invalidated (after commits and
/// aggregate rebuilds), so computers must not assume they see each row once.
///
/// Closures taking a [`ComputeContext`] implement this trait.
pub trait ColumnComputer {
    /// Resets running state before a pass.
    fn start(&mut self) {}

    /// Computes the outputs for one row.
    fn calculate(&mut self, ctx: &mut ComputeContext<'_>);
}

impl<F> ColumnComputer for F
where
    F: FnMut(&mut ComputeContext<'_>),
{
    fn calculate(&mut self, ctx: &mut ComputeContext<'_>) {
        self(ctx);
    }
}

/// Per-row view handed to a [`ColumnComputer`].
pub struct ComputeContext<'a> {
    pub(crate) row: &'a mut TableRow,
    pub(crate) mapping: Option<&'a TableMapping>,
    pub(crate) outputs: &'a [usize],
    pub(crate) aggregated: bool,
    pub(crate) index: usize,
}

impl fmt::Debug for ComputeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeContext")
            .field("key", &self.row.key)
            .field("outputs", &self.outputs)
            .field("aggregated", &self.aggregated)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ComputeContext<'_> {
    /// Returns the row key.
    #[must_use]
    pub fn key(&self) -> f64 {
        self.row.key
    }

    /// Returns the raw value of `field`.
    #[must_use]
    pub fn value(&self, field: &FieldKey) -> Option<&Value> {
        self.row.get(field)
    }

    /// Returns the numeric value of `field`, or `NaN`.
    #[must_use]
    pub fn number(&self, field: &FieldKey) -> f64 {
        self.row.number(field)
    }

    /// Returns the value of mapped field `name`, or `NaN`.
    ///
    /// Raw rows read the field's source column and aggregated rows its
    /// aggregator column. Computers created without a mapping read `NaN`.
    #[must_use]
    pub fn field(&self, name: &str) -> f64 {
        self.mapping
            .map_or(f64::NAN, |m| m.number(self.row, name, self.aggregated))
    }

    /// Returns computed column `column` of this row, if already calculated.
    #[must_use]
    pub fn computed(&self, column: usize) -> Option<f64> {
        self.row.computed(column)
    }

    /// Returns the table column of this computer's `n`th output.
    #[must_use]
    pub fn output_column(&self, n: usize) -> Option<usize> {
        self.outputs.get(n).copied()
    }

    /// Writes computed column `column`.
    ///
    /// Writes to columns beyond the table's allocated range are ignored.
    pub fn set(&mut self, column: usize, value: f64) {
        if let Some(slot) = self.row.computed_values.get_mut(column) {
            *slot = Some(value);
        }
    }

    /// Writes this computer's `n`th output column.
    pub fn set_output(&mut self, n: usize, value: f64) {
        if let Some(column) = self.output_column(n) {
            self.set(column, value);
        }
    }

    /// Returns `true` when running over an aggregated storage.
    #[must_use]
    pub const fn is_aggregated(&self) -> bool {
        self.aggregated
    }

    /// Position of the row within its storage.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the whole row.
    #[must_use]
    pub fn row(&self) -> &TableRow {
        self.row
    }
}

/// Handle to a computer registered with a table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputerId(u32);

impl ComputerId {
    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

pub(crate) struct ComputerSlot {
    pub(crate) id: ComputerId,
    pub(crate) computer: Box<dyn ColumnComputer>,
    pub(crate) mapping: Option<TableMapping>,
    pub(crate) outputs: Vec<usize>,
}

impl fmt::Debug for ComputerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputerSlot")
            .field("id", &self.id)
            .field("mapping", &self.mapping)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl ComputerSlot {
    /// Rightmost output column, if any.
    pub(crate) fn rightmost(&self) -> Option<usize> {
        self.outputs.iter().copied().max()
    }

    /// Returns `true` if this computer writes at or right of `watermark - 1`.
    ///
    /// Computers are registered left to right, so a computer whose outputs all
    /// sit left of the watermark has nothing stale to recompute.
    pub(crate) fn needs_run(&self, watermark: usize) -> bool {
        self.rightmost().is_some_and(|r| r + 1 >= watermark)
    }
}

/// The computers of a table and the column pool they draw from.
#[derive(Debug, Default)]
pub(crate) struct ComputerSet {
    slots: Vec<ComputerSlot>,
    next_id: u32,
    columns: usize,
    reusable: Vec<usize>,
    aliases: HashMap<String, usize>,
}

impl ComputerSet {
    pub(crate) fn create(&mut self, computer: Box<dyn ColumnComputer>) -> ComputerId {
        self.create_mapped(computer, None)
    }

    pub(crate) fn create_mapped(
        &mut self,
        computer: Box<dyn ColumnComputer>,
        mapping: Option<TableMapping>,
    ) -> ComputerId {
        let id = ComputerId(self.next_id);
        self.next_id += 1;
        self.slots.push(ComputerSlot {
            id,
            computer,
            mapping,
            outputs: Vec::new(),
        });
        id
    }

    fn slot_index(&self, id: ComputerId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    /// Allocates an output column for `id`, reusing the smallest freed index.
    pub(crate) fn register_column(
        &mut self,
        id: ComputerId,
        alias: Option<&str>,
    ) -> Result<usize, TableError> {
        let slot = self
            .slot_index(id)
            .ok_or(TableError::UnknownComputer(id))?;
        if let Some(alias) = alias
            && self.aliases.contains_key(alias)
        {
            return Err(TableError::DuplicateAlias(alias.into()));
        }

        let column = if self.reusable.is_empty() {
            let column = self.columns;
            self.columns += 1;
            column
        } else {
            // Kept sorted, so the front is the smallest.
            self.reusable.remove(0)
        };
        self.slots[slot].outputs.push(column);
        if let Some(alias) = alias {
            self.aliases.insert(alias.into(), column);
        }
        Ok(column)
    }

    /// Removes `id` and frees its columns. Returns the smallest freed column.
    pub(crate) fn deregister(&mut self, id: ComputerId) -> Result<Option<usize>, TableError> {
        let slot = self
            .slot_index(id)
            .ok_or(TableError::UnknownComputer(id))?;
        let slot = self.slots.remove(slot);
        let lowest = slot.outputs.iter().copied().min();
        self.aliases.retain(|_, column| !slot.outputs.contains(column));
        self.reusable.extend_from_slice(&slot.outputs);
        self.reusable.sort_unstable();
        // Freed columns at the end of the range shrink it instead.
        while self.columns > 0 && self.reusable.last() == Some(&(self.columns - 1)) {
            self.reusable.pop();
            self.columns -= 1;
        }
        Ok(lowest)
    }

    pub(crate) fn column_by_alias(&self, alias: &str) -> Option<usize> {
        self.aliases.get(alias).copied()
    }

    pub(crate) fn outputs(&self, id: ComputerId) -> Option<&[usize]> {
        self.slot_index(id).map(|i| self.slots[i].outputs.as_slice())
    }

    /// Number of computed columns ever allocated.
    pub(crate) fn columns(&self) -> usize {
        self.columns
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [ComputerSlot] {
        &mut self.slots
    }
}
