// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The table facade: one main storage, its aggregates, aggregators, and
//! computed columns.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use chartwell_consistency::{
    ComponentId, Dispatching, ListenerId, Signal, SignalDispatcher, SignalEvent,
};
use hashbrown::HashMap;

use crate::aggregated::{AggregateDirty, TableAggregatedStorage};
use crate::aggregator::{AggregationType, Aggregator, BuiltinAggregator};
use crate::computer::{ColumnComputer, ComputerId, ComputerSet};
use crate::interval::IntervalGenerator;
use crate::key::TableConfig;
use crate::main_storage::{RemoveFromStart, TableMainStorage};
use crate::mapping::{FieldSpec, MappedColumn, TableMapping, kind_for_name};
use crate::storage::TableStorage;
use crate::value::{FieldKey, RowValues};

/// Errors reported by [`Table`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableError {
    /// A computed column alias is already taken.
    DuplicateAlias(String),
    /// The computer was never created or has been deregistered.
    UnknownComputer(ComputerId),
    /// The mapping was created by another table.
    ForeignMapping,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateAlias(alias) => {
                write!(f, "computed column alias `{alias}` is already registered")
            }
            Self::UnknownComputer(id) => write!(f, "unknown computer {}", id.get()),
            Self::ForeignMapping => f.write_str("mapping belongs to a different table"),
        }
    }
}

impl core::error::Error for TableError {}

type AggregatorKey = (AggregationType, FieldKey, Option<FieldKey>);

/// A time-series table.
///
/// Mutations go to the main storage and, once committed, mark every
/// aggregated storage with the repair they need. Storages are brought up to
/// date lazily by [`storage`](Self::storage). The table dispatches
/// [`Signal::DATA_CHANGED`] whenever committed data or aggregate columns
/// change.
///
/// # Example
///
/// ```
/// use chartwell_data::{
///     AggregationType, DateTimeInterval, FieldKey, IntervalUnit, RemoveFromStart, RowValues,
///     Table, TableStorage,
/// };
///
/// let mut table = Table::default();
/// let close = table.register_field(FieldKey::Index(1), AggregationType::Last, None);
/// table.add_data(
///     [
///         RowValues::array([0.0, 10.0]),
///         RowValues::array([500.0, 11.0]),
///         RowValues::array([1500.0, 12.0]),
///     ],
///     RemoveFromStart::Keep,
/// );
///
/// let seconds = DateTimeInterval::new(IntervalUnit::Second, 1);
/// let grouped = table.storage(Some(&seconds));
/// assert_eq!(grouped.rows_count(), 2);
/// assert_eq!(grouped.select_all().max(&close.into()), 12.0);
/// ```
pub struct Table {
    main: TableMainStorage,
    aggregates: HashMap<String, TableAggregatedStorage>,
    aggregators: Vec<Box<dyn Aggregator>>,
    aggregator_columns: HashMap<AggregatorKey, usize>,
    computers: ComputerSet,
    dispatcher: SignalDispatcher,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("main", &self.main)
            .field("aggregates", &self.aggregates.len())
            .field("aggregators", &self.aggregators.len())
            .field("computers", &self.computers)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new(TableConfig::new())
    }
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        Self {
            main: TableMainStorage::new(config),
            aggregates: HashMap::new(),
            aggregators: Vec::new(),
            aggregator_columns: HashMap::new(),
            computers: ComputerSet::default(),
            dispatcher: SignalDispatcher::new(ComponentId::next(), Signal::DATA_CHANGED),
        }
    }

    /// Returns the table's component id, the source of its signals.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.dispatcher.source()
    }

    /// Registers a listener for table signals.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        self.dispatcher.listen(listener)
    }

    /// Removes a listener.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.dispatcher.unlisten(id)
    }

    /// Read access to the main storage without updating computed columns.
    #[must_use]
    pub const fn main_storage(&self) -> &TableMainStorage {
        &self.main
    }

    /// Returns the storage for `interval`, brought up to date.
    ///
    /// `None` is the main storage. Aggregated storages are created on first
    /// request and cached by [`IntervalGenerator::cache_key`].
    pub fn storage(&mut self, interval: Option<&dyn IntervalGenerator>) -> &mut dyn TableStorage {
        match interval {
            None => {
                self.main
                    .store_mut()
                    .update_computed(&mut self.computers, false);
                &mut self.main
            }
            Some(interval) => self.aggregated_storage(interval),
        }
    }

    /// Returns the aggregated storage for `interval`, brought up to date.
    pub fn aggregated_storage(
        &mut self,
        interval: &dyn IntervalGenerator,
    ) -> &mut TableAggregatedStorage {
        let storage = self
            .aggregates
            .entry(interval.cache_key())
            .or_insert_with(|| TableAggregatedStorage::new(Some(interval.boxed_clone())));
        storage.update(
            self.main.rows(),
            &mut self.aggregators,
            &mut self.computers,
        );
        storage
    }

    /// Registers a built-in aggregation of `column` and returns its bucket
    /// column. Identical registrations share a column.
    pub fn register_field(
        &mut self,
        column: FieldKey,
        kind: AggregationType,
        weights: Option<FieldKey>,
    ) -> usize {
        let key = (kind, column, weights);
        if let Some(index) = self.aggregator_columns.get(&key) {
            return *index;
        }
        let (kind, column, weights) = key.clone();
        let index = self.push_aggregator(Box::new(BuiltinAggregator::new(kind, column, weights)));
        self.aggregator_columns.insert(key, index);
        index
    }

    /// Creates a mapping of named fields, registering an aggregator for each.
    ///
    /// See [`FieldSpec`] for how a field is grouped when no kind is given.
    pub fn map_as<I, N, S>(&mut self, fields: I) -> TableMapping
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<FieldSpec>,
    {
        let mut mapping = TableMapping::new(self.id());
        for (name, spec) in fields {
            self.map_field(&mut mapping, name.into(), spec.into());
        }
        mapping
    }

    /// Adds field `name` to `mapping`.
    pub fn add_mapped_field(
        &mut self,
        mapping: &mut TableMapping,
        name: impl Into<String>,
        spec: impl Into<FieldSpec>,
    ) -> Result<(), TableError> {
        if mapping.table() != self.id() {
            return Err(TableError::ForeignMapping);
        }
        self.map_field(mapping, name.into(), spec.into());
        Ok(())
    }

    fn map_field(&mut self, mapping: &mut TableMapping, name: String, spec: FieldSpec) {
        let kind = spec.kind.unwrap_or_else(|| kind_for_name(&name));
        let aggregate = self.register_field(spec.column.clone(), kind, spec.weights);
        mapping.insert(
            name,
            MappedColumn::Source {
                source: spec.column,
                kind,
                aggregate,
            },
        );
    }

    /// Registers a custom aggregator and returns its bucket column.
    pub fn register_aggregator(&mut self, aggregator: Box<dyn Aggregator>) -> usize {
        self.push_aggregator(aggregator)
    }

    fn push_aggregator(&mut self, aggregator: Box<dyn Aggregator>) -> usize {
        let index = self.aggregators.len();
        self.aggregators.push(aggregator);
        self.set_aggregates_dirty(AggregateDirty::COLUMNS_COUNT, false);
        index
    }

    /// Number of aggregator columns.
    #[must_use]
    pub fn aggregator_count(&self) -> usize {
        self.aggregators.len()
    }

    /// Creates a computer. Give it columns with
    /// [`register_computed_column`](Self::register_computed_column).
    pub fn create_computer(&mut self, computer: impl ColumnComputer + 'static) -> ComputerId {
        self.computers.create(Box::new(computer))
    }

    /// Creates a computer that reads its inputs by name through `mapping`
    /// with [`ComputeContext::field`](crate::ComputeContext::field).
    pub fn create_mapped_computer(
        &mut self,
        mapping: &TableMapping,
        computer: impl ColumnComputer + 'static,
    ) -> Result<ComputerId, TableError> {
        if mapping.table() != self.id() {
            return Err(TableError::ForeignMapping);
        }
        Ok(self
            .computers
            .create_mapped(Box::new(computer), Some(mapping.clone())))
    }

    /// Allocates an output column for `computer`, optionally under a unique
    /// alias.
    pub fn register_computed_column(
        &mut self,
        computer: ComputerId,
        alias: Option<&str>,
    ) -> Result<usize, TableError> {
        self.computers
            .register_column(computer, alias)
            .inspect_err(|err| tracing::warn!(%err, "computed column not registered"))
    }

    /// Looks up a computed column by alias.
    #[must_use]
    pub fn computed_column_by_alias(&self, alias: &str) -> Option<usize> {
        self.computers.column_by_alias(alias)
    }

    /// Returns the output columns of `computer`.
    #[must_use]
    pub fn computer_outputs(&self, computer: ComputerId) -> Option<&[usize]> {
        self.computers.outputs(computer)
    }

    /// Number of computed columns in use.
    #[must_use]
    pub fn computed_columns_count(&self) -> usize {
        self.computers.columns()
    }

    /// Removes `computer` and frees its columns for reuse.
    pub fn deregister_computer(&mut self, computer: ComputerId) -> Result<(), TableError> {
        if let Some(lowest) = self.computers.deregister(computer)? {
            self.main.store_mut().lower_watermark(lowest);
            for storage in self.aggregates.values_mut() {
                storage.store_mut().lower_watermark(lowest);
            }
        }
        Ok(())
    }

    /// Marks every aggregate with `dirty` and dispatches
    /// [`Signal::DATA_CHANGED`] if anything observable changed.
    pub fn set_aggregates_dirty(&mut self, dirty: AggregateDirty, main_changed: bool) {
        let mut changed = main_changed;
        for storage in self.aggregates.values_mut() {
            changed |= storage.set_dirty(dirty);
        }
        if changed {
            self.dispatcher.dispatch(Signal::DATA_CHANGED);
        }
    }

    fn forward_commit(&mut self) {
        if let Some(dirty) = self.main.take_committed() {
            self.set_aggregates_dirty(dirty, true);
        }
    }

    /// Starts an explicit transaction.
    pub fn start_transaction(&mut self) {
        self.main.start_transaction();
    }

    /// Commits the current transaction.
    pub fn commit(&mut self) {
        self.main.commit();
        self.forward_commit();
    }

    /// Discards the current transaction.
    pub fn rollback(&mut self) {
        self.main.rollback();
    }

    /// Adds rows. See [`TableMainStorage::add_data`].
    pub fn add_data<I>(&mut self, rows: I, remove_from_start: RemoveFromStart) -> usize
    where
        I: IntoIterator<Item = RowValues>,
    {
        let accepted = self.main.add_data(rows, remove_from_start);
        self.forward_commit();
        accepted
    }

    /// Removes rows with keys in `[start, end]`.
    pub fn remove(&mut self, start: Option<f64>, end: Option<f64>) {
        self.main.remove(start, end);
        self.forward_commit();
    }

    /// Removes the first `count` distinct keys.
    pub fn remove_first(&mut self, count: usize) {
        self.main.remove_first(count);
        self.forward_commit();
    }

    /// Releases listeners.
    pub fn dispose(&mut self) {
        self.dispatcher.dispose();
    }
}

impl Dispatching for Table {
    fn dispatcher_mut(&mut self) -> &mut SignalDispatcher {
        &mut self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use crate::computer::ComputeContext;
    use crate::interval::{DateTimeInterval, IntervalUnit};
    use chartwell_consistency::SignalInbox;

    fn rows(points: &[(f64, f64)]) -> Vec<RowValues> {
        points.iter().map(|(k, v)| RowValues::array([*k, *v])).collect()
    }

    #[test]
    fn data_changed_only_when_something_changed() {
        let mut table = Table::default();
        let inbox = SignalInbox::new();
        table.listen(inbox.handler());

        table.add_data(rows(&[(1.0, 1.0)]), RemoveFromStart::Keep);
        assert_eq!(inbox.take(), Signal::DATA_CHANGED);

        // An empty commit changes nothing.
        table.commit();
        assert_eq!(inbox.deliveries(), 1);

        // A new aggregator with no aggregates yet is not observable.
        table.register_field(FieldKey::Index(1), AggregationType::Sum, None);
        assert_eq!(inbox.deliveries(), 1);

        let days = DateTimeInterval::new(IntervalUnit::Day, 1);
        table.storage(Some(&days));
        table.register_field(FieldKey::Index(1), AggregationType::Max, None);
        assert_eq!(inbox.deliveries(), 2);

        // Already dirty: no second signal.
        table.register_field(FieldKey::Index(1), AggregationType::Min, None);
        assert_eq!(inbox.deliveries(), 2);
    }

    #[test]
    fn register_field_dedupes() {
        let mut table = Table::default();
        let a = table.register_field(FieldKey::Index(1), AggregationType::Sum, None);
        let b = table.register_field(FieldKey::Index(2), AggregationType::Sum, None);
        let c = table.register_field(FieldKey::Index(1), AggregationType::Sum, None);
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(table.aggregator_count(), 2);
    }

    #[test]
    fn computed_columns_run_per_storage() {
        let mut table = Table::default();
        let computer = table.create_computer(|ctx: &mut ComputeContext<'_>| {
            let v = ctx.number(&FieldKey::Index(1));
            let out = if ctx.is_aggregated() { -v } else { v };
            ctx.set_output(0, out);
        });
        let column = table
            .register_computed_column(computer, Some("signed"))
            .unwrap();
        assert_eq!(table.computed_column_by_alias("signed"), Some(column));

        table.register_field(FieldKey::Index(1), AggregationType::Sum, None);
        table.add_data(rows(&[(1.0, 2.0), (2.0, 3.0)]), RemoveFromStart::Keep);

        let main = table.storage(None);
        assert_eq!(main.rows()[1].computed(column), Some(3.0));
        assert_eq!(main.select_all().calc_max(column), 3.0);

        // Aggregated rows hold the aggregator output in column 0.
        let seconds = DateTimeInterval::new(IntervalUnit::Second, 1);
        let grouped = table.storage(Some(&seconds));
        assert_eq!(grouped.rows_count(), 1);
        assert_eq!(grouped.rows()[0].number(&FieldKey::Index(0)), 5.0);

        table.deregister_computer(computer).unwrap();
        assert_eq!(table.computed_column_by_alias("signed"), None);
        assert_eq!(
            table.deregister_computer(computer),
            Err(TableError::UnknownComputer(computer))
        );
    }

    #[test]
    fn duplicate_alias_is_an_error() {
        let mut table = Table::default();
        let computer = table.create_computer(|_: &mut ComputeContext<'_>| {});
        table.register_computed_column(computer, Some("x")).unwrap();
        let err = table
            .register_computed_column(computer, Some("x"))
            .unwrap_err();
        assert_eq!(err.to_string(), "computed column alias `x` is already registered");
    }

    #[test]
    fn mappings_read_raw_and_grouped_rows_by_name() {
        let mut table = Table::default();
        let mut mapping = table.map_as([("high", FieldKey::Index(1)), ("low", FieldKey::Index(2))]);
        table
            .add_mapped_field(
                &mut mapping,
                "value",
                FieldSpec::new(FieldKey::Index(1)).kind(AggregationType::Sum),
            )
            .unwrap();
        assert_eq!(mapping.aggregate_column("high"), Some(0));
        assert_eq!(mapping.aggregate_column("low"), Some(1));
        assert_eq!(mapping.aggregate_column("value"), Some(2));
        assert_eq!(mapping.source_column("value"), Some(&FieldKey::Index(1)));

        table.add_data(
            [
                RowValues::array([0.0, 5.0, 1.0]),
                RowValues::array([500.0, 7.0, 2.0]),
                RowValues::array([1000.0, 6.0, 3.0]),
            ],
            RemoveFromStart::Keep,
        );

        let main = table.storage(None);
        let all = main.select_all();
        assert_eq!(mapping.max(&all, "high", false), 7.0);
        assert_eq!(mapping.min(&all, "low", false), 1.0);
        assert_eq!(mapping.row(&main.rows()[1], false).get("high"), 7.0);

        let seconds = DateTimeInterval::new(IntervalUnit::Second, 1);
        let grouped = table.storage(Some(&seconds));
        assert_eq!(grouped.rows_count(), 2);
        let all = grouped.select_all();
        assert_eq!(mapping.max(&all, "value", true), 12.0);
        assert_eq!(mapping.min(&all, "low", true), 1.0);
        let bucket = mapping.row(&grouped.rows()[0], true);
        assert_eq!(
            (bucket.get("high"), bucket.get("low"), bucket.get("value")),
            (7.0, 1.0, 12.0)
        );
        assert!(bucket.get("missing").is_nan());
    }

    #[test]
    fn mapped_computers_read_fields_by_name() {
        let mut table = Table::default();
        let mut mapping = table.map_as([("high", FieldKey::Index(1)), ("low", FieldKey::Index(2))]);
        let spread = table
            .create_mapped_computer(&mapping, |ctx: &mut ComputeContext<'_>| {
                let v = ctx.field("high") - ctx.field("low");
                ctx.set_output(0, v);
            })
            .unwrap();
        let column = table.register_computed_column(spread, None).unwrap();
        mapping.add_computed("spread", column);
        table.add_data(
            [
                RowValues::array([0.0, 5.0, 1.0]),
                RowValues::array([500.0, 7.0, 2.0]),
            ],
            RemoveFromStart::Keep,
        );

        let main = table.storage(None);
        assert_eq!(mapping.row(&main.rows()[1], false).get("spread"), 5.0);
        assert_eq!(mapping.max(&main.select_all(), "spread", false), 5.0);

        // Buckets read the aggregated high and low.
        let seconds = DateTimeInterval::new(IntervalUnit::Second, 1);
        let grouped = table.storage(Some(&seconds));
        assert_eq!(mapping.row(&grouped.rows()[0], true).get("spread"), 6.0);
    }

    #[test]
    fn mappings_belong_to_one_table() {
        let mut table = Table::default();
        let mut other = Table::default();
        let mut mapping = table.map_as([("close", FieldKey::Index(1))]);
        assert_eq!(
            other.add_mapped_field(&mut mapping, "open", FieldKey::Index(2)),
            Err(TableError::ForeignMapping)
        );
        assert_eq!(
            other
                .create_mapped_computer(&mapping, |_: &mut ComputeContext<'_>| {})
                .unwrap_err(),
            TableError::ForeignMapping
        );
        assert_eq!(mapping.len(), 1);
        assert_eq!(other.aggregator_count(), 0);
    }

    #[test]
    fn aggregates_follow_appends() {
        let mut table = Table::default();
        let sum = table.register_field(FieldKey::Index(1), AggregationType::Sum, None);
        let seconds = DateTimeInterval::new(IntervalUnit::Second, 1);
        table.add_data(rows(&[(0.0, 1.0), (100.0, 2.0)]), RemoveFromStart::Keep);
        assert_eq!(table.storage(Some(&seconds)).rows_count(), 1);

        table.add_data(rows(&[(900.0, 4.0), (1000.0, 8.0)]), RemoveFromStart::Keep);
        let grouped = table.aggregated_storage(&seconds);
        assert_eq!(grouped.full_rebuilds(), 1);
        let sums: Vec<f64> = grouped
            .rows()
            .iter()
            .map(|r| r.number(&sum.into()))
            .collect();
        assert_eq!(sums, [7.0, 8.0]);
    }
}
