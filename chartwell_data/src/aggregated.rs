// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Aggregated storages: main-storage rows folded into interval buckets.
//!
//! An aggregated storage keeps a dirty mask describing how the main storage
//! changed since the last update, and repairs only the affected buckets:
//!
//! - [`AggregateDirty::LEFT_REMOVES`]: leading buckets are dropped and the
//!   boundary bucket is re-aggregated from what remains.
//! - [`AggregateDirty::RIGHT_APPENDS`]: the last bucket is popped and
//!   everything from its key onwards is re-aggregated.
//! - [`AggregateDirty::COLUMNS_COUNT`]: new aggregators are folded into
//!   every existing bucket.
//! - [`AggregateDirty::TOTAL_MESS`]: full rebuild.
//!
//! Repairs produce the same rows as a full rebuild would.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use bitflags::bitflags;

use crate::aggregator::Aggregator;
use crate::computer::ComputerSet;
use crate::interval::IntervalGenerator;
use crate::row::{RowId, TableRow};
use crate::selection::KnownFields;
use crate::storage::{RowStore, TableStorage};
use crate::value::{RowValues, Value};

bitflags! {
    /// What an aggregated storage must repair on its next update.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct AggregateDirty: u8 {
        /// Rows were appended right of the previous last key.
        const RIGHT_APPENDS = 1 << 0;
        /// Leading rows were removed.
        const LEFT_REMOVES = 1 << 1;
        /// Aggregators were added.
        const COLUMNS_COUNT = 1 << 2;
        /// Anything else; forces a full rebuild.
        const TOTAL_MESS = 1 << 3;
    }
}

/// A storage of buckets derived from the main storage.
///
/// Bucket `i` holds, in column `j`, the value of aggregator `j` over the main
/// rows whose keys fall in `[bucket_i.key, bucket_{i+1}.key)`. Without an
/// interval every main row is its own bucket.
pub struct TableAggregatedStorage {
    store: RowStore,
    interval: Option<Box<dyn IntervalGenerator>>,
    dirty: AggregateDirty,
    num_columns: usize,
    next_row_id: u64,
    full_rebuilds: u64,
}

impl fmt::Debug for TableAggregatedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableAggregatedStorage")
            .field("store", &self.store)
            .field("interval", &self.interval)
            .field("dirty", &self.dirty)
            .field("num_columns", &self.num_columns)
            .field("full_rebuilds", &self.full_rebuilds)
            .finish_non_exhaustive()
    }
}

impl TableAggregatedStorage {
    /// Creates an empty storage that will fully build on first update.
    #[must_use]
    pub fn new(interval: Option<Box<dyn IntervalGenerator>>) -> Self {
        Self {
            store: RowStore::default(),
            interval,
            dirty: AggregateDirty::TOTAL_MESS,
            num_columns: 0,
            next_row_id: 0,
            full_rebuilds: 0,
        }
    }

    /// Returns the interval, if any.
    #[must_use]
    pub fn interval(&self) -> Option<&dyn IntervalGenerator> {
        self.interval.as_deref()
    }

    /// Returns the pending repairs.
    #[must_use]
    pub const fn dirty(&self) -> AggregateDirty {
        self.dirty
    }

    /// Adds `dirty` to the pending repairs. Returns `true` if the mask grew.
    pub fn set_dirty(&mut self, dirty: AggregateDirty) -> bool {
        let before = self.dirty;
        self.dirty |= dirty;
        self.dirty != before
    }

    /// Number of aggregator columns in every bucket.
    #[must_use]
    pub const fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Number of full rebuilds performed so far.
    #[must_use]
    pub const fn full_rebuilds(&self) -> u64 {
        self.full_rebuilds
    }

    pub(crate) fn store_mut(&mut self) -> &mut RowStore {
        &mut self.store
    }

    /// Repairs the buckets against `main`, then brings computed columns up to
    /// date.
    pub(crate) fn update(
        &mut self,
        main: &[TableRow],
        aggregators: &mut [Box<dyn Aggregator>],
        computers: &mut ComputerSet,
    ) {
        if !self.dirty.is_empty() {
            let dirty = self.dirty;
            if dirty.contains(AggregateDirty::TOTAL_MESS) {
                self.store.computed_columns = 0;
                self.store.rows.clear();
                self.create_aggregate(main, aggregators, aggregators.len(), None);
                self.full_rebuilds += 1;
            } else {
                if dirty.contains(AggregateDirty::LEFT_REMOVES) {
                    self.store.computed_columns = 0;
                    self.aggregate_removes(main, aggregators);
                }
                if dirty.contains(AggregateDirty::RIGHT_APPENDS) {
                    self.store.computed_columns = 0;
                    let start = self.store.rows.pop().map(|row| row.key);
                    self.create_aggregate(main, aggregators, self.num_columns, start);
                }
                if dirty.contains(AggregateDirty::COLUMNS_COUNT) {
                    // Computers may read the new columns.
                    self.store.computed_columns = 0;
                    self.aggregate_new_columns(main, aggregators);
                }
            }
            tracing::debug!(
                ?dirty,
                buckets = self.store.rows.len(),
                columns = aggregators.len(),
                "aggregated storage repaired"
            );
            self.num_columns = aggregators.len();
            self.dirty = AggregateDirty::empty();
            self.store.drop_caches();
        }
        self.store.update_computed(computers, true);
    }

    fn push_bucket(&mut self, key: f64, values: Vec<Value>) {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        self.store
            .rows
            .push(TableRow::new(id, key, RowValues::Array(values)));
    }

    /// Appends buckets for the main rows with keys `>= start`.
    fn create_aggregate(
        &mut self,
        main: &[TableRow],
        aggregators: &mut [Box<dyn Aggregator>],
        columns: usize,
        start: Option<f64>,
    ) {
        let from = start.map_or(0, |key| main.partition_point(|row| row.key < key));
        let source = &main[from..];
        let Some(first) = source.first() else {
            return;
        };
        let columns = 0..columns;

        let Some(interval) = self.interval.as_mut() else {
            for row in source {
                feed(aggregators, columns.clone(), row);
                let values = collect(aggregators, columns.clone());
                self.push_bucket(row.key, values);
            }
            return;
        };

        interval.set_start(first.key);
        let mut key = interval.next_boundary();
        let mut buckets = Vec::new();
        let mut i = 0;
        while i < source.len() {
            let mut next_key = interval.next_boundary();
            if !next_key.is_nan() && next_key <= key {
                tracing::warn!(key, next_key, "interval did not advance; closing buckets");
                next_key = f64::NAN;
            }
            let begin = i;
            while i < source.len() && (next_key.is_nan() || source[i].key < next_key) {
                feed(aggregators, columns.clone(), &source[i]);
                i += 1;
            }
            if i > begin {
                buckets.push((key, collect(aggregators, columns.clone())));
            }
            key = next_key;
        }
        for (key, values) in buckets {
            self.push_bucket(key, values);
        }
    }

    /// Drops buckets left of the main storage's first key and re-aggregates
    /// the bucket that now straddles it.
    fn aggregate_removes(&mut self, main: &[TableRow], aggregators: &mut [Box<dyn Aggregator>]) {
        let Some(first_main) = main.first() else {
            self.store.rows.clear();
            return;
        };
        let first_key = first_main.key;
        let rows = &mut self.store.rows;
        if rows.first().is_none_or(|bucket| bucket.key >= first_key) {
            return;
        }

        let mut prev = 0;
        while rows.get(prev + 1).is_some_and(|bucket| bucket.key < first_key) {
            prev += 1;
        }
        let mut remove = prev;
        match rows.get(prev + 1) {
            Some(next) if next.key == first_key => remove += 1,
            next => {
                let limit = next.map_or(f64::INFINITY, |bucket| bucket.key);
                let columns = 0..self.num_columns;
                for row in main.iter().take_while(|row| row.key < limit) {
                    feed(aggregators, columns.clone(), row);
                }
                rows[prev].values = RowValues::Array(collect(aggregators, columns));
            }
        }
        rows.drain(..remove);
    }

    /// Folds aggregators `num_columns..` into every existing bucket.
    fn aggregate_new_columns(&mut self, main: &[TableRow], aggregators: &mut [Box<dyn Aggregator>]) {
        let columns = self.num_columns..aggregators.len();
        if columns.is_empty() {
            return;
        }
        let rows = &mut self.store.rows;
        let mut m = 0;
        for b in 0..rows.len() {
            if m >= main.len() {
                break;
            }
            let next_key = rows.get(b + 1).map(|bucket| bucket.key);
            while m < main.len() && next_key.is_none_or(|key| main[m].key < key) {
                feed(aggregators, columns.clone(), &main[m]);
                m += 1;
            }
            let added = collect(aggregators, columns.clone());
            if let RowValues::Array(values) = &mut rows[b].values {
                values.resize(columns.start, Value::Null);
                values.extend(added);
            }
        }
    }
}

fn feed(aggregators: &mut [Box<dyn Aggregator>], columns: Range<usize>, row: &TableRow) {
    for aggregator in &mut aggregators[columns] {
        let value = row.values.get(aggregator.values_column());
        let weight = aggregator
            .weights_column()
            .and_then(|column| row.values.get(column));
        aggregator.process(value, weight, &row.values);
    }
}

fn collect(aggregators: &mut [Box<dyn Aggregator>], columns: Range<usize>) -> Vec<Value> {
    aggregators[columns]
        .iter_mut()
        .map(|aggregator| aggregator.value_and_clear())
        .collect()
}

impl TableStorage for TableAggregatedStorage {
    fn row_store(&self) -> &RowStore {
        &self.store
    }

    fn parts_mut(&mut self) -> (&mut RowStore, KnownFields<'_>) {
        (&mut self.store, KnownFields::Columns(self.num_columns))
    }

    fn known_fields(&self) -> KnownFields<'_> {
        KnownFields::Columns(self.num_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AggregationType, BuiltinAggregator};
    use crate::interval::{DateTimeInterval, IntervalUnit};
    use crate::value::FieldKey;

    fn main_rows(points: &[(f64, f64)]) -> Vec<TableRow> {
        points
            .iter()
            .enumerate()
            .map(|(i, (k, v))| TableRow::new(RowId(i as u64), *k, RowValues::array([*k, *v])))
            .collect()
    }

    fn aggs(kinds: &[AggregationType]) -> Vec<Box<dyn Aggregator>> {
        kinds
            .iter()
            .map(|k| {
                Box::new(BuiltinAggregator::new(*k, FieldKey::Index(1), None)) as Box<dyn Aggregator>
            })
            .collect()
    }

    /// Ten-millisecond buckets; the fixed origin is a multiple of ten.
    fn tens() -> Option<Box<dyn IntervalGenerator>> {
        Some(Box::new(DateTimeInterval::new(IntervalUnit::Millisecond, 10)))
    }

    fn snapshot(s: &TableAggregatedStorage) -> Vec<(f64, RowValues)> {
        s.rows().iter().map(|r| (r.key, r.values.clone())).collect()
    }

    #[test]
    fn one_bucket_per_interval() {
        let main = main_rows(&[(1.0, 1.0), (5.0, 2.0), (12.0, 3.0), (35.0, 4.0)]);
        let mut a = aggs(&[AggregationType::Sum, AggregationType::Count]);
        let mut s = TableAggregatedStorage::new(tens());
        s.update(&main, &mut a, &mut ComputerSet::default());
        assert_eq!(
            snapshot(&s),
            [
                (0.0, RowValues::array([3.0, 2.0])),
                (10.0, RowValues::array([3.0, 1.0])),
                (30.0, RowValues::array([4.0, 1.0])),
            ]
        );
        assert_eq!(s.dirty(), AggregateDirty::empty());
        assert_eq!(s.full_rebuilds(), 1);
    }

    #[test]
    fn without_interval_each_row_is_a_bucket() {
        let main = main_rows(&[(1.0, 1.0), (5.0, 2.0)]);
        let mut a = aggs(&[AggregationType::Max]);
        let mut s = TableAggregatedStorage::new(None);
        s.update(&main, &mut a, &mut ComputerSet::default());
        assert_eq!(
            snapshot(&s),
            [(1.0, RowValues::array([1.0])), (5.0, RowValues::array([2.0]))]
        );
    }

    #[test]
    fn incremental_repairs_match_rebuild() {
        let mut main = main_rows(&[(1.0, 1.0), (5.0, 2.0), (12.0, 3.0), (15.0, 4.0)]);
        let mut a = aggs(&[AggregationType::Sum]);
        let mut s = TableAggregatedStorage::new(tens());
        let mut computers = ComputerSet::default();
        s.update(&main, &mut a, &mut computers);

        // Append into the open bucket and beyond, drop the first row.
        main.remove(0);
        main.extend(main_rows(&[(18.0, 5.0), (21.0, 6.0)]));
        assert!(s.set_dirty(AggregateDirty::RIGHT_APPENDS | AggregateDirty::LEFT_REMOVES));
        assert!(!s.set_dirty(AggregateDirty::RIGHT_APPENDS));

        // And add a column.
        a.extend(aggs(&[AggregationType::Min]));
        s.set_dirty(AggregateDirty::COLUMNS_COUNT);
        s.update(&main, &mut a, &mut computers);

        let mut fresh = TableAggregatedStorage::new(tens());
        fresh.update(&main, &mut a, &mut computers);
        assert_eq!(snapshot(&s), snapshot(&fresh));
        assert_eq!(s.full_rebuilds(), 1);
        assert_eq!(
            snapshot(&s),
            [
                (0.0, RowValues::array([2.0, 2.0])),
                (10.0, RowValues::array([12.0, 3.0])),
                (20.0, RowValues::array([6.0, 6.0])),
            ]
        );
    }

    #[test]
    fn removing_whole_buckets() {
        let mut main = main_rows(&[(1.0, 1.0), (12.0, 2.0), (25.0, 3.0)]);
        let mut a = aggs(&[AggregationType::Sum]);
        let mut s = TableAggregatedStorage::new(tens());
        let mut computers = ComputerSet::default();
        s.update(&main, &mut a, &mut computers);

        main.drain(..2);
        s.set_dirty(AggregateDirty::LEFT_REMOVES);
        s.update(&main, &mut a, &mut computers);
        assert_eq!(snapshot(&s), [(20.0, RowValues::array([3.0]))]);

        main.clear();
        s.set_dirty(AggregateDirty::LEFT_REMOVES);
        s.update(&main, &mut a, &mut computers);
        assert_eq!(s.rows_count(), 0);
    }
}
