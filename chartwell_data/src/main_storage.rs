// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The main storage: raw rows, staged appends, and transactional commits.

use alloc::vec::Vec;
use core::fmt;
use core::mem;

use hashbrown::HashSet;

use crate::aggregated::AggregateDirty;
use crate::key::TableConfig;
use crate::merge::{Directed, MergingIterator};
use crate::row::{RowId, TableRow};
use crate::search::compare_keys;
use crate::selection::KnownFields;
use crate::storage::{RowStore, TableStorage};
use crate::value::{FieldKey, RowValues};

/// Ordering of the staged appends, tracked as rows arrive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum PusherMode {
    /// Nothing staged yet.
    #[default]
    First,
    /// Strictly ascending.
    Ascending,
    /// Strictly descending.
    Descending,
    /// Unordered; sorted on commit.
    Assorted,
}

/// Which rows are marked for removal by the current transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RemovesStatus {
    /// Nothing.
    #[default]
    None,
    /// A prefix of the merged sequence.
    OnlyLeading,
    /// Anything.
    Arbitrary,
}

/// How many leading rows [`TableMainStorage::add_data`] drops after adding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RemoveFromStart {
    /// Keep everything.
    #[default]
    Keep,
    /// Drop this many distinct keys.
    Count(usize),
    /// Drop as many distinct keys as rows were accepted. Rows that replace
    /// an existing key are counted too, so the window only keeps its size
    /// when every row brings a new key.
    Added,
}

/// Key-sorted raw rows with one-level transactions.
///
/// Rows are staged as appends and merged into the storage on
/// [`commit`](Self::commit). Appends that all land right of the last stored
/// key (with at most a leading removal) are committed in place; anything else
/// rebuilds the storage from a merge of rows and appends. On equal keys the
/// most recently staged row wins.
///
/// Each commit leaves behind the [`AggregateDirty`] delta that aggregated
/// storages need, retrieved with [`take_committed`](Self::take_committed).
pub struct TableMainStorage {
    store: RowStore,
    config: TableConfig,
    appends: Vec<TableRow>,
    pusher: PusherMode,
    removes: RemovesStatus,
    in_transaction: bool,
    largest_seen_row_length: usize,
    object_fields: Option<Vec<FieldKey>>,
    object_fields_seen: HashSet<FieldKey>,
    next_row_id: u64,
    full_rebuilds: u64,
    committed: Option<AggregateDirty>,
}

impl fmt::Debug for TableMainStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableMainStorage")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("appends", &self.appends.len())
            .field("pusher", &self.pusher)
            .field("removes", &self.removes)
            .field("in_transaction", &self.in_transaction)
            .field("largest_seen_row_length", &self.largest_seen_row_length)
            .field("object_fields", &self.object_fields)
            .field("full_rebuilds", &self.full_rebuilds)
            .finish_non_exhaustive()
    }
}

impl Default for TableMainStorage {
    fn default() -> Self {
        Self::new(TableConfig::new())
    }
}

impl TableMainStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        Self {
            store: RowStore::default(),
            config,
            appends: Vec::new(),
            pusher: PusherMode::First,
            removes: RemovesStatus::None,
            in_transaction: false,
            largest_seen_row_length: 0,
            object_fields: None,
            object_fields_seen: HashSet::new(),
            next_row_id: 0,
            full_rebuilds: 0,
            committed: None,
        }
    }

    /// Returns the key configuration.
    #[must_use]
    pub const fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Returns `true` inside an explicit transaction.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Returns the ordering of the staged appends.
    #[must_use]
    pub const fn pusher_mode(&self) -> PusherMode {
        self.pusher
    }

    /// Returns the pending removal status.
    #[must_use]
    pub const fn removes_status(&self) -> RemovesStatus {
        self.removes
    }

    /// Number of staged rows.
    #[must_use]
    pub fn pending_appends(&self) -> usize {
        self.appends.len()
    }

    /// Longest array row seen so far.
    #[must_use]
    pub const fn largest_seen_row_length(&self) -> usize {
        self.largest_seen_row_length
    }

    /// Field set in use once any object row has been stored.
    #[must_use]
    pub fn object_fields(&self) -> Option<&[FieldKey]> {
        self.object_fields.as_deref()
    }

    /// Number of commits that rebuilt the storage from a merge.
    #[must_use]
    pub const fn full_rebuilds(&self) -> u64 {
        self.full_rebuilds
    }

    pub(crate) fn store_mut(&mut self) -> &mut RowStore {
        &mut self.store
    }

    /// Returns and clears the aggregate delta of the commits since the last
    /// call.
    pub fn take_committed(&mut self) -> Option<AggregateDirty> {
        self.committed.take()
    }

    /// Starts an explicit transaction.
    pub fn start_transaction(&mut self) {
        if self.in_transaction {
            tracing::warn!("table is already in a transaction");
        }
        self.in_transaction = true;
    }

    /// Stages `rows` and, outside a transaction, commits them.
    ///
    /// Rows without a usable key are dropped. Returns the number of rows
    /// accepted.
    pub fn add_data<I>(&mut self, rows: I, remove_from_start: RemoveFromStart) -> usize
    where
        I: IntoIterator<Item = RowValues>,
    {
        let auto = !self.in_transaction;
        if auto {
            self.in_transaction = true;
        }
        let mut accepted = 0;
        for values in rows {
            if self.add_internal(values) {
                accepted += 1;
            }
        }
        match remove_from_start {
            RemoveFromStart::Keep => {}
            RemoveFromStart::Count(n) => self.remove_first(n),
            RemoveFromStart::Added => self.remove_first(accepted),
        }
        if auto {
            self.commit();
        }
        accepted
    }

    fn add_internal(&mut self, values: RowValues) -> bool {
        let Some(key) = self.config.parse_key(values.get(&self.config.key_column)) else {
            tracing::debug!(column = %self.config.key_column, "dropping row without a usable key");
            return false;
        };
        let row = TableRow::new(RowId(self.next_row_id), key, values);
        self.next_row_id += 1;
        self.push(row);
        true
    }

    fn push(&mut self, row: TableRow) {
        let Some(last) = self.appends.last_mut() else {
            self.appends.push(row);
            self.pusher = PusherMode::Ascending;
            return;
        };
        let order = compare_keys(row.key, last.key);
        if order.is_eq() && self.pusher != PusherMode::Assorted {
            *last = row;
            return;
        }
        self.pusher = match (self.pusher, order.is_gt()) {
            (PusherMode::First | PusherMode::Ascending, true) => PusherMode::Ascending,
            (PusherMode::First | PusherMode::Ascending, false) if self.appends.len() == 1 => {
                PusherMode::Descending
            }
            (PusherMode::Descending, false) => PusherMode::Descending,
            _ => PusherMode::Assorted,
        };
        self.appends.push(row);
    }

    /// Sorts assorted appends. Returns `true` if appends are ascending.
    fn normalize_appends(&mut self) -> bool {
        if self.pusher == PusherMode::Assorted {
            // Stable, so later duplicates stay later and win the merge.
            self.appends.sort_by(|a, b| compare_keys(a.key, b.key));
            self.pusher = PusherMode::Ascending;
        }
        self.pusher != PusherMode::Descending
    }

    /// Marks every row with a key in `[start, end]` for removal. `None` is
    /// unbounded.
    pub fn remove(&mut self, start: Option<f64>, end: Option<f64>) {
        let ascending = self.normalize_appends();
        for row in MergingIterator::over_slices(
            &mut self.store.rows,
            &mut self.appends,
            ascending,
            start,
            end,
        ) {
            row.removed = true;
        }
        self.removes = RemovesStatus::Arbitrary;
        if !self.in_transaction {
            self.commit();
        }
    }

    /// Marks the rows of the first `count` distinct keys for removal.
    pub fn remove_first(&mut self, count: usize) {
        let ascending = self.normalize_appends();
        let mut remaining = count;
        let mut last_key = None;
        for row in
            MergingIterator::over_slices(&mut self.store.rows, &mut self.appends, ascending, None, None)
        {
            if last_key != Some(row.key) {
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
                last_key = Some(row.key);
            }
            row.removed = true;
        }
        if self.removes == RemovesStatus::None {
            self.removes = RemovesStatus::OnlyLeading;
        }
        if !self.in_transaction {
            self.commit();
        }
    }

    /// Applies staged appends and removals.
    pub fn commit(&mut self) {
        self.in_transaction = false;
        if self.appends.is_empty() && self.removes == RemovesStatus::None {
            return;
        }
        let ascending = self.normalize_appends();
        let first_append = if ascending {
            self.appends.first()
        } else {
            self.appends.last()
        };
        let to_the_right = match (first_append, self.store.rows.last()) {
            (Some(append), Some(last)) => append.key > last.key,
            _ => true,
        };

        let appends = mem::take(&mut self.appends);
        let dirty = if to_the_right && self.removes != RemovesStatus::Arbitrary {
            let mut dirty = AggregateDirty::RIGHT_APPENDS;
            if self.removes == RemovesStatus::OnlyLeading {
                dirty |= AggregateDirty::LEFT_REMOVES;
                let leading = self.store.rows.iter().take_while(|row| row.removed).count();
                self.store.rows.drain(..leading);
            }
            let appended = appends.len();
            self.fill(Directed::new(appends.into_iter(), ascending).filter(|row| !row.removed));
            tracing::trace!(appended, rows = self.store.rows.len(), "committed in place");
            dirty
        } else {
            let rows = mem::take(&mut self.store.rows);
            self.fill(MergingIterator::new(
                rows.into_iter(),
                Directed::new(appends.into_iter(), ascending),
            ));
            self.full_rebuilds += 1;
            tracing::debug!(rows = self.store.rows.len(), "committed by full rebuild");
            AggregateDirty::TOTAL_MESS
        };

        self.pusher = PusherMode::First;
        self.removes = RemovesStatus::None;
        self.store.computed_columns = 0;
        self.store.drop_caches();
        self.committed = Some(self.committed.map_or(dirty, |pending| pending | dirty));
    }

    /// Discards staged appends and un-marks pending removals.
    pub fn rollback(&mut self) {
        self.in_transaction = false;
        self.appends.clear();
        self.pusher = PusherMode::First;
        if self.removes != RemovesStatus::None {
            let arbitrary = self.removes == RemovesStatus::Arbitrary;
            for row in &mut self.store.rows {
                if !arbitrary && !row.removed {
                    break;
                }
                row.removed = false;
            }
            self.removes = RemovesStatus::None;
        }
    }

    /// Appends ascending rows to the storage; an equal key replaces the last
    /// stored row.
    fn fill(&mut self, rows: impl Iterator<Item = TableRow>) {
        for row in rows {
            self.track_shape(&row.values);
            match self.store.rows.last_mut() {
                Some(last) if last.key == row.key => *last = row,
                _ => self.store.rows.push(row),
            }
        }
    }

    fn track_shape(&mut self, values: &RowValues) {
        match values {
            RowValues::Array(values) => {
                let len = values.len();
                if len > self.largest_seen_row_length {
                    if self.object_fields.is_some() {
                        for i in self.largest_seen_row_length..len {
                            self.add_field(FieldKey::Index(i));
                        }
                    }
                    self.largest_seen_row_length = len;
                }
            }
            RowValues::Object(map) => {
                if self.object_fields.is_none() {
                    self.object_fields = Some(Vec::new());
                    for i in 0..self.largest_seen_row_length {
                        self.add_field(FieldKey::Index(i));
                    }
                }
                for name in map.keys() {
                    self.add_field(FieldKey::canonical(name));
                }
            }
        }
    }

    fn add_field(&mut self, field: FieldKey) {
        if let Some(fields) = &mut self.object_fields
            && self.object_fields_seen.insert(field.clone())
        {
            fields.push(field);
        }
    }
}

impl TableStorage for TableMainStorage {
    fn row_store(&self) -> &RowStore {
        &self.store
    }

    fn parts_mut(&mut self) -> (&mut RowStore, KnownFields<'_>) {
        let known = match &self.object_fields {
            Some(fields) => KnownFields::Fields(fields),
            None => KnownFields::Columns(self.largest_seen_row_length),
        };
        (&mut self.store, known)
    }

    fn known_fields(&self) -> KnownFields<'_> {
        match &self.object_fields {
            Some(fields) => KnownFields::Fields(fields),
            None => KnownFields::Columns(self.largest_seen_row_length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn keyed(keys: &[f64]) -> Vec<RowValues> {
        keys.iter().map(|k| RowValues::array([*k, *k * 10.0])).collect()
    }

    fn keys(s: &TableMainStorage) -> Vec<f64> {
        s.rows().iter().map(TableRow::key).collect()
    }

    #[test]
    fn pusher_tracks_order() {
        let mut s = TableMainStorage::default();
        s.start_transaction();
        s.add_data(keyed(&[3.0]), RemoveFromStart::Keep);
        assert_eq!(s.pusher_mode(), PusherMode::Ascending);
        s.add_data(keyed(&[2.0, 1.0]), RemoveFromStart::Keep);
        assert_eq!(s.pusher_mode(), PusherMode::Descending);
        s.add_data(keyed(&[1.0]), RemoveFromStart::Keep);
        assert_eq!(s.pending_appends(), 3);
        s.add_data(keyed(&[5.0]), RemoveFromStart::Keep);
        assert_eq!(s.pusher_mode(), PusherMode::Assorted);
        s.commit();
        assert_eq!(keys(&s), [1.0, 2.0, 3.0, 5.0]);
        assert_eq!(s.pusher_mode(), PusherMode::First);
    }

    #[test]
    fn right_appends_commit_in_place() {
        let mut s = TableMainStorage::default();
        s.add_data(keyed(&[1.0, 2.0]), RemoveFromStart::Keep);
        assert_eq!(s.take_committed(), Some(AggregateDirty::RIGHT_APPENDS));
        let first_id = s.rows()[0].id();

        s.add_data(keyed(&[4.0, 3.0]), RemoveFromStart::Keep);
        assert_eq!(keys(&s), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.rows()[0].id(), first_id);
        assert_eq!(s.full_rebuilds(), 0);
        assert_eq!(s.take_committed(), Some(AggregateDirty::RIGHT_APPENDS));
        assert_eq!(s.take_committed(), None);
    }

    #[test]
    fn interleaved_append_rebuilds_and_last_write_wins() {
        let mut s = TableMainStorage::default();
        s.add_data(keyed(&[1.0, 3.0]), RemoveFromStart::Keep);
        s.take_committed();
        s.add_data(
            vec![RowValues::array([2.0, 0.0]), RowValues::array([3.0, 99.0])],
            RemoveFromStart::Keep,
        );
        assert_eq!(keys(&s), [1.0, 2.0, 3.0]);
        assert_eq!(s.rows()[2].number(&FieldKey::Index(1)), 99.0);
        assert_eq!(s.full_rebuilds(), 1);
        assert_eq!(s.take_committed(), Some(AggregateDirty::TOTAL_MESS));
    }

    #[test]
    fn sliding_window_removes_leading_keys() {
        let mut s = TableMainStorage::default();
        s.add_data(keyed(&[1.0, 2.0, 3.0]), RemoveFromStart::Keep);
        s.take_committed();
        s.add_data(keyed(&[4.0, 5.0]), RemoveFromStart::Added);
        assert_eq!(keys(&s), [3.0, 4.0, 5.0]);
        assert_eq!(
            s.take_committed(),
            Some(AggregateDirty::RIGHT_APPENDS | AggregateDirty::LEFT_REMOVES)
        );
        assert_eq!(s.full_rebuilds(), 0);
    }

    #[test]
    fn rollback_restores_marks() {
        let mut s = TableMainStorage::default();
        s.add_data(keyed(&[1.0, 2.0, 3.0]), RemoveFromStart::Keep);
        s.start_transaction();
        s.remove(Some(2.0), None);
        s.add_data(keyed(&[9.0]), RemoveFromStart::Keep);
        assert!(s.rows()[1].is_removed());
        s.rollback();
        assert!(!s.in_transaction());
        assert_eq!(keys(&s), [1.0, 2.0, 3.0]);
        assert!(s.rows().iter().all(|r| !r.is_removed()));
        assert_eq!(s.pending_appends(), 0);
    }

    #[test]
    fn arbitrary_remove_rebuilds() {
        let mut s = TableMainStorage::default();
        s.add_data(keyed(&[1.0, 2.0, 3.0, 4.0]), RemoveFromStart::Keep);
        s.take_committed();
        s.remove(Some(2.0), Some(3.0));
        assert_eq!(keys(&s), [1.0, 4.0]);
        assert_eq!(s.take_committed(), Some(AggregateDirty::TOTAL_MESS));
    }

    #[test]
    fn rows_without_keys_are_dropped() {
        let mut s = TableMainStorage::default();
        let accepted = s.add_data(
            vec![
                RowValues::array([1.0]),
                RowValues::array(["nope"]),
                RowValues::default(),
            ],
            RemoveFromStart::Keep,
        );
        assert_eq!(accepted, 1);
        assert_eq!(s.rows_count(), 1);
    }

    #[test]
    fn object_rows_switch_to_field_set() {
        let mut s = TableMainStorage::new(TableConfig::new().with_key_column("x"));
        s.add_data(
            vec![RowValues::object([("x", 1.0), ("value", 5.0)])],
            RemoveFromStart::Keep,
        );
        let fields = s.object_fields().unwrap();
        assert!(fields.contains(&FieldKey::from("x")));
        assert!(fields.contains(&FieldKey::from("value")));
        let sel = s.select_all();
        assert_eq!(sel.max(&"value".into()), 5.0);
    }
}
