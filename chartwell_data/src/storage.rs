// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared row storage: ordered rows, cached selections and searches, and
//! computed-column bookkeeping.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::computer::{ComputeContext, ComputerSet};
use crate::ring::RingCache;
use crate::row::TableRow;
use crate::search::{SearchMode, find_index};
use crate::selection::{Extremes, KnownFields, Selection};

const SELECTION_CACHE: usize = 4;
const SEARCH_CACHE: usize = 2;

#[derive(Copy, Clone, Debug)]
struct CachedSearch {
    key: f64,
    mode: SearchMode,
    result: Option<usize>,
}

/// Key-sorted rows with the caches shared by every storage kind.
///
/// Caches are dropped together whenever the rows change; a selection or
/// search answered from cache is therefore always consistent with the rows
/// it indexes.
#[derive(Clone, Default)]
pub struct RowStore {
    pub(crate) rows: Vec<TableRow>,
    selections: RingCache<Rc<Selection>, SELECTION_CACHE>,
    searches: RingCache<CachedSearch, SEARCH_CACHE>,
    full_range: Option<Extremes>,
    pub(crate) computed_columns: usize,
}

impl fmt::Debug for RowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStore")
            .field("rows", &self.rows.len())
            .field("computed_columns", &self.computed_columns)
            .field("full_range_cached", &self.full_range.is_some())
            .finish_non_exhaustive()
    }
}

impl RowStore {
    /// Returns the rows in key order.
    #[must_use]
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row at `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&TableRow> {
        self.rows.get(index)
    }

    /// Returns the row before `index`.
    #[must_use]
    pub fn prev(&self, index: usize) -> Option<&TableRow> {
        index.checked_sub(1).and_then(|i| self.rows.get(i))
    }

    /// Returns the row after `index`.
    #[must_use]
    pub fn next(&self, index: usize) -> Option<&TableRow> {
        index.checked_add(1).and_then(|i| self.rows.get(i))
    }

    /// Number of computed columns that are up to date in every row.
    #[must_use]
    pub fn computed_watermark(&self) -> usize {
        self.computed_columns
    }

    /// Finds the index of `key` according to `mode`.
    ///
    /// The last two searches are remembered.
    pub fn search_index(&mut self, key: f64, mode: SearchMode) -> Option<usize> {
        if let Some(hit) = self
            .searches
            .find(|s| s.mode == mode && s.key.to_bits() == key.to_bits())
        {
            return hit.result;
        }
        let result = find_index(&self.rows, key, mode);
        self.searches.push(CachedSearch { key, mode, result });
        result
    }

    /// Selects rows with keys in `[start, end]`.
    ///
    /// A `NaN` bound is unbounded on that side. Infinite bounds resolve to
    /// `NaN`. Repeating a recent query returns the same [`Rc`].
    pub fn select(&mut self, start: f64, end: f64, known: KnownFields<'_>) -> Rc<Selection> {
        let start = if start.is_infinite() { f64::NAN } else { start };
        let end = if end.is_infinite() { f64::NAN } else { end };
        let len = self.rows.len();

        let (pre_first, post_last) = if len == 0 {
            (None, None)
        } else {
            let first = if start.is_nan() {
                Some(0)
            } else {
                self.search_index(start, SearchMode::ExactOrNext)
            };
            match first {
                // Everything is left of the range.
                None => (Some(len - 1), None),
                Some(first) => {
                    let last = if end.is_nan() {
                        Some(len - 1)
                    } else {
                        self.search_index(end, SearchMode::ExactOrPrev)
                    };
                    match last {
                        // Everything is right of the range.
                        None => (None, Some(0)),
                        Some(last) if first <= last => (
                            first.checked_sub(1),
                            (last + 1 < len).then_some(last + 1),
                        ),
                        // The range falls between two adjacent rows.
                        Some(last) => (Some(last), Some(first)),
                    }
                }
            }
        };
        self.select_fast(start, end, pre_first, post_last, known)
    }

    /// Builds a selection from already-known neighbour indexes.
    ///
    /// `pre_first` is the row just before the range and `post_last` the row
    /// just after it; `None` means the range reaches that end of the data.
    /// A `pre_first` past the last row is clamped to it, and a `post_last`
    /// past the last row means the range reaches the end.
    pub fn select_fast(
        &mut self,
        start: f64,
        end: f64,
        pre_first: Option<usize>,
        post_last: Option<usize>,
        known: KnownFields<'_>,
    ) -> Rc<Selection> {
        let len = self.rows.len();
        let pre_first = pre_first.and_then(|i| len.checked_sub(1).map(|last| i.min(last)));
        let post_last = post_last.filter(|&i| i < len);
        if let Some(hit) = self
            .selections
            .find(|s| s.answers(start, end, pre_first, post_last))
        {
            return hit.clone();
        }

        let (first, last) = if len == 0 {
            (None, None)
        } else {
            match (pre_first, post_last) {
                (None, None) => (Some(0), Some(len - 1)),
                (None, Some(0)) => (None, None),
                (None, Some(post)) => (Some(0), Some(post - 1)),
                (Some(pre), None) if pre + 1 >= len => (None, None),
                (Some(pre), None) => (Some(pre + 1), Some(len - 1)),
                (Some(pre), Some(post)) if post <= pre + 1 => (None, None),
                (Some(pre), Some(post)) => (Some(pre + 1), Some(post - 1)),
            }
        };

        let computed = self.computed_columns;
        let extremes = match (first, last) {
            (Some(first), Some(last)) => {
                let full = pre_first.is_none() && post_last.is_none();
                if full && let Some(cached) = &self.full_range {
                    cached.clone()
                } else {
                    let from = pre_first.unwrap_or(first);
                    let to = post_last.unwrap_or(last);
                    let scanned = Extremes::scan(&self.rows[from..=to], known, computed);
                    if full {
                        self.full_range = Some(scanned.clone());
                    }
                    scanned
                }
            }
            _ => Extremes::empty(known, computed),
        };

        let selection = Rc::new(Selection {
            start_key: start,
            end_key: end,
            pre_first,
            first,
            last,
            post_last,
            extremes,
        });
        if len != 0 {
            self.selections.push(selection.clone());
        }
        selection
    }

    /// Selects every row.
    pub fn select_all(&mut self, known: KnownFields<'_>) -> Rc<Selection> {
        let (start, end) = match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => (first.key, last.key),
            _ => (f64::NAN, f64::NAN),
        };
        self.select_fast(start, end, None, None, known)
    }

    /// Forgets every cached selection, search, and full-range extreme.
    pub fn drop_caches(&mut self) {
        self.selections.clear();
        self.searches.clear();
        self.full_range = None;
    }

    /// Lowers the computed watermark, forcing columns from `column` onwards to
    /// be recomputed on the next update.
    pub(crate) fn lower_watermark(&mut self, column: usize) {
        self.computed_columns = self.computed_columns.min(column);
    }

    /// Brings computed columns up to date with `computers`.
    pub(crate) fn update_computed(&mut self, computers: &mut ComputerSet, aggregated: bool) {
        let count = computers.columns();
        let watermark = self.computed_columns;
        if watermark >= count {
            return;
        }
        if self.rows.is_empty() {
            self.computed_columns = count;
            return;
        }

        for slot in computers.slots_mut() {
            if !slot.needs_run(watermark) {
                continue;
            }
            slot.computer.start();
            for (index, row) in self.rows.iter_mut().enumerate() {
                if row.computed_values.len() < count {
                    row.computed_values.resize(count, None);
                }
                let mut ctx = ComputeContext {
                    row,
                    mapping: slot.mapping.as_ref(),
                    outputs: &slot.outputs,
                    aggregated,
                    index,
                };
                slot.computer.calculate(&mut ctx);
            }
        }
        tracing::trace!(rows = self.rows.len(), from = watermark, to = count, "computed columns");
        self.computed_columns = count;
        self.drop_caches();
    }
}

/// Read access shared by the main storage and aggregated storages.
///
/// Selection and search take `&mut self` because they populate caches.
pub trait TableStorage {
    /// Returns the underlying rows and caches.
    fn row_store(&self) -> &RowStore;

    /// Returns the rows and caches together with the known field set.
    fn parts_mut(&mut self) -> (&mut RowStore, KnownFields<'_>);

    /// Returns the fields scanned for extremes.
    fn known_fields(&self) -> KnownFields<'_>;

    /// Returns the rows in key order.
    fn rows(&self) -> &[TableRow] {
        self.row_store().rows()
    }

    /// Number of rows.
    fn rows_count(&self) -> usize {
        self.row_store().len()
    }

    /// Returns the row at `index`.
    fn row(&self, index: usize) -> Option<&TableRow> {
        self.row_store().row(index)
    }

    /// See [`RowStore::select`].
    fn select(&mut self, start: f64, end: f64) -> Rc<Selection> {
        let (store, known) = self.parts_mut();
        store.select(start, end, known)
    }

    /// See [`RowStore::select_fast`].
    fn select_fast(
        &mut self,
        start: f64,
        end: f64,
        pre_first: Option<usize>,
        post_last: Option<usize>,
    ) -> Rc<Selection> {
        let (store, known) = self.parts_mut();
        store.select_fast(start, end, pre_first, post_last, known)
    }

    /// See [`RowStore::select_all`].
    fn select_all(&mut self) -> Rc<Selection> {
        let (store, known) = self.parts_mut();
        store.select_all(known)
    }

    /// See [`RowStore::search_index`].
    fn search_index(&mut self, key: f64, mode: SearchMode) -> Option<usize> {
        self.parts_mut().0.search_index(key, mode)
    }

    /// Returns the row found by [`search_index`](Self::search_index).
    fn search(&mut self, key: f64, mode: SearchMode) -> Option<&TableRow> {
        let index = self.search_index(key, mode)?;
        self.row(index)
    }

    /// See [`RowStore::drop_caches`].
    fn drop_caches(&mut self) {
        self.parts_mut().0.drop_caches();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowId;
    use crate::value::{FieldKey, RowValues};
    use alloc::boxed::Box;

    fn store(points: &[(f64, f64)]) -> RowStore {
        let mut s = RowStore::default();
        for (i, (k, v)) in points.iter().enumerate() {
            s.rows
                .push(TableRow::new(RowId(i as u64), *k, RowValues::array([*v])));
        }
        s
    }

    const ONE: KnownFields<'static> = KnownFields::Columns(1);

    #[test]
    fn select_interior_range_reports_neighbours() {
        let mut s = store(&[(1.0, 5.0), (2.0, 1.0), (3.0, 9.0), (4.0, 4.0), (5.0, 2.0)]);
        let sel = s.select(2.0, 3.5, ONE);
        assert_eq!(sel.pre_first(), Some(0));
        assert_eq!(sel.first(), Some(1));
        assert_eq!(sel.last(), Some(2));
        assert_eq!(sel.post_last(), Some(3));
        // Extremes include both neighbours.
        assert_eq!(sel.min(&FieldKey::Index(0)), 1.0);
        assert_eq!(sel.max(&FieldKey::Index(0)), 9.0);
    }

    #[test]
    fn select_between_points_is_empty_with_neighbours() {
        let mut s = store(&[(1.0, 5.0), (2.0, 1.0), (3.0, 9.0)]);
        let sel = s.select(2.2, 2.8, ONE);
        assert!(sel.is_empty());
        assert_eq!(sel.pre_first(), Some(1));
        assert_eq!(sel.post_last(), Some(2));
        assert!(sel.min(&FieldKey::Index(0)).is_nan());
    }

    #[test]
    fn select_outside_data() {
        let mut s = store(&[(1.0, 5.0), (2.0, 1.0)]);
        let left = s.select(-5.0, 0.0, ONE);
        assert!(left.is_empty());
        assert_eq!((left.pre_first(), left.post_last()), (None, Some(0)));

        let right = s.select(10.0, 20.0, ONE);
        assert!(right.is_empty());
        assert_eq!((right.pre_first(), right.post_last()), (Some(1), None));
    }

    #[test]
    fn select_fast_clamps_neighbours_past_the_end() {
        let mut s = store(&[(1.0, 5.0), (2.0, 1.0), (3.0, 9.0)]);
        let tail = s.select_fast(2.0, 10.0, Some(0), Some(7), ONE);
        assert_eq!(tail.range(), Some(1..=2));
        assert_eq!(tail.post_last(), None);
        assert_eq!(tail.max(&FieldKey::Index(0)), 9.0);

        let beyond = s.select_fast(10.0, 20.0, Some(9), None, ONE);
        assert!(beyond.is_empty());
        assert_eq!(beyond.pre_first(), Some(2));

        let mut empty = RowStore::default();
        let none = empty.select_fast(1.0, 2.0, Some(3), Some(4), ONE);
        assert_eq!((none.pre_first(), none.post_last()), (None, None));
    }

    #[test]
    fn repeated_select_hits_cache_until_dropped() {
        let mut s = store(&[(1.0, 5.0), (2.0, 1.0), (3.0, 9.0)]);
        let a = s.select(f64::NEG_INFINITY, f64::INFINITY, ONE);
        let b = s.select(f64::NAN, f64::NAN, ONE);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.range(), Some(0..=2));

        s.drop_caches();
        let c = s.select(f64::NAN, f64::NAN, ONE);
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(a.range(), c.range());
    }

    #[test]
    fn empty_store_selection_is_not_cached() {
        let mut s = RowStore::default();
        let a = s.select_all(ONE);
        let b = s.select_all(ONE);
        assert!(a.is_empty());
        assert!(!Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn update_computed_runs_only_stale_computers() {
        let mut s = store(&[(1.0, 2.0), (2.0, 3.0)]);
        let mut set = ComputerSet::default();
        let doubled = set.create(Box::new(|ctx: &mut ComputeContext<'_>| {
            let v = ctx.number(&FieldKey::Index(0)) * 2.0;
            ctx.set_output(0, v);
        }));
        set.register_column(doubled, None).unwrap();
        let index = set.create(Box::new(|ctx: &mut ComputeContext<'_>| {
            let v = ctx.index() as f64;
            ctx.set_output(0, v);
        }));
        set.register_column(index, None).unwrap();

        s.update_computed(&mut set, false);
        assert_eq!(s.computed_watermark(), 2);
        assert_eq!(s.rows[1].computed(0), Some(6.0));
        assert_eq!(s.rows[1].computed(1), Some(1.0));

        let flagged = set.create(Box::new(|ctx: &mut ComputeContext<'_>| {
            let v = if ctx.is_aggregated() { 1.0 } else { 0.0 };
            ctx.set_output(0, v);
        }));
        set.register_column(flagged, None).unwrap();
        s.rows[0].computed_values[0] = Some(-1.0);
        s.update_computed(&mut set, true);
        // Column 0 sits well left of the watermark and is left alone.
        assert_eq!(s.rows[0].computed(0), Some(-1.0));
        assert_eq!(s.rows[0].computed(2), Some(1.0));
        assert_eq!(s.computed_watermark(), 3);
    }
}
