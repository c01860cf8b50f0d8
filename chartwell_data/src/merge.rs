// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered merge of committed rows with staged appends.

use core::iter::{Peekable, Rev};
use core::slice;

use crate::row::TableRow;

/// Something with a merge key and a removal mark.
pub(crate) trait MergeRow {
    fn merge_key(&self) -> f64;
    fn merge_removed(&self) -> bool;
}

impl MergeRow for TableRow {
    fn merge_key(&self) -> f64 {
        self.key
    }

    fn merge_removed(&self) -> bool {
        self.removed
    }
}

impl MergeRow for &mut TableRow {
    fn merge_key(&self) -> f64 {
        self.key
    }

    fn merge_removed(&self) -> bool {
        self.removed
    }
}

/// Walks a sorted sequence forwards, or a reverse-sorted one backwards, so
/// that it always yields ascending keys.
#[derive(Debug)]
pub(crate) enum Directed<I> {
    Forward(I),
    Backward(Rev<I>),
}

impl<I: DoubleEndedIterator> Directed<I> {
    pub(crate) fn new(iter: I, ascending: bool) -> Self {
        if ascending {
            Self::Forward(iter)
        } else {
            Self::Backward(iter.rev())
        }
    }
}

impl<I: DoubleEndedIterator> Iterator for Directed<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Forward(it) => it.next(),
            Self::Backward(it) => it.next(),
        }
    }
}

/// Merges two ascending sequences into one ascending sequence.
///
/// On equal keys the storage side is yielded first, so when the output is
/// folded with "equal key replaces the previous row" the staged row wins.
/// Rows marked removed are skipped. Iteration ends after the last row with
/// key `<= until`.
pub(crate) struct MergingIterator<S: Iterator, A: Iterator> {
    storage: Peekable<S>,
    appends: Peekable<A>,
    until: Option<f64>,
    done: bool,
}

impl<S, A> MergingIterator<S, A>
where
    S: Iterator,
    A: Iterator<Item = S::Item>,
    S::Item: MergeRow,
{
    pub(crate) fn new(storage: S, appends: A) -> Self {
        Self {
            storage: storage.peekable(),
            appends: appends.peekable(),
            until: None,
            done: false,
        }
    }

    pub(crate) fn until(mut self, to: Option<f64>) -> Self {
        self.until = to.filter(|t| !t.is_nan());
        self
    }
}

impl<'a> MergingIterator<slice::IterMut<'a, TableRow>, Directed<slice::IterMut<'a, TableRow>>> {
    /// Mutable merge over the rows with keys in `[from, to]`.
    pub(crate) fn over_slices(
        storage: &'a mut [TableRow],
        appends: &'a mut [TableRow],
        ascending: bool,
        from: Option<f64>,
        to: Option<f64>,
    ) -> Self {
        let from = from.filter(|f| !f.is_nan());
        let storage = match from {
            Some(from) => {
                let start = storage.partition_point(|r| r.key < from);
                &mut storage[start..]
            }
            None => storage,
        };
        let appends = match from {
            Some(from) if ascending => {
                let start = appends.partition_point(|r| r.key < from);
                &mut appends[start..]
            }
            Some(from) => {
                let end = appends.partition_point(|r| r.key >= from);
                &mut appends[..end]
            }
            None => appends,
        };
        Self::new(storage.iter_mut(), Directed::new(appends.iter_mut(), ascending)).until(to)
    }
}

impl<S, A> Iterator for MergingIterator<S, A>
where
    S: Iterator,
    A: Iterator<Item = S::Item>,
    S::Item: MergeRow,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let from_storage = match (self.storage.peek(), self.appends.peek()) {
                (None, None) => {
                    self.done = true;
                    return None;
                }
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(s), Some(a)) => s.merge_key() <= a.merge_key(),
            };
            let item = if from_storage {
                self.storage.next()
            } else {
                self.appends.next()
            }?;
            if self.until.is_some_and(|to| item.merge_key() > to) {
                self.done = true;
                return None;
            }
            if !item.merge_removed() {
                return Some(item);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowId;
    use crate::value::RowValues;
    use alloc::vec::Vec;

    fn rows(keys: &[f64], id_base: u64) -> Vec<TableRow> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| TableRow::new(RowId(id_base + i as u64), *k, RowValues::default()))
            .collect()
    }

    #[test]
    fn storage_wins_ties_and_output_is_ascending() {
        let storage = rows(&[1.0, 3.0, 5.0], 0);
        let appends = rows(&[6.0, 3.0, 2.0], 100);
        let merged: Vec<_> =
            MergingIterator::new(storage.into_iter(), Directed::new(appends.into_iter(), false))
                .map(|r| (r.key, r.id.get()))
                .collect();
        assert_eq!(
            merged,
            [(1.0, 0), (2.0, 102), (3.0, 1), (3.0, 101), (5.0, 2), (6.0, 100)]
        );
    }

    #[test]
    fn removed_rows_are_skipped() {
        let mut storage = rows(&[1.0, 2.0, 3.0], 0);
        let mut appends = rows(&[2.5], 100);
        storage[1].removed = true;
        appends[0].removed = true;
        let kept: Vec<f64> =
            MergingIterator::new(storage.into_iter(), appends.into_iter())
                .map(|r| r.key)
                .collect();
        assert_eq!(kept, [1.0, 3.0]);
    }

    #[test]
    fn slice_range_marks_only_keys_in_bounds() {
        let mut storage = rows(&[1.0, 2.0, 4.0, 8.0], 0);
        let mut appends = rows(&[7.0, 5.0, 3.0], 100);
        for row in MergingIterator::over_slices(&mut storage, &mut appends, false, Some(2.0), Some(5.0))
        {
            row.removed = true;
        }
        let marked: Vec<f64> = storage
            .iter()
            .chain(&appends)
            .filter(|r| r.removed)
            .map(|r| r.key)
            .collect();
        assert_eq!(marked, [2.0, 4.0, 5.0, 3.0]);
    }
}
