// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key-range selections and their per-field extremes.

use alloc::vec::Vec;
use core::fmt;
use core::ops::RangeInclusive;

use hashbrown::HashMap;

use crate::row::TableRow;
use crate::value::FieldKey;

/// The fields a storage knows about when scanning for extremes.
#[derive(Copy, Clone, Debug)]
pub enum KnownFields<'a> {
    /// Array rows: columns `0..n`.
    Columns(usize),
    /// An explicit field set, used once object rows have been seen.
    Fields(&'a [FieldKey]),
}

impl KnownFields<'_> {
    pub(crate) fn for_each(&self, mut f: impl FnMut(FieldKey)) {
        match self {
            Self::Columns(n) => (0..*n).for_each(|i| f(FieldKey::Index(i))),
            Self::Fields(fields) => fields.iter().cloned().for_each(f),
        }
    }
}

/// Per-field minimums and maximums over a run of rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Extremes {
    pub(crate) mins: HashMap<FieldKey, f64>,
    pub(crate) maxs: HashMap<FieldKey, f64>,
    pub(crate) calc_mins: Vec<f64>,
    pub(crate) calc_maxs: Vec<f64>,
}

impl Extremes {
    /// Extremes of no rows: every known field is `NaN`.
    pub(crate) fn empty(known: KnownFields<'_>, computed: usize) -> Self {
        let mut out = Self::default();
        known.for_each(|field| {
            out.mins.insert(field.clone(), f64::NAN);
            out.maxs.insert(field, f64::NAN);
        });
        out.calc_mins = alloc::vec![f64::NAN; computed];
        out.calc_maxs = alloc::vec![f64::NAN; computed];
        out
    }

    /// Scans `rows`. Values that do not convert to a number are skipped.
    pub(crate) fn scan(rows: &[TableRow], known: KnownFields<'_>, computed: usize) -> Self {
        let mut fields = Vec::new();
        known.for_each(|f| fields.push(f));

        let mut mins = alloc::vec![f64::INFINITY; fields.len()];
        let mut maxs = alloc::vec![f64::NEG_INFINITY; fields.len()];
        let mut calc_mins = alloc::vec![f64::INFINITY; computed];
        let mut calc_maxs = alloc::vec![f64::NEG_INFINITY; computed];

        for row in rows {
            for (i, field) in fields.iter().enumerate() {
                let v = row.number(field);
                if v < mins[i] {
                    mins[i] = v;
                }
                if v > maxs[i] {
                    maxs[i] = v;
                }
            }
            for col in 0..computed {
                let v = row.computed(col).unwrap_or(f64::NAN);
                if v < calc_mins[col] {
                    calc_mins[col] = v;
                }
                if v > calc_maxs[col] {
                    calc_maxs[col] = v;
                }
            }
        }

        let finite = |v: f64| if v.is_infinite() { f64::NAN } else { v };
        let mut out = Self::default();
        for (i, field) in fields.into_iter().enumerate() {
            out.mins.insert(field.clone(), finite(mins[i]));
            out.maxs.insert(field, finite(maxs[i]));
        }
        out.calc_mins = calc_mins.into_iter().map(finite).collect();
        out.calc_maxs = calc_maxs.into_iter().map(finite).collect();
        out
    }
}

/// The result of selecting a key range from a storage.
///
/// Boundary indexes point into the storage's row vector as it was when the
/// selection was made; any commit invalidates them together with the
/// storage's selection cache.
///
/// `pre_first` and `post_last` are the rows just outside the range, which
/// line and area renderers need to draw segments that cross the viewport
/// edge. When the range falls between two adjacent rows, `first` and `last`
/// are `None` and the two neighbours are still reported.
#[derive(Clone, PartialEq)]
pub struct Selection {
    pub(crate) start_key: f64,
    pub(crate) end_key: f64,
    pub(crate) pre_first: Option<usize>,
    pub(crate) first: Option<usize>,
    pub(crate) last: Option<usize>,
    pub(crate) post_last: Option<usize>,
    pub(crate) extremes: Extremes,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("start_key", &self.start_key)
            .field("end_key", &self.end_key)
            .field("pre_first", &self.pre_first)
            .field("first", &self.first)
            .field("last", &self.last)
            .field("post_last", &self.post_last)
            .field("fields", &self.extremes.mins.len())
            .field("computed", &self.extremes.calc_mins.len())
            .finish_non_exhaustive()
    }
}

impl Selection {
    /// Returns the requested start key, `NaN` if unbounded.
    #[must_use]
    pub const fn start_key(&self) -> f64 {
        self.start_key
    }

    /// Returns the requested end key, `NaN` if unbounded.
    #[must_use]
    pub const fn end_key(&self) -> f64 {
        self.end_key
    }

    /// Index of the row just before the range.
    #[must_use]
    pub const fn pre_first(&self) -> Option<usize> {
        self.pre_first
    }

    /// Index of the first row in the range.
    #[must_use]
    pub const fn first(&self) -> Option<usize> {
        self.first
    }

    /// Index of the last row in the range.
    #[must_use]
    pub const fn last(&self) -> Option<usize> {
        self.last
    }

    /// Index of the row just after the range.
    #[must_use]
    pub const fn post_last(&self) -> Option<usize> {
        self.post_last
    }

    /// Returns `true` if no row falls inside the range.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Returns the index range of rows inside the selection.
    #[must_use]
    pub fn range(&self) -> Option<RangeInclusive<usize>> {
        Some(self.first?..=self.last?)
    }

    /// Returns the rows of the selection, borrowed from `rows`.
    ///
    /// `rows` must be the row slice of the storage that produced this
    /// selection.
    #[must_use]
    pub fn rows<'a>(&self, rows: &'a [TableRow]) -> &'a [TableRow] {
        self.range()
            .and_then(|r| rows.get(r))
            .unwrap_or(&[])
    }

    /// Minimum of `field` over the range and its two neighbours, or `NaN`.
    #[must_use]
    pub fn min(&self, field: &FieldKey) -> f64 {
        self.extremes.mins.get(field).copied().unwrap_or(f64::NAN)
    }

    /// Maximum of `field` over the range and its two neighbours, or `NaN`.
    #[must_use]
    pub fn max(&self, field: &FieldKey) -> f64 {
        self.extremes.maxs.get(field).copied().unwrap_or(f64::NAN)
    }

    /// Minimum of computed column `column`, or `NaN`.
    #[must_use]
    pub fn calc_min(&self, column: usize) -> f64 {
        self.extremes.calc_mins.get(column).copied().unwrap_or(f64::NAN)
    }

    /// Maximum of computed column `column`, or `NaN`.
    #[must_use]
    pub fn calc_max(&self, column: usize) -> f64 {
        self.extremes.calc_maxs.get(column).copied().unwrap_or(f64::NAN)
    }

    /// Number of computed columns covered by the extremes.
    #[must_use]
    pub fn computed_columns(&self) -> usize {
        self.extremes.calc_mins.len()
    }

    /// Returns `true` if this selection answers a query for `[start, end]`
    /// with the given neighbours. `NaN` keys match each other.
    pub(crate) fn answers(
        &self,
        start: f64,
        end: f64,
        pre_first: Option<usize>,
        post_last: Option<usize>,
    ) -> bool {
        same_key(self.start_key, start)
            && same_key(self.end_key, end)
            && self.pre_first == pre_first
            && self.post_last == post_last
    }
}

fn same_key(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowId;
    use crate::value::RowValues;

    fn row(key: f64, values: &[f64], computed: &[Option<f64>]) -> TableRow {
        let mut r = TableRow::new(RowId(0), key, RowValues::array(values.iter().copied()));
        r.computed_values = computed.to_vec();
        r
    }

    #[test]
    fn scan_skips_non_numbers_and_reports_nan_for_empty_columns() {
        let rows = [
            row(1.0, &[3.0, f64::NAN], &[Some(1.0)]),
            row(2.0, &[-1.0, f64::NAN], &[None]),
            row(3.0, &[7.0], &[Some(4.0)]),
        ];
        let ex = Extremes::scan(&rows, KnownFields::Columns(2), 1);
        assert_eq!(ex.mins[&FieldKey::Index(0)], -1.0);
        assert_eq!(ex.maxs[&FieldKey::Index(0)], 7.0);
        assert!(ex.mins[&FieldKey::Index(1)].is_nan());
        assert_eq!(ex.calc_mins, [1.0]);
        assert_eq!(ex.calc_maxs, [4.0]);
    }

    #[test]
    fn nan_bounds_answer_each_other() {
        let sel = Selection {
            start_key: f64::NAN,
            end_key: 5.0,
            pre_first: None,
            first: Some(0),
            last: Some(1),
            post_last: Some(2),
            extremes: Extremes::default(),
        };
        assert!(sel.answers(f64::NAN, 5.0, None, Some(2)));
        assert!(!sel.answers(0.0, 5.0, None, Some(2)));
        assert!(!sel.answers(f64::NAN, 5.0, Some(0), Some(2)));
    }
}
