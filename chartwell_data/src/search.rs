// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary search over key-sorted rows.

use core::cmp::Ordering;

use crate::row::TableRow;

/// How [`search_index`](crate::TableStorage::search_index) resolves a key
/// that is not present.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum SearchMode {
    /// Only an exact match.
    #[default]
    Exact,
    /// The exact match or the first row after the key.
    ExactOrNext,
    /// The exact match or the last row before the key.
    ExactOrPrev,
    /// The numerically closest row. On a tie the later row wins.
    Nearest,
}

/// Orders two keys. Keys are never `NaN` once stored.
pub(crate) fn compare_keys(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Resolves `key` against `rows` (sorted ascending) without any caching.
pub(crate) fn find_index(rows: &[TableRow], key: f64, mode: SearchMode) -> Option<usize> {
    if key.is_nan() {
        return None;
    }
    let insert_at = match rows.binary_search_by(|row| compare_keys(row.key, key)) {
        Ok(found) => return Some(found),
        Err(insert_at) => insert_at,
    };
    let len = rows.len();
    match mode {
        SearchMode::Exact => None,
        SearchMode::ExactOrNext => (insert_at < len).then_some(insert_at),
        SearchMode::ExactOrPrev => insert_at.checked_sub(1),
        SearchMode::Nearest => {
            if len == 0 {
                None
            } else if insert_at == 0 {
                Some(0)
            } else if insert_at < len {
                let before = rows[insert_at - 1].key;
                let after = rows[insert_at].key;
                if key - before < after - key {
                    Some(insert_at - 1)
                } else {
                    Some(insert_at)
                }
            } else {
                Some(len - 1)
            }
        }
    }
}
