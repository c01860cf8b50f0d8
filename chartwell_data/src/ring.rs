// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded most-recent-first cache.

use alloc::collections::VecDeque;

/// A fixed-capacity cache that overwrites its oldest entry.
///
/// Lookups scan from the most recently pushed entry to the oldest, which is
/// the order that makes repeated queries of the same window hit first.
#[derive(Clone, Debug)]
pub(crate) struct RingCache<T, const N: usize> {
    entries: VecDeque<T>,
}

impl<T, const N: usize> Default for RingCache<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RingCache<T, N> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(N),
        }
    }

    /// Pushes `value`, evicting the oldest entry when full.
    pub(crate) fn push(&mut self, value: T) {
        if N == 0 {
            return;
        }
        if self.entries.len() == N {
            self.entries.pop_back();
        }
        self.entries.push_front(value);
    }

    /// Returns the most recent entry matching `pred`.
    pub(crate) fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.entries.iter().find(|e| pred(e))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
