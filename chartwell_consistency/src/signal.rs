// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Signal bits, component identifiers, and the event delivered to listeners.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// Outward change notifications a component emits to its listeners.
    ///
    /// Signals are distinct from consistency states: a state bit records that
    /// some aspect of a component is stale, while a signal tells whoever is
    /// listening what kind of reaction is expected. One state may map to
    /// several signals, and a signal may be emitted without any local state
    /// (a pure notification).
    ///
    /// # Example
    ///
    /// ```
    /// use chartwell_consistency::Signal;
    ///
    /// let s = Signal::NEEDS_REDRAW | Signal::BOUNDS_CHANGED;
    /// assert!(s.contains(Signal::NEEDS_REDRAW));
    /// assert!(!s.contains(Signal::DATA_CHANGED));
    /// ```
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Signal: u32 {
        /// The listener should schedule a redraw.
        const NEEDS_REDRAW = 1 << 0;
        /// Settings must be re-applied to children before redrawing.
        const NEEDS_REAPPLICATION = 1 << 1;
        /// Derived values (scales, ranges) must be recalculated.
        const NEEDS_RECALCULATION = 1 << 2;
        /// The component bounds changed.
        const BOUNDS_CHANGED = 1 << 3;
        /// The underlying data changed.
        const DATA_CHANGED = 1 << 4;
        /// Only metadata attached to the data changed.
        const META_CHANGED = 1 << 5;
        /// Legend items depending on this component must be refreshed.
        const NEEDS_UPDATE_LEGEND = 1 << 6;
        /// Items computed over the full data range must be refreshed.
        const NEEDS_UPDATE_FULL_RANGE_ITEMS = 1 << 7;
        /// Everything that depends on axis ticks must be refreshed.
        const NEEDS_UPDATE_TICK_DEPENDENT = 1 << 8;
        /// Labels must be redrawn.
        const NEEDS_REDRAW_LABELS = 1 << 9;
        /// Appearance (fill, stroke) must be redrawn.
        const NEEDS_REDRAW_APPEARANCE = 1 << 10;
        /// The enabled flag of the component changed.
        const ENABLED_STATE_CHANGED = 1 << 11;
        /// The stacking order of the component changed.
        const Z_INDEX_STATE_CHANGED = 1 << 12;
    }
}

/// Identifier of a signal source.
///
/// Identifiers are allocated from a process-wide counter and never reused, so
/// a listener attached to several sources can tell them apart.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(1);

impl ComponentId {
    /// Allocates a fresh identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value of this identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentId").field(&self.0).finish()
    }
}

/// Event passed to listeners when a component dispatches signals.
///
/// The `signals` field is already masked to the signals the source supports
/// and is never empty.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalEvent {
    /// The component that dispatched the event.
    pub source: ComponentId,
    /// The dispatched signals.
    pub signals: Signal,
}

impl SignalEvent {
    /// Creates a new event.
    #[must_use]
    pub const fn new(source: ComponentId, signals: Signal) -> Self {
        Self { source, signals }
    }

    /// Returns `true` if any of `signals` is carried by this event.
    #[must_use]
    pub const fn has_signal(&self, signals: Signal) -> bool {
        self.signals.intersects(signals)
    }

    /// Returns `true` if the listener should schedule a redraw.
    #[must_use]
    pub const fn target_needs_redraw(&self) -> bool {
        self.has_signal(Signal::NEEDS_REDRAW)
    }

    /// Returns `true` if the source bounds changed.
    #[must_use]
    pub const fn target_bounds_changed(&self) -> bool {
        self.has_signal(Signal::BOUNDS_CHANGED)
    }

    /// Returns `true` if the source data changed.
    #[must_use]
    pub const fn target_data_changed(&self) -> bool {
        self.has_signal(Signal::DATA_CHANGED)
    }

    /// Returns `true` if the source metadata changed.
    #[must_use]
    pub const fn target_meta_changed(&self) -> bool {
        self.has_signal(Signal::META_CHANGED)
    }

    /// Returns `true` if derived values must be recalculated.
    #[must_use]
    pub const fn target_needs_recalculation(&self) -> bool {
        self.has_signal(Signal::NEEDS_RECALCULATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_ids_are_unique() {
        let a = ComponentId::next();
        let b = ComponentId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn event_helpers_follow_bits() {
        let ev = SignalEvent::new(
            ComponentId::next(),
            Signal::NEEDS_REDRAW | Signal::DATA_CHANGED,
        );
        assert!(ev.target_needs_redraw());
        assert!(ev.target_data_changed());
        assert!(!ev.target_bounds_changed());
        assert!(!ev.target_meta_changed());
        assert!(!ev.target_needs_recalculation());
        assert!(ev.has_signal(Signal::DATA_CHANGED | Signal::META_CHANGED));
    }
}
