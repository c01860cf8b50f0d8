// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared accumulator for signals bubbling from children to a parent.

use alloc::rc::Rc;
use core::cell::Cell;

use crate::dispatcher::{ListenerId, SignalDispatcher};
use crate::signal::{Signal, SignalEvent};

/// Collects signals dispatched by children until the parent reads them.
///
/// A parent keeps one inbox and registers a handler from it on every child
/// dispatcher. The children never hold a reference to the parent, so bubbling
/// works without shared mutable ownership of the component tree: the parent
/// drains the inbox when it next reacts (typically at the start of a draw).
///
/// # Example
///
/// ```
/// use chartwell_consistency::{ComponentId, Signal, SignalDispatcher, SignalInbox};
///
/// let inbox = SignalInbox::new();
/// let mut child = SignalDispatcher::new(ComponentId::next(), Signal::all());
/// inbox.attach(&mut child);
///
/// child.dispatch(Signal::NEEDS_REDRAW);
/// child.dispatch(Signal::BOUNDS_CHANGED);
///
/// assert_eq!(inbox.deliveries(), 2);
/// assert_eq!(inbox.take(), Signal::NEEDS_REDRAW | Signal::BOUNDS_CHANGED);
/// assert!(inbox.peek().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct SignalInbox {
    signals: Rc<Cell<Signal>>,
    deliveries: Rc<Cell<u32>>,
}

impl SignalInbox {
    /// Creates an empty inbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a listener that ORs every received event into this inbox.
    pub fn handler(&self) -> impl FnMut(&SignalEvent) + 'static {
        let signals = Rc::clone(&self.signals);
        let deliveries = Rc::clone(&self.deliveries);
        move |event: &SignalEvent| {
            signals.set(signals.get() | event.signals);
            deliveries.set(deliveries.get().wrapping_add(1));
        }
    }

    /// Registers [`handler`](Self::handler) on `dispatcher`.
    pub fn attach(&self, dispatcher: &mut SignalDispatcher) -> ListenerId {
        dispatcher.listen(self.handler())
    }

    /// Returns the accumulated signals and clears them.
    pub fn take(&self) -> Signal {
        self.signals.replace(Signal::empty())
    }

    /// Returns the accumulated signals without clearing them.
    #[must_use]
    pub fn peek(&self) -> Signal {
        self.signals.get()
    }

    /// Returns how many events were received in total.
    #[must_use]
    pub fn deliveries(&self) -> u32 {
        self.deliveries.get()
    }
}
