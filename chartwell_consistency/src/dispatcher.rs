// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listener registration and depth-counted signal dispatch.

use alloc::boxed::Box;
use core::fmt;

use smallvec::SmallVec;

use crate::signal::{ComponentId, Signal, SignalEvent};

/// Handle returned by [`SignalDispatcher::listen`], used to unregister.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

/// A boxed listener callback.
pub type Listener = Box<dyn FnMut(&SignalEvent)>;

/// Synchronous signal dispatcher with suspension support.
///
/// A dispatcher belongs to one source component. It masks every dispatched
/// signal to the set the source supports, so listeners never observe bits the
/// source does not declare. While suspended, dispatched signals are OR-ed into
/// a pending mask instead of being delivered; when the outermost suspension is
/// resumed they are either delivered as one event or discarded.
///
/// Suspension is depth-counted: nested `suspend`/`resume` pairs only deliver
/// on the transition from depth 1 to 0.
///
/// # Example
///
/// ```
/// use core::cell::Cell;
/// use std::rc::Rc;
///
/// use chartwell_consistency::{ComponentId, Signal, SignalDispatcher};
///
/// let mut bus = SignalDispatcher::new(ComponentId::next(), Signal::NEEDS_REDRAW | Signal::DATA_CHANGED);
/// let seen = Rc::new(Cell::new(0_u32));
/// let counter = seen.clone();
/// bus.listen(move |_| counter.set(counter.get() + 1));
///
/// bus.suspend();
/// bus.dispatch(Signal::NEEDS_REDRAW);
/// bus.dispatch(Signal::DATA_CHANGED);
/// assert_eq!(seen.get(), 0);
/// bus.resume(true);
/// assert_eq!(seen.get(), 1);
/// ```
///
/// # See Also
///
/// - [`Invalidatable`](crate::Invalidatable): Pairs a dispatcher with a consistency mask.
/// - [`SignalInbox`](crate::SignalInbox): A listener that accumulates signals for a parent.
pub struct SignalDispatcher {
    source: ComponentId,
    supported: Signal,
    listeners: SmallVec<[(ListenerId, Listener); 2]>,
    next_listener: u32,
    suspension: u32,
    pending: Signal,
    disposed: bool,
}

impl fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDispatcher")
            .field("source", &self.source)
            .field("supported", &self.supported)
            .field("listeners", &self.listeners.len())
            .field("next_listener", &self.next_listener)
            .field("suspension", &self.suspension)
            .field("pending", &self.pending)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl SignalDispatcher {
    /// Creates a dispatcher for `source` that delivers only `supported` signals.
    #[must_use]
    pub fn new(source: ComponentId, supported: Signal) -> Self {
        Self {
            source,
            supported,
            listeners: SmallVec::new(),
            next_listener: 0,
            suspension: 0,
            pending: Signal::empty(),
            disposed: false,
        }
    }

    /// Returns the component this dispatcher speaks for.
    #[must_use]
    pub const fn source(&self) -> ComponentId {
        self.source
    }

    /// Returns the signals this dispatcher is allowed to deliver.
    #[must_use]
    pub const fn supported(&self) -> Signal {
        self.supported
    }

    /// Returns the current suspension depth.
    #[must_use]
    pub const fn suspension_depth(&self) -> u32 {
        self.suspension
    }

    /// Returns `true` while at least one suspension is active.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspension > 0
    }

    /// Returns the signals accumulated during the current suspension.
    #[must_use]
    pub const fn pending(&self) -> Signal {
        self.pending
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Registers a listener and returns a handle for [`unlisten`](Self::unlisten).
    ///
    /// Listeners registered on a disposed dispatcher are dropped immediately.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        if self.disposed {
            tracing::debug!(source = self.source.get(), "listener added to a disposed dispatcher");
            return id;
        }
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        let Some(pos) = self.listeners.iter().position(|(lid, _)| *lid == id) else {
            return false;
        };
        self.listeners.remove(pos);
        true
    }

    /// Dispatches `signals` to every listener, or accumulates them while suspended.
    ///
    /// Signals outside the supported mask are dropped; if nothing remains the
    /// call is a no-op.
    pub fn dispatch(&mut self, signals: Signal) {
        let signals = signals & self.supported;
        if signals.is_empty() || self.disposed {
            return;
        }
        if self.suspension > 0 {
            self.pending |= signals;
        } else {
            self.emit(signals);
        }
    }

    /// Increments the suspension depth.
    pub fn suspend(&mut self) {
        self.suspension += 1;
    }

    /// Decrements the suspension depth.
    ///
    /// When the depth drops to zero the accumulated signals are delivered as a
    /// single event if `dispatch_accumulated` is `true` and discarded otherwise.
    /// Resuming an unsuspended dispatcher is a no-op.
    pub fn resume(&mut self, dispatch_accumulated: bool) {
        if self.suspension == 0 {
            return;
        }
        self.suspension -= 1;
        if self.suspension > 0 {
            return;
        }
        let pending = core::mem::take(&mut self.pending);
        if dispatch_accumulated && !pending.is_empty() {
            self.emit(pending);
        }
    }

    /// Drops every listener.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Releases all listeners and stops any further dispatch.
    pub fn dispose(&mut self) {
        self.listeners.clear();
        self.pending = Signal::empty();
        self.disposed = true;
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn emit(&mut self, signals: Signal) {
        let event = SignalEvent::new(self.source, signals);
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }
}
