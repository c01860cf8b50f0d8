// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consistency masks, per-family state models, and scoped dispatch suspension.

use core::fmt;
use core::ops::{Deref, DerefMut};

use bitflags::Flags;

use crate::dispatcher::{ListenerId, SignalDispatcher};
use crate::signal::{ComponentId, Signal, SignalEvent};

/// Describes the consistency states and signals of one component family.
///
/// Each family declares its own [`bitflags`] state type, so a state bit of one
/// family cannot be handed to a component of another by accident. Families
/// that extend a base family compute their supported mask as a `const` union.
///
/// # Example
///
/// ```
/// use chartwell_consistency::{ConsistencyModel, Invalidatable, Signal};
///
/// bitflags::bitflags! {
///     #[derive(Clone, Copy, Debug, PartialEq, Eq)]
///     pub struct AxisState: u32 {
///         const BOUNDS = 1 << 0;
///         const TICKS = 1 << 1;
///         const LABELS = 1 << 2;
///     }
/// }
///
/// struct Axis;
///
/// impl ConsistencyModel for Axis {
///     type State = AxisState;
///     const SUPPORTED_STATES: AxisState = AxisState::BOUNDS.union(AxisState::TICKS);
///     const SUPPORTED_SIGNALS: Signal = Signal::NEEDS_REDRAW.union(Signal::BOUNDS_CHANGED);
/// }
///
/// let axis = Invalidatable::of::<Axis>();
/// assert!(axis.has_state(AxisState::TICKS));
/// // Unsupported bits are masked away.
/// assert!(!axis.has_state(AxisState::LABELS));
/// ```
pub trait ConsistencyModel {
    /// The state bitmask type of this family.
    type State: Flags + Copy;

    /// Every state the family can be invalidated with.
    const SUPPORTED_STATES: Self::State;

    /// Every signal the family may dispatch.
    const SUPPORTED_SIGNALS: Signal;

    /// Whether new components start fully dirty or fully consistent.
    const INITIAL: InitialState = InitialState::Dirty;
}

/// Consistency of a freshly created component.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum InitialState {
    /// Every supported state is set, so the first draw computes everything.
    #[default]
    Dirty,
    /// No state is set.
    Consistent,
}

/// A consistency mask paired with a signal dispatcher.
///
/// `Invalidatable` is the building block every retained component embeds:
///
/// - [`invalidate`](Self::invalidate) sets supported state bits and dispatches signals.
/// - [`has_state`](Self::has_state) lets a draw pass test the aspects it must refresh.
/// - [`mark_consistent`](Self::mark_consistent) clears them once refreshed.
///
/// The mask only grows through `invalidate` and only shrinks through
/// `mark_consistent`. Invalidating with bits the component does not support
/// is not an error: they are ignored.
///
/// # See Also
///
/// - [`ConsistencyModel`]: Declares the supported states and signals of a family.
/// - [`Dispatching`]: Scoped suspension via [`SuspendGuard`].
pub struct Invalidatable<S: Flags + Copy> {
    consistency: S,
    supported: S,
    dispatcher: SignalDispatcher,
}

impl<S: Flags + Copy + fmt::Debug> fmt::Debug for Invalidatable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidatable")
            .field("consistency", &self.consistency)
            .field("supported", &self.supported)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<S: Flags + Copy> Invalidatable<S> {
    /// Creates a component supporting `supported` states and `signals`.
    #[must_use]
    pub fn new(supported: S, signals: Signal, initial: InitialState) -> Self {
        let consistency = match initial {
            InitialState::Dirty => supported,
            InitialState::Consistent => S::empty(),
        };
        Self {
            consistency,
            supported,
            dispatcher: SignalDispatcher::new(ComponentId::next(), signals),
        }
    }

    /// Creates a component for the family `M`.
    #[must_use]
    pub fn of<M: ConsistencyModel<State = S>>() -> Self {
        Self::new(M::SUPPORTED_STATES, M::SUPPORTED_SIGNALS, M::INITIAL)
    }

    /// Returns the identifier carried by dispatched events.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.dispatcher.source()
    }

    /// Sets `states` (masked to supported states) and dispatches `signals`.
    ///
    /// Returns the states that were not already set. Signals are dispatched
    /// even when no state changed, since pure notifications are legal.
    pub fn invalidate(&mut self, states: S, signals: Signal) -> S {
        let effective = states
            .intersection(self.supported)
            .difference(self.consistency);
        self.consistency.insert(effective);
        self.dispatcher.dispatch(signals);
        effective
    }

    /// Returns `true` if any of `states` is set.
    #[must_use]
    pub fn has_state(&self, states: S) -> bool {
        self.consistency.intersects(states)
    }

    /// Returns `true` if no state is set.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.consistency.is_empty()
    }

    /// Returns `true` if no state outside `allowed` is set.
    #[must_use]
    pub fn is_consistent_except(&self, allowed: S) -> bool {
        self.consistency.difference(allowed).is_empty()
    }

    /// Clears `states`.
    pub fn mark_consistent(&mut self, states: S) {
        self.consistency.remove(states);
    }

    /// Returns the current consistency mask.
    #[must_use]
    pub const fn consistency(&self) -> S {
        self.consistency
    }

    /// Returns the supported states.
    #[must_use]
    pub const fn supported_states(&self) -> S {
        self.supported
    }

    /// Returns the supported signals.
    #[must_use]
    pub const fn supported_signals(&self) -> Signal {
        self.dispatcher.supported()
    }

    /// Dispatches `signals` without touching the consistency mask.
    pub fn dispatch(&mut self, signals: Signal) {
        self.dispatcher.dispatch(signals);
    }

    /// Suspends dispatch. Prefer [`Dispatching::suspended`] where a scope fits.
    pub fn suspend_dispatch(&mut self) {
        self.dispatcher.suspend();
    }

    /// Resumes dispatch, see [`SignalDispatcher::resume`].
    pub fn resume_dispatch(&mut self, dispatch_accumulated: bool) {
        self.dispatcher.resume(dispatch_accumulated);
    }

    /// Registers a listener.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        self.dispatcher.listen(listener)
    }

    /// Unregisters a listener.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.dispatcher.unlisten(id)
    }

    /// Releases all listeners and stops further dispatch.
    pub fn dispose(&mut self) {
        self.dispatcher.dispose();
    }
}

/// Types that own a [`SignalDispatcher`] and can batch their notifications.
pub trait Dispatching {
    /// Returns the dispatcher signals of this value go through.
    fn dispatcher_mut(&mut self) -> &mut SignalDispatcher;

    /// Suspends dispatch until the returned guard is dropped.
    ///
    /// Dropping the guard delivers the accumulated signals once;
    /// [`SuspendGuard::discard`] swallows them instead.
    fn suspended(&mut self) -> SuspendGuard<'_, Self>
    where
        Self: Sized,
    {
        SuspendGuard::new(self)
    }

    /// Runs `f` with dispatch suspended and delivers its signals as one event.
    fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        let mut guard = self.suspended();
        f(&mut *guard)
    }

    /// Runs `f` with dispatch suspended and drops every signal it raised.
    fn batch_silently<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        let mut guard = self.suspended();
        let result = f(&mut *guard);
        guard.discard();
        result
    }
}

impl<S: Flags + Copy> Dispatching for Invalidatable<S> {
    fn dispatcher_mut(&mut self) -> &mut SignalDispatcher {
        &mut self.dispatcher
    }
}

impl Dispatching for SignalDispatcher {
    fn dispatcher_mut(&mut self) -> &mut Self {
        self
    }
}

/// Scope guard returned by [`Dispatching::suspended`].
///
/// The guard dereferences to the suspended value so the batch can be written
/// against it directly.
#[must_use = "dropping the guard immediately resumes dispatch"]
pub struct SuspendGuard<'a, T: Dispatching> {
    target: &'a mut T,
    deliver: bool,
}

impl<'a, T: Dispatching> SuspendGuard<'a, T> {
    fn new(target: &'a mut T) -> Self {
        target.dispatcher_mut().suspend();
        Self {
            target,
            deliver: true,
        }
    }

    /// Ends the scope, discarding the signals accumulated during it.
    pub fn discard(mut self) {
        self.deliver = false;
    }
}

impl<T: Dispatching> Deref for SuspendGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: Dispatching> DerefMut for SuspendGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: Dispatching> Drop for SuspendGuard<'_, T> {
    fn drop(&mut self) {
        self.target.dispatcher_mut().resume(self.deliver);
    }
}

impl<T: Dispatching> fmt::Debug for SuspendGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendGuard")
            .field("deliver", &self.deliver)
            .finish_non_exhaustive()
    }
}
