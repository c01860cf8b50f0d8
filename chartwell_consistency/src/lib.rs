// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chartwell Consistency: invalidation states and signal dispatch for retained components.
//!
//! Every retained chart component (chart, plot, series, axis) keeps track of
//! which of its aspects are stale and tells interested parties when something
//! observable changed. This crate provides the two halves of that protocol:
//!
//! - **Consistency states** ([`ConsistencyModel`], [`Invalidatable`]): a
//!   per-family [`bitflags`] mask of stale aspects. `invalidate` sets bits,
//!   `has_state` tests them in the draw pass, `mark_consistent` clears them.
//! - **Signals** ([`Signal`], [`SignalDispatcher`]): outward notifications,
//!   masked to what the source supports and delivered synchronously to
//!   listeners.
//! - **Coalescing** ([`Dispatching`], [`SuspendGuard`]): suspending dispatch
//!   for a batch of mutations so listeners observe one OR-combined event.
//! - **Bubbling** ([`SignalInbox`]): a shared accumulator a parent registers on
//!   its children.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartwell_consistency::{
//!     ConsistencyModel, Dispatching, Invalidatable, Signal, SignalInbox,
//! };
//!
//! bitflags::bitflags! {
//!     #[derive(Clone, Copy, Debug, PartialEq, Eq)]
//!     pub struct SeriesState: u32 {
//!         const BOUNDS = 1 << 0;
//!         const DATA = 1 << 1;
//!     }
//! }
//!
//! struct Series;
//!
//! impl ConsistencyModel for Series {
//!     type State = SeriesState;
//!     const SUPPORTED_STATES: SeriesState = SeriesState::all();
//!     const SUPPORTED_SIGNALS: Signal = Signal::NEEDS_REDRAW.union(Signal::DATA_CHANGED);
//! }
//!
//! let parent = SignalInbox::new();
//! let mut series = Invalidatable::of::<Series>();
//! series.listen(parent.handler());
//!
//! // A batch of mutations reaches the parent as one event.
//! series.batch(|s| {
//!     s.invalidate(SeriesState::BOUNDS, Signal::NEEDS_REDRAW);
//!     s.invalidate(SeriesState::DATA, Signal::DATA_CHANGED);
//! });
//! assert_eq!(parent.deliveries(), 1);
//! assert_eq!(parent.take(), Signal::NEEDS_REDRAW | Signal::DATA_CHANGED);
//!
//! // The draw pass refreshes only what is stale.
//! if series.has_state(SeriesState::DATA) {
//!     // recompute data
//!     series.mark_consistent(SeriesState::DATA);
//! }
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. Diagnostics go through
//! [`tracing`]; no subscriber is installed.

#![no_std]

extern crate alloc;

mod dispatcher;
mod inbox;
mod invalidatable;
mod signal;

pub use dispatcher::{Listener, ListenerId, SignalDispatcher};
pub use inbox::SignalInbox;
pub use invalidatable::{ConsistencyModel, Dispatching, InitialState, Invalidatable, SuspendGuard};
pub use signal::{ComponentId, Signal, SignalEvent};
