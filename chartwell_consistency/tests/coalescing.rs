// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for the `chartwell_consistency` crate.
//!
//! These exercise dispatch suspension across a small component hierarchy,
//! with a focus on exactly-once delivery and on the consistency mask surviving
//! a discarded batch.

use std::cell::RefCell;
use std::rc::Rc;

use chartwell_consistency::{
    ConsistencyModel, Dispatching, InitialState, Invalidatable, Signal, SignalEvent, SignalInbox,
};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct WidgetState: u32 {
        const BOUNDS = 1 << 0;
        const APPEARANCE = 1 << 1;
        const LABELS = 1 << 2;
    }
}

struct Widget;

impl ConsistencyModel for Widget {
    type State = WidgetState;
    const SUPPORTED_STATES: WidgetState = WidgetState::BOUNDS.union(WidgetState::APPEARANCE);
    const SUPPORTED_SIGNALS: Signal = Signal::NEEDS_REDRAW
        .union(Signal::BOUNDS_CHANGED)
        .union(Signal::NEEDS_RECALCULATION);
    const INITIAL: InitialState = InitialState::Consistent;
}

fn events(w: &mut Invalidatable<WidgetState>) -> Rc<RefCell<Vec<SignalEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    w.listen(move |ev| sink.borrow_mut().push(*ev));
    log
}

#[test]
fn suspended_batch_fires_once_with_union() {
    let mut w = Invalidatable::of::<Widget>();
    let log = events(&mut w);

    w.suspend_dispatch();
    w.invalidate(WidgetState::BOUNDS, Signal::BOUNDS_CHANGED);
    w.invalidate(WidgetState::APPEARANCE, Signal::NEEDS_REDRAW);
    assert!(log.borrow().is_empty());
    w.resume_dispatch(true);

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].signals, Signal::BOUNDS_CHANGED | Signal::NEEDS_REDRAW);
    assert_eq!(log[0].source, w.id());
}

#[test]
fn discarded_batch_keeps_mask() {
    let mut w = Invalidatable::of::<Widget>();
    let log = events(&mut w);

    w.suspend_dispatch();
    w.invalidate(WidgetState::BOUNDS | WidgetState::LABELS, Signal::BOUNDS_CHANGED);
    w.invalidate(WidgetState::APPEARANCE, Signal::NEEDS_REDRAW);
    w.resume_dispatch(false);

    assert!(log.borrow().is_empty());
    assert_eq!(w.consistency(), WidgetState::BOUNDS | WidgetState::APPEARANCE);
}

#[test]
fn guards_nest() {
    let mut w = Invalidatable::of::<Widget>();
    let log = events(&mut w);

    {
        let mut outer = w.suspended();
        outer.invalidate(WidgetState::BOUNDS, Signal::BOUNDS_CHANGED);
        {
            let mut inner = outer.suspended();
            inner.invalidate(WidgetState::APPEARANCE, Signal::NEEDS_REDRAW);
        }
        // Inner scope closing does not deliver.
        assert!(log.borrow().is_empty());
    }

    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn bubbling_through_two_levels() {
    // leaf -> plot inbox; plot re-dispatches to the chart inbox on its own terms.
    let plot_inbox = SignalInbox::new();
    let chart_inbox = SignalInbox::new();

    let mut leaf = Invalidatable::of::<Widget>();
    leaf.listen(plot_inbox.handler());

    let mut plot = Invalidatable::of::<Widget>();
    plot.listen(chart_inbox.handler());

    leaf.batch(|leaf| {
        leaf.invalidate(WidgetState::BOUNDS, Signal::BOUNDS_CHANGED);
        leaf.invalidate(WidgetState::APPEARANCE, Signal::NEEDS_REDRAW);
    });
    assert_eq!(plot_inbox.deliveries(), 1);

    let from_children = plot_inbox.take();
    if from_children.contains(Signal::BOUNDS_CHANGED) {
        plot.invalidate(WidgetState::BOUNDS, Signal::NEEDS_REDRAW | Signal::NEEDS_RECALCULATION);
    }

    assert_eq!(
        chart_inbox.take(),
        Signal::NEEDS_REDRAW | Signal::NEEDS_RECALCULATION
    );
    assert!(plot.has_state(WidgetState::BOUNDS));
}

#[test]
fn unsupported_signals_never_reach_listeners() {
    let mut w = Invalidatable::of::<Widget>();
    let log = events(&mut w);
    w.invalidate(WidgetState::BOUNDS, Signal::DATA_CHANGED);
    assert!(log.borrow().is_empty());
    assert!(w.has_state(WidgetState::BOUNDS));
}
