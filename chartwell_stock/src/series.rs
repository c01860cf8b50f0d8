// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use chartwell_consistency::{
    ComponentId, ConsistencyModel, Invalidatable, ListenerId, Signal, SignalEvent,
};
use chartwell_data::{MappedColumn, Selection, TableRow, TableStorage};
use kurbo::Point;

use crate::projection::Projection;
use crate::state::SeriesState;

/// One line of values drawn in a [`StockPlot`](crate::StockPlot).
///
/// A series reads its [`MappedColumn`]: the source field from the main
/// storage and the aggregator column from grouped storages, or a computed
/// column from either. Its frame is the list of projected points for the
/// visible window, including the rows just outside it so the line reaches
/// the plot edges.
pub struct StockSeries {
    state: Invalidatable<SeriesState>,
    column: MappedColumn,
    enabled: bool,
    selection: Option<Rc<Selection>>,
    frame: Vec<Point>,
}

impl ConsistencyModel for StockSeries {
    type State = SeriesState;
    const SUPPORTED_STATES: SeriesState = SeriesState::all();
    const SUPPORTED_SIGNALS: Signal = Signal::NEEDS_REDRAW
        .union(Signal::NEEDS_RECALCULATION)
        .union(Signal::ENABLED_STATE_CHANGED);
}

impl fmt::Debug for StockSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StockSeries")
            .field("state", &self.state)
            .field("column", &self.column)
            .field("enabled", &self.enabled)
            .field("frame", &self.frame.len())
            .finish_non_exhaustive()
    }
}

impl StockSeries {
    pub(crate) fn new(column: MappedColumn) -> Self {
        Self {
            state: Invalidatable::of::<Self>(),
            column,
            enabled: true,
            selection: None,
            frame: Vec::new(),
        }
    }

    /// Returns the series' component id.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.state.id()
    }

    /// Returns the column this series plots.
    #[must_use]
    pub const fn column(&self) -> &MappedColumn {
        &self.column
    }

    /// Returns the current consistency mask.
    #[must_use]
    pub const fn state(&self) -> SeriesState {
        self.state.consistency()
    }

    /// Returns `true` if the series is drawn.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Shows or hides the series. Hidden series have an empty frame and do
    /// not contribute to the plot's value range.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.state.invalidate(
            SeriesState::FRAME,
            Signal::NEEDS_REDRAW | Signal::ENABLED_STATE_CHANGED,
        );
    }

    /// Returns the last selected window.
    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_deref()
    }

    /// Returns the projected points of the last draw.
    #[must_use]
    pub fn frame(&self) -> &[Point] {
        &self.frame
    }

    /// Registers a listener for this series' signals.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        self.state.listen(listener)
    }

    /// Unregisters a listener.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.state.unlisten(id)
    }

    pub(crate) fn invalidate_silently(&mut self, states: SeriesState) {
        self.state.invalidate(states, Signal::empty());
    }

    pub(crate) fn has_state(&self, states: SeriesState) -> bool {
        self.state.has_state(states)
    }

    /// Selects `window` from `storage`. The frame goes stale.
    pub(crate) fn select(&mut self, storage: &mut dyn TableStorage, window: &Range<f64>) {
        self.selection = Some(storage.select(window.start, window.end));
        self.state.mark_consistent(SeriesState::DATA);
        self.invalidate_silently(SeriesState::FRAME);
    }

    /// Value extent of the selected window, `None` when hidden or empty.
    pub(crate) fn extent(&self, grouped: bool) -> Option<Range<f64>> {
        if !self.enabled {
            return None;
        }
        let selection = self.selection.as_ref()?;
        let (min, max) = (
            self.column.min(selection, grouped),
            self.column.max(selection, grouped),
        );
        (min.is_finite() && max.is_finite()).then_some(min..max)
    }

    /// Projects the selected rows of `rows`.
    pub(crate) fn project(&mut self, rows: &[TableRow], projection: &Projection, grouped: bool) {
        self.frame.clear();
        self.state.mark_consistent(SeriesState::FRAME);
        if !self.enabled {
            return;
        }
        let Some(selection) = &self.selection else {
            return;
        };
        let (Some(from), Some(to)) = (
            selection.pre_first().or(selection.first()),
            selection.post_last().or(selection.last()),
        ) else {
            return;
        };
        for row in rows.get(from..=to).unwrap_or_default() {
            let value = self.column.number(row, grouped);
            if value.is_finite() {
                self.frame.push(projection.point(row.key(), value));
            }
        }
    }

    pub(crate) fn dispose(&mut self) {
        self.state.dispose();
        self.selection = None;
    }
}
