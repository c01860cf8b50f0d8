// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use chartwell_consistency::{
    ComponentId, ConsistencyModel, Invalidatable, ListenerId, Signal, SignalEvent, SignalInbox,
};
use chartwell_data::{MappedColumn, TableStorage};
use kurbo::Rect;

use crate::chart::DrawReport;
use crate::projection::Projection;
use crate::series::StockSeries;
use crate::state::{PlotState, SeriesState};

/// A horizontal band of the chart sharing one value axis.
///
/// The value range is the union of the visible extents of all enabled
/// series. Series signals reach the plot through a [`SignalInbox`]; enabling
/// or hiding a series recomputes the range on the next draw.
pub struct StockPlot {
    state: Invalidatable<PlotState>,
    inbox: SignalInbox,
    series: Vec<StockSeries>,
    height_ratio: f64,
    rect: Rect,
    y_range: Option<Range<f64>>,
}

impl ConsistencyModel for StockPlot {
    type State = PlotState;
    const SUPPORTED_STATES: PlotState = PlotState::all();
    const SUPPORTED_SIGNALS: Signal = Signal::NEEDS_REDRAW;
}

impl fmt::Debug for StockPlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StockPlot")
            .field("state", &self.state)
            .field("series", &self.series)
            .field("height_ratio", &self.height_ratio)
            .field("rect", &self.rect)
            .field("y_range", &self.y_range)
            .finish_non_exhaustive()
    }
}

impl StockPlot {
    pub(crate) fn new(height_ratio: f64) -> Self {
        Self {
            state: Invalidatable::of::<Self>(),
            inbox: SignalInbox::new(),
            series: Vec::new(),
            height_ratio,
            rect: Rect::ZERO,
            y_range: None,
        }
    }

    /// Returns the plot's component id.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.state.id()
    }

    /// Returns the current consistency mask.
    #[must_use]
    pub const fn state(&self) -> PlotState {
        self.state.consistency()
    }

    /// Share of the chart height relative to the other plots.
    #[must_use]
    pub const fn height_ratio(&self) -> f64 {
        self.height_ratio
    }

    /// Returns the rectangle assigned by the last layout.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        self.rect
    }

    /// Returns the value range of the last draw, `None` without data.
    #[must_use]
    pub fn y_range(&self) -> Option<Range<f64>> {
        self.y_range.clone()
    }

    /// Returns the series of this plot.
    #[must_use]
    pub fn series(&self) -> &[StockSeries] {
        &self.series
    }

    /// Returns a series for mutation.
    pub fn series_mut(&mut self, index: usize) -> Option<&mut StockSeries> {
        self.series.get_mut(index)
    }

    /// Returns `true` if the plot or one of its series is stale.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        !self.state.is_consistent()
            || !self.inbox.peek().is_empty()
            || self.series.iter().any(|s| !s.state().is_empty())
    }

    /// Registers a listener for this plot's signals.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        self.state.listen(listener)
    }

    pub(crate) fn push_series(&mut self, column: MappedColumn) -> usize {
        let mut series = StockSeries::new(column);
        series.listen(self.inbox.handler());
        self.series.push(series);
        self.state.invalidate(PlotState::Y_RANGE, Signal::NEEDS_REDRAW);
        self.series.len() - 1
    }

    pub(crate) fn set_rect(&mut self, rect: Rect) {
        if rect != self.rect {
            self.rect = rect;
            self.state.invalidate(PlotState::BOUNDS, Signal::NEEDS_REDRAW);
        }
    }

    pub(crate) fn reselect(&mut self) {
        for series in &mut self.series {
            series.invalidate_silently(SeriesState::DATA);
        }
    }

    pub(crate) fn draw(
        &mut self,
        storage: &mut dyn TableStorage,
        window: &Range<f64>,
        grouped: bool,
        report: &mut DrawReport,
    ) {
        if self
            .inbox
            .take()
            .intersects(Signal::NEEDS_RECALCULATION | Signal::ENABLED_STATE_CHANGED)
        {
            self.state.invalidate(PlotState::Y_RANGE, Signal::empty());
        }

        for series in &mut self.series {
            if series.has_state(SeriesState::DATA) {
                series.select(storage, window);
                report.selections += 1;
                self.state.invalidate(PlotState::Y_RANGE, Signal::empty());
            }
        }

        if self.state.has_state(PlotState::Y_RANGE) {
            let y_range = self
                .series
                .iter()
                .filter_map(|s| s.extent(grouped))
                .reduce(|a, b| a.start.min(b.start)..a.end.max(b.end));
            report.y_ranges += 1;
            if y_range != self.y_range {
                tracing::trace!(plot = self.id().get(), ?y_range, "value range changed");
                self.y_range = y_range;
                for series in &mut self.series {
                    series.invalidate_silently(SeriesState::FRAME);
                }
            }
            self.state.mark_consistent(PlotState::Y_RANGE);
        }

        if self.state.has_state(PlotState::BOUNDS) {
            for series in &mut self.series {
                series.invalidate_silently(SeriesState::FRAME);
            }
            self.state.mark_consistent(PlotState::BOUNDS);
        }

        let projection = Projection::new(
            window.clone(),
            self.y_range.clone().unwrap_or(0.0..0.0),
            self.rect,
        );
        let rows = storage.rows();
        for series in &mut self.series {
            if series.has_state(SeriesState::FRAME) {
                series.project(rows, &projection, grouped);
                report.frames += 1;
            }
        }
    }

    pub(crate) fn dispose(&mut self) {
        for series in &mut self.series {
            series.dispose();
        }
        self.state.dispose();
    }
}
