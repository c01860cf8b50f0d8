// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use chartwell_consistency::{
    ComponentId, ConsistencyModel, Dispatching, Invalidatable, ListenerId, Signal,
    SignalDispatcher, SignalEvent, SignalInbox,
};
use chartwell_data::{
    AggregationType, FieldKey, IntervalGenerator, MappedColumn, Table, TableMapping,
    TableStorage,
};
use kurbo::Rect;

use crate::plot::StockPlot;
use crate::state::ChartState;

/// Errors reported by [`StockChart`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChartError {
    /// No plot has this index.
    NoSuchPlot(usize),
    /// The mapping has no field of this name.
    UnknownField(String),
    /// The mapping was created by another table.
    ForeignMapping,
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchPlot(index) => write!(f, "no plot at index {index}"),
            Self::UnknownField(name) => write!(f, "mapping has no field `{name}`"),
            Self::ForeignMapping => f.write_str("mapping belongs to a different table"),
        }
    }
}

impl core::error::Error for ChartError {}

/// What one [`StockChart::draw`] call recomputed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawReport {
    /// Plots were laid out again.
    pub layout: bool,
    /// Series that selected their visible window again.
    pub selections: usize,
    /// Plots that recomputed their value range.
    pub y_ranges: usize,
    /// Series that projected their points again.
    pub frames: usize,
}

impl DrawReport {
    /// Returns `true` if the draw found nothing stale.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// A stock chart over one [`Table`].
///
/// The chart owns its table and listens to it through a [`SignalInbox`], so
/// mutating the table via [`table_mut`](Self::table_mut) is enough to make
/// the next [`draw`](Self::draw) pick up new data. Each draw walks chart,
/// plots and series and recomputes only the aspects whose consistency state
/// is set:
///
/// - layout when the bounds or the set of plots changed,
/// - window selections when data, scroll position or grouping changed,
/// - value ranges when a plot's selections or enabled series changed,
/// - point frames when a series' window, its plot's value range, or the plot
///   rectangle changed.
///
/// # Example
///
/// ```
/// use chartwell_data::{FieldKey, RemoveFromStart, RowValues, Table};
/// use chartwell_stock::StockChart;
/// use kurbo::Rect;
///
/// let mut chart = StockChart::new(Table::default());
/// let plot = chart.add_plot(1.0);
/// chart.add_series(plot, FieldKey::Index(1)).unwrap();
/// chart.table_mut().add_data(
///     (0..100).map(|i| RowValues::array([f64::from(i), f64::from(i % 10)])),
///     RemoveFromStart::Keep,
/// );
/// chart.set_visible_range(20.0..40.0);
///
/// let bounds = Rect::new(0.0, 0.0, 400.0, 300.0);
/// let first = chart.draw(bounds);
/// assert!(first.layout);
/// assert_eq!(first.frames, 1);
/// assert_eq!(chart.plots()[0].y_range(), Some(0.0..9.0));
///
/// // Nothing changed: nothing runs.
/// assert!(chart.draw(bounds).is_idle());
/// ```
pub struct StockChart {
    state: Invalidatable<ChartState>,
    table: Table,
    table_inbox: SignalInbox,
    plots_inbox: SignalInbox,
    plots: Vec<StockPlot>,
    visible: Range<f64>,
    grouping: Option<Box<dyn IntervalGenerator>>,
    bounds: Rect,
}

impl ConsistencyModel for StockChart {
    type State = ChartState;
    const SUPPORTED_STATES: ChartState = ChartState::all();
    const SUPPORTED_SIGNALS: Signal = Signal::NEEDS_REDRAW.union(Signal::BOUNDS_CHANGED);
}

impl fmt::Debug for StockChart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StockChart")
            .field("state", &self.state)
            .field("table", &self.table)
            .field("plots", &self.plots)
            .field("visible", &self.visible)
            .field("grouping", &self.grouping)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

impl Default for StockChart {
    fn default() -> Self {
        Self::new(Table::default())
    }
}

impl StockChart {
    /// Creates a chart over `table` showing every key.
    #[must_use]
    pub fn new(mut table: Table) -> Self {
        let table_inbox = SignalInbox::new();
        table.listen(table_inbox.handler());
        Self {
            state: Invalidatable::of::<Self>(),
            table,
            table_inbox,
            plots_inbox: SignalInbox::new(),
            plots: Vec::new(),
            visible: f64::NAN..f64::NAN,
            grouping: None,
            bounds: Rect::ZERO,
        }
    }

    /// Returns the chart's component id.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.state.id()
    }

    /// Returns the current consistency mask.
    #[must_use]
    pub const fn state(&self) -> ChartState {
        self.state.consistency()
    }

    /// Returns the table.
    #[must_use]
    pub const fn table(&self) -> &Table {
        &self.table
    }

    /// Returns the table for mutation. Committed changes are picked up by
    /// the next draw.
    pub fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    /// Returns the visible key range. `NaN` bounds are open.
    #[must_use]
    pub fn visible_range(&self) -> Range<f64> {
        self.visible.clone()
    }

    /// Scrolls or zooms to `range`.
    pub fn set_visible_range(&mut self, range: Range<f64>) {
        if same_key(range.start, self.visible.start) && same_key(range.end, self.visible.end) {
            return;
        }
        self.visible = range;
        self.state.invalidate(ChartState::SCROLL, Signal::NEEDS_REDRAW);
    }

    /// Returns the grouping interval, `None` for raw rows.
    #[must_use]
    pub fn grouping(&self) -> Option<&dyn IntervalGenerator> {
        self.grouping.as_deref()
    }

    /// Groups rows by `interval`, or shows raw rows for `None`.
    pub fn set_grouping(&mut self, interval: Option<Box<dyn IntervalGenerator>>) {
        let key = |g: &Option<Box<dyn IntervalGenerator>>| g.as_ref().map(|g| g.cache_key());
        if key(&interval) == key(&self.grouping) {
            return;
        }
        self.grouping = interval;
        self.state.invalidate(ChartState::GROUPING, Signal::NEEDS_REDRAW);
    }

    /// Returns the plots, top to bottom.
    #[must_use]
    pub fn plots(&self) -> &[StockPlot] {
        &self.plots
    }

    /// Returns a plot for mutation.
    pub fn plot_mut(&mut self, index: usize) -> Option<&mut StockPlot> {
        self.plots.get_mut(index)
    }

    /// Appends a plot taking `height_ratio` of the chart height relative to
    /// the other plots. Returns its index.
    pub fn add_plot(&mut self, height_ratio: f64) -> usize {
        let mut plot = StockPlot::new(height_ratio);
        plot.listen(self.plots_inbox.handler());
        self.plots.push(plot);
        self.state.invalidate(ChartState::PLOTS, Signal::NEEDS_REDRAW);
        self.plots.len() - 1
    }

    /// Adds a series plotting `field` to plot `plot`. Grouped storages show
    /// the last value of `field` in each bucket.
    ///
    /// Returns the series index within the plot.
    pub fn add_series(&mut self, plot: usize, field: FieldKey) -> Result<usize, ChartError> {
        let target = self.plots.get_mut(plot).ok_or(ChartError::NoSuchPlot(plot))?;
        let aggregate = self
            .table
            .register_field(field.clone(), AggregationType::Last, None);
        Ok(target.push_series(MappedColumn::Source {
            source: field,
            kind: AggregationType::Last,
            aggregate,
        }))
    }

    /// Adds a series plotting field `name` of `mapping` to plot `plot`.
    ///
    /// The mapping decides how grouped storages combine the field, and may
    /// name a computed column.
    pub fn add_mapped_series(
        &mut self,
        plot: usize,
        mapping: &TableMapping,
        name: &str,
    ) -> Result<usize, ChartError> {
        if mapping.table() != self.table.id() {
            return Err(ChartError::ForeignMapping);
        }
        let column = mapping
            .column(name)
            .cloned()
            .ok_or_else(|| ChartError::UnknownField(name.into()))?;
        let target = self.plots.get_mut(plot).ok_or(ChartError::NoSuchPlot(plot))?;
        Ok(target.push_series(column))
    }

    /// Returns `true` if the next draw would recompute anything.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        !self.state.is_consistent()
            || self.table_inbox.peek().contains(Signal::DATA_CHANGED)
            || self.plots_inbox.peek().contains(Signal::NEEDS_REDRAW)
            || self.plots.iter().any(StockPlot::needs_redraw)
    }

    /// Brings every plot and series up to date for `bounds`.
    pub fn draw(&mut self, bounds: Rect) -> DrawReport {
        let mut report = DrawReport::default();
        if bounds != self.bounds {
            self.bounds = bounds;
            self.state.invalidate(ChartState::BOUNDS, Signal::BOUNDS_CHANGED);
        }
        if self.table_inbox.take().contains(Signal::DATA_CHANGED) {
            self.state.invalidate(ChartState::DATA, Signal::empty());
        }

        if self.state.has_state(ChartState::LAYOUT) {
            self.layout();
            report.layout = true;
        }
        if self.state.has_state(ChartState::RESELECT) {
            for plot in &mut self.plots {
                plot.reselect();
            }
        }
        self.state.mark_consistent(ChartState::all());

        let window = self.window();
        let grouped = self.grouping.is_some();
        let storage = self.table.storage(self.grouping.as_deref());
        for plot in &mut self.plots {
            plot.draw(storage, &window, grouped, &mut report);
        }
        self.plots_inbox.take();

        tracing::trace!(chart = self.id().get(), ?report, "drawn");
        report
    }

    /// Visible keys with open ends resolved against the main storage.
    fn window(&self) -> Range<f64> {
        let rows = self.table.main_storage().rows();
        let start = if self.visible.start.is_nan() {
            rows.first().map_or(f64::NAN, |r| r.key())
        } else {
            self.visible.start
        };
        let end = if self.visible.end.is_nan() {
            rows.last().map_or(f64::NAN, |r| r.key())
        } else {
            self.visible.end
        };
        start..end
    }

    fn layout(&mut self) {
        let total: f64 = self.plots.iter().map(StockPlot::height_ratio).sum();
        let mut y = self.bounds.y0;
        for plot in &mut self.plots {
            let share = if total > 0.0 {
                plot.height_ratio() / total
            } else {
                0.0
            };
            let height = self.bounds.height() * share;
            plot.set_rect(Rect::new(self.bounds.x0, y, self.bounds.x1, y + height));
            y += height;
        }
    }

    /// Registers a listener for the chart's signals.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        self.state.listen(listener)
    }

    /// Unregisters a listener.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.state.unlisten(id)
    }

    /// Releases every listener of the chart, its plots and series.
    pub fn dispose(&mut self) {
        for plot in &mut self.plots {
            plot.dispose();
        }
        self.state.dispose();
        self.table.dispose();
    }
}

impl Dispatching for StockChart {
    fn dispatcher_mut(&mut self) -> &mut SignalDispatcher {
        self.state.dispatcher_mut()
    }
}

fn same_key(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}
