// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consistency states of the stock component families.

bitflags::bitflags! {
    /// Stale aspects of a [`StockChart`](crate::StockChart).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChartState: u32 {
        /// Chart bounds changed; plots must be laid out again.
        const BOUNDS = 1 << 0;
        /// Plots were added; plots must be laid out again.
        const PLOTS = 1 << 1;
        /// The table committed new data.
        const DATA = 1 << 2;
        /// The visible key range moved.
        const SCROLL = 1 << 3;
        /// The grouping interval changed.
        const GROUPING = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Stale aspects of a [`StockPlot`](crate::StockPlot).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PlotState: u32 {
        /// The plot rectangle changed.
        const BOUNDS = 1 << 0;
        /// The auto value range must be recomputed from the series.
        const Y_RANGE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Stale aspects of a [`StockSeries`](crate::StockSeries).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SeriesState: u32 {
        /// The visible window must be selected again.
        const DATA = 1 << 0;
        /// Points must be projected again.
        const FRAME = 1 << 1;
    }
}

impl ChartState {
    /// States after which every series must select its window again.
    pub const RESELECT: Self = Self::DATA.union(Self::SCROLL).union(Self::GROUPING);

    /// States after which plots must be laid out again.
    pub const LAYOUT: Self = Self::BOUNDS.union(Self::PLOTS);
}
