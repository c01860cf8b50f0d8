// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chartwell Stock: retained stock chart components with an incremental draw pass.
//!
//! A [`StockChart`] owns a [`Table`](chartwell_data::Table) and a stack of
//! [`StockPlot`]s, each holding [`StockSeries`]. Every component embeds an
//! [`Invalidatable`](chartwell_consistency::Invalidatable) with its own
//! state family ([`ChartState`], [`PlotState`], [`SeriesState`]), and
//! [`StockChart::draw`] recomputes only the aspects that are stale:
//!
//! - table commits reach the chart as [`Signal::DATA_CHANGED`] through a
//!   [`SignalInbox`](chartwell_consistency::SignalInbox) and make series
//!   select their window again;
//! - resizing only re-lays out plots and re-projects frames;
//! - value ranges are recomputed only for plots whose series changed.
//!
//! The returned [`DrawReport`] tells what ran. Frames are plain
//! [`kurbo::Point`] lists; painting them is up to the caller.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartwell_data::{FieldKey, RemoveFromStart, RowValues};
//! use chartwell_stock::StockChart;
//! use kurbo::Rect;
//!
//! let mut chart = StockChart::default();
//! let price = chart.add_plot(3.0);
//! let volume = chart.add_plot(1.0);
//! chart.add_series(price, FieldKey::Index(1)).unwrap();
//! chart.add_series(volume, FieldKey::Index(2)).unwrap();
//! chart.table_mut().add_data(
//!     (0..50).map(|i| RowValues::array([f64::from(i), 100.0 + f64::from(i), 10.0])),
//!     RemoveFromStart::Keep,
//! );
//!
//! let bounds = Rect::new(0.0, 0.0, 800.0, 400.0);
//! let report = chart.draw(bounds);
//! assert_eq!(report.selections, 2);
//!
//! // A resize re-projects without selecting again.
//! let report = chart.draw(Rect::new(0.0, 0.0, 600.0, 400.0));
//! assert_eq!(report.selections, 0);
//! assert_eq!(report.frames, 2);
//! ```
//!
//! [`Signal::DATA_CHANGED`]: chartwell_consistency::Signal::DATA_CHANGED
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod chart;
mod plot;
mod projection;
mod series;
mod state;

pub use chart::{ChartError, DrawReport, StockChart};
pub use plot::StockPlot;
pub use projection::Projection;
pub use series::StockSeries;
pub use state::{ChartState, PlotState, SeriesState};
