// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw pass tests for `chartwell_stock`.
//!
//! Each test performs one kind of change and checks through [`DrawReport`]
//! that the next draw recomputes exactly the dependent aspects.

use chartwell_data::{FieldKey, RemoveFromStart, RowValues};
use chartwell_stock::{DrawReport, StockChart};
use kurbo::{Point, Rect};

const BOUNDS: Rect = Rect::new(0.0, 0.0, 400.0, 300.0);

/// Two plots: close and high on the first, volume on the second.
fn chart() -> StockChart {
    let mut chart = StockChart::default();
    let price = chart.add_plot(2.0);
    let volume = chart.add_plot(1.0);
    chart.add_series(price, FieldKey::Index(1)).unwrap();
    chart.add_series(price, FieldKey::Index(2)).unwrap();
    chart.add_series(volume, FieldKey::Index(3)).unwrap();
    chart.table_mut().add_data(
        (0..100).map(|i| {
            let k = f64::from(i);
            RowValues::array([k, 50.0 + k, 60.0 + k, f64::from(i % 7)])
        }),
        RemoveFromStart::Keep,
    );
    chart.set_visible_range(10.0..30.0);
    let first = chart.draw(BOUNDS);
    assert_eq!(
        first,
        DrawReport {
            layout: true,
            selections: 3,
            y_ranges: 2,
            frames: 3,
        }
    );
    chart
}

#[test]
fn idle_draw_does_nothing() {
    let mut chart = chart();
    assert!(!chart.needs_redraw());
    assert!(chart.draw(BOUNDS).is_idle());
}

#[test]
fn value_ranges_cover_window_and_neighbours() {
    let chart = chart();
    assert_eq!(chart.plots()[0].y_range(), Some(59.0..91.0));
    assert_eq!(chart.plots()[1].y_range(), Some(0.0..6.0));
}

#[test]
fn frames_include_edge_neighbours() {
    let chart = chart();
    let close = chart.plots()[0].series()[0].frame();
    assert_eq!(close.len(), 23);
    // Key 10 sits on the left edge of a 400 wide plot.
    assert_eq!(close[1].x, 0.0);
    assert_eq!(close[21].x, 400.0);
}

#[test]
fn resize_reprojects_only() {
    let mut chart = chart();
    let report = chart.draw(Rect::new(0.0, 0.0, 800.0, 300.0));
    assert_eq!(
        report,
        DrawReport {
            layout: true,
            selections: 0,
            y_ranges: 0,
            frames: 3,
        }
    );
    assert_eq!(chart.plots()[0].series()[0].frame()[21].x, 800.0);
}

#[test]
fn scroll_reselects_every_series() {
    let mut chart = chart();
    chart.set_visible_range(40.0..60.0);
    let report = chart.draw(BOUNDS);
    assert!(!report.layout, "scrolling keeps the layout");
    assert_eq!(report.selections, 3);
    assert_eq!(report.y_ranges, 2);
    assert_eq!(chart.plots()[0].y_range(), Some(89.0..121.0));
}

#[test]
fn hiding_a_series_touches_only_its_plot() {
    let mut chart = chart();
    chart
        .plot_mut(0)
        .and_then(|p| p.series_mut(1))
        .unwrap()
        .set_enabled(false);
    assert!(chart.needs_redraw());

    let report = chart.draw(BOUNDS);
    assert_eq!(report.selections, 0);
    assert_eq!(report.y_ranges, 1);
    // Both price series re-project against the narrower range.
    assert_eq!(report.frames, 2);
    assert_eq!(chart.plots()[0].y_range(), Some(59.0..81.0));
    assert!(chart.plots()[0].series()[1].frame().is_empty());
}

#[test]
fn appended_rows_outside_the_window_keep_ranges() {
    let mut chart = chart();
    chart
        .table_mut()
        .add_data([RowValues::array([100.0, 1.0, 1.0, 1.0])], RemoveFromStart::Keep);
    let report = chart.draw(BOUNDS);
    assert_eq!(report.selections, 3);
    assert_eq!(report.y_ranges, 2);
    // Fresh selections always re-project: row indexes may have shifted.
    assert_eq!(report.frames, 3);
    assert_eq!(chart.plots()[0].y_range(), Some(59.0..91.0));
    assert_eq!(chart.plots()[1].y_range(), Some(0.0..6.0));
}

#[test]
fn degenerate_plot_values_sit_mid_height() {
    let mut chart = StockChart::default();
    let plot = chart.add_plot(1.0);
    chart.add_series(plot, FieldKey::Index(1)).unwrap();
    chart.table_mut().add_data(
        [RowValues::array([0.0, 5.0]), RowValues::array([10.0, 5.0])],
        RemoveFromStart::Keep,
    );
    chart.draw(BOUNDS);
    assert_eq!(
        chart.plots()[0].series()[0].frame(),
        [Point::new(0.0, 150.0), Point::new(400.0, 150.0)]
    );
}
