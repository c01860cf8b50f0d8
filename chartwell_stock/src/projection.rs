// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::ops::Range;

use kurbo::{Point, Rect};

/// Maps `(key, value)` pairs into a plot rectangle.
///
/// Keys grow to the right and values grow upwards, so the smallest value
/// lands on `rect.y1`. A degenerate span maps everything to the middle of the
/// rectangle along that axis.
///
/// # Example
///
/// ```
/// use chartwell_stock::Projection;
/// use kurbo::{Point, Rect};
///
/// let p = Projection::new(0.0..10.0, 0.0..100.0, Rect::new(0.0, 0.0, 200.0, 50.0));
/// assert_eq!(p.point(5.0, 100.0), Point::new(100.0, 0.0));
/// assert_eq!(p.point(0.0, 0.0), Point::new(0.0, 50.0));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    keys: Range<f64>,
    values: Range<f64>,
    rect: Rect,
}

impl Projection {
    /// Creates a projection of `keys` × `values` onto `rect`.
    #[must_use]
    pub const fn new(keys: Range<f64>, values: Range<f64>, rect: Rect) -> Self {
        Self { keys, values, rect }
    }

    /// Returns the target rectangle.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        self.rect
    }

    /// Projects one data point.
    #[must_use]
    pub fn point(&self, key: f64, value: f64) -> Point {
        let x = self.rect.x0 + unit(key, &self.keys) * self.rect.width();
        let y = self.rect.y1 - unit(value, &self.values) * self.rect.height();
        Point::new(x, y)
    }
}

fn unit(v: f64, span: &Range<f64>) -> f64 {
    let len = span.end - span.start;
    if len > 0.0 {
        (v - span.start) / len
    } else {
        0.5
    }
}
