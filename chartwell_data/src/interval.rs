// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interval generators: the bucket boundaries of aggregated storages.
//!
//! Boundaries are aligned to a fixed origin (2000-01-01 UTC, or Sunday
//! 2000-01-02 for weeks) so that a bucket's key does not depend on where the
//! data happens to start. Incremental aggregation relies on this.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime};

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;
const MS_PER_WEEK: f64 = 7.0 * MS_PER_DAY;

/// 2000-01-01T00:00:00Z.
const ORIGIN: f64 = 946_684_800_000.0;
/// 2000-01-02T00:00:00Z, a Sunday.
const WEEK_ORIGIN: f64 = ORIGIN + MS_PER_DAY;

/// Produces increasing bucket boundaries.
pub trait IntervalGenerator: fmt::Debug {
    /// Positions the generator so that the next boundary is the start of the
    /// bucket containing `key`.
    fn set_start(&mut self, key: f64);

    /// Returns the next boundary. `NaN` means the current bucket is open
    /// ended.
    fn next_boundary(&mut self) -> f64;

    /// A stable string identifying this interval; storages are cached by it.
    fn cache_key(&self) -> String;

    /// Clones into a box.
    fn boxed_clone(&self) -> Box<dyn IntervalGenerator>;
}

/// Calendar and clock units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    /// Milliseconds.
    Millisecond,
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks starting on Sunday.
    Week,
    /// Thirds of a month, starting on the 1st, 11th, and 21st.
    ThirdOfMonth,
    /// Calendar months.
    Month,
    /// Calendar quarters.
    Quarter,
    /// Half years.
    Semester,
    /// Calendar years.
    Year,
}

impl IntervalUnit {
    const fn name(self) -> &'static str {
        match self {
            Self::Millisecond => "millisecond",
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::ThirdOfMonth => "third-of-month",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Semester => "semester",
            Self::Year => "year",
        }
    }

    /// Width in milliseconds for fixed-width units.
    fn fixed_width(self) -> Option<f64> {
        Some(match self {
            Self::Millisecond => 1.0,
            Self::Second => MS_PER_SECOND,
            Self::Minute => MS_PER_MINUTE,
            Self::Hour => MS_PER_HOUR,
            Self::Day => MS_PER_DAY,
            Self::Week => MS_PER_WEEK,
            _ => return None,
        })
    }

    /// Width in months for month-based units.
    const fn months(self) -> Option<i64> {
        match self {
            Self::Month => Some(1),
            Self::Quarter => Some(3),
            Self::Semester => Some(6),
            Self::Year => Some(12),
            _ => None,
        }
    }
}

/// Where a [`DateTimeInterval`] is, in the unit's own coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Cursor {
    /// UTC milliseconds.
    Millis(f64),
    /// Months since year 0.
    Months(i64),
    /// Thirds of a month since year 0.
    Thirds(i64),
}

/// Fixed-origin calendar intervals of `count` units.
///
/// # Example
///
/// ```
/// use chartwell_data::{DateTimeInterval, IntervalGenerator, IntervalUnit};
///
/// let mut days = DateTimeInterval::new(IntervalUnit::Day, 1);
/// // 2000-01-03T12:00Z
/// days.set_start(946_900_800_000.0);
/// assert_eq!(days.next_boundary(), 946_857_600_000.0);
/// assert_eq!(days.next_boundary(), 946_944_000_000.0);
/// assert_eq!(days.cache_key(), "day:1");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DateTimeInterval {
    unit: IntervalUnit,
    count: u32,
    cursor: Cursor,
}

impl DateTimeInterval {
    /// Creates an interval of `count` units. A zero count is treated as one.
    #[must_use]
    pub fn new(unit: IntervalUnit, count: u32) -> Self {
        let count = count.max(1);
        let cursor = match unit {
            IntervalUnit::ThirdOfMonth => Cursor::Thirds(0),
            u if u.months().is_some() => Cursor::Months(0),
            _ => Cursor::Millis(f64::NAN),
        };
        Self {
            unit,
            count,
            cursor,
        }
    }

    /// Returns the unit.
    #[must_use]
    pub const fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// Returns the unit count.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    fn step(&self) -> i64 {
        i64::from(self.count) * self.unit.months().unwrap_or(1)
    }
}

impl IntervalGenerator for DateTimeInterval {
    fn set_start(&mut self, key: f64) {
        if let Some(width) = self.unit.fixed_width() {
            let width = width * f64::from(self.count);
            let origin = if self.unit == IntervalUnit::Week {
                WEEK_ORIGIN
            } else {
                ORIGIN
            };
            let aligned = origin + ((key - origin) / width).floor() * width;
            self.cursor = Cursor::Millis(aligned - width);
            return;
        }
        let Some(date) = to_date(key) else {
            tracing::debug!(key, "interval start outside the calendar range");
            self.cursor = Cursor::Millis(f64::NAN);
            return;
        };
        let months = i64::from(date.year()) * 12 + i64::from(date.month0());
        let step = self.step();
        self.cursor = if self.unit == IntervalUnit::ThirdOfMonth {
            let third = i64::from((date.day0() / 10).min(2));
            let index = months * 3 + third;
            Cursor::Thirds(align(index, 2000 * 36, step) - step)
        } else {
            Cursor::Months(align(months, 2000 * 12, step) - step)
        };
    }

    fn next_boundary(&mut self) -> f64 {
        match &mut self.cursor {
            Cursor::Millis(ms) => {
                if let Some(width) = self.unit.fixed_width() {
                    *ms += width * f64::from(self.count);
                }
                *ms
            }
            Cursor::Months(m) => {
                *m += i64::from(self.count) * self.unit.months().unwrap_or(1);
                from_parts(m.div_euclid(12), m.rem_euclid(12), 0)
            }
            Cursor::Thirds(t) => {
                *t += i64::from(self.count);
                let months = t.div_euclid(3);
                from_parts(months.div_euclid(12), months.rem_euclid(12), t.rem_euclid(3) * 10)
            }
        }
    }

    fn cache_key(&self) -> String {
        format!("{}:{}", self.unit.name(), self.count)
    }

    fn boxed_clone(&self) -> Box<dyn IntervalGenerator> {
        Box::new(self.clone())
    }
}

fn align(index: i64, base: i64, step: i64) -> i64 {
    base + (index - base).div_euclid(step) * step
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "keys outside the i64 millisecond range are rejected by chrono anyway"
)]
fn to_date(key: f64) -> Option<NaiveDate> {
    if !key.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(key.floor() as i64).map(|dt| dt.date_naive())
}

/// UTC milliseconds of `year`-`month0`-`day0`, or `NaN` when out of range.
fn from_parts(year: i64, month0: i64, day0: i64) -> f64 {
    let date = i32::try_from(year).ok().and_then(|y| {
        let month = u32::try_from(month0 + 1).ok()?;
        let day = u32::try_from(day0 + 1).ok()?;
        NaiveDate::from_ymd_opt(y, month, day)
    });
    date.map_or(f64::NAN, |d| {
        d.and_time(NaiveTime::MIN).and_utc().timestamp_millis() as f64
    })
}
