// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row key extraction and date-time parsing.

use alloc::string::String;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::value::{FieldKey, Value};

const MS_PER_HOUR: f64 = 3_600_000.0;

const FALLBACK_DATE_TIMES: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const FALLBACK_DATES: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// How a table turns raw rows into keyed rows.
///
/// # Example
///
/// ```
/// use chartwell_data::{TableConfig, Value};
///
/// let config = TableConfig::new()
///     .with_key_column("date")
///     .with_date_time_pattern("%d.%m.%Y");
/// let key = config.parse_key(Some(&Value::from("02.01.2000"))).unwrap();
/// assert_eq!(key, 946_771_200_000.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TableConfig {
    /// Field holding the row key. Defaults to column 0.
    pub key_column: FieldKey,
    /// `chrono` format string tried first for text keys.
    pub date_time_pattern: Option<String>,
    /// Hours added to every parsed key.
    pub time_offset_hours: f64,
    /// Day (UTC milliseconds) that time-only keys are placed on.
    pub base_date: Option<f64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TableConfig {
    /// Creates a config keyed on column 0 with no pattern and no offset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_column: FieldKey::Index(0),
            date_time_pattern: None,
            time_offset_hours: 0.0,
            base_date: None,
        }
    }

    /// Sets the key column.
    #[must_use]
    pub fn with_key_column(mut self, column: impl Into<FieldKey>) -> Self {
        self.key_column = column.into();
        self
    }

    /// Sets the date-time pattern.
    #[must_use]
    pub fn with_date_time_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.date_time_pattern = Some(pattern.into());
        self
    }

    /// Sets the time offset in hours.
    #[must_use]
    pub const fn with_time_offset_hours(mut self, hours: f64) -> Self {
        self.time_offset_hours = hours;
        self
    }

    /// Sets the base date for time-only keys.
    #[must_use]
    pub const fn with_base_date(mut self, base_ms: f64) -> Self {
        self.base_date = Some(base_ms);
        self
    }

    /// Parses a raw key value to UTC milliseconds plus the configured offset.
    ///
    /// Numbers pass through. Text is tried against the configured pattern,
    /// then as a number, then against RFC 3339 and a few common layouts.
    /// Returns `None` for anything that does not yield a finite key.
    #[must_use]
    pub fn parse_key(&self, raw: Option<&Value>) -> Option<f64> {
        let key = match raw? {
            Value::Number(n) => *n,
            Value::Text(text) => self.parse_text(text.trim())?,
            Value::Null | Value::Bool(_) => return None,
        };
        let key = key + self.time_offset_hours * MS_PER_HOUR;
        key.is_finite().then_some(key)
    }

    fn parse_text(&self, text: &str) -> Option<f64> {
        if let Some(pattern) = &self.date_time_pattern
            && let Some(ms) = self.parse_with(text, pattern)
        {
            return Some(ms);
        }
        if let Ok(n) = text.parse::<f64>() {
            return Some(n);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(millis(dt.timestamp_millis()));
        }
        FALLBACK_DATE_TIMES
            .iter()
            .chain(FALLBACK_DATES.iter())
            .find_map(|pattern| self.parse_with(text, pattern))
    }

    fn parse_with(&self, text: &str, pattern: &str) -> Option<f64> {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(millis(dt.and_utc().timestamp_millis()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, pattern) {
            return Some(millis(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()));
        }
        let time = NaiveTime::parse_from_str(text, pattern).ok()?;
        let midnight = time.signed_duration_since(NaiveTime::MIN);
        Some(self.base_date.unwrap_or(0.0) + millis(midnight.num_milliseconds()))
    }
}

fn millis(ms: i64) -> f64 {
    ms as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_numeric_text_pass_through() {
        let c = TableConfig::new();
        assert_eq!(c.parse_key(Some(&Value::from(5.0))), Some(5.0));
        assert_eq!(c.parse_key(Some(&Value::from(" 7 "))), Some(7.0));
        assert_eq!(c.parse_key(Some(&Value::Null)), None);
        assert_eq!(c.parse_key(None), None);
        assert_eq!(c.parse_key(Some(&Value::from(f64::NAN))), None);
        assert_eq!(c.parse_key(Some(&Value::from("not a date"))), None);
    }

    #[test]
    fn fallback_layouts_and_offset() {
        let c = TableConfig::new().with_time_offset_hours(1.0);
        let base = 946_684_800_000.0;
        assert_eq!(c.parse_key(Some(&Value::from("2000-01-01"))), Some(base + 3_600_000.0));
        assert_eq!(
            c.parse_key(Some(&Value::from("2000-01-01T00:00:01Z"))),
            Some(base + 3_601_000.0)
        );
        assert_eq!(
            c.parse_key(Some(&Value::from("2000-01-01 00:01"))),
            Some(base + 3_660_000.0)
        );
    }

    #[test]
    fn time_only_pattern_uses_base_date() {
        let c = TableConfig::new()
            .with_date_time_pattern("%H:%M")
            .with_base_date(1000.0);
        assert_eq!(c.parse_key(Some(&Value::from("01:30"))), Some(1000.0 + 5_400_000.0));
    }
}
