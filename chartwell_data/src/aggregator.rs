// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-bucket aggregation of one field.

use core::fmt;

use crate::value::{FieldKey, RowValues, Value};

/// Accumulates one field over the rows of a bucket.
///
/// [`process`](Self::process) is called for every row in the bucket, in key
/// order, then [`value_and_clear`](Self::value_and_clear) yields the bucket
/// value and resets the aggregator for the next bucket.
pub trait Aggregator: fmt::Debug {
    /// The field this aggregator reads.
    fn values_column(&self) -> &FieldKey;

    /// The weights field, for weighted aggregations.
    fn weights_column(&self) -> Option<&FieldKey> {
        None
    }

    /// Feeds one row.
    fn process(&mut self, value: Option<&Value>, weight: Option<&Value>, row: &RowValues);

    /// Returns the bucket value and resets.
    fn value_and_clear(&mut self) -> Value;
}

/// Built-in aggregation kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AggregationType {
    /// Value of the first row, even if missing.
    First,
    /// Value of the last row, even if missing.
    Last,
    /// First value that is present.
    FirstValue,
    /// Last value that is present.
    LastValue,
    /// Sum of numeric values.
    Sum,
    /// Mean of numeric values.
    Average,
    /// Weighted mean of numeric values; falls back to the plain mean when no
    /// weights column is set.
    WeightedAverage,
    /// Largest numeric value.
    Max,
    /// Smallest numeric value.
    Min,
    /// Number of rows.
    Count,
}

impl AggregationType {
    /// Resolves a name, including the financial aliases `open`, `high`,
    /// `low`, and `close`. Matching is case-insensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Some(match lower.as_str() {
            "first" | "open" => Self::First,
            "last" | "close" => Self::Last,
            "firstvalue" | "first-value" => Self::FirstValue,
            "lastvalue" | "last-value" => Self::LastValue,
            "sum" => Self::Sum,
            "average" | "avg" => Self::Average,
            "weightedaverage" | "weighted-average" => Self::WeightedAverage,
            "max" | "high" => Self::Max,
            "min" | "low" => Self::Min,
            "count" => Self::Count,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
enum AggState {
    Pick(Option<Value>),
    Sum { sum: f64, count: usize },
    Weighted { sum: f64, weights: f64 },
    Extreme(f64),
    Count(usize),
}

/// An [`Aggregator`] implementing one of the [`AggregationType`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinAggregator {
    kind: AggregationType,
    values: FieldKey,
    weights: Option<FieldKey>,
    state: AggState,
}

impl BuiltinAggregator {
    /// Creates an aggregator of `kind` over `values`.
    #[must_use]
    pub fn new(kind: AggregationType, values: FieldKey, weights: Option<FieldKey>) -> Self {
        Self {
            kind,
            values,
            weights,
            state: Self::initial(kind),
        }
    }

    /// Returns the aggregation kind.
    #[must_use]
    pub const fn kind(&self) -> AggregationType {
        self.kind
    }

    fn initial(kind: AggregationType) -> AggState {
        match kind {
            AggregationType::First
            | AggregationType::Last
            | AggregationType::FirstValue
            | AggregationType::LastValue => AggState::Pick(None),
            AggregationType::Sum | AggregationType::Average => AggState::Sum { sum: 0.0, count: 0 },
            AggregationType::WeightedAverage => AggState::Weighted {
                sum: 0.0,
                weights: 0.0,
            },
            AggregationType::Max => AggState::Extreme(f64::NEG_INFINITY),
            AggregationType::Min => AggState::Extreme(f64::INFINITY),
            AggregationType::Count => AggState::Count(0),
        }
    }
}

impl Aggregator for BuiltinAggregator {
    fn values_column(&self) -> &FieldKey {
        &self.values
    }

    fn weights_column(&self) -> Option<&FieldKey> {
        self.weights.as_ref()
    }

    fn process(&mut self, value: Option<&Value>, weight: Option<&Value>, _row: &RowValues) {
        let number = value.map_or(f64::NAN, Value::to_number);
        let present = value.filter(|v| !v.is_null());
        match (&mut self.state, self.kind) {
            (AggState::Pick(picked), AggregationType::First) => {
                if picked.is_none() {
                    *picked = Some(value.cloned().unwrap_or_default());
                }
            }
            (AggState::Pick(picked), AggregationType::Last) => {
                *picked = Some(value.cloned().unwrap_or_default());
            }
            (AggState::Pick(picked), AggregationType::FirstValue) => {
                if picked.is_none() {
                    *picked = present.cloned();
                }
            }
            (AggState::Pick(picked), _) => {
                if let Some(v) = present {
                    *picked = Some(v.clone());
                }
            }
            (AggState::Sum { sum, count }, _) => {
                if !number.is_nan() {
                    *sum += number;
                    *count += 1;
                }
            }
            (AggState::Weighted { sum, weights }, _) => {
                let w = match (&self.weights, weight) {
                    (None, _) => 1.0,
                    (Some(_), w) => w.map_or(f64::NAN, Value::to_number),
                };
                if !number.is_nan() && !w.is_nan() {
                    *sum += number * w;
                    *weights += w;
                }
            }
            (AggState::Extreme(best), AggregationType::Max) => {
                if number > *best {
                    *best = number;
                }
            }
            (AggState::Extreme(best), _) => {
                if number < *best {
                    *best = number;
                }
            }
            (AggState::Count(n), _) => *n += 1,
        }
    }

    fn value_and_clear(&mut self) -> Value {
        let state = core::mem::replace(&mut self.state, Self::initial(self.kind));
        match state {
            AggState::Pick(picked) => picked.unwrap_or_default(),
            AggState::Sum { sum, count } => {
                if count == 0 {
                    Value::Number(f64::NAN)
                } else if self.kind == AggregationType::Sum {
                    Value::Number(sum)
                } else {
                    Value::Number(sum / count as f64)
                }
            }
            AggState::Weighted { sum, weights } => Value::Number(sum / weights),
            AggState::Extreme(best) => Value::Number(if best.is_infinite() { f64::NAN } else { best }),
            AggState::Count(n) => Value::Number(n as f64),
        }
    }
}
