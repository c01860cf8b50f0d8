// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chartwell Data: time-series tables and hierarchical data for charts.
//!
//! The stock chart reads its rows from a [`Table`]. Tables are append-mostly:
//!
//! - [`TableMainStorage`] holds committed rows sorted by key. New rows are
//!   staged and merged on [`commit`](TableMainStorage::commit); appends past
//!   the end of the data take a fast path that keeps row identities.
//! - [`TableAggregatedStorage`] groups the main rows into buckets produced by
//!   an [`IntervalGenerator`] and repairs only what a commit invalidated
//!   (right appends, leading removes, new aggregator columns).
//! - Every storage implements [`TableStorage`]: cached [`Selection`]s of key
//!   ranges with per-field extremes, and binary [`search`](TableStorage::search)
//!   with [`SearchMode`]s.
//! - [`ColumnComputer`]s derive extra columns on every storage.
//! - A [`TableMapping`] names fields so that raw and grouped rows are read
//!   alike.
//!
//! The Gantt chart reads a [`TreeModel`]: an arena of items with field
//! indexes, CRUD operations, and [`TreeEvent`]s.
//!
//! Both sources announce changes through [`chartwell_consistency`] signals.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartwell_data::{FieldKey, RemoveFromStart, RowValues, SearchMode, Table, TableStorage};
//!
//! let mut table = Table::default();
//! table.add_data(
//!     (0..10).map(|i| RowValues::array([f64::from(i) * 10.0, f64::from(i * i)])),
//!     RemoveFromStart::Keep,
//! );
//!
//! let main = table.storage(None);
//! let visible = main.select(25.0, 55.0);
//! assert_eq!(visible.first(), Some(3));
//! assert_eq!(visible.last(), Some(5));
//! // Extremes cover the neighbours just outside the range.
//! assert_eq!(visible.max(&FieldKey::Index(1)), 36.0);
//!
//! assert_eq!(main.search_index(41.0, SearchMode::ExactOrPrev), Some(4));
//! ```
//!
//! ## Diagnostics
//!
//! Data problems that the engine recovers from (unparseable keys, duplicate
//! tree ids, cyclic parents) are reported through [`tracing`] at `debug` or
//! `warn` level. No subscriber is installed.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod aggregated;
mod aggregator;
mod computer;
mod interval;
mod key;
mod main_storage;
mod mapping;
mod merge;
mod ring;
mod row;
mod search;
mod selection;
mod storage;
mod table;
mod tree;
mod value;

pub use aggregated::{AggregateDirty, TableAggregatedStorage};
pub use aggregator::{AggregationType, Aggregator, BuiltinAggregator};
pub use computer::{ColumnComputer, ComputeContext, ComputerId};
pub use interval::{DateTimeInterval, IntervalGenerator, IntervalUnit};
pub use key::TableConfig;
pub use main_storage::{PusherMode, RemoveFromStart, RemovesStatus, TableMainStorage};
pub use mapping::{FieldSpec, MappedColumn, RowProxy, TableMapping};
pub use row::{RowId, TableRow};
pub use search::SearchMode;
pub use selection::{KnownFields, Selection};
pub use storage::{RowStore, TableStorage};
pub use table::{Table, TableError};
pub use tree::{
    EventListenerId, Fields, ID_FIELD, ItemId, PARENT_FIELD, TreeData, TreeError, TreeEvent,
    TreeModel,
};
pub use value::{FieldKey, RowValues, Value};
