//! An in-memory temporal state store.
//!
//! A [`State`] is a collection of [`Space`]s (one per entity, keyed by a
//! primary-key value), each holding many named, typed time-series
//! ([`Stream`]) that can be queried at any timestamp through an
//! [`Interpolation`] policy, not only at the timestamps they were recorded
//! at. Streams may also be [`CalculatedStream`]s: pure functions of other
//! streams, resolved through a per-space dependency graph ([`StreamGraph`])
//! on every query.
//!
//! * See [`DateTree`] for the ordered temporal index underlying one stream.
//! * See [`StreamController::get`] and [`StreamController::all`] for the
//!   point and range query entry points.
//! * See [`State::add`] and [`State::include`] for the write APIs.

mod calculated_stream;
mod controller;
mod date_tree;
mod dtype;
mod error;
mod event;
mod expr;
mod graph;
mod merge_iter;
mod space;
mod state;
mod stream;
mod time;

pub use self::calculated_stream::CalculatedStream;
pub use self::controller::{StreamController, StreamKind};
pub use self::date_tree::{DateTree, DuplicatePolicy, Interpolation};
pub use self::dtype::{Dtype, Value};
pub use self::error::{StatefulError, StatefulResult};
pub use self::event::{Event, EventColumn, EventFrame};
pub use self::expr::{BinOp, Expr, UnaryOp};
pub use self::graph::StreamGraph;
pub use self::merge_iter::MergedTimestamps;
pub use self::space::{Record, Space};
pub use self::state::State;
pub use self::stream::{Stream, StreamConfig};
pub use self::time::Timestamp;
