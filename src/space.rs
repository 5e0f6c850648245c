//! One entity's controller plus identity (`spec.md` §4.7).

use std::collections::BTreeMap;

use crate::calculated_stream::CalculatedStream;
use crate::controller::{StreamController, StreamKind};
use crate::dtype::{Dtype, Value};
use crate::error::{StatefulError, StatefulResult};
use crate::event::{Event, EventFrame};
use crate::merge_iter::MergedTimestamps;
use crate::stream::{Stream, StreamConfig};
use crate::time::Timestamp;

/// A single ingestion record: field name to raw value, time key included.
pub type Record = BTreeMap<String, Value>;

#[derive(Clone)]
pub struct Space {
    primary_key: String,
    primary_value: Value,
    time_key: String,
    controller: StreamController,
}

impl Space {
    pub fn new(primary_key: impl Into<String>, primary_value: Value, time_key: impl Into<String>, configuration: BTreeMap<String, StreamConfig>) -> Self {
        Self {
            primary_key: primary_key.into(),
            primary_value,
            time_key: time_key.into(),
            controller: StreamController::new(configuration),
        }
    }

    pub fn primary_value(&self) -> &Value {
        &self.primary_value
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StreamController {
        &mut self.controller
    }

    pub fn is_empty(&self) -> bool {
        self.controller.is_empty()
    }

    /// Total recorded points across every data stream (`spec.md` §4.7 `len`).
    pub fn len(&self) -> usize {
        self.controller.data_streams().map(Stream::len).sum()
    }

    pub fn start(&self) -> StatefulResult<Timestamp> {
        self.controller.start()
    }

    pub fn end(&self) -> StatefulResult<Timestamp> {
        self.controller.end()
    }

    pub fn first(&self) -> StatefulResult<Event> {
        self.get_at(self.start()?, true, true)
    }

    pub fn last(&self) -> StatefulResult<Event> {
        self.get_at(self.end()?, true, true)
    }

    /// Requires `time_key` in `event`; pops it, then forwards each remaining
    /// `(name, value)` pair to its stream (`spec.md` §4.7).
    pub fn add(&mut self, mut event: Record) -> StatefulResult<()> {
        let date_value = event
            .remove(&self.time_key)
            .ok_or_else(|| StatefulError::InvalidEvent { key: self.time_key.clone() })?;
        let date = Timestamp::from_value(&date_value)
            .ok_or_else(|| StatefulError::InvalidEvent { key: self.time_key.clone() })?;

        for (name, value) in event {
            self.controller.add_value(&name, date, value)?;
        }
        Ok(())
    }

    /// `space.get(date)`: obtains an Event from the controller, optionally
    /// augmented with the date and the primary identifier.
    pub fn get_at(&self, date: Timestamp, include_date: bool, include_id: bool) -> StatefulResult<Event> {
        let mut event = self.controller.get(date, None, true)?;
        if include_date {
            event.set(self.time_key.clone(), Value::Str(date.to_string()))?;
        }
        if include_id {
            event.set(self.primary_key.clone(), self.primary_value.clone())?;
        }
        Ok(event)
    }

    /// `space.all(dates)`.
    pub fn all_at(&self, dates: &[Timestamp]) -> StatefulResult<EventFrame> {
        self.controller.all(dates, None, true)
    }

    /// Installs a stream (possibly derived) directly.
    pub fn set(&mut self, name: &str, kind: StreamKind) -> StatefulResult<()> {
        self.controller.add_stream(name, kind, &[])
    }

    /// `space[name] = expr`: declares a derived stream.
    pub fn declare(&mut self, name: &str, expr: CalculatedStream) -> StatefulResult<()> {
        self.set(name, StreamKind::Calculated(expr))
    }

    /// `space[name]`: an anchored `CalculatedStream` over one dependency,
    /// creating it lazily if it isn't known yet (`spec.md` §4.7, §3
    /// "Lifecycles").
    pub fn stream(&mut self, name: &str) -> CalculatedStream {
        let _ = self.controller.ensure_stream(name, None);
        let dtype = self.controller.get_kind(name).map(StreamKind::dtype).unwrap_or(Dtype::Object);
        CalculatedStream::dependency(name, dtype)
    }

    /// `space[[name, ...]]`: a `CalculatedStream` aggregating several
    /// dependencies at once.
    pub fn streams(&mut self, names: &[&str]) -> CalculatedStream {
        for name in names {
            let _ = self.controller.ensure_stream(name, None);
        }
        let dtype = names
            .iter()
            .map(|name| self.controller.get_kind(name).map(StreamKind::dtype).unwrap_or(Dtype::Object))
            .fold(Dtype::Boolean, Dtype::widen);
        CalculatedStream::dependencies_of(names, dtype)
    }

    /// Iterates per-timestamp `Event`s over the merged timeline of the
    /// space, in ascending order with no duplicates (`spec.md` §4.7,
    /// invariant 8).
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        MergedTimestamps::new(&self.controller).map(move |date| {
            self.get_at(date, true, true)
                .expect("a timestamp drawn from this space's own streams always resolves")
        })
    }
}

impl<'a> IntoIterator for &'a Space {
    type Item = Event;
    type IntoIter = Box<dyn Iterator<Item = Event> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
