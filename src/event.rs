//! Value carriers: [`Event`] (scalar snapshot at one date), [`EventColumn`]
//! (a vectorized column aligned to a date index), and [`EventFrame`] (the
//! row-major batch of several aligned columns), per `spec.md` §4.4.

use std::collections::BTreeMap;

use crate::dtype::{Dtype, Value};
use crate::error::{StatefulError, StatefulResult};
use crate::time::Timestamp;

/// A scalar snapshot of named values at one timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    date: Timestamp,
    state: BTreeMap<String, Value>,
    /// Set by [`Event::project`]: a narrowed view that writes shouldn't reach
    /// back through (`spec.md` §7 `OutOfScopeMutation`).
    projected: bool,
}

impl Event {
    pub fn new(date: Timestamp) -> Self {
        Self { date, state: BTreeMap::new(), projected: false }
    }

    pub fn with_state(date: Timestamp, state: BTreeMap<String, Value>) -> Self {
        Self { date, state, projected: false }
    }

    pub fn date(&self) -> Timestamp {
        self.date
    }

    /// Looks up a key. Missing keys read as `Value::Null` (the "NaN" of
    /// `spec.md` §4.4), never panic.
    pub fn get(&self, name: &str) -> Value {
        self.state.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Fails with [`StatefulError::OutOfScopeMutation`] if this event is a
    /// [`Event::project`]ed view rather than a freshly built snapshot.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> StatefulResult<()> {
        if self.projected {
            return Err(StatefulError::OutOfScopeMutation { what: "Event::set on a projected event" });
        }
        self.state.insert(name.into(), value);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.state.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.state.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// When the event holds exactly one key, returns that key's value — the
    /// "value is the scalar" case of `spec.md` §4.4. Otherwise returns
    /// `Value::Null`; callers that need the full mapping use [`Event::iter`].
    pub fn scalar(&self) -> Value {
        if self.state.len() == 1 {
            self.state.values().next().cloned().unwrap_or(Value::Null)
        } else {
            Value::Null
        }
    }

    /// Restricts the event to a subset of names, per `spec.md` §4.4 projection.
    pub fn project(&self, names: &[&str]) -> Event {
        let mut state = BTreeMap::new();
        for &name in names {
            state.insert(name.to_owned(), self.get(name));
        }
        Event { date: self.date, state, projected: true }
    }

    pub fn cast(&mut self, dtypes: &BTreeMap<String, Dtype>) {
        for (name, value) in self.state.iter_mut() {
            if let Some(&dtype) = dtypes.get(name) {
                *value = value.cast_output(dtype);
            }
        }
    }
}

/// A vector of values aligned to an ordered date index: `events[i]` is the
/// value at `dates[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventColumn {
    name: String,
    dates: Vec<Timestamp>,
    events: Vec<Value>,
}

impl EventColumn {
    pub fn new(name: String, dates: Vec<Timestamp>, events: Vec<Value>) -> Self {
        debug_assert_eq!(dates.len(), events.len());
        Self { name, dates, events }
    }

    pub fn empty(name: impl Into<String>, dates: Vec<Timestamp>) -> Self {
        let events = vec![Value::Null; dates.len()];
        Self { name: name.into(), dates, events }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dates(&self) -> &[Timestamp] {
        &self.dates
    }

    pub fn values(&self) -> &[Value] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn same_dates(&self, other: &EventColumn) -> bool {
        self.dates == other.dates
    }

    /// Elementwise combination with another column sharing the same dates.
    pub fn zip_with(&self, other: &EventColumn, mut f: impl FnMut(&Value, &Value) -> Value) -> EventColumn {
        let events = self
            .events
            .iter()
            .zip(other.events.iter())
            .map(|(a, b)| f(a, b))
            .collect();
        EventColumn::new(self.name.clone(), self.dates.clone(), events)
    }

    /// Elementwise combination against a constant scalar.
    pub fn map_scalar(&self, mut f: impl FnMut(&Value) -> Value) -> EventColumn {
        let events = self.events.iter().map(|v| f(v)).collect();
        EventColumn::new(self.name.clone(), self.dates.clone(), events)
    }

    /// Vectorized cast to a target dtype (`spec.md` §4.4).
    pub fn cast(&self, dtype: Dtype) -> EventColumn {
        self.map_scalar(|v| v.cast_output(dtype))
    }

    pub fn row(&self, index: usize) -> Value {
        self.events[index].clone()
    }
}

/// The batched counterpart to [`Event`]: a shared date index plus one
/// [`EventColumn`] per name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFrame {
    dates: Vec<Timestamp>,
    columns: BTreeMap<String, EventColumn>,
}

impl EventFrame {
    pub fn new(dates: Vec<Timestamp>) -> Self {
        Self { dates, columns: BTreeMap::new() }
    }

    pub fn dates(&self) -> &[Timestamp] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&EventColumn> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Adds a column; requires the column's date index to equal the frame's
    /// (`spec.md` §4.4).
    pub fn add_column(&mut self, column: EventColumn) {
        debug_assert_eq!(column.dates(), self.dates.as_slice(), "column dates must match frame dates");
        self.columns.insert(column.name().to_owned(), column);
    }

    pub fn empty_column(&self, name: impl Into<String>) -> EventColumn {
        EventColumn::empty(name, self.dates.clone())
    }

    /// One [`Event`] per date, in index order.
    pub fn rows(&self) -> impl Iterator<Item = Event> + '_ {
        (0..self.dates.len()).map(move |i| {
            let mut state = BTreeMap::new();
            for (name, column) in &self.columns {
                state.insert(name.clone(), column.row(i));
            }
            Event::with_state(self.dates[i], state)
        })
    }

    /// Restricts the frame to a subset of columns, per `spec.md` §4.4 projection.
    pub fn project(&self, names: &[&str]) -> EventFrame {
        let mut out = EventFrame::new(self.dates.clone());
        for &name in names {
            if let Some(column) = self.columns.get(name) {
                out.columns.insert(name.to_owned(), column.clone());
            }
        }
        out
    }

    /// Concatenates two frames along the date axis, unioning column sets and
    /// filling any column missing from one side with nulls for that side's
    /// rows (`spec.md` §4.4).
    pub fn concat(&self, other: &EventFrame) -> EventFrame {
        let mut dates = self.dates.clone();
        dates.extend(other.dates.iter().copied());

        let mut names: Vec<String> = self.columns.keys().cloned().collect();
        for name in other.columns.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let mut out = EventFrame::new(dates);
        for name in names {
            let mut events = Vec::with_capacity(out.dates.len());
            if let Some(col) = self.columns.get(&name) {
                events.extend(col.values().iter().cloned());
            } else {
                events.extend(std::iter::repeat(Value::Null).take(self.dates.len()));
            }
            if let Some(col) = other.columns.get(&name) {
                events.extend(col.values().iter().cloned());
            } else {
                events.extend(std::iter::repeat(Value::Null).take(other.dates.len()));
            }
            out.columns.insert(name.clone(), EventColumn::new(name, out.dates.clone(), events));
        }
        out
    }

    pub fn cast(&mut self, dtypes: &BTreeMap<String, Dtype>) {
        for (name, column) in self.columns.iter_mut() {
            if let Some(&dtype) = dtypes.get(name) {
                *column = column.cast(dtype);
            }
        }
    }
}
