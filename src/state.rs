//! Top-level collection of [`Space`]s keyed by primary value (`spec.md`
//! §4.8), plus the tabular `include` ingestion helper.

use std::collections::BTreeMap;

use tracing::trace;

use crate::calculated_stream::CalculatedStream;
use crate::dtype::{Dtype, Value};
use crate::error::{StatefulError, StatefulResult};
use crate::event::EventFrame;
use crate::space::{Record, Space};
use crate::stream::StreamConfig;
use crate::time::Timestamp;

/// A derived stream declared at the `State` level, replayed into every space
/// — existing ones immediately, future ones as they're created (`spec.md`
/// §4.8, `SPEC_FULL.md` §2 "`__setitem__` propagation").
#[derive(Clone)]
struct Declaration {
    name: String,
    calculated: CalculatedStream,
}

pub struct State {
    primary_key: String,
    time_key: String,
    configuration: BTreeMap<String, StreamConfig>,
    /// Keyed by the primary value's canonical display form — `Value` isn't
    /// `Hash`/`Eq` (it carries `f64`), so the display string stands in as the
    /// map key while the space itself keeps the original `Value`.
    spaces: BTreeMap<String, Space>,
    declarations: Vec<Declaration>,
}

impl State {
    pub fn new(primary_key: impl Into<String>, time_key: impl Into<String>, configuration: BTreeMap<String, StreamConfig>) -> Self {
        Self {
            primary_key: primary_key.into(),
            time_key: time_key.into(),
            configuration,
            spaces: BTreeMap::new(),
            declarations: Vec::new(),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn time_key(&self) -> &str {
        &self.time_key
    }

    pub fn is_empty(&self) -> bool {
        !self.spaces.is_empty() && self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.spaces.values().map(Space::len).sum()
    }

    pub fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.spaces.values()
    }

    pub fn space(&self, primary_value: &Value) -> Option<&Space> {
        self.spaces.get(&primary_value.to_string())
    }

    pub fn start(&self) -> StatefulResult<Timestamp> {
        self.spaces
            .values()
            .filter_map(|s| s.start().ok())
            .min()
            .ok_or(StatefulError::EmptyQuery { what: "start" })
    }

    pub fn end(&self) -> StatefulResult<Timestamp> {
        self.spaces
            .values()
            .filter_map(|s| s.end().ok())
            .max()
            .ok_or(StatefulError::EmptyQuery { what: "end" })
    }

    /// Creates the space for `primary_value` if it doesn't exist yet, and
    /// replays every previously declared derived stream into it so every
    /// space shares the same derived-stream schema regardless of when it
    /// was created (`spec.md` §4.8).
    ///
    /// A fresh space has an empty graph, so before replaying a declaration
    /// its dependencies must already exist there — a data stream mentioned
    /// only by a declaration, never yet by `add`, has no placeholder in a
    /// brand-new space otherwise, and `StreamGraph::add` rejects unknown
    /// dependencies outright. `ensure_stream` is a no-op for a dependency
    /// that's itself an earlier declaration replayed in this same loop, so
    /// a dependency chain (`combined` on `half` on `amount`) still resolves
    /// in the right order.
    fn ensure_space(&mut self, primary_value: &Value) -> StatefulResult<&mut Space> {
        let key = primary_value.to_string();
        if !self.spaces.contains_key(&key) {
            trace!(primary_value = %primary_value, "creating space");
            let mut space = Space::new(self.primary_key.clone(), primary_value.clone(), self.time_key.clone(), self.configuration.clone());
            for declaration in &self.declarations {
                for dependency in declaration.calculated.dependencies() {
                    space.controller_mut().ensure_stream(dependency, None)?;
                }
                space.declare(&declaration.name, declaration.calculated.clone())?;
            }
            self.spaces.insert(key.clone(), space);
        }
        Ok(self.spaces.get_mut(&key).expect("just inserted"))
    }

    /// Routes one event to its space by popping the primary key off the
    /// record, creating the space on first mention (`spec.md` §4.8).
    pub fn add(&mut self, mut event: Record) -> StatefulResult<()> {
        let primary_value = event
            .remove(&self.primary_key)
            .ok_or_else(|| StatefulError::InvalidEvent { key: self.primary_key.clone() })?;
        let space = self.ensure_space(&primary_value)?;
        space.add(event)
    }

    /// Installs a pre-built space directly, e.g. from [`State::filter`].
    pub fn set(&mut self, space: Space) {
        self.spaces.insert(space.primary_value().to_string(), space);
    }

    /// Bulk ingestion from tabular rows (`spec.md` §4.8/§6, `SPEC_FULL.md`
    /// §2). `columns` selects (as-is, when every entry maps to itself) or
    /// renames (source column -> output field) extra fields pulled from each
    /// row; `event` is merged on top as a shared override for every row;
    /// `drop_na`/`fill_na` govern rows with a missing/null time value.
    pub fn include(
        &mut self,
        rows: &[BTreeMap<String, Value>],
        primary_column: Option<&str>,
        time_column: Option<&str>,
        event: Option<&BTreeMap<String, Value>>,
        columns: Option<&BTreeMap<String, String>>,
        drop_na: bool,
        fill_na: Option<Value>,
    ) -> StatefulResult<()> {
        let primary_column = primary_column.unwrap_or(&self.primary_key);
        let time_column = time_column.unwrap_or(&self.time_key);

        for row in rows {
            let id = row.get(primary_column).cloned().unwrap_or(Value::Null);
            let mut time = row.get(time_column).cloned().unwrap_or(Value::Null);

            if time.is_null() {
                if drop_na {
                    continue;
                }
                time = fill_na.clone().unwrap_or(Value::Null);
            }

            let mut out = Record::new();
            out.insert(self.primary_key.clone(), id);
            out.insert(self.time_key.clone(), time);

            if let Some(columns) = columns {
                for (source, renamed) in columns {
                    if let Some(value) = row.get(source) {
                        out.insert(renamed.clone(), value.clone());
                    }
                }
            }

            if let Some(event) = event {
                for (key, value) in event {
                    out.insert(key.clone(), value.clone());
                }
            }

            self.add(out)?;
        }

        Ok(())
    }

    /// One `EventFrame` per space, each tagged with a `primary_key` column
    /// holding that space's identity (`spec.md` §4.8).
    pub fn all(&self, dates: &[Timestamp]) -> StatefulResult<Vec<EventFrame>> {
        self.spaces
            .values()
            .map(|space| {
                let mut frame = space.all_at(dates)?;
                let tag = crate::event::EventColumn::new(
                    self.primary_key.clone(),
                    dates.to_vec(),
                    std::iter::repeat(space.primary_value().clone()).take(dates.len()).collect(),
                );
                frame.add_column(tag);
                Ok(frame)
            })
            .collect()
    }

    /// `state[name]`: a `CalculatedStream` anchored on one stream name,
    /// known across every existing space (a space with no prior mention of
    /// `name` gets one lazily).
    pub fn stream(&mut self, name: &str) -> CalculatedStream {
        let mut dtype = Dtype::Boolean;
        let mut any = false;
        for space in self.spaces.values_mut() {
            let calc = space.stream(name);
            dtype = if any { dtype.widen(calc.dtype()) } else { calc.dtype() };
            any = true;
        }
        if !any {
            dtype = Dtype::Object;
        }
        CalculatedStream::dependency(name, dtype)
    }

    pub fn streams(&mut self, names: &[&str]) -> CalculatedStream {
        let mut dtype = Dtype::Boolean;
        for space in self.spaces.values_mut() {
            dtype = dtype.widen(space.streams(names).dtype());
        }
        CalculatedStream::dependencies_of(names, dtype)
    }

    /// `state[name] = expr`: declares a derived stream in every existing
    /// space and remembers it for spaces created afterwards (`spec.md`
    /// §4.8, `SPEC_FULL.md` §2).
    pub fn declare(&mut self, name: &str, calculated: CalculatedStream) -> StatefulResult<()> {
        for space in self.spaces.values_mut() {
            space.declare(name, calculated.clone())?;
        }
        self.declarations.push(Declaration { name: name.to_owned(), calculated });
        Ok(())
    }

    /// Keeps only the spaces for which `predicate` holds, as a new `State`
    /// sharing this one's schema and declared streams (`spec.md` §4.8
    /// `filter`).
    pub fn filter(&self, predicate: impl Fn(&Space) -> bool) -> Self {
        let mut out = State::new(self.primary_key.clone(), self.time_key.clone(), self.configuration.clone());
        out.declarations = self.declarations.clone();
        for space in self.spaces.values() {
            if predicate(space) {
                out.set(space.clone());
            }
        }
        out
    }

    /// A uniformly random non-empty space, for preview/sampling callers
    /// (`spec.md` §2, `SPEC_FULL.md` §2 "`State::random_space`").
    pub fn random_space(&self) -> StatefulResult<&Space> {
        let candidates: Vec<&Space> = self.spaces.values().filter(|s| !s.is_empty()).collect();
        if candidates.is_empty() {
            return Err(StatefulError::EmptyQuery { what: "random_space" });
        }
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        Ok(candidates.choose(&mut rng).expect("checked non-empty above"))
    }

    /// The union of every timestamp recorded anywhere, across every space.
    pub fn dates(&self) -> std::collections::BTreeSet<Timestamp> {
        self.spaces
            .values()
            .flat_map(|space| space.iter().map(|event| event.date()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn row(id: i64, time: Timestamp, fields: &[(&str, Value)]) -> Record {
        let mut r = Record::new();
        r.insert("id".to_string(), Value::Int(id));
        r.insert("date".to_string(), Value::Str(time.to_string()));
        for (k, v) in fields {
            r.insert((*k).to_string(), v.clone());
        }
        r
    }

    #[test]
    fn routes_events_to_the_right_space() {
        let mut state = State::new("id", "date", BTreeMap::new());
        state.add(row(1, ts(0), &[("kind", Value::from("elf"))])).unwrap();
        state.add(row(2, ts(0), &[("kind", Value::from("reindeer"))])).unwrap();

        let one = state.space(&Value::Int(1)).unwrap();
        assert_eq!(one.get_at(ts(0), false, false).unwrap().get("kind"), Value::Str("elf".into()));

        let two = state.space(&Value::Int(2)).unwrap();
        assert_eq!(two.get_at(ts(0), false, false).unwrap().get("kind"), Value::Str("reindeer".into()));
    }

    #[test]
    fn declare_propagates_to_existing_and_future_spaces() {
        let mut config = BTreeMap::new();
        config.insert(
            "amount".to_string(),
            StreamConfig { dtype: Some(Dtype::Integer), interpolation: crate::date_tree::Interpolation::Linear, on_duplicate: Default::default() },
        );
        let mut state = State::new("id", "date", config);
        state.add(row(1, ts(0), &[("amount", Value::Int(10))])).unwrap();

        let amount = state.stream("amount");
        let doubled = amount.clone() + amount;
        state.declare("doubled", doubled).unwrap();

        state.add(row(2, ts(0), &[("amount", Value::Int(5))])).unwrap();

        assert_eq!(state.space(&Value::Int(1)).unwrap().get_at(ts(0), false, false).unwrap().get("doubled"), Value::Int(20));
        assert_eq!(state.space(&Value::Int(2)).unwrap().get_at(ts(0), false, false).unwrap().get("doubled"), Value::Int(10));
    }

    #[test]
    fn declare_then_create_a_space_that_never_saw_the_dependency_directly() {
        let mut config = BTreeMap::new();
        config.insert(
            "amount".to_string(),
            StreamConfig { dtype: Some(Dtype::Integer), interpolation: crate::date_tree::Interpolation::Linear, on_duplicate: Default::default() },
        );
        let mut state = State::new("id", "date", config);
        state.add(row(1, ts(0), &[("amount", Value::Int(10))])).unwrap();

        let amount = state.stream("amount");
        let doubled = amount.clone() + amount;
        state.declare("doubled", doubled).unwrap();

        // Space 2 is created here, after "doubled" was already declared, and
        // never independently mentions "amount" until this very call.
        state.add(row(2, ts(0), &[("amount", Value::Int(7))])).unwrap();

        assert_eq!(state.space(&Value::Int(2)).unwrap().get_at(ts(0), false, false).unwrap().get("doubled"), Value::Int(14));
    }

    #[test]
    fn include_renames_and_drops_null_timestamps() {
        let mut state = State::new("id", "date", BTreeMap::new());
        let mut row_a = BTreeMap::new();
        row_a.insert("id".to_string(), Value::Int(1));
        row_a.insert("ts".to_string(), Value::Str(ts(0).to_string()));
        row_a.insert("src_kind".to_string(), Value::from("elf"));

        let mut row_missing_time = BTreeMap::new();
        row_missing_time.insert("id".to_string(), Value::Int(2));
        row_missing_time.insert("src_kind".to_string(), Value::from("reindeer"));

        let mut columns = BTreeMap::new();
        columns.insert("src_kind".to_string(), "kind".to_string());

        state
            .include(&[row_a, row_missing_time], None, Some("ts"), None, Some(&columns), true, None)
            .unwrap();

        assert_eq!(state.spaces().count(), 1);
        assert_eq!(
            state.space(&Value::Int(1)).unwrap().get_at(ts(0), false, false).unwrap().get("kind"),
            Value::Str("elf".into())
        );
    }

    #[test]
    fn filter_keeps_matching_spaces() {
        let mut state = State::new("id", "date", BTreeMap::new());
        state.add(row(1, ts(0), &[("kind", Value::from("elf"))])).unwrap();
        state.add(row(2, ts(0), &[("kind", Value::from("reindeer"))])).unwrap();

        let filtered = state.filter(|space| *space.primary_value() == Value::Int(1));
        assert_eq!(filtered.spaces().count(), 1);
        assert!(filtered.space(&Value::Int(1)).is_some());
    }
}
