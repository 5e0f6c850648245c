//! The ordered temporal index underlying one stream.
//!
//! Keeps three views over the same data:
//! - `primary`: every inserted `(timestamp, value)`, the source of truth.
//! - `change_tree`: only the timestamps at which the value differs from the
//!   previous one, used to answer step-floor range queries without
//!   re-evaluating unchanged stretches.
//! - `backup`: a flat `timestamp -> value` lookup consulted before the
//!   primary index under `linear` interpolation, so that an exact hit at a
//!   bracket point always returns the stored value rather than a
//!   recomputed interpolation (`spec.md` §3, §9).

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

use crate::dtype::{Dtype, Value};
use crate::error::{StatefulError, StatefulResult};
use crate::event::EventColumn;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Floor,
    Ceil,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Increment,
    Erase,
    Keep,
}

/// Bound on `increment` retries so a pathological run of collisions can't
/// spin forever (`spec.md` §9).
const MAX_INCREMENT_RETRIES: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub struct DateTree {
    dtype: Dtype,
    interpolation: Interpolation,
    on_duplicate: DuplicatePolicy,
    primary: BTreeMap<Timestamp, Value>,
    change_tree: BTreeMap<Timestamp, Value>,
    /// Only populated when `interpolation == Linear`.
    backup: HashMap<Timestamp, Value>,
    length: usize,
    iterating: Cell<bool>,
}

impl DateTree {
    pub fn new(dtype: Dtype, interpolation: Interpolation, on_duplicate: DuplicatePolicy) -> Self {
        Self {
            dtype,
            interpolation,
            on_duplicate,
            primary: BTreeMap::new(),
            change_tree: BTreeMap::new(),
            backup: HashMap::new(),
            length: 0,
            iterating: Cell::new(false),
        }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn on_duplicate(&self) -> DuplicatePolicy {
        self.on_duplicate
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.primary.keys().next().copied()
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.primary.keys().next_back().copied()
    }

    pub fn default_value(&self) -> Value {
        self.dtype.default_value()
    }

    pub fn first(&self) -> Value {
        self.start().map_or_else(|| self.default_value(), |t| self.get(t))
    }

    pub fn last(&self) -> Value {
        self.end().map_or_else(|| self.default_value(), |t| self.get(t))
    }

    /// Inserts `value` at `date`, normalizing and casting it first. On a
    /// duplicate key, resolves per `on_duplicate` (`spec.md` §3).
    pub fn add(&mut self, stream_name: &str, date: Timestamp, value: Value) -> StatefulResult<()> {
        let casted = value.cast_input(self.dtype).ok_or_else(|| StatefulError::TypeMismatch {
            stream: stream_name.to_owned(),
            date,
            dtype: self.dtype,
            value: value.to_string(),
        })?;
        self.insert_resolving_duplicates(stream_name, date, casted, 0)
    }

    fn insert_resolving_duplicates(
        &mut self,
        stream_name: &str,
        date: Timestamp,
        value: Value,
        retries: u32,
    ) -> StatefulResult<()> {
        if !self.primary.contains_key(&date) {
            self.insert_fresh(date, value);
            return Ok(());
        }

        match self.on_duplicate {
            DuplicatePolicy::Erase => {
                self.overwrite(date, value);
                Ok(())
            }
            DuplicatePolicy::Keep => {
                self.insert_keep(date, value);
                Ok(())
            }
            DuplicatePolicy::Increment => {
                if retries >= MAX_INCREMENT_RETRIES {
                    return Err(StatefulError::DuplicateKey {
                        stream: stream_name.to_owned(),
                        date,
                    });
                }
                tracing::trace!(stream = stream_name, %date, "duplicate key, retrying one second later");
                self.insert_resolving_duplicates(stream_name, date.plus_one_second(), value, retries + 1)
            }
        }
    }

    fn insert_fresh(&mut self, date: Timestamp, value: Value) {
        let previous = self.floor(date).map(|(_, v)| v);
        if previous.as_ref() != Some(&value) {
            self.change_tree.insert(date, value.clone());
        }
        if self.interpolation == Interpolation::Linear {
            self.backup.insert(date, value.clone());
        }
        self.primary.insert(date, value);
        self.length += 1;
    }

    /// `erase`: overwrite the existing point in place without growing
    /// `length` and rebuild the surrounding change-tree transitions.
    fn overwrite(&mut self, date: Timestamp, value: Value) {
        self.primary.insert(date, value.clone());
        if self.interpolation == Interpolation::Linear {
            self.backup.insert(date, value.clone());
        }
        self.rebuild_change_tree();
    }

    /// `keep`: instead of shifting a colliding insert to a new slot, folds it
    /// into a growing list of every value recorded at `date` (`spec.md` §3,
    /// grounded on `stream/base.py::add`'s `[prev_state, state]` branch).
    fn insert_keep(&mut self, date: Timestamp, value: Value) {
        let merged = match self.primary.get(&date) {
            Some(Value::Object(serde_json::Value::Array(items))) => {
                let mut items = items.clone();
                items.push(value.to_json());
                Value::Object(serde_json::Value::Array(items))
            }
            Some(other) => Value::Object(serde_json::Value::Array(vec![other.to_json(), value.to_json()])),
            None => value,
        };
        self.overwrite(date, merged);
        self.length += 1;
    }

    fn rebuild_change_tree(&mut self) {
        self.change_tree.clear();
        let mut previous: Option<&Value> = None;
        for (date, value) in &self.primary {
            if previous != Some(value) {
                self.change_tree.insert(*date, value.clone());
            }
            previous = Some(value);
        }
    }

    /// Point-in-time query, per the before/during/after rules of `spec.md` §3/§4.1.
    pub fn get(&self, date: Timestamp) -> Value {
        let (Some(start), Some(end)) = (self.start(), self.end()) else {
            return self.default_value();
        };

        if date < start {
            return self.default_value();
        }
        if date > end {
            return if self.interpolation == Interpolation::Floor {
                self.last()
            } else {
                self.default_value()
            };
        }

        self.get_within_range(date)
    }

    fn get_within_range(&self, date: Timestamp) -> Value {
        if let Some(value) = self.backup.get(&date) {
            return value.clone();
        }

        match self.interpolation {
            Interpolation::Linear => self.interpolate_linear(date),
            Interpolation::Floor => self.change_tree_floor(date),
            Interpolation::Ceil => self.ceil_within(date),
        }
    }

    fn change_tree_floor(&self, date: Timestamp) -> Value {
        self.change_tree
            .range(..=date)
            .next_back()
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_value())
    }

    fn ceil_within(&self, date: Timestamp) -> Value {
        self.primary
            .range(date..)
            .next()
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_value())
    }

    fn interpolate_linear(&self, date: Timestamp) -> Value {
        let before = self.primary.range(..=date).next_back();
        let after = self.primary.range(date..).next();

        match (before, after) {
            (Some((t, v)), _) if *t == date => v.clone(),
            (Some((t1, v1)), Some((t2, v2))) => {
                let (Some(a), Some(b)) = (v1.as_f64(), v2.as_f64()) else {
                    return v1.clone();
                };
                let span = (t2.inner() - t1.inner()).num_seconds() as f64;
                if span == 0.0 {
                    return v1.clone();
                }
                let elapsed = (date.inner() - t1.inner()).num_seconds() as f64;
                // Stays raw here and is cast to the stream's dtype only at
                // the output boundary (`Value::cast_output`, applied by
                // `Event`/`EventFrame`/`CalculatedStream::calculate`) — an
                // arithmetic dependency on this value (e.g. a derived
                // `amount + amount`) must see the un-rounded interpolation,
                // not an intermediate integer truncation (`spec.md` §8 S3).
                Value::Float(a + (b - a) * (elapsed / span))
            }
            (Some((_, v)), None) => v.clone(),
            (None, Some((_, v))) => v.clone(),
            (None, None) => self.default_value(),
        }
    }

    /// The predecessor `(timestamp, value)`, or `None` if `date` is at or
    /// before the first recorded point.
    pub fn floor(&self, date: Timestamp) -> Option<(Timestamp, Value)> {
        self.primary.range(..date).next_back().map(|(t, v)| (*t, v.clone()))
    }

    /// The successor `(timestamp, value)`, or `None` if `date` is at or
    /// after the last recorded point.
    pub fn ceil(&self, date: Timestamp) -> Option<(Timestamp, Value)> {
        self.primary
            .range((std::ops::Bound::Excluded(date), std::ops::Bound::Unbounded))
            .next()
            .map(|(t, v)| (*t, v.clone()))
    }

    /// Vectorized range query, per `spec.md` §4.1.
    pub fn all(&self, name: &str, dates: &[Timestamp]) -> EventColumn {
        let values = dates.iter().map(|&date| self.get(date)).collect::<Vec<_>>();
        EventColumn::new(name.to_owned(), dates.to_vec(), values)
    }

    pub fn values(&self) -> Vec<Value> {
        self.primary.values().cloned().collect()
    }

    pub fn dates(&self) -> Vec<Timestamp> {
        self.primary.keys().copied().collect()
    }

    /// Toggles iterator-mode bookkeeping. Scoped acquisition/release is
    /// enforced by [`crate::merge_iter::MergedIterator`]'s RAII guard rather
    /// than left to caller discipline (`spec.md` §5, §9).
    pub fn on(&self, flag: bool) {
        self.iterating.set(flag);
    }

    pub fn is_iterating(&self) -> bool {
        self.iterating.get()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, Value)> + '_ {
        self.primary.iter().map(|(t, v)| (*t, v.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        use chrono::{TimeZone, Utc};
        Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn step_floor_before_and_after() {
        let mut tree = DateTree::new(Dtype::String, Interpolation::Floor, DuplicatePolicy::Increment);
        tree.add("kind", ts(100), Value::from("elf")).unwrap();
        assert_eq!(tree.get(ts(50)), Value::Null);
        assert_eq!(tree.get(ts(200)), Value::Str("elf".into()));
    }

    #[test]
    fn linear_interpolation_exact_hits_and_midpoint() {
        let mut tree = DateTree::new(Dtype::Integer, Interpolation::Linear, DuplicatePolicy::Increment);
        tree.add("amount", ts(0), Value::Int(4)).unwrap();
        tree.add("amount", ts(100), Value::Int(5)).unwrap();
        tree.add("amount", ts(300), Value::Int(100)).unwrap();

        assert_eq!(tree.get(ts(0)), Value::Int(4));
        assert_eq!(tree.get(ts(100)), Value::Int(5));
        // midpoint between (100,5) and (300,100): 5 + (100-5)*(100/200) = 52.5,
        // returned raw — the integer cast happens at the output boundary,
        // not inside the tree (`spec.md` §8 S3).
        assert_eq!(tree.get(ts(200)).cast_output(Dtype::Integer), Value::Int(52));
    }

    #[test]
    fn duplicate_increment_resolves_and_counts_length() {
        let mut tree = DateTree::new(Dtype::Integer, Interpolation::Floor, DuplicatePolicy::Increment);
        tree.add("x", ts(0), Value::Int(1)).unwrap();
        tree.add("x", ts(0), Value::Int(2)).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(ts(0)), Value::Int(1));
        assert_eq!(tree.get(ts(1)), Value::Int(2));

        tree.add("x", ts(0), Value::Int(3)).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(ts(2)), Value::Int(3));
    }

    #[test]
    fn change_tree_only_stores_transitions() {
        let mut tree = DateTree::new(Dtype::Integer, Interpolation::Floor, DuplicatePolicy::Increment);
        tree.add("x", ts(0), Value::Int(1)).unwrap();
        tree.add("x", ts(10), Value::Int(1)).unwrap();
        tree.add("x", ts(20), Value::Int(2)).unwrap();
        assert_eq!(tree.change_tree.len(), 2);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn duplicate_keep_folds_collisions_into_a_growing_list() {
        let mut tree = DateTree::new(Dtype::Integer, Interpolation::Floor, DuplicatePolicy::Keep);
        tree.add("x", ts(0), Value::Int(1)).unwrap();
        assert_eq!(tree.get(ts(0)), Value::Int(1));
        assert_eq!(tree.len(), 1);

        tree.add("x", ts(0), Value::Int(2)).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(
            tree.get(ts(0)),
            Value::Object(serde_json::Value::Array(vec![serde_json::json!(1), serde_json::json!(2)]))
        );

        tree.add("x", ts(0), Value::Int(3)).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(
            tree.get(ts(0)),
            Value::Object(serde_json::Value::Array(vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]))
        );

        // Only one distinct timestamp key was ever occupied.
        assert_eq!(tree.dates(), vec![ts(0)]);
    }
}
