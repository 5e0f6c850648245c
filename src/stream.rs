//! A named, dtype'd time-series: a thin identity wrapper over one
//! [`DateTree`] (`spec.md` §4.2).

use crate::date_tree::{DateTree, DuplicatePolicy, Interpolation};
use crate::dtype::{Dtype, Value};
use crate::error::StatefulResult;
use crate::event::EventColumn;
use crate::time::Timestamp;

#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub dtype: Option<Dtype>,
    pub interpolation: Interpolation,
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Debug, Clone)]
pub struct Stream {
    name: String,
    tree: DateTree,
}

impl Stream {
    /// Creates a stream with a known dtype, or infers one from `sample` when
    /// the configuration doesn't declare it (`spec.md` §3, §4.2).
    pub fn new(name: impl Into<String>, config: &StreamConfig, sample: Option<&Value>) -> Self {
        let dtype = config
            .dtype
            .or_else(|| sample.map(Dtype::infer))
            .unwrap_or(Dtype::Object);
        Self {
            name: name.into(),
            tree: DateTree::new(dtype, config.interpolation, config.on_duplicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> Dtype {
        self.tree.dtype()
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.tree.start()
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.tree.end()
    }

    pub fn first(&self) -> Value {
        self.tree.first()
    }

    pub fn last(&self) -> Value {
        self.tree.last()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn values(&self) -> Vec<Value> {
        self.tree.values()
    }

    pub fn dates(&self) -> Vec<Timestamp> {
        self.tree.dates()
    }

    pub fn add(&mut self, date: Timestamp, value: Value) -> StatefulResult<()> {
        // If the dtype hasn't been pinned by configuration and this is the
        // first point, infer it now from the appended sample.
        if self.tree.is_empty() && self.tree.dtype() == Dtype::Object && !matches!(value, Value::Object(_)) {
            let inferred = Dtype::infer(&value);
            let interpolation = self.tree.interpolation();
            let on_duplicate = self.tree.on_duplicate();
            self.tree = DateTree::new(inferred, interpolation, on_duplicate);
        }
        self.tree.add(&self.name, date, value)
    }

    pub fn get(&self, date: Timestamp) -> Value {
        self.tree.get(date)
    }

    pub fn all(&self, dates: &[Timestamp]) -> EventColumn {
        self.tree.all(&self.name, dates)
    }

    pub fn floor(&self, date: Timestamp) -> Option<(Timestamp, Value)> {
        self.tree.floor(date)
    }

    pub fn ceil(&self, date: Timestamp) -> Option<(Timestamp, Value)> {
        self.tree.ceil(date)
    }

    pub fn on(&self, flag: bool) {
        self.tree.on(flag)
    }

    pub fn is_iterating(&self) -> bool {
        self.tree.is_iterating()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, Value)> + '_ {
        self.tree.iter()
    }
}
