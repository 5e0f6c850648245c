//! The query engine for one space: owns its streams, resolves the DAG, and
//! answers `get`/`all` (`spec.md` §4.6).

use std::collections::{BTreeMap, HashMap};

use crate::calculated_stream::CalculatedStream;
use crate::dtype::{Dtype, Value};
use crate::error::{StatefulError, StatefulResult};
use crate::event::{Event, EventFrame};
use crate::graph::StreamGraph;
use crate::stream::{Stream, StreamConfig};
use crate::time::Timestamp;

#[derive(Clone)]
pub enum StreamKind {
    Data(Stream),
    Calculated(CalculatedStream),
}

impl StreamKind {
    pub fn dtype(&self) -> Dtype {
        match self {
            StreamKind::Data(s) => s.dtype(),
            StreamKind::Calculated(c) => c.dtype(),
        }
    }
}

#[derive(Clone, Default)]
pub struct StreamController {
    graph: StreamGraph,
    configuration: BTreeMap<String, StreamConfig>,
    streams: HashMap<String, StreamKind>,
    /// Order streams were first mentioned in, used both to break ties in the
    /// merged iterator and to give `execution_order` a deterministic sweep.
    insertion_order: Vec<String>,
}

impl StreamController {
    pub fn new(configuration: BTreeMap<String, StreamConfig>) -> Self {
        Self {
            graph: StreamGraph::new(),
            configuration,
            streams: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    pub fn get_kind(&self, name: &str) -> Option<&StreamKind> {
        self.streams.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.graph.keys()
    }

    /// Creates a plain data [`Stream`] if `name` is unknown, inferring its
    /// dtype from `sample` when configuration doesn't pin one down
    /// (`spec.md` §4.6).
    pub fn ensure_stream(&mut self, name: &str, sample: Option<&Value>) -> StatefulResult<()> {
        if self.streams.contains_key(name) {
            return Ok(());
        }
        let config = self.configuration.get(name).cloned().unwrap_or_default();
        let stream = Stream::new(name, &config, sample);
        self.streams.insert(name.to_owned(), StreamKind::Data(stream));
        self.insertion_order.push(name.to_owned());
        self.graph.add(name, &[])
    }

    /// Registers a stream (data or calculated) and its DAG node. Dependencies
    /// come from the stream itself when it is a `CalculatedStream`, else from
    /// `dependencies` (`spec.md` §4.6).
    pub fn add_stream(
        &mut self,
        name: &str,
        stream: StreamKind,
        dependencies: &[String],
    ) -> StatefulResult<()> {
        let deps: Vec<String> = match &stream {
            StreamKind::Calculated(calc) => calc.dependencies().to_vec(),
            StreamKind::Data(_) => dependencies.to_vec(),
        };

        if !self.streams.contains_key(name) {
            self.insertion_order.push(name.to_owned());
        }
        self.graph.add(name, &deps)?;
        self.streams.insert(name.to_owned(), stream);
        Ok(())
    }

    /// Appends a value to a data stream, creating it lazily on first mention
    /// (`spec.md` §3 "Lifecycles").
    pub fn add_value(&mut self, name: &str, date: Timestamp, value: Value) -> StatefulResult<()> {
        self.ensure_stream(name, Some(&value))?;
        match self.streams.get_mut(name) {
            Some(StreamKind::Data(stream)) => stream.add(date, value),
            _ => unreachable!("ensure_stream always installs a Stream for a fresh name"),
        }
    }

    fn dtypes(&self) -> BTreeMap<String, Dtype> {
        self.streams.iter().map(|(name, kind)| (name.clone(), kind.dtype())).collect()
    }

    pub fn get(&self, date: Timestamp, columns: Option<&[String]>, cast: bool) -> StatefulResult<Event> {
        let order = self.graph.execution_order(columns);
        let mut snapshot = Event::new(date);

        for (name, _deps) in &order {
            let value = match self.streams.get(name) {
                Some(StreamKind::Data(stream)) => stream.get(date),
                Some(StreamKind::Calculated(calc)) => calc.calculate(&snapshot),
                None => Value::Null,
            };
            snapshot.set(name.clone(), value)?;
        }

        if columns.is_none() {
            for name in self.graph.keys() {
                if !snapshot.contains(name) {
                    snapshot.set(name, Value::Null)?;
                }
            }
        }

        if cast {
            snapshot.cast(&self.dtypes());
        }

        Ok(snapshot)
    }

    pub fn all(&self, dates: &[Timestamp], columns: Option<&[String]>, cast: bool) -> StatefulResult<EventFrame> {
        let order = self.graph.execution_order(columns);
        let mut frame = EventFrame::new(dates.to_vec());

        for (name, _deps) in &order {
            let column = match self.streams.get(name) {
                Some(StreamKind::Data(stream)) => stream.all(dates),
                Some(StreamKind::Calculated(calc)) => calc.expr().eval_frame(name, &frame),
                None => frame.empty_column(name.clone()),
            };
            frame.add_column(column);
        }

        if columns.is_none() {
            for name in self.graph.keys().map(str::to_owned).collect::<Vec<_>>() {
                if frame.column(&name).is_none() {
                    let col = frame.empty_column(name);
                    frame.add_column(col);
                }
            }
        }

        if cast {
            frame.cast(&self.dtypes());
        }

        Ok(frame)
    }

    pub fn data_streams(&self) -> impl Iterator<Item = &Stream> {
        self.insertion_order.iter().filter_map(move |name| match self.streams.get(name) {
            Some(StreamKind::Data(stream)) => Some(stream),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data_streams().all(|s| s.is_empty())
    }

    pub fn start(&self) -> StatefulResult<Timestamp> {
        self.data_streams()
            .filter_map(Stream::start)
            .min()
            .ok_or(StatefulError::EmptyQuery { what: "start" })
    }

    pub fn end(&self) -> StatefulResult<Timestamp> {
        self.data_streams()
            .filter_map(Stream::end)
            .max()
            .ok_or(StatefulError::EmptyQuery { what: "end" })
    }

    /// Toggles iterator-mode bookkeeping on every data stream — required
    /// before merged iteration (`spec.md` §4.6).
    pub fn on(&self, flag: bool) {
        for stream in self.data_streams() {
            stream.on(flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn get_fills_missing_known_keys_with_null() {
        let mut controller = StreamController::new(BTreeMap::new());
        controller.add_value("kind", ts(100), Value::from("elf")).unwrap();
        controller.ensure_stream("can_make", None).unwrap();

        let event = controller.get(ts(50), None, true).unwrap();
        assert_eq!(event.get("kind"), Value::Null);
        assert_eq!(event.get("can_make"), Value::Null);
    }

    #[test]
    fn derived_stream_executes_after_its_dependency() {
        let mut configuration = BTreeMap::new();
        configuration.insert(
            "amount".to_string(),
            StreamConfig {
                dtype: Some(Dtype::Integer),
                interpolation: crate::date_tree::Interpolation::Linear,
                on_duplicate: Default::default(),
            },
        );
        let mut controller = StreamController::new(configuration);
        controller.add_value("amount", ts(0), Value::Int(0)).unwrap();
        controller.add_value("amount", ts(200), Value::Int(100)).unwrap();

        let half = CalculatedStream::dependency("amount", Dtype::Integer) / Value::Int(2);
        controller
            .add_stream("half", StreamKind::Calculated(half), &[])
            .unwrap();

        let event = controller.get(ts(100), None, true).unwrap();
        assert_eq!(event.get("half"), Value::Int(25));
    }
}
