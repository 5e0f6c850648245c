//! Semantic dtypes and the runtime value carrier.
//!
//! Widening order is `boolean < integer < floating < string < object`
//! (`spec.md` §3, §9). Composite expressions take the max of their operands'
//! dtypes under this order.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Boolean,
    Integer,
    Floating,
    String,
    Object,
}

impl Dtype {
    fn rank(self) -> u8 {
        match self {
            Dtype::Boolean => 0,
            Dtype::Integer => 1,
            Dtype::Floating => 2,
            Dtype::String => 3,
            Dtype::Object => 4,
        }
    }

    /// Widen two dtypes to the one that can represent both, per the total
    /// order in `spec.md` §3/§9. Symmetric: `widen(a, b) == widen(b, a)`.
    pub fn widen(self, other: Dtype) -> Dtype {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    /// The dtype's neutral default, returned for out-of-range queries.
    pub fn default_value(self) -> Value {
        match self {
            Dtype::Integer => Value::Int(0),
            Dtype::Floating => Value::Float(0.0),
            Dtype::Boolean => Value::Bool(false),
            Dtype::String | Dtype::Object => Value::Null,
        }
    }

    /// Infers a dtype from a sample value, the way a stream's dtype is
    /// inferred from its first non-null append (`spec.md` §3).
    pub fn infer(value: &Value) -> Dtype {
        match value {
            Value::Null => Dtype::Object,
            Value::Bool(_) => Dtype::Boolean,
            Value::Int(_) => Dtype::Integer,
            Value::Float(_) => Dtype::Floating,
            Value::Str(_) => Dtype::String,
            Value::Object(_) => Dtype::Object,
        }
    }
}

impl PartialOrd for Dtype {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}

impl Ord for Dtype {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// A runtime value carried by a stream, an [`crate::event::Event`], or an
/// [`crate::event::EventColumn`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Casts a raw appended value into the stream's declared dtype.
    /// Fails with `None` (surfaced by the caller as `TypeMismatch`) when the
    /// value has no reasonable representation under that dtype.
    pub fn cast_input(&self, dtype: Dtype) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }

        match dtype {
            Dtype::Integer => self.as_f64().map(|f| Value::Int(f as i64)),
            Dtype::Boolean => self.as_f64().map(|f| Value::Bool(f != 0.0)),
            Dtype::Floating => self.as_f64().map(Value::Float),
            Dtype::String => match self {
                Value::Str(s) => Some(Value::Str(s.clone())),
                other => Some(Value::Str(other.display())),
            },
            Dtype::Object => Some(self.clone()),
        }
    }

    /// Casts a value for output, per `spec.md` §3:
    /// `integer -> int`, `boolean -> bool`, others passthrough.
    pub fn cast_output(&self, dtype: Dtype) -> Value {
        if self.is_null() {
            return Value::Null;
        }
        match dtype {
            Dtype::Integer => self.as_f64().map_or_else(|| self.clone(), |f| Value::Int(f as i64)),
            Dtype::Boolean => self.as_f64().map_or_else(|| self.clone(), |f| Value::Bool(f != 0.0)),
            _ => self.clone(),
        }
    }

    /// Converts to a `serde_json::Value` — used to fold colliding inserts
    /// into one list under the `keep` duplicate policy.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::from(s.clone()),
            Value::Object(v) => v.clone(),
        }
    }

    fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Object(v) => v.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
