//! The `Expr` algebraic type that replaces the source's per-operator method
//! explosion (`spec.md` §9 design note): `CalculatedStream` interprets one of
//! these against a dependency snapshot instead of dispatching through a
//! dozen overloaded operator methods.

use std::rc::Rc;

use crate::dtype::{Dtype, Value};
use crate::event::{Event, EventColumn, EventFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Abs,
    Not,
    ToInt,
    ToBool,
    ToFloat,
}

impl UnaryOp {
    /// The dtype a cast-style unary operator forces on its result,
    /// independent of the operand's dtype.
    pub fn forced_dtype(self) -> Option<Dtype> {
        match self {
            UnaryOp::ToInt => Some(Dtype::Integer),
            UnaryOp::ToBool => Some(Dtype::Boolean),
            UnaryOp::ToFloat => Some(Dtype::Floating),
            _ => None,
        }
    }
}

/// A pure expression over named dependencies, evaluated against an [`Event`]
/// snapshot (point queries) or an [`EventFrame`] (range queries).
#[derive(Clone)]
pub enum Expr {
    DataRef(String),
    Const(Value),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    UnaryOp(UnaryOp, Box<Expr>),
    /// `apply(f)`: an arbitrary pure function composed after whatever the
    /// inner expression produces. Not introspectable, so dtype widening
    /// treats it as opaque (callers should supply an explicit dtype when
    /// wrapping with `Map`).
    Map(Rc<dyn Fn(&Event) -> Value>, Box<Expr>),
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::DataRef(name) => f.debug_tuple("DataRef").field(name).finish(),
            Expr::Const(v) => f.debug_tuple("Const").field(v).finish(),
            Expr::BinOp(op, l, r) => f.debug_tuple("BinOp").field(op).field(l).field(r).finish(),
            Expr::UnaryOp(op, inner) => f.debug_tuple("UnaryOp").field(op).field(inner).finish(),
            Expr::Map(_, inner) => f.debug_tuple("Map").field(inner).finish(),
        }
    }
}

impl Expr {
    pub fn eval(&self, snapshot: &Event) -> Value {
        match self {
            Expr::DataRef(name) => snapshot.get(name),
            Expr::Const(v) => v.clone(),
            Expr::BinOp(op, l, r) => apply_binop(*op, &l.eval(snapshot), &r.eval(snapshot)),
            Expr::UnaryOp(op, inner) => apply_unary(*op, &inner.eval(snapshot)),
            Expr::Map(f, inner) => {
                // The wrapped function closes over the outer snapshot's shape;
                // evaluate the inner expression first so `apply` composes
                // after whatever function preceded it, then hand the
                // (possibly synthetic) snapshot to `f`.
                let mut synthetic = Event::new(snapshot.date());
                synthetic.set("value", inner.eval(snapshot)).expect("a freshly built event is never projected");
                f(&synthetic)
            }
        }
    }

    /// Vectorized evaluation over an aligned frame, for range queries.
    pub fn eval_frame(&self, name: &str, frame: &EventFrame) -> EventColumn {
        match self {
            Expr::DataRef(dep) => frame
                .column(dep)
                .cloned()
                .unwrap_or_else(|| EventColumn::empty(name, frame.dates().to_vec())),
            Expr::Const(v) => EventColumn::new(
                name.to_owned(),
                frame.dates().to_vec(),
                vec![v.clone(); frame.dates().len()],
            ),
            Expr::BinOp(op, l, r) => {
                let lc = l.eval_frame(name, frame);
                let rc = r.eval_frame(name, frame);
                let mut out = lc.zip_with(&rc, |a, b| apply_binop(*op, a, b));
                out = EventColumn::new(name.to_owned(), out.dates().to_vec(), out.values().to_vec());
                out
            }
            Expr::UnaryOp(op, inner) => {
                let col = inner.eval_frame(name, frame);
                let out = col.map_scalar(|v| apply_unary(*op, v));
                EventColumn::new(name.to_owned(), out.dates().to_vec(), out.values().to_vec())
            }
            Expr::Map(f, inner) => {
                let col = inner.eval_frame(name, frame);
                let events = frame
                    .dates()
                    .iter()
                    .enumerate()
                    .map(|(i, &date)| {
                        let mut synthetic = Event::new(date);
                        synthetic.set("value", col.row(i)).expect("a freshly built event is never projected");
                        f(&synthetic)
                    })
                    .collect();
                EventColumn::new(name.to_owned(), frame.dates().to_vec(), events)
            }
        }
    }

    /// Every stream name this expression reads from, used to compute a
    /// `CalculatedStream`'s `dependencies` list (`spec.md` §4.3).
    pub fn dependency_names(&self, out: &mut Vec<String>) {
        match self {
            Expr::DataRef(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Const(_) => {}
            Expr::BinOp(_, l, r) => {
                l.dependency_names(out);
                r.dependency_names(out);
            }
            Expr::UnaryOp(_, inner) | Expr::Map(_, inner) => inner.dependency_names(out),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::Object(_) => true,
    }
}

pub fn apply_binop(op: BinOp, a: &Value, b: &Value) -> Value {
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        return Value::Bool(match op {
            BinOp::Eq => a == b,
            BinOp::Ne => a != b,
            _ => unreachable!(),
        });
    }

    if matches!(op, BinOp::And | BinOp::Or) {
        return Value::Bool(match op {
            BinOp::And => truthy(a) && truthy(b),
            BinOp::Or => truthy(a) || truthy(b),
            _ => unreachable!(),
        });
    }

    // String concatenation for `+` when either side is a string.
    if matches!(op, BinOp::Add) {
        if let (Value::Str(x), _) | (_, Value::Str(x)) = (a, b) {
            let _ = x;
            if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
                return Value::Str(format!("{a}{b}"));
            }
        }
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Value::Null;
    };

    match op {
        BinOp::Add => Value::Float(x + y),
        BinOp::Sub => Value::Float(x - y),
        BinOp::Mul => Value::Float(x * y),
        BinOp::Div => Value::Float(x / y),
        BinOp::FloorDiv => Value::Float((x / y).floor()),
        BinOp::Mod => Value::Float(x.rem_euclid(y)),
        BinOp::Pow => Value::Float(x.powf(y)),
        BinOp::Gt => Value::Bool(x > y),
        BinOp::Ge => Value::Bool(x >= y),
        BinOp::Lt => Value::Bool(x < y),
        BinOp::Le => Value::Bool(x <= y),
        BinOp::And | BinOp::Or | BinOp::Eq | BinOp::Ne => unreachable!(),
    }
}

pub fn apply_unary(op: UnaryOp, a: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!truthy(a)),
        UnaryOp::ToInt => a.as_f64().map_or(Value::Null, |f| Value::Int(f as i64)),
        UnaryOp::ToBool => Value::Bool(truthy(a)),
        UnaryOp::ToFloat => a.as_f64().map_or(Value::Null, Value::Float),
        UnaryOp::Neg => a.as_f64().map_or(Value::Null, |f| Value::Float(-f)),
        UnaryOp::Pos => a.as_f64().map_or(Value::Null, Value::Float),
        UnaryOp::Abs => a.as_f64().map_or(Value::Null, |f| Value::Float(f.abs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::time::Timestamp;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn binop_add_on_dependencies() {
        let mut snapshot = Event::new(ts(0));
        snapshot.set("a", Value::Int(2)).unwrap();
        snapshot.set("b", Value::Int(3)).unwrap();
        let expr = Expr::BinOp(
            BinOp::Add,
            Box::new(Expr::DataRef("a".into())),
            Box::new(Expr::DataRef("b".into())),
        );
        assert_eq!(expr.eval(&snapshot), Value::Float(5.0));
    }

    #[test]
    fn dependency_names_union_preserves_left_first() {
        let expr = Expr::BinOp(
            BinOp::Add,
            Box::new(Expr::DataRef("amount".into())),
            Box::new(Expr::DataRef("half".into())),
        );
        let mut names = Vec::new();
        expr.dependency_names(&mut names);
        assert_eq!(names, vec!["amount".to_string(), "half".to_string()]);
    }
}
