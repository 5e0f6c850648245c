//! A derived stream: a pure function of other streams, evaluated lazily at
//! query time by the owning [`crate::controller::StreamController`]
//! (`spec.md` §4.3).
//!
//! Per the redesign note in `spec.md` §9, this does not hold a back-pointer
//! to its parent space or controller — dependencies are stream *names*, and
//! the expression tree ([`crate::expr::Expr`]) is interpreted against
//! whatever snapshot the controller assembles. That is also why `assign_to`
//! from the source needs no counterpart here: a `CalculatedStream` is never
//! bound to a particular space to begin with, so declaring it in a new space
//! is just cloning the value.

use std::rc::Rc;

use crate::dtype::{Dtype, Value};
use crate::event::Event;
use crate::expr::{BinOp, Expr, UnaryOp};

#[derive(Clone)]
pub struct CalculatedStream {
    dependencies: Vec<String>,
    expr: Expr,
    dtype: Dtype,
    vectorized: bool,
}

impl CalculatedStream {
    /// Anchors a new `CalculatedStream` directly on one named dependency —
    /// the value returned by `space[name]` / `state[name]` before any
    /// operator is applied.
    pub fn dependency(name: impl Into<String>, dtype: Dtype) -> Self {
        let name = name.into();
        Self {
            expr: Expr::DataRef(name.clone()),
            dependencies: vec![name],
            dtype,
            vectorized: false,
        }
    }

    /// Anchors on several named dependencies at once (`space[[a, b]]`).
    pub fn dependencies_of(names: &[&str], dtype: Dtype) -> Self {
        let dependencies = names.iter().map(|s| s.to_string()).collect();
        // No single expression represents "all of these names" — this value
        // exists purely to be read back column-by-column via `dependencies()`
        // and is never itself evaluated with `Expr::eval`.
        Self {
            expr: Expr::Const(Value::Null),
            dependencies,
            dtype,
            vectorized: false,
        }
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn vectorized(&self) -> bool {
        self.vectorized
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Applies `f` after whatever this stream currently computes, preserving
    /// dependencies (`spec.md` §4.3 `apply`).
    pub fn apply<F>(&self, f: F, dtype: Dtype) -> Self
    where
        F: Fn(&Event) -> Value + 'static,
    {
        Self {
            expr: Expr::Map(Rc::new(f), Box::new(self.expr.clone())),
            dependencies: self.dependencies.clone(),
            dtype,
            vectorized: self.vectorized,
        }
    }

    fn binary(self, other: Self, op: BinOp) -> Self {
        let dtype = self.dtype.widen(other.dtype);
        let mut dependencies = self.dependencies.clone();
        for dep in &other.dependencies {
            if !dependencies.contains(dep) {
                dependencies.push(dep.clone());
            }
        }
        Self {
            expr: Expr::BinOp(op, Box::new(self.expr), Box::new(other.expr)),
            dependencies,
            dtype,
            vectorized: self.vectorized || other.vectorized,
        }
    }

    fn binary_scalar(self, scalar: Value, op: BinOp) -> Self {
        let dtype = self.dtype.widen(Dtype::infer(&scalar));
        Self {
            expr: Expr::BinOp(op, Box::new(self.expr), Box::new(Expr::Const(scalar))),
            dependencies: self.dependencies,
            dtype,
            vectorized: self.vectorized,
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        let dtype = op.forced_dtype().unwrap_or(self.dtype);
        Self {
            expr: Expr::UnaryOp(op, Box::new(self.expr)),
            dependencies: self.dependencies,
            dtype,
            vectorized: self.vectorized,
        }
    }

    pub fn floor_div(self, other: Self) -> Self {
        self.binary(other, BinOp::FloorDiv)
    }

    pub fn modulo(self, other: Self) -> Self {
        self.binary(other, BinOp::Mod)
    }

    pub fn pow(self, other: Self) -> Self {
        self.binary(other, BinOp::Pow)
    }

    pub fn eq_stream(self, other: Self) -> Self {
        self.binary(other, BinOp::Eq)
    }

    pub fn ne_stream(self, other: Self) -> Self {
        self.binary(other, BinOp::Ne)
    }

    pub fn gt(self, other: Self) -> Self {
        self.binary(other, BinOp::Gt)
    }

    pub fn ge(self, other: Self) -> Self {
        self.binary(other, BinOp::Ge)
    }

    pub fn lt(self, other: Self) -> Self {
        self.binary(other, BinOp::Lt)
    }

    pub fn le(self, other: Self) -> Self {
        self.binary(other, BinOp::Le)
    }

    pub fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    pub fn to_int(self) -> Self {
        self.unary(UnaryOp::ToInt)
    }

    pub fn to_bool(self) -> Self {
        self.unary(UnaryOp::ToBool)
    }

    pub fn to_float(self) -> Self {
        self.unary(UnaryOp::ToFloat)
    }

    /// Evaluates this expression against a scalar snapshot that already
    /// contains every name in `dependencies`, casting the result to `dtype`.
    pub fn calculate(&self, snapshot: &Event) -> Value {
        self.expr.eval(snapshot).cast_output(self.dtype)
    }
}

impl std::ops::Add for CalculatedStream {
    type Output = CalculatedStream;
    fn add(self, rhs: CalculatedStream) -> CalculatedStream {
        self.binary(rhs, BinOp::Add)
    }
}

impl std::ops::Add<Value> for CalculatedStream {
    type Output = CalculatedStream;
    fn add(self, rhs: Value) -> CalculatedStream {
        self.binary_scalar(rhs, BinOp::Add)
    }
}

impl std::ops::Sub for CalculatedStream {
    type Output = CalculatedStream;
    fn sub(self, rhs: CalculatedStream) -> CalculatedStream {
        self.binary(rhs, BinOp::Sub)
    }
}

impl std::ops::Sub<Value> for CalculatedStream {
    type Output = CalculatedStream;
    fn sub(self, rhs: Value) -> CalculatedStream {
        self.binary_scalar(rhs, BinOp::Sub)
    }
}

impl std::ops::Mul for CalculatedStream {
    type Output = CalculatedStream;
    fn mul(self, rhs: CalculatedStream) -> CalculatedStream {
        self.binary(rhs, BinOp::Mul)
    }
}

impl std::ops::Mul<Value> for CalculatedStream {
    type Output = CalculatedStream;
    fn mul(self, rhs: Value) -> CalculatedStream {
        self.binary_scalar(rhs, BinOp::Mul)
    }
}

impl std::ops::Div for CalculatedStream {
    type Output = CalculatedStream;
    fn div(self, rhs: CalculatedStream) -> CalculatedStream {
        self.binary(rhs, BinOp::Div)
    }
}

impl std::ops::Div<Value> for CalculatedStream {
    type Output = CalculatedStream;
    fn div(self, rhs: Value) -> CalculatedStream {
        self.binary_scalar(rhs, BinOp::Div)
    }
}

impl std::ops::BitAnd for CalculatedStream {
    type Output = CalculatedStream;
    fn bitand(self, rhs: CalculatedStream) -> CalculatedStream {
        self.binary(rhs, BinOp::And)
    }
}

impl std::ops::BitOr for CalculatedStream {
    type Output = CalculatedStream;
    fn bitor(self, rhs: CalculatedStream) -> CalculatedStream {
        self.binary(rhs, BinOp::Or)
    }
}

impl std::ops::Neg for CalculatedStream {
    type Output = CalculatedStream;
    fn neg(self) -> CalculatedStream {
        self.unary(UnaryOp::Neg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_picks_higher_rank() {
        let a = CalculatedStream::dependency("amount", Dtype::Integer);
        let b = CalculatedStream::dependency("label", Dtype::String);
        let combined = a + b;
        assert_eq!(combined.dtype(), Dtype::String);
    }

    #[test]
    fn dependency_union_preserves_left_operand_order() {
        let a = CalculatedStream::dependency("amount", Dtype::Integer);
        let b = CalculatedStream::dependency("half", Dtype::Integer);
        let combined = a + b;
        assert_eq!(combined.dependencies(), &["amount".to_string(), "half".to_string()]);
    }
}
