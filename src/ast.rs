//! This module defines the parsed [`Expression`] tree and the runtime [`Value`]
//! type. Expressions are immutable once parsed; values are what evaluation
//! produces and what scopes bind. A value can also wrap an unevaluated
//! expression, which is how macro parameters see their arguments.
//!
//! Conversion traits are implemented for common Rust types so values can be
//! built from literals, arrays and vectors, both in code and in tests.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::Error;
use crate::builtinops::BuiltinOp;
use crate::environment::Environment;

/// Exact decimal used for every number in the language
pub type Number = BigDecimal;

/// Parsed program text.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant resolved at parse time (number, string or boolean)
    Literal(Value),
    /// A name resolved against the environment at evaluation time
    Identifier(String),
    /// A parenthesized sequence, used for both code and list data
    Compound(Vec<Expression>),
}

impl Expression {
    /// Render the tree as JSON, one object per node.
    ///
    /// Numbers are emitted as strings so no precision is lost.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Expression::Literal(Value::Number(n)) => json!({ "number": n.to_string() }),
            Expression::Literal(Value::String(s)) => json!({ "string": s }),
            Expression::Literal(Value::Bool(b)) => json!({ "boolean": b }),
            Expression::Literal(other) => json!({ "value": other.to_string() }),
            Expression::Identifier(name) => json!({ "identifier": name }),
            Expression::Compound(children) => json!({
                "compound": children.iter().map(Expression::to_json).collect::<Vec<_>>()
            }),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::Identifier(name) => write!(f, "{name}"),
            Expression::Compound(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A user-defined function or macro: parameter names, a body and the
/// environment it was created in.
pub struct Closure {
    pub params: Vec<String>,
    pub body: Rc<Expression>,
    pub env: Environment,
}

impl Closure {
    fn params_list(&self) -> String {
        format!("({})", self.params.join(" "))
    }
}

/// Runtime values
#[derive(Clone)]
pub enum Value {
    /// Exact decimal
    Number(Number),
    String(String),
    Bool(bool),
    /// Ordered list of values; the empty list is a valid value
    List(Vec<Value>),
    /// Built-in primitive or special form
    Builtin(&'static BuiltinOp),
    /// Closure receiving evaluated arguments
    Function(Rc<Closure>),
    /// Closure receiving unevaluated argument expressions
    Macro(Rc<Closure>),
    /// An unevaluated expression, as bound to a macro parameter
    Expression(Rc<Expression>),
    /// Result of forms evaluated for effect (`def`, `defn`, one-armed `if`)
    Nothing,
}

impl Value {
    /// Name reported by `typeof` and in type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Bool(_) => "Boolean",
            Value::List(_) => "List",
            Value::Builtin(op) if op.is_special_form() => "Macro",
            Value::Builtin(_) | Value::Function(_) => "Function",
            Value::Macro(_) => "Macro",
            Value::Expression(_) => "Expression",
            Value::Nothing => "Nothing",
        }
    }

    /// Parse a decimal literal such as `42`, `1.` or `0.250`
    pub fn number(text: &str) -> Result<Value, Error> {
        Number::from_str(text)
            .map(Value::Number)
            .map_err(|e| Error::TypeError(format!("invalid number {text}: {e}")))
    }

    /// String form used by `print` and string concatenation: strings are
    /// shown without quotes, everything else as displayed.
    pub fn to_print_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Copy of this value with every number stripped of trailing zeros,
    /// recursively through lists
    pub fn normalized(&self) -> Value {
        match self {
            Value::Number(n) => Value::Number(n.normalized()),
            Value::List(items) => Value::List(items.iter().map(Value::normalized).collect()),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
            Value::Function(closure) => write!(
                f,
                "Function(params={:?}, body={})",
                closure.params, closure.body
            ),
            Value::Macro(closure) => {
                write!(f, "Macro(params={:?}, body={})", closure.params, closure.body)
            }
            Value::Expression(expr) => write!(f, "Expression({expr})"),
            Value::Nothing => write!(f, "Nothing"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Builtin(op) => write!(f, "#<builtin:{}>", op.name),
            Value::Function(closure) => write!(f, "#<fn {}>", closure.params_list()),
            Value::Macro(closure) => write!(f, "#<macro {}>", closure.params_list()),
            Value::Expression(expr) => write!(f, "{expr}"),
            Value::Nothing => write!(f, "nil"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Built-ins are unique by name
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Function(a), Value::Function(b)) | (Value::Macro(a), Value::Macro(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Expression(a), Value::Expression(b)) => a == b,
            (Value::Nothing, Value::Nothing) => true,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<Expression> for Value {
    fn from(expr: Expression) -> Self {
        Value::Expression(Rc::new(expr))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(Number::from(n))
            }
        }
    };
}

impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u32);
impl_from_integer!(u64);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into Rust types.

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected a Number, found {}: {other}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<bool, Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(Error::TypeError(format!(
                "expected a Boolean, found {}: {other}",
                other.type_name()
            ))),
        }
    }
}

/// Helper for building values in tests - works in mixed lists
#[cfg(test)]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper for exact decimal values in tests
#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
pub(crate) fn num(text: &str) -> Value {
    Value::number(text).unwrap()
}

/// Helper for identifier expressions in tests
#[cfg(test)]
pub(crate) fn ident(name: &str) -> Expression {
    Expression::Identifier(name.to_owned())
}
