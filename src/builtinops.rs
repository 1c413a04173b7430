//! Built-in operations registry.
//!
//! Every built-in is defined once in [`BUILTIN_OPS`] and bound under its name
//! in the library scope by [`create_library`].
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: receive their arguments evaluated, left to right
//!   (e.g. `+`, `head`, `print`)
//! - **Special Forms**: receive their argument expressions unevaluated and
//!   decide what to evaluate (e.g. `if`, `fn`, `def`). At runtime they are
//!   indistinguishable from user macros.
//!
//! ## Error Handling
//!
//! - **Arity Checking**: argument counts are validated against [`Arity`]
//!   before the implementation runs
//! - **No Coercion**: `if` requires a Boolean and arithmetic requires Numbers;
//!   the only mixed-type operation is `+` with a String first operand, which
//!   concatenates
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the [`FunctionImpl`] or
//!    [`SpecialFormImpl`] signature
//! 2. **Add it to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Expression, Number, Value};
use crate::environment::Environment;
use crate::evaluator::{
    self, eval_def, eval_defn, eval_fn, eval_if, eval_import, eval_let, eval_macro,
};
use crate::package::Interpreter;

/// Signature of a built-in function: evaluated arguments plus the calling scope
pub type FunctionImpl = fn(Vec<Value>, &Environment, &mut Interpreter) -> Result<Value, Error>;

/// Signature of a built-in special form: unevaluated arguments plus the
/// calling scope
pub type SpecialFormImpl =
    fn(&[Expression], &Environment, &mut Interpreter) -> Result<Value, Error>;

/// Accepted argument counts for a built-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// At least n arguments, odd count (binding pairs plus a body)
    AtLeastOdd(usize),
    /// At least n arguments, even count (binding pairs only)
    AtLeastEven(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check `got` against this arity, reporting `form` in the error
    pub fn validate(&self, form: &str, got: usize) -> Result<(), Error> {
        let accepted = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::AtLeastOdd(n) => got >= n && got % 2 == 1,
            Arity::AtLeastEven(n) => got >= n && got % 2 == 0,
            Arity::Any => true,
        };

        if accepted {
            Ok(())
        } else {
            Err(Error::arity_error(form, self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::AtLeastOdd(n) => write!(f, "an odd number (at least {n}) of"),
            Arity::AtLeastEven(n) => write!(f, "an even number (at least {n}) of"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Represents the implementation of a built-in (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Takes evaluated arguments
    Function(FunctionImpl),
    /// Takes unevaluated arguments and controls their evaluation
    SpecialForm(SpecialFormImpl),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name bound in the library scope
    pub name: &'static str,
    /// The implementation of this operation
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names are unique within the registry
        self.name == other.name
    }
}

impl BuiltinOp {
    /// Check if this operation is a special form
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Builtin Function Implementations
//

fn single_or_list(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::List(values)
    }
}

fn builtin_eval(
    args: Vec<Value>,
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let mut results = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Expression(expr) => results.push(evaluator::eval(&expr, env, interp)?),
            other => {
                return Err(Error::TypeError(format!(
                    "eval expects Expression arguments, found {}: {other}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(single_or_list(results))
}

fn builtin_apply(
    mut args: Vec<Value>,
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::arity_error("apply", Arity::AtLeast(1), 0));
    }
    let callee = args.remove(0);
    evaluator::apply(&callee, args, env, interp)
}

/// Take the single List argument of `head` or `tail`
fn non_empty_list(form: &str, args: Vec<Value>) -> Result<Vec<Value>, Error> {
    match args.into_iter().next() {
        Some(Value::List(items)) if items.is_empty() => {
            Err(Error::TypeError(format!("{form} of an empty list")))
        }
        Some(Value::List(items)) => Ok(items),
        Some(other) => Err(Error::TypeError(format!(
            "{form} expects a List, found {}: {other}",
            other.type_name()
        ))),
        None => Err(Error::arity_error(form, Arity::Exact(1), 0)),
    }
}

fn builtin_head(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    let mut items = non_empty_list("head", args)?;
    Ok(items.swap_remove(0))
}

fn builtin_tail(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    let mut items = non_empty_list("tail", args)?;
    items.remove(0);
    Ok(Value::List(items))
}

fn builtin_print(
    args: Vec<Value>,
    _: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let text: String = args.iter().map(Value::to_print_string).collect();
    tracing::info!("Print: {text}");
    interp.print_line(&text)?;
    Ok(single_or_list(args))
}

fn builtin_typeof(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    Ok(Value::List(
        args.iter().map(|v| Value::from(v.type_name())).collect(),
    ))
}

fn builtin_equal(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    let mut normalized = args.iter().map(Value::normalized);
    let Some(first) = normalized.next() else {
        return Ok(Value::Bool(true));
    };
    Ok(Value::Bool(normalized.all(|other| other == first)))
}

fn builtin_list(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    Ok(Value::List(args))
}

/// Convert every argument of an arithmetic operation to a Number
fn numeric_args(op: &str, args: Vec<Value>) -> Result<Vec<Number>, Error> {
    if args.is_empty() {
        return Err(Error::TypeError(format!(
            "{op} requires at least one argument"
        )));
    }
    args.into_iter()
        .map(|arg| match arg {
            Value::Number(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "{op} expects Number arguments, found {}: {other}",
                other.type_name()
            ))),
        })
        .collect()
}

fn builtin_add(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    if let Some(Value::String(_)) = args.first() {
        return Ok(Value::String(
            args.iter().map(Value::to_print_string).collect(),
        ));
    }

    let mut nums = numeric_args("+", args)?.into_iter();
    let first = nums.next().unwrap_or_default();
    Ok(Value::Number(nums.fold(first, |sum, n| sum + n)))
}

fn builtin_sub(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    let mut nums = numeric_args("-", args)?.into_iter();
    let first = nums.next().unwrap_or_default();
    Ok(Value::Number(nums.fold(first, |difference, n| difference - n)))
}

fn builtin_mul(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    let mut nums = numeric_args("*", args)?.into_iter();
    let first = nums.next().unwrap_or_default();
    Ok(Value::Number(nums.fold(first, |product, n| product * n)))
}

fn builtin_div(args: Vec<Value>, _: &Environment, _: &mut Interpreter) -> Result<Value, Error> {
    let mut nums = numeric_args("/", args)?.into_iter();
    let mut quotient = nums.next().unwrap_or_default();
    let zero = Number::from(0);
    for divisor in nums {
        if divisor == zero {
            return Err(Error::EvalError("division by zero".to_owned()));
        }
        quotient = quotient / divisor;
    }
    Ok(Value::Number(quotient))
}

/// Global registry of all built-in operations, built once on first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Special forms
        BuiltinOp {
            name: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            arity: Arity::Range(2, 3),
        },
        BuiltinOp {
            name: "fn",
            op_kind: OpKind::SpecialForm(eval_fn),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "macro",
            op_kind: OpKind::SpecialForm(eval_macro),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "let",
            op_kind: OpKind::SpecialForm(eval_let),
            arity: Arity::AtLeastOdd(3),
        },
        BuiltinOp {
            name: "def",
            op_kind: OpKind::SpecialForm(eval_def),
            arity: Arity::AtLeastEven(2),
        },
        BuiltinOp {
            name: "defn",
            op_kind: OpKind::SpecialForm(eval_defn),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            name: "import",
            op_kind: OpKind::SpecialForm(eval_import),
            arity: Arity::AtLeast(2),
        },
        // Evaluation control
        BuiltinOp {
            name: "eval",
            op_kind: OpKind::Function(builtin_eval),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "apply",
            op_kind: OpKind::Function(builtin_apply),
            arity: Arity::AtLeast(1),
        },
        // List operations
        BuiltinOp {
            name: "head",
            op_kind: OpKind::Function(builtin_head),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "tail",
            op_kind: OpKind::Function(builtin_tail),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "list",
            op_kind: OpKind::Function(builtin_list),
            arity: Arity::Any,
        },
        // Introspection and output
        BuiltinOp {
            name: "print",
            op_kind: OpKind::Function(builtin_print),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "typeof",
            op_kind: OpKind::Function(builtin_typeof),
            arity: Arity::Any,
        },
        // Comparison and arithmetic; the empty argument list is a TypeError
        // raised by the implementation rather than an arity error
        BuiltinOp {
            name: "=",
            op_kind: OpKind::Function(builtin_equal),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "+",
            op_kind: OpKind::Function(builtin_add),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "-",
            op_kind: OpKind::Function(builtin_sub),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "*",
            op_kind: OpKind::Function(builtin_mul),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "/",
            op_kind: OpKind::Function(builtin_div),
            arity: Arity::Any,
        },
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}

/// Create the library scope: every built-in plus the constants `true` and
/// `false`
pub fn create_library() -> Environment {
    let mut bindings: HashMap<String, Value> = get_builtin_ops()
        .iter()
        .map(|op| (op.name.to_owned(), Value::Builtin(op)))
        .collect();
    bindings.insert("true".to_owned(), Value::Bool(true));
    bindings.insert("false".to_owned(), Value::Bool(false));
    Environment::library(bindings)
}
