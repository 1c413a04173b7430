//! Expression evaluation.
//!
//! [`eval`] reduces an [`Expression`] to a [`Value`] in a scope. Compound
//! forms dispatch on the evaluated head: macros (user macros and built-in
//! special forms) receive the remaining forms unevaluated, functions receive
//! them evaluated left to right, and any other head value turns the whole form
//! into a list.

use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::ast::{Closure, Expression, Value};
use crate::builtinops::{Arity, BuiltinOp, OpKind};
use crate::environment::Environment;
use crate::package::Interpreter;
use crate::stack::ensure_sufficient_stack;

/// Evaluate `expr` in `env`
pub fn eval(expr: &Expression, env: &Environment, interp: &mut Interpreter) -> Result<Value, Error> {
    interp.enter_eval()?;
    let result = ensure_sufficient_stack(|| eval_expression(expr, env, interp));
    interp.leave_eval();
    result
}

fn eval_expression(
    expr: &Expression,
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Identifier(name) => env.get(name),
        Expression::Compound(children) => {
            eval_compound(children, env, interp).map_err(|err| add_context(err, expr))
        }
    }
}

const CONTEXT_MARKER: &str = "\n  Context: ";

/// Helper function to add the innermost failing form to errors
fn add_context(error: Error, expr: &Expression) -> Error {
    match error {
        Error::TypeError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        Error::EvalError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::EvalError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        // Arity, unbound identifier, import and syntax errors already name their offender
        other => other,
    }
}

/// Evaluate argument expressions left to right
fn eval_args(
    args: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| eval(arg, env, interp)).collect()
}

fn eval_compound(
    children: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let [head_expr, arg_exprs @ ..] = children else {
        return Ok(Value::List(Vec::new()));
    };

    match eval(head_expr, env, interp)? {
        Value::Macro(closure) => apply_macro(&closure, arg_exprs, interp),
        Value::Builtin(op) => match op.op_kind {
            OpKind::SpecialForm(form) => {
                op.arity.validate(op.name, arg_exprs.len())?;
                trace!(form = op.name, args = arg_exprs.len(), "special form");
                form(arg_exprs, env, interp)
            }
            OpKind::Function(_) => {
                let args = eval_args(arg_exprs, env, interp)?;
                call_builtin(op, args, env, interp)
            }
        },
        Value::Function(closure) => {
            let args = eval_args(arg_exprs, env, interp)?;
            apply_function(&closure, args, interp)
        }
        // Any other head makes the form a list literal
        head => {
            let mut list = Vec::with_capacity(children.len());
            list.push(head);
            for arg in arg_exprs {
                list.push(eval(arg, env, interp)?);
            }
            Ok(Value::List(list))
        }
    }
}

fn call_builtin(
    op: &BuiltinOp,
    args: Vec<Value>,
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    match op.op_kind {
        OpKind::Function(func) => {
            op.arity.validate(op.name, args.len())?;
            trace!(function = op.name, args = args.len(), "builtin");
            func(args, env, interp)
        }
        OpKind::SpecialForm(_) => Err(Error::TypeError(format!(
            "cannot apply special form {} to evaluated arguments",
            op.name
        ))),
    }
}

/// Apply a callable value to already evaluated arguments, as `apply` does
pub fn apply(
    callee: &Value,
    args: Vec<Value>,
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    match callee {
        Value::Function(closure) => apply_function(closure, args, interp),
        Value::Builtin(op) => call_builtin(op, args, env, interp),
        other => Err(Error::TypeError(format!(
            "apply expects a Function, found {}: {other}",
            other.type_name()
        ))),
    }
}

/// Bind `min(params, args)` pairs in a fresh scope under the captured
/// environment and evaluate the body there
fn invoke_closure(
    closure: &Closure,
    args: Vec<Value>,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let scope = Environment::with_parent(&closure.env);
    for (param, arg) in closure.params.iter().zip(args) {
        scope.define(param, arg)?;
    }
    eval(&closure.body, &scope, interp)
}

/// Apply a user function to evaluated arguments
pub fn apply_function(
    closure: &Closure,
    args: Vec<Value>,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    trace!(params = ?closure.params, args = args.len(), "applying function");
    invoke_closure(closure, args, interp)
}

/// Apply a user macro to unevaluated argument expressions
pub fn apply_macro(
    closure: &Closure,
    args: &[Expression],
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    trace!(params = ?closure.params, args = args.len(), "applying macro");
    let args = args
        .iter()
        .map(|arg| Value::Expression(Rc::new(arg.clone())))
        .collect();
    invoke_closure(closure, args, interp)
}

//
// Special forms
//

/// Split a special form's arguments into its leading forms and final body
fn split_body<'a>(
    form: &str,
    arity: Arity,
    args: &'a [Expression],
) -> Result<(&'a [Expression], &'a Expression), Error> {
    match args {
        [leading @ .., body] => Ok((leading, body)),
        [] => Err(Error::arity_error(form, arity, 0)),
    }
}

/// Collect parameter names. Binders are either bare identifiers or a single
/// compound of identifiers: `(fn a b body)` and `(fn (a b) body)` agree.
fn collect_params(form: &str, binders: &[Expression]) -> Result<Vec<String>, Error> {
    let binders = match binders {
        [Expression::Compound(list)] => list.as_slice(),
        _ => binders,
    };

    binders
        .iter()
        .map(|binder| match binder {
            Expression::Identifier(name) => Ok(name.clone()),
            other => Err(Error::TypeError(format!(
                "{form} parameters must be identifiers, found {other}"
            ))),
        })
        .collect()
}

fn make_closure(params: Vec<String>, body: &Expression, env: &Environment) -> Rc<Closure> {
    Rc::new(Closure {
        params,
        body: Rc::new(body.clone()),
        env: env.clone(),
    })
}

/// `(if cond then [else])`
pub(crate) fn eval_if(
    args: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let [condition, then_branch, else_branch @ ..] = args else {
        return Err(Error::arity_error("if", Arity::Range(2, 3), args.len()));
    };

    match eval(condition, env, interp)? {
        Value::Bool(true) => eval(then_branch, env, interp),
        Value::Bool(false) => match else_branch {
            [otherwise] => eval(otherwise, env, interp),
            _ => Ok(Value::Nothing),
        },
        other => Err(Error::TypeError(format!(
            "if condition must be a Boolean, found {}: {other}",
            other.type_name()
        ))),
    }
}

/// `(fn param... body)`
pub(crate) fn eval_fn(
    args: &[Expression],
    env: &Environment,
    _interp: &mut Interpreter,
) -> Result<Value, Error> {
    let (binders, body) = split_body("fn", Arity::AtLeast(1), args)?;
    let params = collect_params("fn", binders)?;
    Ok(Value::Function(make_closure(params, body, env)))
}

/// `(macro param... body)`
pub(crate) fn eval_macro(
    args: &[Expression],
    env: &Environment,
    _interp: &mut Interpreter,
) -> Result<Value, Error> {
    let (binders, body) = split_body("macro", Arity::AtLeast(1), args)?;
    if let Expression::Literal(value) = body {
        return Err(Error::TypeError(format!(
            "macro body must be a compound form or an identifier, found {}: {value}",
            value.type_name()
        )));
    }
    let params = collect_params("macro", binders)?;
    Ok(Value::Macro(make_closure(params, body, env)))
}

/// Evaluate `(id value)...` pairs, handing each binding to `bind`
fn eval_bindings(
    form: &str,
    pairs: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
    mut bind: impl FnMut(&str, Value) -> Result<(), Error>,
) -> Result<(), Error> {
    for (i, pair) in pairs.chunks(2).enumerate() {
        let [name, value_expr] = pair else {
            return Err(Error::arity_error(form, "an even number of binding", pairs.len()));
        };
        let Expression::Identifier(name) = name else {
            return Err(Error::TypeError(format!(
                "{form} expects an identifier at position {}, found {name}",
                2 * i + 1
            )));
        };
        let value = eval(value_expr, env, interp)?;
        bind(name, value)?;
    }
    Ok(())
}

/// `(let id value ... body)`: values are evaluated in the outer scope
pub(crate) fn eval_let(
    args: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let (pairs, body) = split_body("let", Arity::AtLeastOdd(3), args)?;
    let scope = Environment::with_parent(env);
    eval_bindings("let", pairs, env, interp, |name, value| {
        scope.define(name, value)
    })?;
    eval(body, &scope, interp)
}

/// `(def id value ...)`: bindings land in the nearest package scope
pub(crate) fn eval_def(
    args: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let target = env.package_scope();
    eval_bindings("def", args, env, interp, |name, value| {
        target.define(name, value)
    })?;
    Ok(Value::Nothing)
}

/// `(defn name param... body)`
pub(crate) fn eval_defn(
    args: &[Expression],
    env: &Environment,
    _interp: &mut Interpreter,
) -> Result<Value, Error> {
    let [name, rest @ ..] = args else {
        return Err(Error::arity_error("defn", Arity::AtLeast(2), 0));
    };
    let Expression::Identifier(name) = name else {
        return Err(Error::TypeError(format!(
            "defn expects a function name, found {name}"
        )));
    };
    let (binders, body) = split_body("defn", Arity::AtLeast(2), rest)?;
    let params = collect_params("defn", binders)?;

    env.package_scope()
        .define(name, Value::Function(make_closure(params, body, env)))?;
    Ok(Value::Nothing)
}

/// `(import package... body)`
pub(crate) fn eval_import(
    args: &[Expression],
    env: &Environment,
    interp: &mut Interpreter,
) -> Result<Value, Error> {
    let (packages, body) = split_body("import", Arity::AtLeast(2), args)?;
    let current = env.package_id();

    let mut imports = Vec::with_capacity(packages.len());
    for package in packages {
        match eval(package, env, interp)? {
            Value::String(name) => imports.push(interp.import_package(current.as_deref(), &name)?),
            other => {
                return Err(Error::TypeError(format!(
                    "import expects String package names, found {}: {other}",
                    other.type_name()
                )));
            }
        }
    }

    let scope = Environment::with_imports(env, imports);
    eval(body, &scope, interp)
}
