//! redlisp - a minimal homoiconic Lisp runtime
//!
//! Source text is tokenized, parsed into a tree of S-expressions and evaluated
//! against a chain of lexical scopes. The language has closures, user-defined
//! macros that receive their arguments unevaluated, and packages: source units
//! evaluated once, cached, and made visible to other packages through `import`.
//!
//! ```lisp
//! (defn square x (* x x))
//! (def total (+ (square 3) (square 4)))
//! (if (= total 25.00) "pythagoras" "nope")
//! ```
//!
//! ## Evaluation in one paragraph
//!
//! A compound form evaluates its head first. A macro head receives the
//! remaining forms unevaluated; a function head receives them evaluated left to
//! right; any other head turns the whole form into a plain list, so `(1 2 3)`
//! is a list literal. Numbers are exact decimals: `(= 1.0 1)` is true.
//!
//! ## Modules
//!
//! - `lexer`: source text to tokens
//! - `parser`: tokens to a single top-level compound expression
//! - `ast`: expressions and runtime values
//! - `environment`: library, standard and import scopes
//! - `evaluator`: the dispatch algorithm and the special forms
//! - `builtinops`: registry of built-in special forms and primitives
//! - `package`: source providers, the package cache and the [`Interpreter`]

use std::fmt;

/// Default maximum nesting of parentheses accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum evaluation depth before evaluation is aborted
///
/// There is no tail-call optimization, so this bounds recursion in user code
/// as well as plain nesting. A user function call costs about three levels.
/// The native stack grows on demand, so the limit is not tied to thread size.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Tunable limits and parser behavior for an [`Interpreter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum parenthesis nesting accepted by the parser
    pub max_parse_depth: usize,
    /// Maximum evaluation depth
    pub max_eval_depth: usize,
    /// Accept unbalanced parentheses: a stray top-level `)` ends the program
    /// and end of input closes every open compound.
    pub lenient_parens: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_parse_depth: MAX_PARSE_DEPTH,
            max_eval_depth: MAX_EVAL_DEPTH,
            lenient_parens: false,
        }
    }
}

/// Categorizes the different kinds of lexing and parsing failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyntaxErrorKind {
    /// Input ended inside a string literal
    UnterminatedString,
    /// Input ended inside an atom with no delimiter after it
    UnterminatedAtom,
    /// A `)` with no matching `(`
    UnmatchedClose,
    /// A `(` still open at end of input
    UnclosedOpen,
    /// Parenthesis nesting exceeded the configured maximum
    TooDeeplyNested,
}

/// A structured error providing detailed information about a syntax failure.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    /// Byte offset of the failure in the source
    pub offset: usize,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl SyntaxError {
    /// Create a SyntaxError with context extracted from input at a given offset
    pub fn with_context(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        input: &str,
        offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // `offset` is a byte offset; back up to a char boundary before slicing
        let mut context_start = offset.min(input.len()).saturating_sub(20);
        while !input.is_char_boundary(context_start) {
            context_start -= 1;
        }

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        SyntaxError {
            kind,
            message: message.into(),
            offset,
            context: Some(display_context),
            found,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// Every error aborts the evaluation that raised it; nothing is retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("LexError: {0}")]
    LexError(SyntaxError),
    #[error("ParseError: {0}")]
    ParseError(SyntaxError),
    #[error("ArityError: {form} expects {expected} arguments, got {got}")]
    ArityError {
        form: String,
        expected: String,
        got: usize,
    },
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("UnboundIdentifierError: no identifier named {0} in scope")]
    UnboundIdentifier(String),
    #[error("ImportError: cannot import {package}: {reason}")]
    ImportError { package: String, reason: String },
    #[error("EvaluationError: {0}")]
    EvalError(String),
}

impl Error {
    /// Create an ArityError for the named form
    pub fn arity_error(form: &str, expected: impl fmt::Display, got: usize) -> Self {
        Error::ArityError {
            form: form.to_owned(),
            expected: expected.to_string(),
            got,
        }
    }

    /// Create an ImportError for the named package
    pub fn import_error(package: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::ImportError {
            package: package.into(),
            reason: reason.to_string(),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod package;
pub mod parser;
mod stack;

pub use ast::{Expression, Value};
pub use environment::Environment;
pub use package::{
    FileSourceProvider, Interpreter, MemorySourceProvider, OutputBuffer, PackageCache,
    SourceProvider,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_offender() {
        let cases = vec![
            (
                Error::arity_error("head", 1, 2),
                "ArityError: head expects 1 arguments, got 2",
            ),
            (
                Error::UnboundIdentifier("b".into()),
                "UnboundIdentifierError: no identifier named b in scope",
            ),
            (
                Error::import_error("lib.lisp", "not found"),
                "ImportError: cannot import lib.lisp: not found",
            ),
            (
                Error::TypeError("if condition must be a Boolean".into()),
                "TypeError: if condition must be a Boolean",
            ),
        ];

        for (i, (error, expected)) in cases.iter().enumerate() {
            assert_eq!(format!("{error}"), *expected, "case #{}", i + 1);
        }
    }

    #[test]
    fn test_syntax_error_context_is_truncated_and_escaped() {
        let input = format!("{}(\"open\n{}", "x ".repeat(30), "y".repeat(200));
        let err = SyntaxError::with_context(
            SyntaxErrorKind::UnterminatedString,
            "unterminated string",
            &input,
            60,
            Some("\"open".into()),
        );

        let context = err.context.clone().unwrap_or_default();
        assert!(context.starts_with("[...]"));
        assert!(context.ends_with("[...]"));
        assert!(context.contains("\\n"));
        assert!(!context.contains('\n'));

        let shown = format!("{}", Error::LexError(err));
        assert!(shown.starts_with("LexError: unterminated string at offset 60"));
        assert!(shown.contains("Found: \"open"));
    }

    #[test]
    fn test_syntax_error_context_with_multibyte_source() {
        let input = format!("{}(print \"x", "\u{e9}".repeat(50));
        let offset = input.find("(print").unwrap_or_default();
        let err = SyntaxError::with_context(
            SyntaxErrorKind::UnterminatedString,
            "unterminated string",
            &input,
            offset,
            None,
        );

        let context = err.context.unwrap_or_default();
        assert!(context.starts_with("[...]"), "{context}");
        assert!(context.ends_with("(print \"x"), "{context}");
        assert_eq!(context.matches('\u{e9}').count(), 10);

        // A window starting inside a multi-byte char backs up to its boundary
        let input = "\u{e9}".repeat(30);
        let err = SyntaxError::with_context(
            SyntaxErrorKind::UnterminatedAtom,
            "atom",
            &input,
            41,
            None,
        );
        assert_eq!(err.context, Some(format!("[...]{}", "\u{e9}".repeat(20))));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_parse_depth, MAX_PARSE_DEPTH);
        assert_eq!(config.max_eval_depth, MAX_EVAL_DEPTH);
        assert!(!config.lenient_parens);
    }
}
