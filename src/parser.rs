//! Token stream to expression tree.
//!
//! The grammar is only parenthesis nesting: `(` opens a compound, `)` closes
//! it, anything else is classified as a literal or an identifier. Arity and
//! every other semantic check happen at evaluation time.

use crate::ast::{Expression, Value};
use crate::lexer::{Token, TokenKind, lex};
use crate::{Config, Error, SyntaxError, SyntaxErrorKind};

/// Whether an atom is a number literal: digits, optionally one decimal point,
/// optionally more digits (`7`, `3.25`, `10.`)
fn is_number_atom(text: &str) -> bool {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
}

/// Classify a bare atom as a number literal or an identifier
fn classify_atom(text: &str) -> Expression {
    if is_number_atom(text)
        && let Ok(Value::Number(n)) = Value::number(text)
    {
        return Expression::Literal(Value::Number(n));
    }
    Expression::Identifier(text.to_owned())
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
    config: &'a Config,
}

impl Parser<'_> {
    fn error(&self, kind: SyntaxErrorKind, message: &str, offset: usize, found: &str) -> Error {
        Error::ParseError(SyntaxError::with_context(
            kind,
            message,
            self.source,
            offset,
            Some(found.to_owned()),
        ))
    }

    /// Collect siblings until the `)` closing the compound opened at
    /// `opened_at`, or until the end of input for the top level.
    fn parse_sequence(
        &mut self,
        depth: usize,
        opened_at: Option<usize>,
    ) -> Result<Vec<Expression>, Error> {
        let mut children = Vec::new();

        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            match &token.kind {
                TokenKind::Open => {
                    if depth >= self.config.max_parse_depth {
                        return Err(self.error(
                            SyntaxErrorKind::TooDeeplyNested,
                            &format!(
                                "expression too deeply nested (max depth: {})",
                                self.config.max_parse_depth
                            ),
                            token.offset,
                            "(",
                        ));
                    }
                    let nested = self.parse_sequence(depth + 1, Some(token.offset))?;
                    children.push(Expression::Compound(nested));
                }
                TokenKind::Close => {
                    if opened_at.is_some() {
                        return Ok(children);
                    }
                    if self.config.lenient_parens {
                        // A stray `)` at the top level ends the program
                        return Ok(children);
                    }
                    return Err(self.error(
                        SyntaxErrorKind::UnmatchedClose,
                        "unmatched closing parenthesis",
                        token.offset,
                        ")",
                    ));
                }
                TokenKind::String(s) => {
                    children.push(Expression::Literal(Value::String(s.clone())));
                }
                TokenKind::Atom(text) => children.push(classify_atom(text)),
            }
        }

        match opened_at {
            Some(offset) if !self.config.lenient_parens => Err(self.error(
                SyntaxErrorKind::UnclosedOpen,
                "unclosed parenthesis at end of input",
                offset,
                "(",
            )),
            _ => Ok(children),
        }
    }
}

/// Build the top-level compound from `tokens`; its children are every
/// top-level form. `source` is only used for error context.
pub fn parse(tokens: &[Token], source: &str, config: &Config) -> Result<Expression, Error> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
        config,
    };
    parser.parse_sequence(0, None).map(Expression::Compound)
}

/// Lex and parse a complete source unit
pub fn parse_program(source: &str, config: &Config) -> Result<Expression, Error> {
    let tokens = lex(source)?;
    parse(&tokens, source, config)
}
