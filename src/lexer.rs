//! Tokenizer.
//!
//! Three token shapes exist: a parenthesis, a string literal read verbatim up
//! to the next `"` (there are no escapes, so a string can never contain a
//! quote), and an atom running until whitespace or a parenthesis. A
//! parenthesis always ends an atom and is emitted as its own token.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while, take_while1},
    character::complete::char,
    combinator::{cut, value},
};

use crate::{Error, SyntaxError, SyntaxErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    /// Contents of a string literal, without the quotes
    String(String),
    Atom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character
    pub offset: usize,
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_whitespace()).parse(input)
}

fn paren(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Open, char('(')),
        value(TokenKind::Close, char(')')),
    ))
    .parse(input)
}

/// A missing closing quote is a hard failure rather than a backtrack
fn string_literal(input: &str) -> IResult<&str, TokenKind> {
    let (input, _) = char('"').parse(input)?;
    let (input, content) = take_till(|c: char| c == '"').parse(input)?;
    let (input, _) = cut(char('"')).parse(input)?;
    Ok((input, TokenKind::String(content.to_owned())))
}

fn atom(input: &str) -> IResult<&str, TokenKind> {
    let (input, text) = take_while1(is_atom_char).parse(input)?;
    Ok((input, TokenKind::Atom(text.to_owned())))
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((paren, string_literal, atom)).parse(input)
}

/// Split `input` into tokens.
///
/// Fails if the input ends inside a string literal, or inside an atom that
/// has no whitespace or parenthesis after it.
pub fn lex(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        // Skipping whitespace cannot fail
        if let Ok((remaining, _)) = whitespace(rest) {
            rest = remaining;
        }
        if rest.is_empty() {
            return Ok(tokens);
        }

        let offset = input.len() - rest.len();
        match token(rest) {
            Ok((remaining, kind)) => {
                if let TokenKind::Atom(text) = &kind
                    && remaining.is_empty()
                {
                    return Err(Error::LexError(SyntaxError::with_context(
                        SyntaxErrorKind::UnterminatedAtom,
                        "input ends inside an atom",
                        input,
                        offset,
                        Some(text.clone()),
                    )));
                }
                tokens.push(Token { kind, offset });
                rest = remaining;
            }
            Err(_) => {
                let found: String = rest.chars().take(20).collect();
                return Err(Error::LexError(SyntaxError::with_context(
                    SyntaxErrorKind::UnterminatedString,
                    "input ends inside a string literal",
                    input,
                    offset,
                    Some(found),
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    enum LexTestResult {
        Tokens(Vec<TokenKind>),
        Fails(SyntaxErrorKind),
    }
    use LexTestResult::*;

    fn atom_kind(text: &str) -> TokenKind {
        TokenKind::Atom(text.to_owned())
    }

    fn string_kind(text: &str) -> TokenKind {
        TokenKind::String(text.to_owned())
    }

    fn run_lex_tests(test_cases: Vec<(&str, LexTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Lex test #{}", i + 1);
            match (lex(input), expected) {
                (Ok(tokens), Tokens(kinds)) => {
                    let actual: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
                    assert_eq!(&actual, kinds, "{test_id}: tokens for {input:?}");
                }
                (Err(Error::LexError(err)), Fails(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: error kind for {input:?}");
                }
                (result, expected) => {
                    panic!("{test_id}: for {input:?} expected {expected:?}, got {result:?}")
                }
            }
        }
    }

    #[test]
    fn test_lexer_data_driven() {
        use TokenKind::{Close, Open};

        let test_cases = vec![
            ("", Tokens(vec![])),
            ("  \n\t ", Tokens(vec![])),
            ("()", Tokens(vec![Open, Close])),
            (
                "(+ 1 2)",
                Tokens(vec![Open, atom_kind("+"), atom_kind("1"), atom_kind("2"), Close]),
            ),
            // Parens split atoms with no whitespace around them
            (
                "(a(b)c)",
                Tokens(vec![
                    Open,
                    atom_kind("a"),
                    Open,
                    atom_kind("b"),
                    Close,
                    atom_kind("c"),
                    Close,
                ]),
            ),
            (
                "(def x 1.50)",
                Tokens(vec![Open, atom_kind("def"), atom_kind("x"), atom_kind("1.50"), Close]),
            ),
            // Strings are verbatim, whitespace and parens included
            (
                "(print \"a (b)  c\")",
                Tokens(vec![Open, atom_kind("print"), string_kind("a (b)  c"), Close]),
            ),
            // No escape processing: the backslash is kept and the next quote ends the string
            (
                r#"("a\" b)"#,
                Tokens(vec![Open, string_kind("a\\"), atom_kind("b"), Close]),
            ),
            ("(\"\")", Tokens(vec![Open, string_kind(""), Close])),
            // A string directly followed by an atom
            ("(\"a\"b)", Tokens(vec![Open, string_kind("a"), atom_kind("b"), Close])),
            // A quote inside an atom does not start a string
            ("(ab\"c\")", Tokens(vec![Open, atom_kind("ab\"c\""), Close])),
            // Trailing whitespace terminates the last atom
            ("42\n", Tokens(vec![atom_kind("42")])),
            ("x y ", Tokens(vec![atom_kind("x"), atom_kind("y")])),
            // Unterminated input
            ("(print \"oops)", Fails(SyntaxErrorKind::UnterminatedString)),
            ("\"", Fails(SyntaxErrorKind::UnterminatedString)),
            ("42", Fails(SyntaxErrorKind::UnterminatedAtom)),
            ("(a) b", Fails(SyntaxErrorKind::UnterminatedAtom)),
        ];

        run_lex_tests(test_cases);
    }

    #[test]
    fn test_token_offsets() {
        let tokens = match lex("(ab \"c d\")\n") {
            Ok(tokens) => tokens,
            Err(e) => panic!("unexpected lex error: {e}"),
        };
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 1, 4, 9]);
    }

    #[test]
    fn test_lex_error_reports_offset_and_found_text() {
        match lex("(def name\n  \"never closed") {
            Err(Error::LexError(err)) => {
                assert_eq!(err.offset, 12);
                assert_eq!(err.found.as_deref(), Some("\"never closed"));
            }
            other => panic!("expected LexError, got {other:?}"),
        }

        match lex("(a b) tail") {
            Err(Error::LexError(err)) => {
                assert_eq!(err.kind, SyntaxErrorKind::UnterminatedAtom);
                assert_eq!(err.found.as_deref(), Some("tail"));
                assert_eq!(err.offset, 6);
            }
            other => panic!("expected LexError, got {other:?}"),
        }
    }
}
