use std::io;

use nom::error::{ContextError, ErrorKind, ParseError};
use thiserror::Error;

use crate::position::Position;

/// Errors produced while reading a grammar.
#[derive(Debug, Error)]
pub enum Error {
    /// The input did not match the grammar syntax at the reported position.
    #[error(
        "mismatch with {} at line {line}, column {column}; expected {expected}",
        describe(.actual)
    )]
    Parse {
        expected: String,
        /// The offending byte, or `None` at end of input.
        actual: Option<u8>,
        line: usize,
        column: usize,
    },
    /// A second full (`=`) definition of a rule.
    #[error("collision at line {line}, column {column}: {rule} is redefined")]
    Collision {
        rule: String,
        line: usize,
        column: usize,
    },
    #[error("failed to read grammar: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Where in the input the error was detected.
    pub fn position(&self) -> Option<Position> {
        match *self {
            Error::Parse { line, column, .. } | Error::Collision { line, column, .. } => {
                Some(Position { line, column })
            }
            Error::Io(_) => None,
        }
    }

    /// Build a parse error from a failed production. `full` is the complete
    /// input and `mismatch` points somewhere inside it.
    pub(crate) fn from_mismatch(full: &[u8], mismatch: Mismatch<'_>) -> Self {
        let offset = full.len() - mismatch.input.len();
        let Position { line, column } = Position::locate(full, offset);
        Error::Parse {
            expected: mismatch.expected.to_owned(),
            actual: mismatch.input.first().copied(),
            line,
            column,
        }
    }

    pub(crate) fn from_nom(full: &[u8], err: nom::Err<Mismatch<'_>>) -> Self {
        match err {
            nom::Err::Error(mismatch) | nom::Err::Failure(mismatch) => {
                Self::from_mismatch(full, mismatch)
            }
            // Only complete parsers are used, so input never runs short.
            nom::Err::Incomplete(_) => Self::from_mismatch(
                full,
                Mismatch::new(&full[full.len()..], "more input"),
            ),
        }
    }
}

fn describe(actual: &Option<u8>) -> String {
    match *actual {
        Some(b) if b.is_ascii_graphic() || b == b' ' => format!("'{}' [{:02X}]", b as char, b),
        Some(b) => format!("[{:02X}]", b),
        None => "end of input".to_owned(),
    }
}

/// The parser-internal error: what was expected, and the input remaining
/// where the mismatch happened.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mismatch<'a> {
    pub input: &'a [u8],
    pub expected: &'static str,
}

impl<'a> Mismatch<'a> {
    pub fn new(input: &'a [u8], expected: &'static str) -> Self {
        Mismatch { input, expected }
    }
}

impl<'a> ParseError<&'a [u8]> for Mismatch<'a> {
    fn from_error_kind(input: &'a [u8], _kind: ErrorKind) -> Self {
        Mismatch::new(input, "well-formed grammar")
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }

    /// Keep whichever alternative got further into the input.
    fn or(self, other: Self) -> Self {
        if other.input.len() < self.input.len() {
            other
        } else {
            self
        }
    }
}

impl<'a> ContextError<&'a [u8]> for Mismatch<'a> {
    /// A production that fails on its first byte is reported by its own
    /// name rather than by whichever alternative was tried last.
    fn add_context(input: &'a [u8], ctx: &'static str, other: Self) -> Self {
        if other.input.len() == input.len() {
            Mismatch::new(input, ctx)
        } else {
            other
        }
    }
}
