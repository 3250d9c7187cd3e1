use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: RestartParseErrorKind,
    },
    #[error("Missing required record: {0}")]
    MissingRecord(&'static str),
}

#[derive(Debug, Error, PartialEq)]
pub enum RestartParseErrorKind {
    #[error("Expected record '{expected}', found '{found}'")]
    UnexpectedRecord {
        expected: &'static str,
        found: String,
    },
    #[error("Invalid integer format (value: '{value}')")]
    InvalidInt { value: String },
    #[error("Invalid float format (value: '{value}')")]
    InvalidFloat { value: String },
    #[error("Expected {expected} counts per row, found {found}")]
    RowLength { expected: usize, found: usize },
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}
