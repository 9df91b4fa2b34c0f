//! SQL recognition errors.

use thiserror::Error;

/// Why a statement could not be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The text is not a statement of the dialect.
    #[error("syntax error at or near \"{0}\"")]
    Syntax(String),
    /// Valid SQL that the dialect deliberately does not implement.
    #[error("{0}")]
    Unsupported(String),
    /// A statement that would modify data.
    #[error("cannot execute {0} in a read-only transaction")]
    ReadOnly(String),
    /// A bare identifier used where no table is in scope.
    #[error("column \"{0}\" does not exist")]
    UndefinedColumn(String),
}
