//! Query-level errors.

use thiserror::Error;

use crate::protocol::{ErrorInfo, Severity, sql_state};
use crate::sql::ParseError;
use crate::storage::StorageError;

/// Errors a statement can fail with. All of them are recoverable: the
/// connection reports them and keeps going.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("relation \"{name}\" does not exist")]
    UndefinedTable { name: String },

    #[error("column \"{name}\" does not exist")]
    UndefinedColumn { name: String },

    #[error("unrecognized configuration parameter \"{name}\"")]
    UndefinedParameter { name: String },

    #[error("database \"{name}\" does not exist")]
    UnknownDatabase { name: String },

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for QueryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(name) => QueryError::UnknownDatabase { name },
            other => QueryError::Storage(other),
        }
    }
}

impl QueryError {
    /// SQLSTATE reported for this error.
    pub fn sql_state(&self) -> &'static str {
        match self {
            QueryError::Parse(ParseError::Syntax(_)) => sql_state::SYNTAX_ERROR,
            QueryError::Parse(ParseError::Unsupported(_)) => sql_state::FEATURE_NOT_SUPPORTED,
            QueryError::Parse(ParseError::ReadOnly(_)) => sql_state::READ_ONLY_SQL_TRANSACTION,
            QueryError::Parse(ParseError::UndefinedColumn(_))
            | QueryError::UndefinedColumn { .. } => sql_state::UNDEFINED_COLUMN,
            QueryError::UndefinedTable { .. } => sql_state::UNDEFINED_TABLE,
            QueryError::UndefinedParameter { .. } => sql_state::UNDEFINED_OBJECT,
            QueryError::UnknownDatabase { .. } => sql_state::INVALID_CATALOG_NAME,
            QueryError::Storage(StorageError::Io(_)) => sql_state::IO_ERROR,
            QueryError::Storage(_) => sql_state::INTERNAL_ERROR,
        }
    }

    /// Converts this error into a protocol [`ErrorInfo`] with its SQLSTATE.
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(Severity::Error, self.sql_state(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_map_to_sql_state() {
        let cases = [
            (ParseError::Syntax("x".into()), sql_state::SYNTAX_ERROR),
            (
                ParseError::Unsupported("x".into()),
                sql_state::FEATURE_NOT_SUPPORTED,
            ),
            (
                ParseError::ReadOnly("INSERT".into()),
                sql_state::READ_ONLY_SQL_TRANSACTION,
            ),
            (
                ParseError::UndefinedColumn("x".into()),
                sql_state::UNDEFINED_COLUMN,
            ),
        ];
        for (parse, code) in cases {
            assert_eq!(QueryError::from(parse).sql_state(), code);
        }
    }

    #[test]
    fn test_not_found_becomes_unknown_database() {
        let err = QueryError::from(StorageError::NotFound("shop".to_string()));
        assert_eq!(err.sql_state(), sql_state::INVALID_CATALOG_NAME);
        assert_eq!(err.to_string(), "database \"shop\" does not exist");
    }

    #[test]
    fn test_to_error_info() {
        let info = QueryError::UndefinedTable {
            name: "users".to_string(),
        }
        .to_error_info();
        assert_eq!(info.severity, Severity::Error);
        assert_eq!(info.code, sql_state::UNDEFINED_TABLE);
        assert_eq!(info.message, "relation \"users\" does not exist");
    }
}
