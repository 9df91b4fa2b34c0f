//! Query engine: evaluates statements against a [`Store`].
//!
//! The protocol layer only sees the [`QueryEngine`] trait. It hands over
//! raw SQL text plus a [`SessionContext`] and gets back a fully resolved
//! [`QueryResult`] or a [`QueryError`] carrying a SQLSTATE.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------+
//! | server::connection        |
//! +---------------------------+
//!              | QueryEngine
//!              v
//! +---------------------------+      +-------------------+
//! | Engine<S>                 |----->| sql::parse        |
//! |  values / show / set / tx |      +-------------------+
//! |  select ------------------+---+
//! +---------------------------+   |  +-------------------+
//!              |                  +->| executor          |
//!              v                     | information_schema|
//! +---------------------------+      +-------------------+
//! | Store (File / Memory)     |
//! +---------------------------+
//! ```

mod error;
mod executor;
mod information_schema;

pub use error::QueryError;

use std::future::Future;
use std::sync::Arc;

use crate::protocol::{
    DataValue, ErrorInfo, FieldDescription, FormatCode, Severity, server_parameter, sql_state,
    type_oid,
};
use crate::sql::{self, Function, Literal, Select, SelectItem, Statement, ValueExpr};
use crate::storage::{Database, Store};

/// Schema used when a table reference is unqualified.
pub const DEFAULT_SCHEMA: &str = "public";

/// Per-connection facts a statement may depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub database: String,
    pub user: String,
    pub application_name: Option<String>,
}

/// Describes one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub type_oid: u32,
    pub type_size: i16,
    pub format: FormatCode,
}

impl Column {
    /// Creates a text-format column; the size follows from the type.
    pub fn new(name: impl Into<String>, type_oid: u32) -> Self {
        Self {
            name: name.into(),
            type_oid,
            type_size: type_oid::type_size(type_oid),
            format: FormatCode::Text,
        }
    }

    pub fn to_field_description(&self) -> FieldDescription {
        let mut field = FieldDescription::new(&self.name, self.type_oid, self.type_size);
        field.format = self.format;
        field
    }
}

/// One value of a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Bytes(Vec<u8>),
    Null,
}

impl Cell {
    pub fn into_data_value(self) -> DataValue {
        match self {
            Cell::Text(s) => Some(s.into_bytes()),
            Cell::Bytes(b) => Some(b),
            Cell::Null => None,
        }
    }
}

/// A fully resolved statement result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Empty for statements that return no rows.
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
    /// CommandComplete tag, e.g. `SELECT 3`.
    pub tag: String,
    /// Sent as NoticeResponse before CommandComplete.
    pub notices: Vec<ErrorInfo>,
}

impl QueryResult {
    /// A row-returning result tagged `SELECT n`.
    pub fn rows(columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        let tag = format!("SELECT {}", rows.len());
        Self {
            columns,
            rows,
            tag,
            notices: Vec::new(),
        }
    }

    /// A result without rows.
    pub fn command(tag: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            tag: tag.into(),
            notices: Vec::new(),
        }
    }

    pub fn with_notice(mut self, notice: ErrorInfo) -> Self {
        self.notices.push(notice);
        self
    }
}

/// Evaluates SQL text for the protocol layer.
///
/// Implementations are shared by every connection and must not block the
/// runtime.
pub trait QueryEngine: Send + Sync + 'static {
    /// Runs one statement to completion.
    fn execute(
        &self,
        sql: &str,
        ctx: &SessionContext,
    ) -> impl Future<Output = Result<QueryResult, QueryError>> + Send;

    /// Reports the columns `sql` would return, without producing rows.
    fn describe(
        &self,
        sql: &str,
        ctx: &SessionContext,
    ) -> impl Future<Output = Result<Vec<Column>, QueryError>> + Send {
        async move { Ok(self.execute(sql, ctx).await?.columns) }
    }

    /// Splits a simple Query message into statements. Whitespace-only text
    /// yields an empty list.
    fn split_statements(&self, sql: &str) -> Vec<String> {
        if sql.trim().is_empty() {
            Vec::new()
        } else {
            vec![sql.to_string()]
        }
    }
}

/// The read-only SQL engine over a [`Store`].
pub struct Engine<S: Store> {
    store: S,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn run(
        &self,
        sql: &str,
        ctx: &SessionContext,
        describe_only: bool,
    ) -> Result<QueryResult, QueryError> {
        match sql::parse(sql)? {
            Statement::Values(items) => Ok(values(&items, ctx)),
            Statement::Select(select) => self.select(&select, ctx, describe_only).await,
            Statement::Show(name) => show(&name, ctx),
            Statement::Set(name) => Ok(QueryResult::command("SET").with_notice(ErrorInfo::new(
                Severity::Notice,
                sql_state::SUCCESSFUL_COMPLETION,
                format!("parameter \"{name}\" is ignored by this read-only server"),
            ))),
            Statement::Begin => Ok(QueryResult::command("BEGIN")),
            Statement::Commit => Ok(QueryResult::command("COMMIT").with_notice(no_transaction())),
            Statement::Rollback => {
                Ok(QueryResult::command("ROLLBACK").with_notice(no_transaction()))
            }
        }
    }

    async fn select(
        &self,
        select: &Select,
        ctx: &SessionContext,
        describe_only: bool,
    ) -> Result<QueryResult, QueryError> {
        let db: Arc<Database> = self.store.load_database(&ctx.database).await?;
        let schema = select.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);

        let synthesized;
        let records = if schema == information_schema::SCHEMA {
            synthesized = information_schema::view(&db, &ctx.database, &select.table);
            synthesized.as_deref()
        } else {
            db.table(schema, &select.table).map(Vec::as_slice)
        };
        let records = records.ok_or_else(|| QueryError::UndefinedTable {
            name: select.qualified_name(),
        })?;

        if describe_only {
            let columns = executor::describe(select, records)?;
            Ok(QueryResult::rows(columns, Vec::new()))
        } else {
            executor::execute(select, records)
        }
    }
}

impl<S: Store> QueryEngine for Engine<S> {
    async fn execute(&self, sql: &str, ctx: &SessionContext) -> Result<QueryResult, QueryError> {
        self.run(sql, ctx, false).await
    }

    async fn describe(&self, sql: &str, ctx: &SessionContext) -> Result<Vec<Column>, QueryError> {
        Ok(self.run(sql, ctx, true).await?.columns)
    }

    fn split_statements(&self, sql: &str) -> Vec<String> {
        sql::split_statements(sql)
    }
}

fn no_transaction() -> ErrorInfo {
    ErrorInfo::new(
        Severity::Warning,
        sql_state::NO_ACTIVE_SQL_TRANSACTION,
        "there is no transaction in progress",
    )
}

/// Evaluates a FROM-less select into a single row.
fn values(items: &[SelectItem], ctx: &SessionContext) -> QueryResult {
    let (columns, row): (Vec<Column>, Vec<Cell>) = items
        .iter()
        .map(|item| {
            let (oid, cell) = match &item.expr {
                ValueExpr::Literal(literal) => literal_value(literal),
                ValueExpr::Function(function) => (type_oid::TEXT, function_value(*function, ctx)),
            };
            (Column::new(item.output_name(), oid), cell)
        })
        .unzip();
    QueryResult::rows(columns, vec![row])
}

fn literal_value(literal: &Literal) -> (u32, Cell) {
    match literal {
        Literal::Integer(n) if i32::try_from(*n).is_ok() => {
            (type_oid::INT4, Cell::Text(n.to_string()))
        }
        Literal::Integer(n) => (type_oid::INT8, Cell::Text(n.to_string())),
        Literal::Decimal(s) => (type_oid::NUMERIC, Cell::Text(s.clone())),
        Literal::String(s) => (type_oid::TEXT, Cell::Text(s.clone())),
        Literal::Bool(true) => (type_oid::BOOL, Cell::Text("t".to_string())),
        Literal::Bool(false) => (type_oid::BOOL, Cell::Text("f".to_string())),
        Literal::Null => (type_oid::TEXT, Cell::Null),
    }
}

fn function_value(function: Function, ctx: &SessionContext) -> Cell {
    Cell::Text(match function {
        Function::Version => server_version(),
        Function::CurrentDatabase => ctx.database.clone(),
        Function::CurrentSchema => DEFAULT_SCHEMA.to_string(),
        Function::CurrentUser | Function::SessionUser => ctx.user.clone(),
    })
}

/// The `version()` string.
pub fn server_version() -> String {
    let version = server_parameter("server_version").unwrap_or_default();
    format!(
        "PostgreSQL {version} ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

/// `SHOW name`: a single text column named after the parameter.
fn show(name: &str, ctx: &SessionContext) -> Result<QueryResult, QueryError> {
    let value = match name {
        "transaction_isolation" => "read committed",
        "search_path" => "\"$user\", public",
        "application_name" => ctx.application_name.as_deref().unwrap_or_default(),
        _ => server_parameter(name).ok_or_else(|| QueryError::UndefinedParameter {
            name: name.to_string(),
        })?,
    };
    Ok(QueryResult {
        tag: "SHOW".to_string(),
        ..QueryResult::rows(
            vec![Column::new(canonical_parameter_name(name), type_oid::TEXT)],
            vec![vec![Cell::Text(value.to_string())]],
        )
    })
}

fn canonical_parameter_name(name: &str) -> String {
    crate::protocol::SERVER_PARAMETERS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map_or_else(|| name.to_string(), |(key, _)| (*key).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn engine() -> Engine<MemoryStore> {
        let store = MemoryStore::new()
            .with_json(
                "shop",
                json!({
                    "public": {
                        "products": [
                            {"id": 1, "name": "pen", "price": 1.5},
                            {"id": 2, "name": "ink", "price": 7.25},
                        ],
                    },
                    "archive": {"products": [{"id": 9}]},
                }),
            )
            .unwrap();
        Engine::new(store)
    }

    fn ctx() -> SessionContext {
        SessionContext {
            database: "shop".to_string(),
            user: "alice".to_string(),
            application_name: None,
        }
    }

    fn text(cell: &Cell) -> &str {
        match cell {
            Cell::Text(s) => s,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_select_literals() {
        let result = engine()
            .execute("SELECT 1, 3000000000, 1.50, 'x', false, NULL", &ctx())
            .await
            .unwrap();
        let oids: Vec<_> = result.columns.iter().map(|c| c.type_oid).collect();
        assert_eq!(
            oids,
            vec![
                type_oid::INT4,
                type_oid::INT8,
                type_oid::NUMERIC,
                type_oid::TEXT,
                type_oid::BOOL,
                type_oid::TEXT
            ]
        );
        assert_eq!(result.columns[0].name, "?column?");
        assert_eq!(result.columns[0].type_size, 4);
        assert_eq!(
            result.rows,
            vec![vec![
                Cell::Text("1".to_string()),
                Cell::Text("3000000000".to_string()),
                Cell::Text("1.50".to_string()),
                Cell::Text("x".to_string()),
                Cell::Text("f".to_string()),
                Cell::Null,
            ]]
        );
        assert_eq!(result.tag, "SELECT 1");
    }

    #[tokio::test]
    async fn test_session_functions() {
        let result = engine()
            .execute(
                "SELECT current_database(), current_user, current_schema() AS s, version()",
                &ctx(),
            )
            .await
            .unwrap();
        let row = &result.rows[0];
        assert_eq!(text(&row[0]), "shop");
        assert_eq!(text(&row[1]), "alice");
        assert_eq!(text(&row[2]), "public");
        assert!(text(&row[3]).starts_with("PostgreSQL 16.0"));
        assert_eq!(result.columns[2].name, "s");
    }

    #[tokio::test]
    async fn test_select_from_default_and_explicit_schema() {
        let result = engine()
            .execute("SELECT * FROM products ORDER BY price DESC", &ctx())
            .await
            .unwrap();
        assert_eq!(result.columns.len(), 3);
        assert_eq!(result.columns[2].type_oid, type_oid::FLOAT8);
        assert_eq!(text(&result.rows[0][1]), "ink");

        let result = engine()
            .execute("SELECT id FROM archive.products", &ctx())
            .await
            .unwrap();
        assert_eq!(text(&result.rows[0][0]), "9");
    }

    #[tokio::test]
    async fn test_undefined_table() {
        let err = engine()
            .execute("SELECT * FROM missing", &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.sql_state(), sql_state::UNDEFINED_TABLE);
        assert_eq!(err.to_string(), "relation \"missing\" does not exist");
    }

    #[tokio::test]
    async fn test_unknown_database() {
        let mut ctx = ctx();
        ctx.database = "nope".to_string();
        let err = engine()
            .execute("SELECT * FROM products", &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.sql_state(), sql_state::INVALID_CATALOG_NAME);

        // statements that need no data still work
        let result = engine().execute("SELECT 1", &ctx).await.unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_information_schema() {
        let result = engine()
            .execute(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 ORDER BY table_schema",
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(text(&result.rows[0][0]), "archive");

        let result = engine()
            .execute(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = 'products'",
                &ctx(),
            )
            .await
            .unwrap();
        let names: Vec<_> = result
            .rows
            .iter()
            .map(|r| text(&r[0]).to_string())
            .collect();
        assert_eq!(names, vec!["id", "name", "price"]);
    }

    #[tokio::test]
    async fn test_show() {
        let result = engine().execute("SHOW timezone", &ctx()).await.unwrap();
        assert_eq!(result.tag, "SHOW");
        assert_eq!(result.columns[0].name, "TimeZone");
        assert_eq!(result.rows, vec![vec![Cell::Text("UTC".to_string())]]);

        let result = engine()
            .execute("SHOW transaction_isolation", &ctx())
            .await
            .unwrap();
        assert_eq!(text(&result.rows[0][0]), "read committed");

        let err = engine().execute("SHOW bogus", &ctx()).await.unwrap_err();
        assert_eq!(err.sql_state(), sql_state::UNDEFINED_OBJECT);
    }

    #[tokio::test]
    async fn test_show_application_name() {
        let result = engine()
            .execute("SHOW application_name", &ctx())
            .await
            .unwrap();
        assert_eq!(text(&result.rows[0][0]), "");

        let ctx = SessionContext {
            application_name: Some("psql".to_string()),
            ..ctx()
        };
        let result = engine().execute("SHOW application_name", &ctx).await.unwrap();
        assert_eq!(result.columns[0].name, "application_name");
        assert_eq!(text(&result.rows[0][0]), "psql");
    }

    #[tokio::test]
    async fn test_set_and_transactions() {
        let result = engine()
            .execute("SET application_name = 'x'", &ctx())
            .await
            .unwrap();
        assert_eq!(result.tag, "SET");
        assert!(result.columns.is_empty());
        assert_eq!(result.notices.len(), 1);

        let result = engine().execute("BEGIN", &ctx()).await.unwrap();
        assert_eq!(result.tag, "BEGIN");
        assert!(result.notices.is_empty());

        let result = engine().execute("COMMIT", &ctx()).await.unwrap();
        assert_eq!(result.tag, "COMMIT");
        assert_eq!(result.notices[0].code, sql_state::NO_ACTIVE_SQL_TRANSACTION);
    }

    #[tokio::test]
    async fn test_write_is_rejected() {
        let err = engine()
            .execute("DELETE FROM products", &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.sql_state(), sql_state::READ_ONLY_SQL_TRANSACTION);
        assert_eq!(
            err.to_string(),
            "cannot execute DELETE in a read-only transaction"
        );
    }

    #[tokio::test]
    async fn test_describe_returns_no_rows() {
        let columns = engine()
            .describe("SELECT id, name FROM products", &ctx())
            .await
            .unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);

        let columns = engine().describe("BEGIN", &ctx()).await.unwrap();
        assert!(columns.is_empty());
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(
            engine().split_statements("SELECT 1; SELECT 'a;b';"),
            vec!["SELECT 1", "SELECT 'a;b'"]
        );
    }

    #[test]
    fn test_cell_into_data_value() {
        assert_eq!(
            Cell::Text("ab".into()).into_data_value(),
            Some(b"ab".to_vec())
        );
        assert_eq!(Cell::Bytes(vec![0, 1]).into_data_value(), Some(vec![0, 1]));
        assert_eq!(Cell::Null.into_data_value(), None);
    }
}
