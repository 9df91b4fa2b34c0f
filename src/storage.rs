//! Read-only record storage.
//!
//! A database is a two-level namespace of tables holding JSON records:
//!
//! ```text
//! Database
//!   +-- schema ("public")
//!         +-- table ("users") -> [ {"id": 1, "name": "ada"}, ... ]
//! ```
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | Engine            |
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | Store Trait       |
//! +-------------------+
//!       /      \
//!      v        v
//! +-------------+ +-----------+
//! | MemoryStore | | FileStore |
//! +-------------+ +-----------+
//! ```

pub mod error;
pub mod file;
pub mod memory;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

/// A single row: column name to JSON value, in file order.
pub type Record = Map<String, Value>;

/// Records of a single table, in file order.
pub type Table = Vec<Record>;

/// Tables of a schema, by name.
pub type Schema = BTreeMap<String, Table>;

/// A loaded database: schemas by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    pub schemas: BTreeMap<String, Schema>,
}

impl Database {
    /// Looks up a table by schema and table name.
    pub fn table(&self, schema: &str, table: &str) -> Option<&Table> {
        self.schemas.get(schema)?.get(table)
    }

    /// Builds a database from a parsed JSON document, validating its shape.
    ///
    /// `origin` names the source in error messages.
    pub fn from_json(value: Value, origin: &Path) -> Result<Self, StorageError> {
        let invalid = |reason: String| StorageError::Invalid {
            path: origin.to_path_buf(),
            reason,
        };

        let Value::Object(schemas) = value else {
            return Err(invalid("top level must be an object of schemas".to_string()));
        };

        let mut db = Database::default();
        for (schema_name, tables) in schemas {
            let Value::Object(tables) = tables else {
                return Err(invalid(format!(
                    "schema \"{schema_name}\" must be an object of tables"
                )));
            };

            let mut schema = Schema::new();
            for (table_name, rows) in tables {
                let Value::Array(rows) = rows else {
                    return Err(invalid(format!(
                        "table \"{schema_name}.{table_name}\" must be an array of records"
                    )));
                };

                let mut table = Table::with_capacity(rows.len());
                for (i, row) in rows.into_iter().enumerate() {
                    let Value::Object(record) = row else {
                        return Err(invalid(format!(
                            "record {i} of \"{schema_name}.{table_name}\" must be an object"
                        )));
                    };
                    table.push(record);
                }
                schema.insert(table_name, table);
            }
            db.schemas.insert(schema_name, schema);
        }
        Ok(db)
    }
}

/// Source of databases for the query engine.
///
/// Implementations must be thread-safe: every connection shares one store
/// and may load concurrently. Loading may suspend the calling connection
/// but must never block others.
pub trait Store: Send + Sync + 'static {
    /// Loads the named database.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such database exists, or
    /// `StorageError::Invalid` if its data fails validation.
    fn load_database(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Arc<Database>, StorageError>> + Send;
}
