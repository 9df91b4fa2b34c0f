//! In-memory store for testing and development.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::{Database, Store, StorageError};

/// A fixed set of databases held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: HashMap<String, Arc<Database>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a database built from a JSON document in the file layout.
    pub fn with_json(mut self, name: &str, value: Value) -> Result<Self, StorageError> {
        let db = Database::from_json(value, Path::new(name))?;
        self.databases.insert(name.to_string(), Arc::new(db));
        Ok(self)
    }
}

impl Store for MemoryStore {
    async fn load_database(&self, name: &str) -> Result<Arc<Database>, StorageError> {
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}
