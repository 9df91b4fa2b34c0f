//! JSON file-backed store.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Database, Store, StorageError};

/// Loads databases from `<root>/<name>.json`.
///
/// Each database is parsed once and cached for the life of the store; the
/// data is read-only, so cached copies never go stale from our side.
/// The cache lock is only held for lookups and inserts, never across file
/// I/O, so a slow load does not stall connections using other databases.
pub struct FileStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<Database>>>,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is not touched until
    /// the first load.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a database name to its file, rejecting names that could escape
    /// the data directory.
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && !name.contains(['/', '\\', '\0'])
            && name != "."
            && !name.contains("..");
        valid.then(|| self.root.join(format!("{name}.json")))
    }
}

impl Store for FileStore {
    async fn load_database(&self, name: &str) -> Result<Arc<Database>, StorageError> {
        if let Some(db) = self.cache.read().get(name) {
            return Ok(db.clone());
        }

        let path = self
            .path_for(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        debug!(path = %path.display(), "loading database");
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        let db = Arc::new(Database::from_json(value, &path)?);

        info!(
            database = name,
            schemas = db.schemas.len(),
            "database loaded"
        );

        // Two connections may race to load the same file; keep whichever
        // copy landed first so every session sees the same Arc.
        let db = self
            .cache
            .write()
            .entry(name.to_string())
            .or_insert(db)
            .clone();
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_load_database() {
        let dir = TempDir::new().unwrap();
        write(&dir, "shop.json", r#"{"public": {"items": [{"sku": "a1"}]}}"#);

        let store = FileStore::new(dir.path());
        let db = store.load_database("shop").await.unwrap();
        assert_eq!(db.table("public", "items").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_is_cached() {
        let dir = TempDir::new().unwrap();
        write(&dir, "shop.json", r#"{"public": {}}"#);

        let store = FileStore::new(dir.path());
        let first = store.load_database("shop").await.unwrap();

        // Removing the file does not affect the cached copy.
        std::fs::remove_file(dir.path().join("shop.json")).unwrap();
        let second = store.load_database("shop").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_database() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.load_database("nope").await,
            Err(StorageError::NotFound(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("inner"));
        std::fs::create_dir(dir.path().join("inner")).unwrap();
        write(&dir, "secret.json", r#"{"public": {}}"#);

        for name in ["../secret", "a/b", "", ".."] {
            assert!(matches!(
                store.load_database(name).await,
                Err(StorageError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        write(&dir, "bad.json", "{not json");
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.load_database("bad").await,
            Err(StorageError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_shape() {
        let dir = TempDir::new().unwrap();
        write(&dir, "bad.json", r#"{"public": {"t": "oops"}}"#);
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.load_database("bad").await,
            Err(StorageError::Invalid { .. })
        ));
    }
}
