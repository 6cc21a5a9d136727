use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::errors::{Result, StoreError};

/// Keyed JSON document persistence backing the resource caches
///
/// Every save replaces the whole document for its key.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    async fn save(&self, key: &str, document: &Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory document store for testing and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &str, document: &Value) -> Result<()> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// One `{key}.json` file per document
///
/// # Directory Structure
/// ```text
/// ~/.local/share/vshop/cache/
/// ├── catalog.json
/// ├── prices.json
/// ├── skin_rotation.json
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileDocumentStore {
    dir: PathBuf,
}

impl JsonFileDocumentStore {
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Default cache directory for the current platform
    pub fn default_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("com", "vshop", "vshop").ok_or_else(|| {
            StoreError::Storage("Could not determine data directory".to_string())
        })?;

        Ok(project_dirs.data_dir().join("cache"))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait::async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path(key);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Some(serde_json::from_slice(&content)?))
    }

    async fn save(&self, key: &str, document: &Value) -> Result<()> {
        let path = self.path(key);
        let json = serde_json::to_vec_pretty(document)?;

        // Atomic write: temp file, rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {}", temp_path.display(), e)))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace {}: {}", path.display(), e)))?;

        debug!("Saved document {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
