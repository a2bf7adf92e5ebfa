//! Key-value persistence collaborator.
//!
//! The engine treats persistence as an external service: typed JSON values
//! under string keys. The file implementation loads once on open and writes
//! through on every store.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to write {0}: {1}")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("corrupt persistence file {0}: {1}")]
    Corrupt(PathBuf, #[source] serde_json::Error),
}

pub trait Persistence: Send {
    fn load(&self, key: &str) -> Option<Value>;

    /// Store a typed value. Failures are reported but the caller treats them
    /// as non-fatal; an unwritable store degrades to in-memory behavior.
    fn store(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str);

    /// All keys beginning with the given namespace prefix.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// In-memory persistence, used in tests and as a fallback.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    values: HashMap<String, Value>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// File-backed persistence: one JSON object per file, written through on
/// every mutation.
#[derive(Debug)]
pub struct FilePersistence {
    path: PathBuf,
    values: HashMap<String, Value>,
}

impl FilePersistence {
    /// Open (or create) the persistence file. A missing file is an empty
    /// store; a corrupt file is an error so a damaged store is never
    /// silently truncated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| PersistError::Corrupt(path.clone(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(PersistError::Read(path, e)),
        };
        Ok(Self { path, values })
    }

    fn flush(&self) {
        let serialized = match serde_json::to_string_pretty(&self.values) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to serialize persistence state: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, serialized) {
            warn!("failed to write {}: {}", self.path.display(), e);
        }
    }
}

impl Persistence for FilePersistence {
    fn load(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
        self.flush();
    }

    fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.flush();
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}
