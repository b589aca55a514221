//! Durable key-value storage backed by a JSON file

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A small string map persisted to disk on every write
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl LocalStorage {
    /// Open the storage file at `path`, starting empty if it does not exist
    ///
    /// A corrupt file is logged and treated as empty rather than failing
    /// startup.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("Ignoring unreadable storage file {}", path.display());
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        debug!("Opened storage {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        self.entries
            .insert(key.to_string(), Value::String(value.to_string()));
        self.flush()
    }

    /// Remove `key`, returning whether it was present
    pub fn remove(&mut self, key: &str) -> crate::Result<bool> {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
