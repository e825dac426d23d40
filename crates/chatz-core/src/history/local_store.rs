//! Client-local key-value storage.
//!
//! Backed by a single JSON object file. Storage is best-effort: read and
//! write failures are logged and otherwise ignored, so callers never have
//! to handle them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::paths;
use crate::fsutil::write_atomic;

const SELECTED_API_PREFIX: &str = "chatz_selected_api_";

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$CHATZ_HOME/local_storage.json`.
    pub fn open_default() -> Self {
        Self::new(paths::local_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under which a user's API selection is remembered.
    pub fn selected_api_key(user: Option<&str>) -> String {
        format!("{SELECTED_API_PREFIX}{}", user.unwrap_or("Guest"))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read_all().remove(key)
    }

    /// Reads and deserializes a value; a mismatched shape reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(key, error = %e, "ignoring malformed local store value");
                None
            }
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_as(key)
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(key, error = %e, "failed to serialize local store value");
                return;
            }
        };
        let mut all = self.read_all();
        all.insert(key.to_string(), value);
        self.write_all(&all);
    }

    pub fn remove(&self, key: &str) {
        let mut all = self.read_all();
        if all.remove(key).is_some() {
            self.write_all(&all);
        }
    }

    fn read_all(&self) -> Map<String, Value> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), error = %e, "local store unreadable");
                }
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::debug!(path = %self.path.display(), "local store is not a JSON object; starting empty");
                Map::new()
            }
        }
    }

    fn write_all(&self, all: &Map<String, Value>) {
        let result = serde_json::to_vec_pretty(all)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| write_atomic(&self.path, &bytes));
        if let Err(e) = result {
            tracing::debug!(path = %self.path.display(), error = %e, "failed to write local store");
        }
    }
}
