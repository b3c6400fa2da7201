use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Key/value session state persisted by the login flow.
pub trait SessionSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Session state kept in a JSON object file. The file is re-read on every
/// lookup so logins and logouts by other processes are picked up.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<serde_json::Map<String, Value>> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) | Err(_) => {
                tracing::warn!(
                    event = "session_file_invalid",
                    path = %self.path.display(),
                    "session file is not a JSON object"
                );
                None
            }
        }
    }
}

impl SessionSource for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let map = self.read()?;
        match map.get(key)? {
            Value::String(value) => Some(value.clone()),
            Value::Null => None,
            // Objects such as `user` may be stored inline rather than as a
            // serialized string.
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl SessionSource for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }
}
