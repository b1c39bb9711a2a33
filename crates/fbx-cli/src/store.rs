//! Settings export file as a Filter Store backend.
//!
//! The file is one JSON object mapping persisted keys to their values, the
//! same shape the settings panel exports.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use fbx_core::{KeyValueStore, StoreError};
use serde_json::Value;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    persisted: BTreeMap<String, Value>,
    staged: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open an export. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let persisted = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Json {
                key: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Unavailable(format!("{}: {}", path.display(), e))),
        };
        Ok(Self {
            path,
            persisted,
            staged: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .staged
            .get(key)
            .or_else(|| self.persisted.get(key))
            .map(Value::to_string))
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let value = serde_json::from_str(&value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        self.staged.insert(key.to_string(), value);
        Ok(())
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let mut merged = self.persisted.clone();
        merged.extend(self.staged.iter().map(|(key, value)| (key.clone(), value.clone())));

        let text = serde_json::to_string_pretty(&merged).map_err(|source| StoreError::Json {
            key: self.path.display().to_string(),
            source,
        })?;
        fs::write(&self.path, text + "\n")
            .map_err(|e| StoreError::Backend(format!("{}: {}", self.path.display(), e)))?;

        self.persisted = merged;
        self.staged.clear();
        Ok(())
    }
}
