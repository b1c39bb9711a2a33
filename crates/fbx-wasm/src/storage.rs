//! `window.localStorage` backend for the Filter Store.

use std::collections::HashMap;

use fbx_core::{KeyValueStore, StoreError};
use wasm_bindgen::JsValue;
use web_sys::Storage;

/// Prefix applied to every persisted key.
pub const KEY_PREFIX: &str = "filterboxd.";

/// Local storage with writes staged in memory until [`KeyValueStore::save`].
#[derive(Debug)]
pub struct LocalStorageStore {
    storage: Storage,
    staged: HashMap<String, String>,
}

impl LocalStorageStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            staged: HashMap::new(),
        }
    }

    /// The window's local storage, if the page may use it.
    pub fn from_window() -> Result<Self, StoreError> {
        let window = web_sys::window().ok_or_else(|| StoreError::Unavailable("no window".to_string()))?;
        match window.local_storage() {
            Ok(Some(storage)) => Ok(Self::new(storage)),
            Ok(None) => Err(StoreError::Unavailable("localStorage is disabled".to_string())),
            Err(e) => Err(StoreError::Unavailable(js_error(&e))),
        }
    }
}

fn prefixed(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

fn js_error(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.staged.get(key) {
            return Ok(Some(value.clone()));
        }
        self.storage
            .get_item(&prefixed(key))
            .map_err(|e| StoreError::Backend(js_error(&e)))
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.staged.insert(key.to_string(), value);
        Ok(())
    }

    fn save(&mut self) -> Result<(), StoreError> {
        // Writes that fail stay staged for the next save.
        let mut first_error = None;
        for (key, value) in std::mem::take(&mut self.staged) {
            if let Err(e) = self.storage.set_item(&prefixed(&key), &value) {
                first_error.get_or_insert_with(|| format!("{}: {}", key, js_error(&e)));
                self.staged.insert(key, value);
            }
        }
        match first_error {
            Some(message) => Err(StoreError::Backend(message)),
            None => Ok(()),
        }
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use fbx_core::FilterStore;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn writes_are_staged_until_save() {
        let mut backend = LocalStorageStore::from_window().unwrap();
        backend.storage.remove_item("filterboxd.logLevel").unwrap();
        let mut store = FilterStore::new(backend);

        assert!(store.set(fbx_core::store::keys::LOG_LEVEL, &serde_json::json!("debug")));
        let raw = store.backend().storage.get_item("filterboxd.logLevel").unwrap();
        assert_eq!(raw, None);
        assert_eq!(store.log_level(), fbx_core::LogLevel::Debug);

        assert!(store.save());
        let raw = store.backend().storage.get_item("filterboxd.logLevel").unwrap();
        assert_eq!(raw.as_deref(), Some("\"debug\""));
        store.backend().storage.remove_item("filterboxd.logLevel").unwrap();
    }
}
