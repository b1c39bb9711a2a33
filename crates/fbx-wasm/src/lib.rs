//! WebAssembly bindings for Filterboxd
//!
//! `start()` wires the engine to the live page: the document through
//! [`WebDom`], settings through [`LocalStorageStore`] and DOM changes through
//! [`WebObserver`]. The remaining exports are the settings bridge used by the
//! settings panel.

use std::cell::RefCell;

use fbx_core::settings::CommitReport;
use fbx_core::{AppContext, Engine, FilterStore, MutationKind, SettingsDraft};
use log::warn;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use web_sys::Element;

mod dom;
mod logger;
mod storage;

pub use dom::{WebDom, WebObserver};
pub use storage::LocalStorageStore;

type WebEngine = Engine<WebDom, LocalStorageStore, WebObserver>;

thread_local! {
    static ENGINE: RefCell<Option<WebEngine>> = const { RefCell::new(None) };
    /// Store used by the settings bridge before `start()` has run.
    static STANDALONE: RefCell<Option<FilterStore<LocalStorageStore>>> = const { RefCell::new(None) };
    static DRAFT: RefCell<SettingsDraft> = RefCell::new(SettingsDraft::new());
}

fn busy() -> JsValue {
    JsValue::from_str("Filterboxd is busy")
}

#[wasm_bindgen]
pub fn start() -> Result<(), JsValue> {
    logger::init();

    if is_started() {
        return Err(JsValue::from_str("Already started. Reload the page to restart."));
    }

    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("No document"))?;
    let body = document.body().ok_or_else(|| JsValue::from_str("Document has no body"))?;

    let backend = LocalStorageStore::from_window().map_err(|e| JsValue::from_str(&e.to_string()))?;
    let observer = WebObserver::new(body.into())?;
    let app = AppContext::new(WebDom::new(document), FilterStore::new(backend));
    let engine = Engine::new(app, observer);

    ENGINE.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| busy())?;
        slot.insert(engine).start();
        Ok(())
    })
}

#[wasm_bindgen]
pub fn is_started() -> bool {
    ENGINE.with(|cell| cell.try_borrow().map_or(true, |slot| slot.is_some()))
}

/// Observer loop status: `{ started, state, idleMutations, activeMutations }`.
#[wasm_bindgen]
pub fn get_status() -> JsValue {
    let result = js_sys::Object::new();
    ENGINE.with(|cell| {
        let Ok(slot) = cell.try_borrow() else {
            return;
        };
        let _ = js_sys::Reflect::set(&result, &"started".into(), &JsValue::from(slot.is_some()));
        if let Some(engine) = slot.as_ref() {
            let observer = engine.observer_loop();
            let state = format!("{:?}", observer.state());
            let _ = js_sys::Reflect::set(&result, &"state".into(), &JsValue::from_str(&state));
            let _ = js_sys::Reflect::set(&result, &"idleMutations".into(), &JsValue::from(observer.idle_mutations() as f64));
            let _ = js_sys::Reflect::set(&result, &"activeMutations".into(), &JsValue::from(observer.active_mutations() as f64));
        }
    });
    result.into()
}

// =============================================================================
// Event routing
// =============================================================================

pub(crate) fn dispatch_mutations(records: &[MutationKind]) {
    ENGINE.with(|cell| match cell.try_borrow_mut() {
        Ok(mut slot) => {
            if let Some(engine) = slot.as_mut() {
                engine.on_mutations(records);
            }
        }
        Err(_) => warn!("Mutation batch dropped, engine busy"),
    });
}

pub(crate) fn dispatch_click(control: &Element) {
    ENGINE.with(|cell| match cell.try_borrow_mut() {
        Ok(mut slot) => {
            if let Some(engine) = slot.as_mut() {
                engine.on_toggle_click(control);
            }
        }
        Err(_) => warn!("Toggle click dropped, engine busy"),
    });
}

// =============================================================================
// Settings bridge
// =============================================================================

/// Run `f` against the engine's store, or a standalone one if not started.
fn with_store<R>(f: impl FnOnce(&mut FilterStore<LocalStorageStore>) -> R) -> Result<R, JsValue> {
    ENGINE.with(|engine| {
        let mut engine = engine.try_borrow_mut().map_err(|_| busy())?;
        if let Some(engine) = engine.as_mut() {
            return Ok(f(&mut engine.app_mut().store));
        }

        STANDALONE.with(|standalone| {
            let mut standalone = standalone.try_borrow_mut().map_err(|_| busy())?;
            if standalone.is_none() {
                let backend = LocalStorageStore::from_window().map_err(|e| JsValue::from_str(&e.to_string()))?;
                *standalone = Some(FilterStore::new(backend));
            }
            match standalone.as_mut() {
                Some(store) => Ok(f(store)),
                None => Err(busy()),
            }
        })
    })
}

/// JSON text of a stored value, or `undefined` when unset or unreadable.
#[wasm_bindgen]
pub fn get_setting(key: &str) -> Result<Option<String>, JsValue> {
    with_store(|store| store.get(key).map(|value| value.to_string()))
}

/// Stage a JSON value. Persisted by the next `save_settings`.
#[wasm_bindgen]
pub fn set_setting(key: &str, json: &str) -> Result<(), JsValue> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid JSON for '{}': {}", key, e)))?;
    if with_store(|store| store.set(key, &value))? {
        Ok(())
    } else {
        Err(JsValue::from_str(&format!("Failed to write '{}'", key)))
    }
}

#[wasm_bindgen]
pub fn save_settings() -> Result<bool, JsValue> {
    with_store(|store| store.save())
}

#[wasm_bindgen]
pub fn filtered_film_count() -> Result<usize, JsValue> {
    with_store(|store| store.film_filter().len())
}

/// Display labels of the film list, in stored order.
#[wasm_bindgen]
pub fn film_labels() -> Result<js_sys::Array, JsValue> {
    let labels = with_store(|store| store.film_filter().iter().map(|entry| entry.label()).collect::<Vec<_>>())?;
    Ok(labels.into_iter().map(|label| JsValue::from_str(&label)).collect())
}

/// Flip the pending-removal mark on the film at `index`. Returns whether it
/// is now marked.
#[wasm_bindgen]
pub fn toggle_film_removal(index: usize) -> Result<bool, JsValue> {
    let entry = with_store(|store| store.film_filter().entries().get(index).cloned())?
        .ok_or_else(|| JsValue::from_str(&format!("No film at index {}", index)))?;
    DRAFT.with(|draft| {
        let mut draft = draft.try_borrow_mut().map_err(|_| busy())?;
        Ok(draft.toggle_film_removal(&entry))
    })
}

/// Apply pending removals and save once: `{ filmsRemoved, keysWritten, saved }`.
#[wasm_bindgen]
pub fn commit_settings() -> Result<JsValue, JsValue> {
    let draft = DRAFT.with(|draft| {
        draft
            .try_borrow_mut()
            .map(|mut draft| std::mem::take(&mut *draft))
            .map_err(|_| busy())
    })?;
    let report = with_store(|store| draft.commit(store))?;
    Ok(report_object(&report))
}

fn report_object(report: &CommitReport) -> JsValue {
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"filmsRemoved".into(), &JsValue::from(report.films_removed));
    let _ = js_sys::Reflect::set(&result, &"keysWritten".into(), &JsValue::from(report.keys_written));
    let _ = js_sys::Reflect::set(&result, &"saved".into(), &JsValue::from(report.saved));
    result.into()
}
