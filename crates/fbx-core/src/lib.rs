//! Filterboxd Core Library
//!
//! This crate provides the filter engine behind the Filterboxd overlay. It
//! hides, fades, blurs or replaces films, reviews and page sections on a film
//! site the user does not want to see, and keeps doing so as the page mutates.
//!
//! # Architecture
//!
//! The engine never touches a concrete document or storage backend. The host
//! page is reached through the [`Dom`] trait, persisted settings through
//! [`KeyValueStore`], and the platform mutation observer through
//! [`MutationObserverHandle`]. The wasm crate implements these over `web-sys`;
//! [`MemoryDom`](dom::memory::MemoryDom) and [`MemoryStore`] back the tests,
//! benches and the CLI.
//!
//! # Modules
//!
//! - `types`: filter entries, review/section configs, behaviors
//! - `store`: fail-soft typed Filter Store
//! - `selector`: typed selector builder, validated by `scraper`
//! - `dom`: DOM query/mutate surface and the in-memory DOM
//! - `matcher`: film entry to live nodes, per page context
//! - `treatment`: apply/remove the film behavior on one node
//! - `reviews`, `sections`: review and section filters
//! - `pass`: one Filter Application Pass
//! - `observer`: mutation observer loop with ceilings
//! - `toggle`: injected "Add to filter" controls
//! - `engine`: wires the pieces to the observer
//! - `settings`: batched settings writes with one save
//! - `stylesheet`: generated CSS for the shared classes

pub mod context;
pub mod dom;
pub mod engine;
pub mod markers;
pub mod matcher;
pub mod observer;
pub mod pass;
pub mod reviews;
pub mod sections;
pub mod selector;
pub mod settings;
pub mod store;
pub mod stylesheet;
pub mod toggle;
pub mod treatment;
pub mod types;

// Re-export commonly used types
pub use context::AppContext;
pub use dom::{Dom, MutationKind};
pub use engine::{Engine, StepChanges};
pub use observer::{LoopState, MutationObserverHandle, ObserverLoop};
pub use pass::{apply_filters, PassReport};
pub use selector::{Selector, SelectorError};
pub use settings::SettingsDraft;
pub use store::{FilterStore, KeyValueStore, MemoryStore, StoreError};
pub use toggle::{ToggleError, ToggleOutcome};
pub use types::{
    BehaviorConfig, BehaviorKind, BehaviorType, Behaviors, FilmFilter, FilmFilterEntry, LogLevel,
    MutationLimits, ReviewFilterConfig, SectionFilterConfig,
};
