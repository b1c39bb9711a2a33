//! Engine
//!
//! Ties the application context to the mutation observer loop. The two entry
//! points the host page can reach, mutation batches and toggle clicks, both
//! run their writes with the observer suspended.

use log::{debug, error, info, warn};

use crate::context::AppContext;
use crate::dom::{Dom, MutationKind};
use crate::markers::STYLESHEET_ID;
use crate::observer::{MutationObserverHandle, ObserverLoop};
use crate::pass::apply_filters;
use crate::store::KeyValueStore;
use crate::stylesheet;
use crate::toggle::{
    handle_toggle_click, maybe_insert_context_menu_toggles, maybe_insert_sidebar_toggle, ToggleError, ToggleOutcome,
};

bitflags::bitflags! {
    /// Which steps of one mutation step changed the page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StepChanges: u8 {
        const SIDEBAR_TOGGLE = 1 << 0;
        const MENU_TOGGLES = 1 << 1;
        const FILTERS = 1 << 2;
    }
}

/// Run the per-mutation steps in their fixed order: sidebar toggle, context
/// menu toggles, filter pass.
pub fn run_steps<D: Dom, S: KeyValueStore>(app: &AppContext<D, S>) -> StepChanges {
    let mut changes = StepChanges::empty();
    if maybe_insert_sidebar_toggle(app) {
        changes |= StepChanges::SIDEBAR_TOGGLE;
    }
    if maybe_insert_context_menu_toggles(app) > 0 {
        changes |= StepChanges::MENU_TOGGLES;
    }
    if apply_filters(app).page_updated() {
        changes |= StepChanges::FILTERS;
    }
    changes
}

pub struct Engine<D, S, O> {
    app: AppContext<D, S>,
    observer: ObserverLoop<O>,
}

impl<D, S, O> Engine<D, S, O>
where
    D: Dom,
    S: KeyValueStore,
    O: MutationObserverHandle,
{
    /// Build an engine; ceilings are read from the store.
    pub fn new(app: AppContext<D, S>, observer: O) -> Self {
        let limits = app.store.mutation_limits();
        Self {
            app,
            observer: ObserverLoop::new(observer, limits),
        }
    }

    pub fn app(&self) -> &AppContext<D, S> {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut AppContext<D, S> {
        &mut self.app
    }

    pub fn observer_loop(&self) -> &ObserverLoop<O> {
        &self.observer
    }

    /// Apply the log level, install the stylesheet, run every step once and
    /// start observing.
    pub fn start(&mut self) -> StepChanges {
        log::set_max_level(self.app.store.log_level().to_level_filter());

        let css = stylesheet::generate(&self.app.behaviors);
        if !self.app.dom.install_stylesheet(STYLESHEET_ID, &css) {
            warn!("Could not install the filter stylesheet");
        }

        let changes = run_steps(&self.app);
        self.observer.start();
        info!("Started ({:?})", changes);
        changes
    }

    /// Mutation observer callback.
    pub fn on_mutations(&mut self, records: &[MutationKind]) {
        let app = &self.app;
        self.observer.process_batch(records, || {
            let changes = run_steps(app);
            if !changes.is_empty() {
                debug!("Mutation step changed {:?}", changes);
            }
            !changes.is_empty()
        });
    }

    /// Click handler for injected toggle controls. Failures are logged.
    pub fn on_toggle_click(&mut self, target: &D::Node) -> Option<ToggleOutcome> {
        let app = &mut self.app;
        let result = self.observer.with_suspended(|| handle_toggle_click(app, target));
        match result {
            Ok(outcome) => Some(outcome),
            Err(e @ ToggleError::Storage(_)) => {
                error!("Toggle click failed: {}", e);
                None
            }
            Err(e) => {
                warn!("Toggle click ignored: {}", e);
                None
            }
        }
    }
}

#[cfg(all(test, feature = "memory-dom"))]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryDom, MemoryObserver};
    use crate::markers::FILTERED_FILM;
    use crate::observer::{HaltReason, LoopState};
    use crate::selector::Selector;
    use crate::store::{keys, FilterStore, MemoryStore};
    use crate::types::{BehaviorKind, Behaviors};
    use serde_json::json;

    const PAGE: &str = r##"
        <ul class="poster-list" id="grid">
          <li class="poster-container" id="tile"><div class="film-poster" data-film-id="42" data-film-slug="up" data-film-name="Up" data-film-release-year="2009"><img src="up.jpg"></div></li>
        </ul>
        <div class="film-poster-popmenu"><ul>
          <li><a class="menu-item-add-this-film" data-film-id="42" href="#">Add this film to lists</a></li>
          <li><a class="popmenu-textitem" href="/film/up/">Where to watch</a></li>
        </ul></div>
    "##;

    fn engine_for(html: &str, store: MemoryStore) -> Engine<MemoryDom, MemoryStore, MemoryObserver> {
        let dom = MemoryDom::from_html(html);
        let observer = dom.observer();
        Engine::new(AppContext::new(dom, FilterStore::new(store)), observer)
    }

    /// Deliver whatever the observer queued, as the platform would.
    fn deliver(engine: &mut Engine<MemoryDom, MemoryStore, MemoryObserver>) -> usize {
        let records = engine.observer_loop().observer().take_records();
        let delivered = records.len();
        if delivered > 0 {
            engine.on_mutations(&records);
        }
        delivered
    }

    fn filtered(engine: &Engine<MemoryDom, MemoryStore, MemoryObserver>, id: &str) -> bool {
        let dom = &engine.app().dom;
        dom.element_by_id(id).map_or(false, |node| dom.has_class(&node, FILTERED_FILM))
    }

    #[test]
    fn start_installs_stylesheet_and_observes() {
        let store = MemoryStore::new()
            .with_value("filmBehaviorType", json!("Blur"))
            .with_value("filmBehaviorBlurAmount", json!(5));
        let mut engine = engine_for(PAGE, store);

        let changes = engine.start();

        assert!(changes.contains(StepChanges::MENU_TOGGLES));
        assert!(!changes.contains(StepChanges::FILTERS));
        assert_eq!(engine.app().behaviors.film, BehaviorKind::Blur { amount: 5 });
        let dom = &engine.app().dom;
        let sheet = dom.query_first(&Selector::parse("head style#fbx-stylesheet").unwrap()).unwrap();
        assert!(dom.text(&sheet).contains(".fbx-filtered-film { filter: blur(5px); }"));
        assert_eq!(engine.observer_loop().state(), LoopState::Observing);
        assert_eq!(deliver(&mut engine), 0);
    }

    #[test]
    fn own_writes_do_not_retrigger_the_observer() {
        let store = MemoryStore::new().with_value(keys::FILM_FILTER, json!([{ "id": 42, "slug": "up", "name": "Up" }]));
        let mut engine = engine_for("<ul id=\"grid\"></ul>", store);
        engine.start();

        let grid = engine.app().dom.element_by_id("grid").unwrap();
        engine.app().dom.append_html(
            grid,
            r#"<li class="poster-container" id="late"><div class="film-poster" data-film-id="42"></div><div class="film-poster-popmenu"><ul><li><a class="menu-item-add-this-film" data-film-id="42">Add</a></li></ul></div></li>"#,
        );

        assert_eq!(deliver(&mut engine), 1);
        assert!(filtered(&engine, "late"));
        assert_eq!(engine.observer_loop().active_mutations(), 1);
        assert_eq!(engine.observer_loop().idle_mutations(), 0);

        // The menu control was appended while disconnected.
        assert_eq!(engine.app().dom.query_all(&engine.app().toggles.control).len(), 1);
        assert_eq!(deliver(&mut engine), 0);
        assert_eq!(engine.observer_loop().active_mutations(), 1);
        assert!(engine.observer_loop().observer().is_connected());
    }

    #[test]
    fn idle_churn_halts_the_loop() {
        let store = MemoryStore::new().with_value(keys::MAX_IDLE_MUTATIONS, json!(3));
        let mut engine = engine_for("<div id=\"feed\"></div>", store);
        engine.start();
        let feed = engine.app().dom.element_by_id("feed").unwrap();

        let mut delivered = 0;
        for _ in 0..10 {
            engine.app().dom.append_html(feed, "<p>polling widget</p>");
            delivered += deliver(&mut engine);
        }

        assert_eq!(delivered, 4);
        assert_eq!(engine.observer_loop().state(), LoopState::Halted);
        assert_eq!(engine.observer_loop().halt_reason(), Some(HaltReason::IdleCeiling));
        assert!(!engine.observer_loop().observer().is_connected());
    }

    #[test]
    fn toggle_click_runs_suspended() {
        let mut engine = engine_for(PAGE, MemoryStore::new());
        engine.start();
        let control = engine.app().dom.query_first(&engine.app().toggles.control).unwrap();

        let outcome = engine.on_toggle_click(&control).unwrap();

        assert!(outcome.hidden);
        assert!(filtered(&engine, "tile"));
        assert_eq!(deliver(&mut engine), 0);
        assert_eq!(engine.observer_loop().active_mutations(), 0);
        assert_eq!(engine.observer_loop().state(), LoopState::Observing);
        assert_eq!(engine.observer_loop().observer().connect_count(), 2);
    }

    #[test]
    fn bad_click_is_contained() {
        let mut engine = engine_for(PAGE, MemoryStore::new());
        engine.start();
        let tile = engine.app().dom.element_by_id("tile").unwrap();

        assert_eq!(engine.on_toggle_click(&tile), None);
        assert_eq!(engine.observer_loop().state(), LoopState::Observing);
    }

    #[test]
    fn add_then_reload_marks_every_fragment() {
        let mut engine = engine_for(PAGE, MemoryStore::new());
        engine.start();
        let control = engine.app().dom.query_first(&engine.app().toggles.control).unwrap();
        engine.on_toggle_click(&control).unwrap();
        assert_eq!(
            engine.app().store.backend().persisted(keys::FILM_FILTER),
            Some(json!([{ "id": 42, "slug": "up", "name": "Up", "year": "2009" }]))
        );

        // A new page load with the persisted settings.
        let persisted = engine.app().store.backend().clone();
        let page = r#"
            <ul><li class="poster-container" id="poster"><div class="film-poster" data-film-id="42"></div></li></ul>
            <div class="review-tile" id="review"><div><div><div class="film-poster" data-film-id="42"></div></div></div></div>
            <section class="activity-row" id="activity"><div><div><span data-film-id="42"></span></div></div></section>
        "#;
        let mut reloaded = engine_for(page, persisted);
        let changes = reloaded.start();

        assert!(changes.contains(StepChanges::FILTERS));
        assert!(filtered(&reloaded, "poster"));
        assert!(filtered(&reloaded, "review"));
        assert!(filtered(&reloaded, "activity"));
    }

    #[test]
    fn behaviors_can_be_overridden() {
        let dom = MemoryDom::from_html(PAGE);
        let observer = dom.observer();
        let app = AppContext::new(dom, FilterStore::new(MemoryStore::new())).with_behaviors(Behaviors {
            film: BehaviorKind::Remove,
            ..Behaviors::default()
        });
        let mut engine = Engine::new(app, observer);

        engine.start();

        let dom = &engine.app().dom;
        let sheet = dom.query_first(&Selector::parse("style#fbx-stylesheet").unwrap()).unwrap();
        assert!(dom.text(&sheet).contains("display: none !important;"));
    }
}
