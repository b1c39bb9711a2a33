//! `web-sys` implementations of the engine's DOM and observer seams.

use fbx_core::{Dom, MutationKind, MutationObserverHandle, Selector};
use log::{debug, error};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, HtmlElement, MutationObserver, MutationObserverInit, MutationRecord, NodeList};

/// The live document behind the [`Dom`] trait.
#[derive(Debug, Clone)]
pub struct WebDom {
    document: Document,
}

impl WebDom {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

fn elements(list: Result<NodeList, JsValue>, selector: &Selector) -> Vec<Element> {
    let list = match list {
        Ok(list) => list,
        Err(e) => {
            debug!("querySelectorAll('{}') failed: {:?}", selector, e);
            return Vec::new();
        }
    };
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

impl Dom for WebDom {
    type Node = Element;

    fn query_all(&self, selector: &Selector) -> Vec<Element> {
        elements(self.document.query_selector_all(&selector.to_string()), selector)
    }

    fn query_all_within(&self, root: &Element, selector: &Selector) -> Vec<Element> {
        elements(root.query_selector_all(&selector.to_string()), selector)
    }

    fn matches(&self, node: &Element, selector: &Selector) -> bool {
        node.matches(&selector.to_string()).unwrap_or(false)
    }

    fn parent(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn children(&self, node: &Element) -> Vec<Element> {
        let children = node.children();
        (0..children.length()).filter_map(|i| children.item(i)).collect()
    }

    fn tag_name(&self, node: &Element) -> String {
        node.tag_name().to_ascii_lowercase()
    }

    fn has_class(&self, node: &Element, class: &str) -> bool {
        node.class_list().contains(class)
    }

    fn add_class(&self, node: &Element, class: &str) {
        if let Err(e) = node.class_list().add_1(class) {
            debug!("Could not add class '{}': {:?}", class, e);
        }
    }

    fn remove_class(&self, node: &Element, class: &str) {
        if let Err(e) = node.class_list().remove_1(class) {
            debug!("Could not remove class '{}': {:?}", class, e);
        }
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn set_attribute(&self, node: &Element, name: &str, value: &str) {
        if let Err(e) = node.set_attribute(name, value) {
            debug!("Could not set attribute '{}': {:?}", name, e);
        }
    }

    fn remove_attribute(&self, node: &Element, name: &str) {
        if let Err(e) = node.remove_attribute(name) {
            debug!("Could not remove attribute '{}': {:?}", name, e);
        }
    }

    fn text(&self, node: &Element) -> String {
        node.text_content().unwrap_or_default()
    }

    fn set_text(&self, node: &Element, text: &str) {
        node.set_text_content(Some(text));
    }

    fn style_property(&self, node: &Element, name: &str) -> Option<String> {
        let value = node.dyn_ref::<HtmlElement>()?.style().get_property_value(name).ok()?;
        (!value.is_empty()).then_some(value)
    }

    fn set_style_property(&self, node: &Element, name: &str, value: &str) {
        match node.dyn_ref::<HtmlElement>() {
            Some(html) => {
                if let Err(e) = html.style().set_property(name, value) {
                    debug!("Could not set style '{}': {:?}", name, e);
                }
            }
            None => debug!("Cannot style non-HTML element {:?}", node),
        }
    }

    fn clone_node(&self, node: &Element) -> Option<Element> {
        node.clone_node_with_deep(true).ok()?.dyn_into::<Element>().ok()
    }

    fn append_child(&self, parent: &Element, child: &Element) -> bool {
        parent.append_child(child).is_ok()
    }

    fn insert_before(&self, parent: &Element, child: &Element, reference: &Element) -> bool {
        parent.insert_before(child, Some(reference)).is_ok()
    }

    fn install_stylesheet(&self, id: &str, css: &str) -> bool {
        if let Some(existing) = self.document.get_element_by_id(id) {
            existing.set_text_content(Some(css));
            return true;
        }

        let Some(head) = self.document.head() else {
            debug!("Document has no <head>");
            return false;
        };
        let style = match self.document.create_element("style") {
            Ok(style) => style,
            Err(e) => {
                error!("Could not create stylesheet: {:?}", e);
                return false;
            }
        };
        style.set_id(id);
        style.set_text_content(Some(css));
        head.append_child(&style).is_ok()
    }

    fn listen_click(&self, node: &Element) {
        let control = node.clone();
        let handler = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            event.prevent_default();
            crate::dispatch_click(&control);
        });
        if let Err(e) = node.add_event_listener_with_callback("click", handler.as_ref().unchecked_ref()) {
            error!("Could not listen for toggle clicks: {:?}", e);
        }
        // The listener lives as long as the control.
        handler.forget();
    }
}

// =============================================================================
// Mutation observer
// =============================================================================

/// `MutationObserver` over the document body, watching child-list changes in
/// the whole subtree.
pub struct WebObserver {
    observer: MutationObserver,
    target: Element,
    _callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
}

impl WebObserver {
    pub fn new(target: Element) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            |records: js_sys::Array, _observer: MutationObserver| {
                let kinds = record_kinds(&records);
                crate::dispatch_mutations(&kinds);
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        Ok(Self {
            observer,
            target,
            _callback: callback,
        })
    }
}

fn record_kinds(records: &js_sys::Array) -> Vec<MutationKind> {
    records
        .iter()
        .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
        .filter_map(|record| MutationKind::from_record_type(&record.type_()))
        .collect()
}

impl MutationObserverHandle for WebObserver {
    fn observe(&mut self) {
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        if let Err(e) = self.observer.observe_with_options(&self.target, &options) {
            error!("Could not observe the document: {:?}", e);
        }
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
    }
}
