//! In-memory DOM
//!
//! A [`scraper::Html`] document implementing [`Dom`], with a mutation observer
//! spy. Queries compile the rendered selector with [`scraper::Selector`] and
//! match it against the document's `ego_tree`, which is also mutated in place.
//! Attribute edits rebuild the node's [`Element`] so its cached id and class
//! list stay in step with its attributes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ego_tree::{NodeRef, Tree};
use html5ever::tendril::StrTendril;
use html5ever::{ns, Attribute, LocalName, QualName};
use log::debug;
use scraper::node::{Element, Text};
use scraper::{CaseSensitivity, ElementRef, Html, Node};

use super::{Dom, MutationKind};
use crate::observer::MutationObserverHandle;
use crate::selector::Selector;

/// Handle to a node in a [`MemoryDom`].
pub use ego_tree::NodeId;

#[derive(Debug)]
struct Document {
    html: Html,
    head: NodeId,
    body: NodeId,
    click_targets: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct ObserverState {
    connected: Cell<bool>,
    connects: Cell<usize>,
    records: RefCell<Vec<MutationKind>>,
}

/// Shared, cheaply clonable in-memory document.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    doc: Rc<RefCell<Document>>,
    observer: Rc<ObserverState>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        Self {
            doc: Rc::new(RefCell::new(Document::new())),
            observer: Rc::new(ObserverState::default()),
        }
    }

    /// Document whose body holds the given HTML fragment.
    pub fn from_html(html: &str) -> Self {
        let dom = Self::new();
        {
            let mut doc = dom.doc.borrow_mut();
            let body = doc.body;
            doc.import_fragment(html, body);
        }
        dom
    }

    pub fn body(&self) -> NodeId {
        self.doc.borrow().body
    }

    pub fn head(&self) -> NodeId {
        self.doc.borrow().head
    }

    /// Append a fragment under `parent` the way host-page scripts would,
    /// producing a child-list record if the observer is connected.
    pub fn append_html(&self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let added = self.doc.borrow_mut().import_fragment(html, parent);
        self.record(MutationKind::ChildList);
        added
    }

    /// First element with the given `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let doc = self.doc.borrow();
        let found = doc
            .html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().id() == Some(id))
            .map(|element| element.id());
        found
    }

    /// Short `tag#id.class` description, for reports and assertion messages.
    pub fn describe(&self, node: NodeId) -> String {
        let doc = self.doc.borrow();
        let Some(element) = doc.element(node) else {
            return String::from("#text");
        };
        let mut out = element.name().to_string();
        if let Some(id) = element.id() {
            out.push('#');
            out.push_str(id);
        }
        for class in element.attr("class").unwrap_or("").split_whitespace() {
            out.push('.');
            out.push_str(class);
        }
        out
    }

    /// Elements registered through [`Dom::listen_click`].
    pub fn click_targets(&self) -> Vec<NodeId> {
        self.doc.borrow().click_targets.clone()
    }

    /// Observer handle sharing this document's record queue.
    pub fn observer(&self) -> MemoryObserver {
        MemoryObserver {
            state: Rc::clone(&self.observer),
        }
    }

    fn record(&self, kind: MutationKind) {
        // Only child-list changes are observed, matching the engine's observe options.
        if kind == MutationKind::ChildList && self.observer.connected.get() {
            self.observer.records.borrow_mut().push(kind);
        }
    }

    /// Elements in `scope`'s subtree matching `selector`, in document order.
    fn select(&self, scope: Option<NodeId>, selector: &Selector) -> Vec<NodeId> {
        let compiled = match selector.to_scraper() {
            Ok(compiled) => compiled,
            Err(e) => {
                debug!("Query skipped: {}", e);
                return Vec::new();
            }
        };

        let doc = self.doc.borrow();
        let (start, skip) = match scope {
            Some(root) => (doc.html.tree.get(root), 1),
            None => (Some(doc.html.tree.root()), 0),
        };
        let found: Vec<NodeId> = start
            .into_iter()
            .flat_map(|start| start.descendants().skip(skip))
            .filter_map(ElementRef::wrap)
            .filter(|element| compiled.matches(element))
            .map(|element| element.id())
            .collect();
        found
    }
}

/// Spy standing in for the platform `MutationObserver`.
#[derive(Debug, Clone)]
pub struct MemoryObserver {
    state: Rc<ObserverState>,
}

impl MemoryObserver {
    pub fn is_connected(&self) -> bool {
        self.state.connected.get()
    }

    /// Number of times `observe` connected the observer.
    pub fn connect_count(&self) -> usize {
        self.state.connects.get()
    }

    /// Records queued since the last call.
    pub fn take_records(&self) -> Vec<MutationKind> {
        std::mem::take(&mut *self.state.records.borrow_mut())
    }

    /// Queue a record directly, as if the platform delivered it.
    pub fn push_record(&self, kind: MutationKind) {
        if self.state.connected.get() {
            self.state.records.borrow_mut().push(kind);
        }
    }
}

impl MutationObserverHandle for MemoryObserver {
    fn observe(&mut self) {
        if !self.state.connected.replace(true) {
            self.state.connects.set(self.state.connects.get() + 1);
        }
    }

    fn disconnect(&mut self) {
        self.state.connected.set(false);
        // Like the platform, a disconnect discards undelivered records.
        self.state.records.borrow_mut().clear();
    }
}

// =============================================================================
// Dom implementation
// =============================================================================

impl Dom for MemoryDom {
    type Node = NodeId;

    fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.select(None, selector)
    }

    fn query_all_within(&self, root: &NodeId, selector: &Selector) -> Vec<NodeId> {
        self.select(Some(*root), selector)
    }

    fn matches(&self, node: &NodeId, selector: &Selector) -> bool {
        let Ok(compiled) = selector.to_scraper() else {
            return false;
        };
        let doc = self.doc.borrow();
        let matched = doc.element_ref(*node).is_some_and(|element| compiled.matches(&element));
        matched
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        let doc = self.doc.borrow();
        let parent = doc
            .html
            .tree
            .get(*node)
            .and_then(|node| node.parent())
            .and_then(ElementRef::wrap)
            .map(|element| element.id());
        parent
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.doc.borrow().element_children(*node)
    }

    fn tag_name(&self, node: &NodeId) -> String {
        let doc = self.doc.borrow();
        let name = doc.element(*node).map(|element| element.name().to_string());
        name.unwrap_or_default()
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        let doc = self.doc.borrow();
        let found = doc
            .element(*node)
            .is_some_and(|element| element.has_class(class, CaseSensitivity::CaseSensitive));
        found
    }

    fn add_class(&self, node: &NodeId, class: &str) {
        let mut doc = self.doc.borrow_mut();
        let mut classes = doc.classes(*node);
        if classes.iter().any(|c| c == class) {
            return;
        }
        classes.push(class.to_string());
        doc.set_attr(*node, "class", Some(&classes.join(" ")));
    }

    fn remove_class(&self, node: &NodeId, class: &str) {
        let mut doc = self.doc.borrow_mut();
        let classes = doc.classes(*node);
        if !classes.iter().any(|c| c == class) {
            return;
        }
        let kept: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
        doc.set_attr(*node, "class", Some(&kept.join(" ")));
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.doc.borrow().attr(*node, name)
    }

    fn set_attribute(&self, node: &NodeId, name: &str, value: &str) {
        self.doc.borrow_mut().set_attr(*node, name, Some(value));
    }

    fn remove_attribute(&self, node: &NodeId, name: &str) {
        self.doc.borrow_mut().set_attr(*node, name, None);
    }

    fn text(&self, node: &NodeId) -> String {
        let doc = self.doc.borrow();
        let text = doc.element_ref(*node).map(|element| element.text().collect::<String>());
        text.unwrap_or_default()
    }

    fn set_text(&self, node: &NodeId, text: &str) {
        self.doc.borrow_mut().replace_children_with_text(*node, text);
        self.record(MutationKind::ChildList);
    }

    fn style_property(&self, node: &NodeId, name: &str) -> Option<String> {
        let style = self.doc.borrow().attr(*node, "style")?;
        parse_style(&style)
            .into_iter()
            .find(|(prop, _)| prop == name)
            .map(|(_, value)| value)
    }

    fn set_style_property(&self, node: &NodeId, name: &str, value: &str) {
        let mut doc = self.doc.borrow_mut();
        let mut declarations = doc.attr(*node, "style").map(|style| parse_style(&style)).unwrap_or_default();
        match declarations.iter_mut().find(|(prop, _)| prop == name) {
            Some(existing) => existing.1 = value.to_string(),
            None => declarations.push((name.to_string(), value.to_string())),
        }
        let rendered: Vec<String> = declarations
            .iter()
            .map(|(prop, value)| format!("{prop}: {value};"))
            .collect();
        doc.set_attr(*node, "style", Some(&rendered.join(" ")));
    }

    fn clone_node(&self, node: &NodeId) -> Option<NodeId> {
        self.doc.borrow_mut().deep_clone(*node)
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) -> bool {
        let appended = self.doc.borrow_mut().append(*parent, *child);
        if appended {
            self.record(MutationKind::ChildList);
        }
        appended
    }

    fn insert_before(&self, parent: &NodeId, child: &NodeId, reference: &NodeId) -> bool {
        let inserted = self.doc.borrow_mut().insert_before(*parent, *child, *reference);
        if inserted {
            self.record(MutationKind::ChildList);
        }
        inserted
    }

    fn install_stylesheet(&self, id: &str, css: &str) -> bool {
        let existing = {
            let doc = self.doc.borrow();
            let head = doc.head;
            let found = doc
                .element_children(head)
                .into_iter()
                .find(|node| doc.element(*node).is_some_and(|e| e.name() == "style" && e.id() == Some(id)));
            found
        };

        let style = match existing {
            Some(style) => style,
            None => {
                let style = self.doc.borrow_mut().create("style", &[("id", id)]);
                let head = self.head();
                self.append_child(&head, &style);
                style
            }
        };

        self.set_text(&style, css);
        true
    }

    fn listen_click(&self, node: &NodeId) {
        let mut doc = self.doc.borrow_mut();
        if !doc.click_targets.contains(node) {
            doc.click_targets.push(*node);
        }
    }
}

// =============================================================================
// Document internals
// =============================================================================

impl Document {
    fn new() -> Self {
        let mut html = Html::parse_document("");
        let root = html.root_element().id();
        let head = child_named(&html.tree, root, "head").unwrap_or_else(|| append_element(&mut html.tree, root, "head"));
        let body = child_named(&html.tree, root, "body").unwrap_or_else(|| append_element(&mut html.tree, root, "body"));
        Self {
            html,
            head,
            body,
            click_targets: Vec::new(),
        }
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.html.tree.get(node)?.value().as_element()
    }

    fn element_ref(&self, node: NodeId) -> Option<ElementRef<'_>> {
        ElementRef::wrap(self.html.tree.get(node)?)
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node)
            .map(|node| node.children().filter(|child| child.value().is_element()).map(|child| child.id()).collect())
            .unwrap_or_default()
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.attr(&name.to_ascii_lowercase()).map(str::to_string)
    }

    fn classes(&self, node: NodeId) -> Vec<String> {
        self.attr(node, "class")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Set (`Some`) or remove (`None`) one attribute, rebuilding the element.
    fn set_attr(&mut self, node: NodeId, name: &str, value: Option<&str>) {
        let name = name.to_ascii_lowercase();
        let Some(element) = self.element(node) else {
            return;
        };
        let mut attributes: Vec<Attribute> = element
            .attrs()
            .filter(|(existing, _)| *existing != name)
            .map(|(existing, current)| attribute(existing, current))
            .collect();
        if let Some(value) = value {
            attributes.push(attribute(&name, value));
        }
        let rebuilt = Element::new(element.name.clone(), attributes);

        if let Some(mut node) = self.html.tree.get_mut(node) {
            *node.value() = Node::Element(rebuilt);
        }
    }

    /// Detached element with the given attributes.
    fn create(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let attributes = attributes.iter().map(|(name, value)| attribute(name, value)).collect();
        self.html.tree.orphan(element_node(tag, attributes)).id()
    }

    fn replace_children_with_text(&mut self, node: NodeId, text: &str) {
        let Some(current) = self.html.tree.get(node) else {
            return;
        };
        let children: Vec<NodeId> = current.children().map(|child| child.id()).collect();
        for child in children {
            if let Some(mut child) = self.html.tree.get_mut(child) {
                child.detach();
            }
        }
        if let Some(mut node) = self.html.tree.get_mut(node) {
            node.append(Node::Text(Text {
                text: scraper::StrTendril::from_slice(text),
            }));
        }
    }

    /// Whether moving `child` under `parent` would put a node inside itself.
    fn would_cycle(&self, parent: NodeId, child: NodeId) -> bool {
        parent == child
            || self
                .html
                .tree
                .get(parent)
                .is_some_and(|parent| parent.ancestors().any(|ancestor| ancestor.id() == child))
    }

    fn append(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.html.tree.get(child).is_none() || self.would_cycle(parent, child) {
            return false;
        }
        match self.html.tree.get_mut(parent) {
            Some(mut parent) => {
                parent.append_id(child);
                true
            }
            None => false,
        }
    }

    fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> bool {
        let reference_parent = self.html.tree.get(reference).and_then(|node| node.parent()).map(|node| node.id());
        if child == reference || reference_parent != Some(parent) || self.would_cycle(parent, child) {
            return false;
        }
        if self.html.tree.get(child).is_none() {
            return false;
        }
        match self.html.tree.get_mut(reference) {
            Some(mut reference) => {
                reference.insert_id_before(child);
                true
            }
            None => false,
        }
    }

    fn deep_clone(&mut self, node: NodeId) -> Option<NodeId> {
        let source = self.html.tree.get(node)?;
        let value = source.value().clone();
        let children: Vec<NodeId> = source.children().map(|child| child.id()).collect();

        let copy = self.html.tree.orphan(value).id();
        for child in children {
            if let Some(child_copy) = self.deep_clone(child) {
                self.append(copy, child_copy);
            }
        }
        Some(copy)
    }

    /// Parse `html` in a body context and append its elements and text under
    /// `parent`. Returns the top-level elements added.
    fn import_fragment(&mut self, html: &str, parent: NodeId) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(html);
        let source = *fragment.root_element();
        let mut added = Vec::new();
        for child in source.children() {
            if let Some(copy) = self.import(child) {
                if self.append(parent, copy) && child.value().is_element() {
                    added.push(copy);
                }
            }
        }
        added
    }

    fn import(&mut self, source: NodeRef<'_, Node>) -> Option<NodeId> {
        match source.value() {
            Node::Element(_) | Node::Text(_) => {}
            _ => return None,
        }
        let copy = self.html.tree.orphan(source.value().clone()).id();
        for child in source.children() {
            if let Some(child_copy) = self.import(child) {
                self.append(copy, child_copy);
            }
        }
        Some(copy)
    }
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, ns!(), LocalName::from(name)),
        value: StrTendril::from_slice(value),
    }
}

fn element_node(tag: &str, attributes: Vec<Attribute>) -> Node {
    let name = QualName::new(None, ns!(html), LocalName::from(tag.to_ascii_lowercase()));
    Node::Element(Element::new(name, attributes))
}

fn child_named(tree: &Tree<Node>, parent: NodeId, name: &str) -> Option<NodeId> {
    tree.get(parent)?
        .children()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == name)
        .map(|element| element.id())
}

fn append_element(tree: &mut Tree<Node>, parent: NodeId, tag: &str) -> NodeId {
    let id = tree.orphan(element_node(tag, Vec::new())).id();
    if let Some(mut parent) = tree.get_mut(parent) {
        parent.append_id(id);
    }
    id
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (prop, value) = declaration.split_once(':')?;
            let prop = prop.trim();
            if prop.is_empty() {
                return None;
            }
            Some((prop.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}
