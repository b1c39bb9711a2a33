//! DOM Query/Mutate Surface
//!
//! The engine never touches a concrete document. Everything it needs from the
//! host page goes through [`Dom`], implemented over `web-sys` in the wasm crate
//! and by [`memory::MemoryDom`] for tests, benches and offline previews.

use std::fmt::Debug;

use crate::selector::Selector;

#[cfg(feature = "memory-dom")]
pub mod memory;

/// Kind of a delivered mutation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

impl MutationKind {
    /// Parse the platform's `MutationRecord.type` string.
    pub fn from_record_type(value: &str) -> Option<Self> {
        match value {
            "childList" => Some(Self::ChildList),
            "attributes" => Some(Self::Attributes),
            "characterData" => Some(Self::CharacterData),
            _ => None,
        }
    }
}

/// Element-level access to the live document.
///
/// All methods take `&self`: DOM handles are shared references into a document
/// owned elsewhere, so mutation goes through interior mutability just like the
/// browser's own bindings.
pub trait Dom {
    /// Opaque element handle.
    type Node: Clone + PartialEq + Debug;

    /// All elements in the document matching `selector`, in document order.
    fn query_all(&self, selector: &Selector) -> Vec<Self::Node>;

    /// Descendants of `root` matching `selector`, in document order.
    fn query_all_within(&self, root: &Self::Node, selector: &Selector) -> Vec<Self::Node>;

    fn matches(&self, node: &Self::Node, selector: &Selector) -> bool;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn tag_name(&self, node: &Self::Node) -> String;

    fn has_class(&self, node: &Self::Node, class: &str) -> bool;

    fn add_class(&self, node: &Self::Node, class: &str);

    fn remove_class(&self, node: &Self::Node, class: &str);

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);

    fn remove_attribute(&self, node: &Self::Node, name: &str);

    /// Concatenated text of the node's subtree.
    fn text(&self, node: &Self::Node) -> String;

    /// Replace the node's children with a single text node.
    fn set_text(&self, node: &Self::Node, text: &str);

    /// Inline style property value, if set.
    fn style_property(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn set_style_property(&self, node: &Self::Node, name: &str, value: &str);

    /// Detached copy of `node` (deep copies the subtree).
    fn clone_node(&self, node: &Self::Node) -> Option<Self::Node>;

    fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> bool;

    fn insert_before(&self, parent: &Self::Node, child: &Self::Node, reference: &Self::Node) -> bool;

    /// Create or replace the `<style>` element with `id` in the document head.
    fn install_stylesheet(&self, id: &str, css: &str) -> bool;

    /// Route future clicks on `node` to the toggle handler.
    fn listen_click(&self, node: &Self::Node);

    // -------------------------------------------------------------------------
    // Provided helpers
    // -------------------------------------------------------------------------

    fn query_first(&self, selector: &Selector) -> Option<Self::Node> {
        self.query_all(selector).into_iter().next()
    }

    fn query_first_within(&self, root: &Self::Node, selector: &Selector) -> Option<Self::Node> {
        self.query_all_within(root, selector).into_iter().next()
    }

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, node: &Self::Node, selector: &Selector) -> Option<Self::Node> {
        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if self.matches(&candidate, selector) {
                return Some(candidate);
            }
            current = self.parent(&candidate);
        }
        None
    }

    fn first_element_child(&self, node: &Self::Node) -> Option<Self::Node> {
        self.children(node).into_iter().next()
    }
}

/// Walk up `levels` parents from `node`, stopping at the highest ancestor if
/// the document root is reached first.
pub fn ancestor_at<D: Dom>(dom: &D, node: &D::Node, levels: usize) -> D::Node {
    let mut target = node.clone();
    for _ in 0..levels {
        match dom.parent(&target) {
            Some(parent) => target = parent,
            None => break,
        }
    }
    target
}
