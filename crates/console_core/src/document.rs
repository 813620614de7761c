//! Headless element tree the views render into.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Slots are never
//! reused, so a handle to a removed node stays harmless: reads return
//! nothing and writes are ignored.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write as _,
};

use crate::selector::{Selector, SelectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct Element {
    tag: String,
    attrs: BTreeMap<String, String>,
    classes: BTreeSet<String>,
    text: String,
    value: String,
    checked: bool,
    disabled: bool,
    hidden: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Declarative description of a subtree, used by the templates.
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    text: String,
    value: String,
    checked: bool,
    hidden: bool,
    children: Vec<ElementSpec>,
}

pub fn el(tag: &str) -> ElementSpec {
    ElementSpec {
        tag: tag.to_string(),
        ..ElementSpec::default()
    }
}

impl ElementSpec {
    /// Adds one or more space separated classes.
    pub fn class(mut self, classes: &str) -> Self {
        self.classes
            .extend(classes.split_whitespace().map(str::to_string));
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.push((name.to_string(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<Option<Element>>,
    root: NodeId,
    attached: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new("div")
    }
}

impl Document {
    /// Creates a document whose root stands for the host container.
    pub fn new(root_tag: &str) -> Self {
        let root = Element {
            tag: root_tag.to_string(),
            ..Element::default()
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            attached: true,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn get(&self, id: NodeId) -> Option<&Element> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Element {
            tag: tag.to_string(),
            ..Element::default()
        }));
        id
    }

    /// Materialises `spec` and appends it under `parent`.
    pub fn build(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let id = self.materialize(spec);
        self.append_child(parent, id);
        id
    }

    /// Materialises `spec` and inserts it under `parent` at `index`.
    pub fn build_at(&mut self, parent: NodeId, index: usize, spec: ElementSpec) -> NodeId {
        let id = self.materialize(spec);
        self.insert_child(parent, index, id);
        id
    }

    fn materialize(&mut self, spec: ElementSpec) -> NodeId {
        let id = self.create_element(&spec.tag);
        if let Some(element) = self.get_mut(id) {
            element.classes.extend(spec.classes);
            element.attrs.extend(spec.attrs);
            element.text = spec.text;
            element.value = spec.value;
            element.checked = spec.checked;
            element.hidden = spec.hidden;
        }
        for child in spec.children {
            let child_id = self.materialize(child);
            self.append_child(id, child_id);
        }
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child);
    }

    /// Inserts `child` under `parent`, moving it if it already has a parent.
    /// `index` is clamped to the number of children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        if self.is_ancestor(child, parent) {
            return;
        }
        self.unlink(child);
        if let Some(element) = self.get_mut(parent) {
            let index = index.min(element.children.len());
            element.children.insert(index, child);
        }
        if let Some(element) = self.get_mut(child) {
            element.parent = Some(parent);
        }
    }

    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Removes `node` from its parent without destroying it.
    pub fn unlink(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        if let Some(element) = self.get_mut(parent) {
            element.children.retain(|child| *child != node);
        }
        if let Some(element) = self.get_mut(node) {
            element.parent = None;
        }
    }

    /// Removes and destroys `node` with its whole subtree. The root cannot
    /// be removed.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root {
            return;
        }
        self.unlink(node);
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(element) = self.nodes.get_mut(id.0).and_then(Option::take) {
                stack.extend(element.children);
            }
        }
    }

    pub fn clear_children(&mut self, node: NodeId) {
        for child in self.children(node).to_vec() {
            self.remove(child);
        }
    }

    /// Swaps `old` for a freshly built subtree at the same position.
    pub fn replace(&mut self, old: NodeId, spec: ElementSpec) -> Option<NodeId> {
        let parent = self.parent(old)?;
        let index = self.index_in_parent(old)?;
        self.remove(old);
        Some(self.build_at(parent, index, spec))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node).and_then(|element| element.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.get(node)
            .map(|element| element.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn index_in_parent(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|child| *child == node)
    }

    /// All descendants of `scope` in document order, excluding `scope`.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.get(node).map(|element| element.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.get(node)
            .and_then(|element| element.attrs.get(name))
            .map(String::as_str)
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        if let Some(element) = self.get_mut(node) {
            element.attrs.insert(name.to_string(), value.into());
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(element) = self.get_mut(node) {
            element.attrs.remove(name);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.get(node)
            .is_some_and(|element| element.classes.contains(class))
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(element) = self.get_mut(node) {
            element.classes.insert(class.to_string());
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(element) = self.get_mut(node) {
            element.classes.remove(class);
        }
    }

    pub fn toggle_class(&mut self, node: NodeId, class: &str, on: bool) {
        if on {
            self.add_class(node, class);
        } else {
            self.remove_class(node, class);
        }
    }

    /// The node's own text, not including descendants.
    pub fn text(&self, node: NodeId) -> &str {
        self.get(node)
            .map(|element| element.text.as_str())
            .unwrap_or_default()
    }

    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(element) = self.get_mut(node) {
            element.text = text.into();
        }
    }

    /// Concatenated text of the node and all of its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = self.text(node).to_string();
        for id in self.descendants(node) {
            out.push_str(self.text(id));
        }
        out
    }

    pub fn value(&self, node: NodeId) -> &str {
        self.get(node)
            .map(|element| element.value.as_str())
            .unwrap_or_default()
    }

    pub fn set_value(&mut self, node: NodeId, value: impl Into<String>) {
        if let Some(element) = self.get_mut(node) {
            element.value = value.into();
        }
    }

    pub fn checked(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|element| element.checked)
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if let Some(element) = self.get_mut(node) {
            element.checked = checked;
        }
    }

    pub fn disabled(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|element| element.disabled)
    }

    pub fn set_disabled(&mut self, node: NodeId, disabled: bool) {
        if let Some(element) = self.get_mut(node) {
            element.disabled = disabled;
        }
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|element| element.hidden)
    }

    pub fn show(&mut self, node: NodeId) {
        if let Some(element) = self.get_mut(node) {
            element.hidden = false;
        }
    }

    pub fn hide(&mut self, node: NodeId) {
        if let Some(element) = self.get_mut(node) {
            element.hidden = true;
        }
    }

    /// Detaches the whole document from its host, as when the enclosing
    /// panel is torn down.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn is_document_attached(&self) -> bool {
        self.attached
    }

    /// True when the node is live and reachable from an attached root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        if !self.attached || !self.contains(node) {
            return false;
        }
        let mut current = node;
        while current != self.root {
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        true
    }

    /// True when the node is attached and neither it nor any ancestor is
    /// hidden.
    pub fn is_visible(&self, node: NodeId) -> bool {
        if !self.is_attached(node) {
            return false;
        }
        let mut current = Some(node);
        while let Some(id) = current {
            if self.is_hidden(id) {
                return false;
            }
            current = self.parent(id);
        }
        true
    }

    /// Iterates the node's classes in sorted order.
    pub fn classes(&self, node: NodeId) -> impl Iterator<Item = &str> {
        self.get(node)
            .into_iter()
            .flat_map(|element| element.classes.iter().map(String::as_str))
    }

    pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    pub fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    /// Parses `selector` and returns every match under `scope`.
    pub fn select_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        Ok(self.query_all(scope, &Selector::parse(selector)?))
    }

    pub fn select(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        Ok(self.query(scope, &Selector::parse(selector)?))
    }

    /// Nearest inclusive ancestor of `node` matching `selector`, not
    /// climbing past `within`.
    pub fn closest(&self, node: NodeId, selector: &Selector, within: NodeId) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if selector.matches(self, id) {
                return Some(id);
            }
            if id == within {
                return None;
            }
            current = self.parent(id);
        }
        None
    }

    /// Renders the subtree as indented pseudo-markup for diagnostics.
    pub fn to_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, 0, &mut out);
        out
    }

    fn write_markup(&self, node: NodeId, depth: usize, out: &mut String) {
        let Some(element) = self.get(node) else {
            return;
        };
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}<{}", element.tag);
        if !element.classes.is_empty() {
            let classes: Vec<&str> = element.classes.iter().map(String::as_str).collect();
            let _ = write!(out, " class=\"{}\"", classes.join(" "));
        }
        for (name, value) in &element.attrs {
            let _ = write!(out, " {name}=\"{value}\"");
        }
        if !element.value.is_empty() {
            let _ = write!(out, " value=\"{}\"", element.value);
        }
        if element.checked {
            out.push_str(" checked");
        }
        if element.disabled {
            out.push_str(" disabled");
        }
        if element.hidden {
            out.push_str(" hidden");
        }
        out.push('>');
        if element.children.is_empty() {
            let _ = writeln!(out, "{}</{}>", element.text, element.tag);
            return;
        }
        out.push('\n');
        if !element.text.is_empty() {
            let _ = writeln!(out, "{indent}  {}", element.text);
        }
        for child in &element.children {
            self.write_markup(*child, depth + 1, out);
        }
        let _ = writeln!(out, "{indent}</{}>", element.tag);
    }
}

#[cfg(test)]
#[path = "tests/document_tests.rs"]
mod tests;
