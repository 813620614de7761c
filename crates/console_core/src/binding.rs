//! Two-way binding between config options and form controls.
//!
//! Each bound control remembers the last value the model pushed to it. The
//! DOM only diverges from that value while the user holds an unsaved edit
//! (`modified`); what happens when the model moves underneath such an edit
//! is decided by [`ConflictPolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::domain::{ConfigMap, ConfigValue};
use tracing::debug;

use crate::{
    document::{Document, NodeId},
    error::ViewError,
    selector::Selector,
    textarea::{ResizingTextarea, TextareaSizing},
};

pub const BIND_ATTR: &str = "data-bind";
pub const CONFIG_BIND_PREFIX: &str = "config.";
pub const MODIFIED_CLASS: &str = "modified";
pub const CONFLICT_CLASS: &str = "conflict";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    MultiLine,
    Checkbox,
}

impl FieldKind {
    pub fn detect(doc: &Document, node: NodeId) -> Self {
        match (doc.tag(node), doc.attr(node, "type")) {
            (Some("textarea"), _) => Self::MultiLine,
            (Some("input"), Some("checkbox")) => Self::Checkbox,
            _ => Self::Text,
        }
    }

    /// The control's current value in its submitted string form.
    pub fn read(self, doc: &Document, node: NodeId) -> String {
        match self {
            Self::Checkbox => doc.checked(node).to_string(),
            Self::Text | Self::MultiLine => doc.value(node).to_string(),
        }
    }

    fn model_string(self, value: Option<&ConfigValue>) -> String {
        match self {
            Self::Checkbox => value.is_some_and(ConfigValue::as_bool).to_string(),
            Self::Text | Self::MultiLine => {
                value.map(ConfigValue::to_field_string).unwrap_or_default()
            }
        }
    }
}

/// What a model push does to a field the user is editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the user's value and flag the field as conflicted.
    #[default]
    Preserve,
    /// Replace the user's value with the incoming one.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepMine,
    TakeTheirs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingUpdate {
    Applied,
    Conflicted,
    Overwritten,
}

#[derive(Debug, Clone)]
pub struct FieldBinding {
    pub key: String,
    pub node: NodeId,
    pub kind: FieldKind,
    model_value: Option<ConfigValue>,
    modified: bool,
    conflict: Option<Option<ConfigValue>>,
    resizer: Option<ResizingTextarea>,
}

impl FieldBinding {
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_conflicted(&self) -> bool {
        self.conflict.is_some()
    }

    pub fn model_value(&self) -> Option<&ConfigValue> {
        self.model_value.as_ref()
    }

    pub fn resizer(&self) -> Option<&ResizingTextarea> {
        self.resizer.as_ref()
    }

    /// Pushes `value` into the control using the kind's reconciliation rule.
    /// Never raises a user-input event.
    fn apply(&mut self, doc: &mut Document, value: Option<&ConfigValue>) {
        match self.kind {
            FieldKind::Checkbox => {
                let checked = value.is_some_and(ConfigValue::as_bool);
                if checked != doc.checked(self.node) {
                    doc.set_checked(self.node, checked);
                    let label = value
                        .map(ConfigValue::to_field_string)
                        .unwrap_or_else(|| checked.to_string());
                    set_toggle_label(doc, self.node, &label);
                }
            }
            FieldKind::Text => {
                let text = self.kind.model_string(value);
                doc.set_value(self.node, text);
            }
            FieldKind::MultiLine => {
                let text = self.kind.model_string(value);
                doc.set_value(self.node, text.clone());
                if let Some(resizer) = self.resizer.as_mut() {
                    resizer.run_change(doc, self.node, &text);
                }
            }
        }
    }

    fn diverges(&self, doc: &Document) -> bool {
        self.kind.read(doc, self.node) != self.kind.model_string(self.model_value.as_ref())
    }

    fn set_modified(&mut self, doc: &mut Document, modified: bool) {
        self.modified = modified;
        doc.toggle_class(self.node, MODIFIED_CLASS, modified);
    }

    fn clear_conflict(&mut self, doc: &mut Document) {
        self.conflict = None;
        doc.remove_class(self.node, CONFLICT_CLASS);
    }
}

/// Refreshes the textual label that sits next to a checkbox toggle.
fn set_toggle_label(doc: &mut Document, node: NodeId, label: &str) {
    let Ok(toggle) = Selector::parse(".toggle") else {
        return;
    };
    let Ok(textvalue) = Selector::parse(".textvalue") else {
        return;
    };
    let Some(wrapper) = doc.closest(node, &toggle, doc.root()) else {
        return;
    };
    if let Some(text_node) = doc.query(wrapper, &textvalue) {
        doc.set_text(text_node, label);
    }
}

#[derive(Debug, Default)]
pub struct BindingEngine {
    fields: BTreeMap<String, FieldBinding>,
    policy: ConflictPolicy,
}

impl BindingEngine {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            fields: BTreeMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    /// Binds every `data-bind="config.<key>"` control under `scope` and
    /// brings it in line with `model`. Previous bindings are dropped.
    pub fn bind(&mut self, doc: &mut Document, scope: NodeId, model: &ConfigMap) -> usize {
        self.fields.clear();
        let nodes: Vec<NodeId> = doc
            .descendants(scope)
            .into_iter()
            .filter(|node| {
                doc.attr(*node, BIND_ATTR)
                    .is_some_and(|bind| bind.starts_with(CONFIG_BIND_PREFIX))
            })
            .collect();
        for node in nodes {
            let Some(key) = doc
                .attr(node, BIND_ATTR)
                .and_then(|bind| bind.strip_prefix(CONFIG_BIND_PREFIX))
                .map(str::to_string)
            else {
                continue;
            };
            let kind = FieldKind::detect(doc, node);
            let mut binding = FieldBinding {
                key: key.clone(),
                node,
                kind,
                model_value: model.get(&key).cloned(),
                modified: false,
                conflict: None,
                resizer: None,
            };
            let value = binding.model_value.clone();
            binding.apply(doc, value.as_ref());
            self.fields.insert(key, binding);
        }
        debug!(fields = self.fields.len(), "bound config fields");
        self.fields.len()
    }

    /// Attaches auto-resizing to every multi-line field.
    pub fn plug_resizers(&mut self, sizing: TextareaSizing) {
        for binding in self.fields.values_mut() {
            if binding.kind == FieldKind::MultiLine {
                binding.resizer = Some(ResizingTextarea::new(sizing));
            }
        }
    }

    /// Re-runs sizing on every plugged textarea; returns how many resized.
    pub fn resize_all(&mut self, doc: &mut Document) -> usize {
        let mut resized = 0;
        for binding in self.fields.values_mut() {
            let node = binding.node;
            if let Some(resizer) = binding.resizer.as_mut() {
                if resizer.resize(doc, node) {
                    resized += 1;
                }
            }
        }
        resized
    }

    pub fn field(&self, key: &str) -> Option<&FieldBinding> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldBinding> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    fn field_mut(&mut self, key: &str) -> Result<&mut FieldBinding, ViewError> {
        self.fields
            .get_mut(key)
            .ok_or_else(|| ViewError::UnboundField(key.to_string()))
    }

    /// The model changed underneath the form.
    pub fn update(
        &mut self,
        doc: &mut Document,
        key: &str,
        value: Option<&ConfigValue>,
    ) -> Result<BindingUpdate, ViewError> {
        let policy = self.policy;
        let binding = self.field_mut(key)?;
        binding.model_value = value.cloned();

        if !binding.modified {
            binding.apply(doc, value);
            return Ok(BindingUpdate::Applied);
        }
        if !binding.diverges(doc) {
            binding.set_modified(doc, false);
            binding.clear_conflict(doc);
            return Ok(BindingUpdate::Applied);
        }
        match policy {
            ConflictPolicy::Preserve => {
                debug!(key, "model update conflicts with unsaved edit");
                binding.conflict = Some(value.cloned());
                doc.add_class(binding.node, CONFLICT_CLASS);
                Ok(BindingUpdate::Conflicted)
            }
            ConflictPolicy::Overwrite => {
                debug!(key, "model update overwrites unsaved edit");
                binding.apply(doc, value);
                binding.set_modified(doc, false);
                binding.clear_conflict(doc);
                Ok(BindingUpdate::Overwritten)
            }
        }
    }

    /// The user typed into or toggled a control. Returns whether the field
    /// is now flagged modified.
    pub fn user_input(
        &mut self,
        doc: &mut Document,
        key: &str,
        raw: &str,
    ) -> Result<bool, ViewError> {
        let binding = self.field_mut(key)?;
        match binding.kind {
            FieldKind::Checkbox => {
                let checked = raw.trim() == "true";
                doc.set_checked(binding.node, checked);
                set_toggle_label(doc, binding.node, &checked.to_string());
            }
            FieldKind::Text => doc.set_value(binding.node, raw),
            FieldKind::MultiLine => {
                doc.set_value(binding.node, raw);
                let node = binding.node;
                if let Some(resizer) = binding.resizer.as_mut() {
                    resizer.run_change(doc, node, raw);
                }
            }
        }
        let modified = binding.diverges(doc);
        binding.set_modified(doc, modified);
        if !modified {
            binding.clear_conflict(doc);
        }
        Ok(modified)
    }

    pub fn resolve_conflict(
        &mut self,
        doc: &mut Document,
        key: &str,
        resolution: Resolution,
    ) -> Result<(), ViewError> {
        let binding = self.field_mut(key)?;
        if binding.conflict.is_none() {
            return Ok(());
        }
        binding.clear_conflict(doc);
        match resolution {
            Resolution::KeepMine => {
                let modified = binding.diverges(doc);
                binding.set_modified(doc, modified);
            }
            Resolution::TakeTheirs => {
                let value = binding.model_value.clone();
                binding.apply(doc, value.as_ref());
                binding.set_modified(doc, false);
            }
        }
        Ok(())
    }

    /// Makes every bound control show `model`, dropping unsaved edits and
    /// conflict markers.
    pub fn reset_dom_to_model(&mut self, doc: &mut Document, model: &ConfigMap) {
        for (key, binding) in self.fields.iter_mut() {
            binding.model_value = model.get(key).cloned();
            let value = binding.model_value.clone();
            binding.apply(doc, value.as_ref());
            binding.set_modified(doc, false);
            binding.clear_conflict(doc);
        }
        debug!(fields = self.fields.len(), "reset bound fields to model");
    }

    /// Current control values keyed by option name.
    pub fn values(&self, doc: &Document) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(key, binding)| (key.clone(), binding.kind.read(doc, binding.node)))
            .collect()
    }

    pub fn modified_keys(&self) -> Vec<&str> {
        self.fields
            .values()
            .filter(|binding| binding.modified)
            .map(|binding| binding.key.as_str())
            .collect()
    }

    pub fn conflicted_keys(&self) -> Vec<&str> {
        self.fields
            .values()
            .filter(|binding| binding.is_conflicted())
            .map(|binding| binding.key.as_str())
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/binding_tests.rs"]
mod tests;
