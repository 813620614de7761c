//! Auto-resizing behaviour for multi-line config fields.

use crate::document::{Document, NodeId};

pub const HEIGHT_ATTR: &str = "data-height";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextareaSizing {
    pub max_height: u32,
    pub min_height: u32,
    pub single_line: u32,
}

impl Default for TextareaSizing {
    fn default() -> Self {
        Self {
            max_height: 200,
            min_height: 18,
            single_line: 18,
        }
    }
}

impl TextareaSizing {
    pub fn height_for(&self, value: &str) -> u32 {
        let lines = value.lines().count().max(1) as u32;
        (lines * self.single_line).clamp(self.min_height, self.max_height.max(self.min_height))
    }
}

#[derive(Debug, Clone)]
pub struct ResizingTextarea {
    sizing: TextareaSizing,
    height: Option<u32>,
}

impl ResizingTextarea {
    pub fn new(sizing: TextareaSizing) -> Self {
        Self {
            sizing,
            height: None,
        }
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Recomputes the height from the node's current value. Sizing is only
    /// meaningful while the node is visible, so hidden nodes are skipped and
    /// picked up by the next resize after `show`.
    pub fn resize(&mut self, doc: &mut Document, node: NodeId) -> bool {
        if !doc.is_visible(node) {
            return false;
        }
        let height = self.sizing.height_for(doc.value(node));
        self.apply(doc, node, height);
        true
    }

    /// Reflows after a programmatic value change, which raises no input
    /// event of its own.
    pub fn run_change(&mut self, doc: &mut Document, node: NodeId, value: &str) {
        if !doc.is_visible(node) {
            return;
        }
        let height = self.sizing.height_for(value);
        self.apply(doc, node, height);
    }

    fn apply(&mut self, doc: &mut Document, node: NodeId, height: u32) {
        if self.height != Some(height) {
            self.height = Some(height);
            doc.set_attr(node, HEIGHT_ATTR, height.to_string());
        }
    }
}
