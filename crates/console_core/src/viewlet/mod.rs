//! Viewlets: sub-views embedded in the inspector panel, each with its own
//! render/show/destroy lifecycle and a declarative event table.

use std::time::Duration;

use crate::{
    binding::ConflictPolicy,
    document::{Document, NodeId},
    selector::{Selector, SelectorError},
    textarea::TextareaSizing,
};

pub mod config;

pub const SAVED_HIGHLIGHT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEvent {
    Click,
    Change,
}

/// One row of a view's event table: events of kind `event` raised on or
/// inside a node matching `selector` go to `handler`.
#[derive(Debug, Clone, Copy)]
pub struct EventBinding<H> {
    pub selector: &'static str,
    pub event: DomEvent,
    pub handler: H,
}

#[derive(Debug, Clone)]
pub struct EventTable<H> {
    entries: Vec<(Selector, DomEvent, H)>,
}

impl<H: Copy> EventTable<H> {
    pub fn compile(bindings: &[EventBinding<H>]) -> Result<Self, SelectorError> {
        let entries = bindings
            .iter()
            .map(|binding| {
                Ok((
                    Selector::parse(binding.selector)?,
                    binding.event,
                    binding.handler,
                ))
            })
            .collect::<Result<_, SelectorError>>()?;
        Ok(Self { entries })
    }

    /// Finds the handler for an event raised on `target`, delegating from
    /// `container`. Returns the handler with the matched node.
    pub fn resolve(
        &self,
        doc: &Document,
        target: NodeId,
        event: DomEvent,
        container: NodeId,
    ) -> Option<(H, NodeId)> {
        if !doc.is_attached(target) {
            return None;
        }
        self.entries
            .iter()
            .filter(|(_, kind, _)| *kind == event)
            .find_map(|(selector, _, handler)| {
                doc.closest(target, selector, container)
                    .filter(|matched| *matched != container)
                    .map(|matched| (*handler, matched))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewletOptions {
    pub conflict_policy: ConflictPolicy,
    pub saved_highlight_delay: Duration,
    pub textarea: TextareaSizing,
}

impl Default for ViewletOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            saved_highlight_delay: SAVED_HIGHLIGHT_DELAY,
            textarea: TextareaSizing::default(),
        }
    }
}
