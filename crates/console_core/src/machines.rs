//! Machine collection and the panel that mirrors it.
//!
//! Machines are keyed by a client key assigned on insertion, so a machine
//! keeps its list item while its id changes. The panel reconciles the
//! rendered list against the collection on `render` and applies queued
//! collection events incrementally through `handle`.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
};

use shared::domain::{Machine, MachineId};
use tracing::debug;

use crate::{
    document::{Document, NodeId},
    error::{CollectionError, ViewError},
    templates,
};

pub const PANEL_CLASS: &str = "machine-view-panel";
pub const FULL_WIDTH_CLASS: &str = "full";
pub const ID_ATTR: &str = "data-id";

const LIST_SELECTOR: &str = ".machines .content ul";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(u64);

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineChange {
    Id { old: MachineId, new: MachineId },
    DisplayName { old: String, new: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Add { index: usize, keys: Vec<ClientKey> },
    Remove { keys: Vec<ClientKey> },
    Change { key: ClientKey, changes: Vec<MachineChange> },
    /// The order changed wholesale; views reconcile against the list.
    Reset,
}

#[derive(Debug, Default)]
pub struct MachineList {
    entries: Vec<(ClientKey, Machine)>,
    next_key: u64,
    events: VecDeque<CollectionEvent>,
}

impl MachineList {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"{parent}/{id}"` for containers, the bare id otherwise.
    pub fn create_display_name(id: &MachineId, parent_id: Option<&MachineId>) -> String {
        match parent_id {
            Some(parent) => format!("{parent}/{id}"),
            None => id.to_string(),
        }
    }

    /// Appends `machines` in order. The batch is rejected as a whole when
    /// any id is already taken.
    pub fn add(
        &mut self,
        machines: impl IntoIterator<Item = Machine>,
    ) -> Result<Vec<ClientKey>, CollectionError> {
        let machines: Vec<Machine> = machines.into_iter().collect();
        let mut seen: HashSet<&MachineId> = self.entries.iter().map(|(_, m)| &m.id).collect();
        for machine in &machines {
            if !seen.insert(&machine.id) {
                return Err(CollectionError::DuplicateId(machine.id.clone()));
            }
        }

        let index = self.entries.len();
        let mut keys = Vec::with_capacity(machines.len());
        for mut machine in machines {
            if machine.display_name.is_empty() {
                machine.display_name =
                    Self::create_display_name(&machine.id, machine.parent_id.as_ref());
            }
            let key = ClientKey(self.next_key);
            self.next_key += 1;
            keys.push(key);
            self.entries.push((key, machine));
        }
        if !keys.is_empty() {
            self.events.push_back(CollectionEvent::Add {
                index,
                keys: keys.clone(),
            });
        }
        Ok(keys)
    }

    pub fn remove(&mut self, id: &MachineId) -> Result<Machine, CollectionError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| CollectionError::UnknownId(id.clone()))?;
        self.remove_at(index)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Machine, CollectionError> {
        if index >= self.entries.len() {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        let (key, machine) = self.entries.remove(index);
        self.events
            .push_back(CollectionEvent::Remove { keys: vec![key] });
        Ok(machine)
    }

    /// The live machine at `index`.
    pub fn revive(&self, index: usize) -> Option<&Machine> {
        self.item(index)
    }

    /// Reassigns a machine's id. The display name is left as it was.
    pub fn set_id(&mut self, old: &MachineId, new: MachineId) -> Result<ClientKey, CollectionError> {
        let index = self
            .index_of(old)
            .ok_or_else(|| CollectionError::UnknownId(old.clone()))?;
        if *old == new {
            return Ok(self.entries[index].0);
        }
        if self.index_of(&new).is_some() {
            return Err(CollectionError::DuplicateId(new));
        }
        let (key, machine) = &mut self.entries[index];
        let previous = std::mem::replace(&mut machine.id, new.clone());
        let key = *key;
        self.events.push_back(CollectionEvent::Change {
            key,
            changes: vec![MachineChange::Id {
                old: previous,
                new,
            }],
        });
        Ok(key)
    }

    pub fn set_display_name(
        &mut self,
        id: &MachineId,
        name: impl Into<String>,
    ) -> Result<ClientKey, CollectionError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| CollectionError::UnknownId(id.clone()))?;
        let name = name.into();
        let (key, machine) = &mut self.entries[index];
        let key = *key;
        if machine.display_name == name {
            return Ok(key);
        }
        let old = std::mem::replace(&mut machine.display_name, name.clone());
        self.events.push_back(CollectionEvent::Change {
            key,
            changes: vec![MachineChange::DisplayName { old, new: name }],
        });
        Ok(key)
    }

    /// Reorders the machines in place. Keys are kept.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Machine, &Machine) -> std::cmp::Ordering,
    {
        self.entries.sort_by(|(_, a), (_, b)| compare(a, b));
        self.events.push_back(CollectionEvent::Reset);
    }

    pub fn item(&self, index: usize) -> Option<&Machine> {
        self.entries.get(index).map(|(_, machine)| machine)
    }

    pub fn key_at(&self, index: usize) -> Option<ClientKey> {
        self.entries.get(index).map(|(key, _)| *key)
    }

    pub fn get(&self, key: ClientKey) -> Option<&Machine> {
        self.position(key).map(|index| &self.entries[index].1)
    }

    pub fn position(&self, key: ClientKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }

    pub fn index_of(&self, id: &MachineId) -> Option<usize> {
        self.entries.iter().position(|(_, machine)| machine.id == *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientKey, &Machine)> {
        self.entries.iter().map(|(key, machine)| (*key, machine))
    }

    pub fn keys(&self) -> Vec<ClientKey> {
        self.entries.iter().map(|(key, _)| *key).collect()
    }

    /// Takes every event queued since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<CollectionEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

/// Indices into `seq` of one longest strictly increasing subsequence.
fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < *value);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }
    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = prev[i];
    }
    out.reverse();
    out
}

pub struct MachineViewPanel {
    doc: Document,
    list: Option<NodeId>,
    items: HashMap<ClientKey, NodeId>,
}

impl Default for MachineViewPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineViewPanel {
    pub fn new() -> Self {
        Self {
            doc: Document::new("div"),
            list: None,
            items: HashMap::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// The host node the panel renders into.
    pub fn container(&self) -> NodeId {
        self.doc.root()
    }

    pub fn item_node(&self, key: ClientKey) -> Option<NodeId> {
        self.items.get(&key).copied()
    }

    fn list_or_err(&self) -> Result<NodeId, ViewError> {
        self.list.ok_or(ViewError::NotRendered)
    }

    /// Builds the panel on first call, then brings the machine list in line
    /// with `machines`. Items whose machine is unchanged keep their nodes.
    pub fn render(&mut self, machines: &MachineList) -> Result<(), ViewError> {
        let container = self.container();
        self.doc.add_class(container, PANEL_CLASS);
        let list = match self.list.filter(|list| self.doc.contains(*list)) {
            Some(list) => list,
            None => {
                self.doc.clear_children(container);
                self.items.clear();
                self.doc.build(container, templates::machine_panel());
                let list = self
                    .doc
                    .select(container, LIST_SELECTOR)?
                    .ok_or(ViewError::NotRendered)?;
                self.list = Some(list);
                list
            }
        };
        self.reconcile(list, machines);
        Ok(())
    }

    fn reconcile(&mut self, list: NodeId, machines: &MachineList) {
        let desired = machines.keys();
        let wanted: HashSet<ClientKey> = desired.iter().copied().collect();

        let stale: Vec<ClientKey> = self
            .items
            .keys()
            .filter(|key| !wanted.contains(key))
            .copied()
            .collect();
        for key in &stale {
            if let Some(node) = self.items.remove(key) {
                self.doc.remove(node);
            }
        }

        let old_positions: HashMap<NodeId, usize> = self
            .doc
            .children(list)
            .iter()
            .enumerate()
            .map(|(index, node)| (*node, index))
            .collect();

        let mut created = 0;
        for (key, machine) in machines.iter() {
            match self.items.get(&key) {
                Some(node) => self.sync_item(*node, machine),
                None => {
                    let node = self.doc.build(list, templates::machine_item(machine));
                    self.items.insert(key, node);
                    created += 1;
                }
            }
        }

        // Keep the longest run of already-ordered items in place and move
        // everything else in front of its successor.
        let placed: Vec<(usize, usize)> = desired
            .iter()
            .enumerate()
            .filter_map(|(index, key)| {
                let node = self.items.get(key)?;
                old_positions.get(node).map(|old| (index, *old))
            })
            .collect();
        let olds: Vec<usize> = placed.iter().map(|(_, old)| *old).collect();
        let stable: HashSet<usize> = longest_increasing_subsequence(&olds)
            .into_iter()
            .map(|i| placed[i].0)
            .collect();

        let mut moved = 0;
        let mut anchor: Option<NodeId> = None;
        for (index, key) in desired.iter().enumerate().rev() {
            let Some(node) = self.items.get(key).copied() else {
                continue;
            };
            if !stable.contains(&index) {
                self.move_before(list, node, anchor);
                moved += 1;
            }
            anchor = Some(node);
        }
        debug!(
            items = desired.len(),
            removed = stale.len(),
            created,
            moved,
            "reconciled machine list"
        );
    }

    fn move_before(&mut self, list: NodeId, node: NodeId, anchor: Option<NodeId>) {
        self.doc.unlink(node);
        let index = anchor
            .and_then(|anchor| self.doc.index_in_parent(anchor))
            .unwrap_or_else(|| self.doc.children(list).len());
        self.doc.insert_child(list, index, node);
    }

    fn sync_item(&mut self, node: NodeId, machine: &Machine) {
        if self.doc.attr(node, ID_ATTR) != Some(machine.id.as_str()) {
            self.doc.set_attr(node, ID_ATTR, machine.id.as_str());
        }
        if self.doc.text(node) != machine.display_name {
            self.doc.set_text(node, machine.display_name.as_str());
        }
    }

    /// Applies one collection event without re-rendering the other items.
    pub fn handle(
        &mut self,
        machines: &MachineList,
        event: &CollectionEvent,
    ) -> Result<(), ViewError> {
        let list = self.list_or_err()?;
        match event {
            CollectionEvent::Add { keys, .. } => {
                for key in keys {
                    let Some(index) = machines.position(*key) else {
                        continue;
                    };
                    if self.items.contains_key(key) {
                        continue;
                    }
                    // Insert before the next machine that already has a node.
                    let anchor = machines
                        .keys()
                        .into_iter()
                        .skip(index + 1)
                        .find_map(|next| self.items.get(&next).copied());
                    let node = self
                        .doc
                        .build(list, templates::machine_item(&machines.entries[index].1));
                    self.move_before(list, node, anchor);
                    self.items.insert(*key, node);
                    debug!(%key, index, "added machine item");
                }
            }
            CollectionEvent::Remove { keys } => {
                for key in keys {
                    if let Some(node) = self.items.remove(key) {
                        self.doc.remove(node);
                        debug!(%key, "removed machine item");
                    }
                }
            }
            CollectionEvent::Change { key, changes } => {
                if let (Some(node), Some(machine)) = (self.items.get(key).copied(), machines.get(*key))
                {
                    self.sync_item(node, machine);
                    debug!(%key, ?changes, "updated machine item in place");
                }
            }
            CollectionEvent::Reset => self.reconcile(list, machines),
        }
        Ok(())
    }

    /// Drains `machines` and applies every queued event in order.
    pub fn sync(&mut self, machines: &mut MachineList) -> Result<usize, ViewError> {
        let events = machines.drain_events();
        for event in &events {
            self.handle(machines, event)?;
        }
        Ok(events.len())
    }

    pub fn set_width_full(&mut self, full: bool) {
        let container = self.container();
        self.doc.toggle_class(container, FULL_WIDTH_CLASS, full);
    }

    /// Client keys of the rendered items, in document order.
    pub fn rendered_keys(&self) -> Vec<ClientKey> {
        let Some(list) = self.list else {
            return Vec::new();
        };
        let by_node: HashMap<NodeId, ClientKey> =
            self.items.iter().map(|(key, node)| (*node, *key)).collect();
        self.doc
            .children(list)
            .iter()
            .filter_map(|node| by_node.get(node).copied())
            .collect()
    }

    pub fn destroy(&mut self) {
        self.items.clear();
        self.list = None;
        self.doc.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(ids: &[&str]) -> MachineList {
        let mut list = MachineList::new();
        list.add(ids.iter().map(|id| Machine::new(*id)))
            .expect("add machines");
        list.drain_events();
        list
    }

    fn rendered_ids(panel: &MachineViewPanel) -> Vec<String> {
        panel
            .rendered_keys()
            .into_iter()
            .filter_map(|key| panel.item_node(key))
            .filter_map(|node| panel.document().attr(node, ID_ATTR).map(str::to_string))
            .collect()
    }

    #[test]
    fn display_names_include_the_parent() {
        let id = MachineId::new("lxc/2");
        let parent = MachineId::new("0");
        assert_eq!(MachineList::create_display_name(&id, Some(&parent)), "0/lxc/2");
        assert_eq!(MachineList::create_display_name(&parent, None), "0");

        let mut list = MachineList::new();
        list.add([Machine::new("lxc/2").with_parent("0")])
            .expect("add");
        assert_eq!(list.item(0).map(|m| m.display_name.as_str()), Some("0/lxc/2"));
    }

    #[test]
    fn duplicate_ids_reject_the_whole_batch() {
        let mut list = list_of(&["0"]);
        let err = list
            .add([Machine::new("1"), Machine::new("0")])
            .expect_err("duplicate");
        assert_eq!(err, CollectionError::DuplicateId(MachineId::new("0")));
        assert_eq!(list.len(), 1);
        assert_eq!(list.pending_events(), 0);
    }

    #[test]
    fn mutations_queue_events() {
        let mut list = MachineList::new();
        let keys = list
            .add([Machine::new("0"), Machine::new("1")])
            .expect("add");
        list.set_id(&MachineId::new("1"), MachineId::new("7"))
            .expect("set id");
        list.remove(&MachineId::new("0")).expect("remove");

        assert_eq!(
            list.drain_events(),
            vec![
                CollectionEvent::Add {
                    index: 0,
                    keys: keys.clone(),
                },
                CollectionEvent::Change {
                    key: keys[1],
                    changes: vec![MachineChange::Id {
                        old: MachineId::new("1"),
                        new: MachineId::new("7"),
                    }],
                },
                CollectionEvent::Remove {
                    keys: vec![keys[0]],
                },
            ]
        );
        assert_eq!(list.pending_events(), 0);
    }

    #[test]
    fn set_id_rejects_unknown_and_taken_ids() {
        let mut list = list_of(&["0", "1"]);
        assert_eq!(
            list.set_id(&MachineId::new("9"), MachineId::new("10")),
            Err(CollectionError::UnknownId(MachineId::new("9")))
        );
        assert_eq!(
            list.set_id(&MachineId::new("0"), MachineId::new("1")),
            Err(CollectionError::DuplicateId(MachineId::new("1")))
        );
        assert_eq!(
            list.remove_at(5),
            Err(CollectionError::IndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn lis_picks_an_increasing_run() {
        assert_eq!(longest_increasing_subsequence(&[]), Vec::<usize>::new());
        assert_eq!(longest_increasing_subsequence(&[2, 0, 1]), vec![1, 2]);
        assert_eq!(longest_increasing_subsequence(&[0, 1, 2]), vec![0, 1, 2]);
        let picked = longest_increasing_subsequence(&[3, 1, 4, 0, 5, 2]);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn render_is_idempotent() {
        let list = list_of(&["0", "1", "2"]);
        let mut panel = MachineViewPanel::new();
        panel.render(&list).expect("render");
        let before: Vec<NodeId> = list
            .keys()
            .into_iter()
            .filter_map(|key| panel.item_node(key))
            .collect();

        panel.render(&list).expect("render again");
        let after: Vec<NodeId> = list
            .keys()
            .into_iter()
            .filter_map(|key| panel.item_node(key))
            .collect();

        assert_eq!(before, after);
        assert_eq!(panel.rendered_keys(), list.keys());
    }

    #[test]
    fn render_reorders_without_rebuilding() {
        let mut list = list_of(&["2", "0", "3", "1"]);
        let mut panel = MachineViewPanel::new();
        panel.render(&list).expect("render");
        let nodes: HashMap<ClientKey, NodeId> = list
            .keys()
            .into_iter()
            .filter_map(|key| Some((key, panel.item_node(key)?)))
            .collect();

        list.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        assert_eq!(panel.sync(&mut list).expect("sync"), 1);

        assert_eq!(rendered_ids(&panel), vec!["0", "1", "2", "3"]);
        assert_eq!(panel.rendered_keys(), list.keys());
        for (key, node) in nodes {
            assert_eq!(panel.item_node(key), Some(node));
        }
    }

    #[test]
    fn render_drops_and_creates_items() {
        let mut list = list_of(&["0", "1"]);
        let mut panel = MachineViewPanel::new();
        panel.render(&list).expect("render");
        let removed = panel.item_node(list.key_at(0).expect("key")).expect("node");

        list.remove_at(0).expect("remove");
        list.add([Machine::new("4")]).expect("add");
        list.drain_events();
        panel.render(&list).expect("render");

        assert_eq!(rendered_ids(&panel), vec!["1", "4"]);
        assert!(!panel.document().contains(removed));
    }

    #[test]
    fn handle_applies_events_incrementally() {
        let mut list = list_of(&["0", "2"]);
        let mut panel = MachineViewPanel::new();
        panel.render(&list).expect("render");
        let node_of_0 = panel.item_node(list.key_at(0).expect("key")).expect("node");

        list.add([Machine::new("3")]).expect("add");
        list.set_id(&MachineId::new("0"), MachineId::new("5"))
            .expect("set id");
        list.remove(&MachineId::new("2")).expect("remove");
        assert_eq!(panel.sync(&mut list).expect("sync"), 3);

        assert_eq!(rendered_ids(&panel), vec!["5", "3"]);
        assert_eq!(panel.item_node(list.key_at(0).expect("key")), Some(node_of_0));
        assert_eq!(panel.document().text(node_of_0), "0");
    }

    #[test]
    fn handle_requires_render() {
        let mut list = list_of(&[]);
        list.add([Machine::new("0")]).expect("add");
        let mut panel = MachineViewPanel::new();
        let events = list.drain_events();
        assert!(matches!(
            panel.handle(&list, &events[0]),
            Err(ViewError::NotRendered)
        ));
    }

    #[test]
    fn destroy_detaches_the_panel() {
        let list = list_of(&["0"]);
        let mut panel = MachineViewPanel::new();
        panel.render(&list).expect("render");
        panel.destroy();
        assert!(panel.rendered_keys().is_empty());
        assert!(!panel.document().is_document_attached());
    }
}
