//! Filter trees over typed trace events
//!
//! A [`FilterTree`] is a long-lived, editable boolean tree of [`FilterNode`]s.
//! Nodes live in an arena owned by the tree and are addressed by [`NodeId`];
//! each slot records its parent, its ordered children and its `negate` flag.
//! Slots freed by removal are reused; a generation counter keeps stale ids
//! from reaching the new occupant.
//! Cloning a tree deep-copies the structure while aspect bindings stay shared.

mod generator;
mod node;

pub use generator::{TreeGenerator, saved_filter_tree, to_tree};
pub use node::{
    CompareNode, CompareType, ContainsNode, EqualsNode, FilterNode, MatchesNode, NamedFilterNode,
    NodeKind, ObjectNode, TraceTypeNode,
};

use crate::event::{EventFilter, TraceEvent};
use serde_json::json;
use std::fmt::Write;
use thiserror::Error;

/// Handle to a node inside one [`FilterTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Node {0:?} is not part of this tree")]
    UnknownNode(NodeId),

    #[error("{kind:?} nodes accept at most {limit} children")]
    TooManyChildren { kind: NodeKind, limit: usize },

    #[error("A root node cannot be nested inside another node")]
    NestedRoot,

    #[error("Child index {index} is out of bounds for a node with {len} children")]
    IndexOutOfBounds { index: usize, len: usize },
}

#[derive(Debug, Clone)]
struct Slot {
    node: FilterNode,
    negate: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    generation: u32,
    detached: bool,
}

impl Slot {
    fn new(node: FilterNode, parent: Option<NodeId>) -> Self {
        Self {
            node,
            negate: false,
            parent,
            children: Vec::new(),
            generation: 0,
            detached: false,
        }
    }

    fn is_live(&self, id: NodeId) -> bool {
        !self.detached && self.generation == id.generation
    }
}

#[derive(Debug, Clone)]
pub struct FilterTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for FilterTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTree {
    /// An empty tree under a `Root` node; it matches everything.
    pub fn new() -> Self {
        Self::with_top(FilterNode::Root)
    }

    /// A tree whose top node is `node`.
    pub fn with_top(node: FilterNode) -> Self {
        Self {
            slots: vec![Slot::new(node, None)],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, TreeError> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.is_live(id))
            .ok_or(TreeError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, TreeError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.is_live(id))
            .ok_or(TreeError::UnknownNode(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&FilterNode> {
        self.slot(id).ok().map(|slot| &slot.node)
    }

    /// Payload access for editing a node in place.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut FilterNode> {
        self.slot_mut(id).ok().map(|slot| &mut slot.node)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(FilterNode::kind)
    }

    pub fn is_negated(&self, id: NodeId) -> bool {
        self.slot(id).is_ok_and(|slot| slot.negate)
    }

    /// Set a node's `negate` flag. Root and named-filter nodes ignore it.
    pub fn set_negate(&mut self, id: NodeId, negate: bool) -> Result<(), TreeError> {
        let slot = self.slot_mut(id)?;
        if slot.node.kind().supports_negate() {
            slot.negate = negate;
        }
        Ok(())
    }

    pub fn toggle_negate(&mut self, id: NodeId) -> Result<(), TreeError> {
        let negate = self.slot(id)?.negate;
        self.set_negate(id, !negate)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|slot| slot.children.as_slice()).unwrap_or_default()
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    /// Number of nodes reachable from the top.
    pub fn len(&self) -> usize {
        self.descendants(self.root).len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// `id` followed by every node below it, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if self.slot(next).is_err() {
                continue;
            }
            found.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        found
    }

    pub fn add_child(&mut self, parent: NodeId, node: FilterNode) -> Result<NodeId, TreeError> {
        let index = self.slot(parent)?.children.len();
        self.insert_child(parent, index, node)
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, node: FilterNode) -> Result<NodeId, TreeError> {
        if node.kind() == NodeKind::Root {
            return Err(TreeError::NestedRoot);
        }
        let slot = self.slot(parent)?;
        let kind = slot.node.kind();
        let len = slot.children.len();
        match kind.max_children() {
            Some(limit) if len >= limit => return Err(TreeError::TooManyChildren { kind, limit }),
            _ => {}
        }
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }

        let id = self.allocate(Slot::new(node, Some(parent)));
        self.slot_mut(parent)?.children.insert(index, id);
        Ok(id)
    }

    fn allocate(&mut self, mut slot: Slot) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let generation = self.slots[index].generation;
                slot.generation = generation;
                self.slots[index] = slot;
                NodeId { index, generation }
            }
            None => {
                self.slots.push(slot);
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Mark `id` and everything below it free; their ids stop resolving.
    fn release(&mut self, id: NodeId) {
        for released in self.descendants(id) {
            let slot = &mut self.slots[released.index];
            slot.detached = true;
            slot.generation = slot.generation.wrapping_add(1);
            slot.children.clear();
            slot.node = FilterNode::And;
            self.free.push(released.index);
        }
    }

    /// Detach the child at `index` and return it as a tree of its own.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<FilterTree, TreeError> {
        let len = self.slot(parent)?.children.len();
        if index >= len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        let removed = self.slot_mut(parent)?.children.remove(index);
        let subtree = self.subtree(removed)?;
        self.release(removed);
        Ok(subtree)
    }

    /// Swap the child at `index` for a new leaf or connective, dropping the old subtree.
    pub fn replace_child(&mut self, parent: NodeId, index: usize, node: FilterNode) -> Result<NodeId, TreeError> {
        if node.kind() == NodeKind::Root {
            return Err(TreeError::NestedRoot);
        }
        self.remove_child(parent, index)?;
        self.insert_child(parent, index, node)
    }

    /// Copy `other` below `parent`, returning the id of its top node here.
    pub fn graft(&mut self, parent: NodeId, other: &FilterTree) -> Result<NodeId, TreeError> {
        let top = other.slot(other.root)?;
        let id = self.add_child(parent, top.node.clone())?;
        self.slot_mut(id)?.negate = top.negate;
        for &child in &top.children {
            self.graft_from(id, other, child)?;
        }
        Ok(id)
    }

    fn graft_from(&mut self, parent: NodeId, other: &FilterTree, source: NodeId) -> Result<(), TreeError> {
        let slot = other.slot(source)?;
        let id = self.add_child(parent, slot.node.clone())?;
        self.slot_mut(id)?.negate = slot.negate;
        for &child in &slot.children {
            self.graft_from(id, other, child)?;
        }
        Ok(())
    }

    /// Deep copy of the subtree rooted at `id`.
    pub fn subtree(&self, id: NodeId) -> Result<FilterTree, TreeError> {
        let top = self.slot(id)?;
        let mut tree = FilterTree::with_top(top.node.clone());
        tree.slots[0].negate = top.negate;
        let root = tree.root;
        for &child in &top.children {
            tree.graft_from(root, self, child)?;
        }
        Ok(tree)
    }

    pub fn matches(&self, event: &TraceEvent) -> bool {
        self.matches_from(self.root, event)
    }

    /// Evaluate the subtree rooted at `id`; unknown ids never match.
    pub fn matches_from(&self, id: NodeId, event: &TraceEvent) -> bool {
        self.slot(id).is_ok() && self.evaluate(id, event)
    }

    fn evaluate(&self, id: NodeId, event: &TraceEvent) -> bool {
        let slot = &self.slots[id.index];
        let mut children = slot.children.iter().map(|&child| self.evaluate(child, event));

        match &slot.node {
            FilterNode::Root | FilterNode::NamedFilter(_) => children.all(|matched| matched),
            FilterNode::And => children.all(|matched| matched) ^ slot.negate,
            FilterNode::Or => children.any(|matched| matched) ^ slot.negate,
            FilterNode::Equals(_)
            | FilterNode::Contains(_)
            | FilterNode::Matches(_)
            | FilterNode::Compare(_) => slot.node.evaluate_leaf(event).unwrap_or(false) ^ slot.negate,
            FilterNode::TraceTypeGate(_) => {
                (slot.node.admits_trace_type(event) ^ slot.negate) && children.all(|matched| matched)
            }
            FilterNode::ObjectWrapper(object) => match object.filter() {
                Some(filter) => filter.matches(event) ^ slot.negate,
                None => children.all(|matched| matched),
            },
        }
    }

    /// Indented one-node-per-line rendering.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_into(&mut out, self.root, 0);
        out
    }

    fn outline_into(&self, out: &mut String, id: NodeId, depth: usize) {
        let Ok(slot) = self.slot(id) else {
            return;
        };
        let not = if slot.negate { "NOT " } else { "" };
        let _ = writeln!(out, "{}{}{}", "  ".repeat(depth), not, slot.node);
        for &child in &slot.children {
            self.outline_into(out, child, depth + 1);
        }
    }

    /// Structured rendering exposing each node's kind, flag and payload.
    pub fn to_json(&self) -> serde_json::Value {
        self.node_json(self.root)
    }

    fn node_json(&self, id: NodeId) -> serde_json::Value {
        let Ok(slot) = self.slot(id) else {
            return serde_json::Value::Null;
        };
        let mut value = json!({
            "kind": slot.node.kind(),
            "negate": slot.negate,
        });
        match &slot.node {
            FilterNode::Equals(n) => {
                value["aspect"] = json!(n.aspect().name());
                value["value"] = json!(n.value());
                value["ignore_case"] = json!(n.ignore_case());
            }
            FilterNode::Contains(n) => {
                value["aspect"] = json!(n.aspect().name());
                value["value"] = json!(n.value());
                value["ignore_case"] = json!(n.ignore_case());
            }
            FilterNode::Matches(n) => {
                value["aspect"] = json!(n.aspect().name());
                value["pattern"] = json!(n.pattern());
            }
            FilterNode::Compare(n) => {
                value["aspect"] = json!(n.aspect().name());
                value["value"] = json!(n.value());
                value["result"] = json!(n.result());
                value["type"] = json!(n.compare_type());
            }
            FilterNode::TraceTypeGate(n) => value["trace_type"] = json!(n.trace_type()),
            FilterNode::NamedFilter(n) => value["name"] = json!(n.name()),
            FilterNode::Root | FilterNode::And | FilterNode::Or | FilterNode::ObjectWrapper(_) => {}
        }
        if !slot.children.is_empty() {
            value["children"] = slot
                .children
                .iter()
                .map(|&child| self.node_json(child))
                .collect();
        }
        value
    }
}

impl EventFilter for FilterTree {
    fn matches(&self, event: &TraceEvent) -> bool {
        FilterTree::matches(self, event)
    }
}
