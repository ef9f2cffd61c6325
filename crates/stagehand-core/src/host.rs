//! Host tree primitives.
//!
//! The engine mutates a retained host tree through the [`HostTree`] trait
//! and never assumes anything about what the nodes are. [`MemoryHost`] is
//! the slab-backed reference implementation used by tests and demos; real
//! adapters (a canvas scene graph, a terminal grid, ...) implement the same
//! trait.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::collections::HashMap;
use crate::spec::{EventHandler, PropValue, StateObj};

pub type HostId = usize;
pub type ListenerId = u64;

/// Shared handle to the host tree. Single-threaded by design.
pub type HostHandle = Rc<RefCell<dyn HostTree>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: HostId },
    NotAChild { parent: HostId, child: HostId },
    NotText { id: HostId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
            HostError::NotText { id } => write!(f, "host node {id} is not a text node"),
        }
    }
}

impl std::error::Error for HostError {}

/// Synchronous mutations on the retained host tree. All failures propagate
/// unmodified to the caller of `render`/`update`; the engine never retries.
pub trait HostTree {
    /// Creates a detached node of the given kind.
    fn create_node(&mut self, kind: &str) -> Result<HostId, HostError>;

    /// Creates a detached text node.
    fn create_text(&mut self, content: &str) -> Result<HostId, HostError>;

    fn set_text(&mut self, node: HostId, content: &str) -> Result<(), HostError>;

    /// Inserts `child` under `parent` at `index` (clamped to the child count).
    fn insert_child(&mut self, parent: HostId, child: HostId, index: usize)
        -> Result<(), HostError>;

    /// Moves an existing child of `parent` to `index`.
    fn move_child(&mut self, parent: HostId, child: HostId, index: usize)
        -> Result<(), HostError>;

    /// Detaches `child` from `parent` and destroys its subtree.
    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;

    fn child_index(&self, parent: HostId, child: HostId) -> Option<usize>;

    fn child_count(&self, parent: HostId) -> usize;

    fn set_property(&mut self, node: HostId, name: &str, value: &PropValue)
        -> Result<(), HostError>;

    fn property(&self, node: HostId, name: &str) -> Option<PropValue>;

    /// Adds a named event subscription on `node`.
    fn add_listener(
        &mut self,
        node: HostId,
        event: &str,
        callback: EventHandler,
    ) -> Result<ListenerId, HostError>;

    fn remove_listener(&mut self, node: HostId, event: &str, id: ListenerId)
        -> Result<(), HostError>;
}

struct HostRecord {
    kind: String,
    text: Option<String>,
    children: Vec<HostId>,
    props: HashMap<String, PropValue>,
    listeners: Vec<(String, ListenerId, EventHandler)>,
}

impl HostRecord {
    fn node(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            text: None,
            children: Vec::new(),
            props: HashMap::default(),
            listeners: Vec::new(),
        }
    }

    fn text(content: &str) -> Self {
        Self {
            kind: "#text".to_owned(),
            text: Some(content.to_owned()),
            children: Vec::new(),
            props: HashMap::default(),
            listeners: Vec::new(),
        }
    }
}

/// In-memory host tree. Node 0 is the pre-created root.
pub struct MemoryHost {
    nodes: Vec<Option<HostRecord>>,
    next_listener: ListenerId,
    created: usize,
    removed: usize,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(HostRecord::node("root"))],
            next_listener: 1,
            created: 0,
            removed: 0,
        }
    }

    pub fn root(&self) -> HostId {
        0
    }

    /// Nodes created since construction (root excluded).
    pub fn created(&self) -> usize {
        self.created
    }

    /// Nodes destroyed since construction.
    pub fn removed(&self) -> usize {
        self.removed
    }

    pub fn exists(&self, id: HostId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    pub fn kind_of(&self, id: HostId) -> Option<&str> {
        self.record(id).ok().map(|record| record.kind.as_str())
    }

    pub fn text_of(&self, id: HostId) -> Option<&str> {
        self.record(id).ok().and_then(|record| record.text.as_deref())
    }

    pub fn children_of(&self, id: HostId) -> Vec<HostId> {
        self.record(id)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    pub fn listener_count(&self, id: HostId) -> usize {
        self.record(id)
            .map(|record| record.listeners.len())
            .unwrap_or(0)
    }

    /// Invokes every callback subscribed to `event` on `node`. Takes the
    /// shared handle so callbacks are free to mutate the host re-entrantly.
    pub fn dispatch(
        host: &Rc<RefCell<MemoryHost>>,
        node: HostId,
        event: &str,
        payload: Option<&StateObj>,
    ) {
        let callbacks: Vec<EventHandler> = {
            let host = host.borrow();
            match host.record(node) {
                Ok(record) => record
                    .listeners
                    .iter()
                    .filter(|(name, _, _)| name == event)
                    .map(|(_, _, callback)| Rc::clone(callback))
                    .collect(),
                Err(_) => Vec::new(),
            }
        };
        for callback in callbacks {
            callback(payload);
        }
    }

    pub fn dump_tree(&self, root: HostId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, root, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: HostId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.record(id) {
            Ok(record) => {
                match &record.text {
                    Some(text) => output.push_str(&format!("{indent}[{id}] \"{text}\"\n")),
                    None => output.push_str(&format!("{indent}[{id}] {}\n", record.kind)),
                }
                for child in &record.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            Err(_) => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }

    fn record(&self, id: HostId) -> Result<&HostRecord, HostError> {
        self.nodes
            .get(id)
            .and_then(|slot| slot.as_ref())
            .ok_or(HostError::Missing { id })
    }

    fn record_mut(&mut self, id: HostId) -> Result<&mut HostRecord, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(|slot| slot.as_mut())
            .ok_or(HostError::Missing { id })
    }

    fn free_subtree(&mut self, id: HostId) {
        let children = match self.nodes.get_mut(id).and_then(|slot| slot.take()) {
            Some(record) => record.children,
            None => return,
        };
        self.removed += 1;
        for child in children {
            self.free_subtree(child);
        }
    }
}

impl HostTree for MemoryHost {
    fn create_node(&mut self, kind: &str) -> Result<HostId, HostError> {
        let id = self.nodes.len();
        self.nodes.push(Some(HostRecord::node(kind)));
        self.created += 1;
        Ok(id)
    }

    fn create_text(&mut self, content: &str) -> Result<HostId, HostError> {
        let id = self.nodes.len();
        self.nodes.push(Some(HostRecord::text(content)));
        self.created += 1;
        Ok(id)
    }

    fn set_text(&mut self, node: HostId, content: &str) -> Result<(), HostError> {
        let record = self.record_mut(node)?;
        if record.text.is_none() {
            return Err(HostError::NotText { id: node });
        }
        record.text = Some(content.to_owned());
        Ok(())
    }

    fn insert_child(
        &mut self,
        parent: HostId,
        child: HostId,
        index: usize,
    ) -> Result<(), HostError> {
        self.record(child)?;
        let record = self.record_mut(parent)?;
        let index = index.min(record.children.len());
        record.children.insert(index, child);
        Ok(())
    }

    fn move_child(&mut self, parent: HostId, child: HostId, index: usize)
        -> Result<(), HostError> {
        let record = self.record_mut(parent)?;
        let position = record
            .children
            .iter()
            .position(|candidate| *candidate == child)
            .ok_or(HostError::NotAChild { parent, child })?;
        record.children.remove(position);
        let index = index.min(record.children.len());
        record.children.insert(index, child);
        Ok(())
    }

    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        let record = self.record_mut(parent)?;
        let position = record
            .children
            .iter()
            .position(|candidate| *candidate == child)
            .ok_or(HostError::NotAChild { parent, child })?;
        record.children.remove(position);
        self.free_subtree(child);
        Ok(())
    }

    fn child_index(&self, parent: HostId, child: HostId) -> Option<usize> {
        self.record(parent)
            .ok()?
            .children
            .iter()
            .position(|candidate| *candidate == child)
    }

    fn child_count(&self, parent: HostId) -> usize {
        self.record(parent)
            .map(|record| record.children.len())
            .unwrap_or(0)
    }

    fn set_property(
        &mut self,
        node: HostId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        let record = self.record_mut(node)?;
        record.props.insert(name.to_owned(), value.clone());
        Ok(())
    }

    fn property(&self, node: HostId, name: &str) -> Option<PropValue> {
        self.record(node).ok()?.props.get(name).cloned()
    }

    fn add_listener(
        &mut self,
        node: HostId,
        event: &str,
        callback: EventHandler,
    ) -> Result<ListenerId, HostError> {
        let id = self.next_listener;
        self.next_listener += 1;
        let record = self.record_mut(node)?;
        record.listeners.push((event.to_owned(), id, callback));
        Ok(id)
    }

    fn remove_listener(
        &mut self,
        node: HostId,
        event: &str,
        id: ListenerId,
    ) -> Result<(), HostError> {
        let record = self.record_mut(node)?;
        let position = record
            .listeners
            .iter()
            .position(|(name, listener, _)| name == event && *listener == id);
        if let Some(position) = position {
            record.listeners.remove(position);
        }
        Ok(())
    }
}
