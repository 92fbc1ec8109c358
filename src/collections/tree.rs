use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::view::{NullObserver, ViewEvent, ViewObserver};

use super::source::{CollectionDescriptor, CollectionKey, CollectionLoader, FileEntry, LoaderError};

/// Stable handle to a node. A node keeps its id for as long as it lives;
/// ids of destroyed nodes are never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandState {
    Unexpanded,
    /// The loader was asked for children and has not answered yet
    Expanding,
    Expanded,
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("no such collection node: {0}")]
    UnknownNode(NodeId),

    #[error("collection '{0}' has no children loader")]
    LoaderUnavailable(CollectionKey),

    #[error("loading collection '{key}' failed: {source}")]
    Loader { key: CollectionKey, source: LoaderError },
}

pub struct CollectionNode {
    id: NodeId,
    name: String,
    key: CollectionKey,
    checked: bool,
    state: ExpandState,
    /// Presentation only: whether the display shows the children
    open: bool,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    files: Vec<FileEntry>,
    loader: Option<Arc<dyn CollectionLoader>>,
}

impl CollectionNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn state(&self) -> ExpandState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_expandable(&self) -> bool {
        self.loader.is_some()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

impl fmt::Debug for CollectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("key", &self.key)
            .field("checked", &self.checked)
            .field("state", &self.state)
            .field("children", &self.children)
            .finish()
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Contiguous runs of the old child list that were removed, ascending
    pub removed: Vec<Range<usize>>,
    /// Where the new children landed in the updated list
    pub inserted: Range<usize>,
    /// Checked nodes destroyed by this pass, descendants included.
    /// The ids are dead in the tree but still name the catalog membership.
    pub unchecked: Vec<NodeId>,
}

impl ReconcileReport {
    pub fn removed_count(&self) -> usize {
        self.removed.iter().map(|r| r.len()).sum()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    pub fn is_unchanged(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }
}

/// What a caller needs to fetch children itself (e.g. off the interactive thread)
#[derive(Clone)]
pub struct LoadRequest {
    pub node: NodeId,
    pub key: CollectionKey,
    pub loader: Arc<dyn CollectionLoader>,
    previous: ExpandState,
}

impl LoadRequest {
    pub fn run(&self) -> Result<Vec<CollectionDescriptor>, LoaderError> {
        self.loader.load_children(&self.key)
    }
}

/// Ordered forest of collections whose children are loaded on demand.
///
/// Refreshing a node diffs the loader's answer against the current children
/// by key: vanished children are destroyed with their subtree, surviving
/// children are left untouched (same `NodeId`, same check/expand state,
/// same subtree) and new keys are appended in the loader's order.
pub struct CollectionTree {
    nodes: HashMap<NodeId, CollectionNode>,
    roots: Vec<NodeId>,
    next_id: u64,
    observer: Box<dyn ViewObserver>,
}

impl Default for CollectionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionTree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: 1,
            observer: Box::new(NullObserver),
        }
    }

    /// Build a tree whose top level is `roots`
    pub fn with_roots(roots: Vec<CollectionDescriptor>) -> Self {
        let mut tree = Self::new();
        tree.set_roots(roots);
        tree
    }

    pub fn set_observer(&mut self, observer: Box<dyn ViewObserver>) {
        self.observer = observer;
    }

    /// Reconcile the top level against `fresh`, same rules as for children
    pub fn set_roots(&mut self, fresh: Vec<CollectionDescriptor>) -> ReconcileReport {
        let old = std::mem::take(&mut self.roots);
        let (roots, report) = self.reconcile_list(old, None, fresh);
        self.roots = roots;
        self.publish(None, &report);
        report
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&CollectionNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<&CollectionNode, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut CollectionNode, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.node(id)?.children)
    }

    /// Child of `parent` (or root when `None`) with backing identity `key`
    pub fn find_child(&self, parent: Option<NodeId>, key: &CollectionKey) -> Option<NodeId> {
        let siblings = match parent {
            Some(parent) => &self.nodes.get(&parent)?.children,
            None => &self.roots,
        };
        siblings.iter().copied().find(|id| &self.nodes[id].key == key)
    }

    /// Show the node's children, loading them the first time.
    ///
    /// A node without a loader has nothing to show; that is not an error.
    pub fn expand(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id)?;
        if !node.is_expandable() {
            debug!("[CollectionTree] '{}' is not expandable, ignoring", node.key);
            return Ok(());
        }
        if node.state == ExpandState::Unexpanded {
            let request = self.begin_load(id)?;
            self.finish_load(&request, request.run())?;
        }
        self.node_mut(id)?.open = true;
        Ok(())
    }

    /// Hide the node's children. Nothing is unloaded.
    pub fn collapse(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node_mut(id)?.open = false;
        Ok(())
    }

    /// Ask the loader again and reconcile.
    pub fn refresh(&mut self, id: NodeId) -> Result<ReconcileReport, TreeError> {
        let request = self.begin_load(id)?;
        let fresh = request.run();
        self.finish_load(&request, fresh)
    }

    /// Mark the node as expanding and hand back what is needed to call its loader
    pub fn begin_load(&mut self, id: NodeId) -> Result<LoadRequest, TreeError> {
        let node = self.node_mut(id)?;
        let Some(loader) = node.loader.clone() else {
            return Err(TreeError::LoaderUnavailable(node.key.clone()));
        };
        let previous = node.state;
        node.state = ExpandState::Expanding;
        Ok(LoadRequest {
            node: id,
            key: node.key.clone(),
            loader,
            previous,
        })
    }

    /// Apply a loader answer obtained through `begin_load`.
    /// On failure the children stay as they were.
    pub fn finish_load(
        &mut self,
        request: &LoadRequest,
        fresh: Result<Vec<CollectionDescriptor>, LoaderError>,
    ) -> Result<ReconcileReport, TreeError> {
        match fresh {
            Ok(fresh) => self.reconcile(request.node, fresh),
            Err(source) => {
                warn!("[CollectionTree] Loader failed for '{}': {}", request.key, source);
                if let Some(node) = self.nodes.get_mut(&request.node) {
                    node.state = request.previous;
                }
                Err(TreeError::Loader {
                    key: request.key.clone(),
                    source,
                })
            }
        }
    }

    /// Replace the children of `id` with `fresh`, keeping every child whose key survives
    pub fn reconcile(&mut self, id: NodeId, fresh: Vec<CollectionDescriptor>) -> Result<ReconcileReport, TreeError> {
        let old = std::mem::take(&mut self.node_mut(id)?.children);
        let (children, report) = self.reconcile_list(old, Some(id), fresh);

        let node = self.node_mut(id)?;
        node.children = children;
        node.state = ExpandState::Expanded;

        self.publish(Some(id), &report);
        Ok(report)
    }

    fn reconcile_list(
        &mut self,
        old: Vec<NodeId>,
        parent: Option<NodeId>,
        fresh: Vec<CollectionDescriptor>,
    ) -> (Vec<NodeId>, ReconcileReport) {
        let fresh_keys: HashSet<&CollectionKey> = fresh.iter().map(|d| &d.key).collect();
        let mut report = ReconcileReport::default();
        let mut kept = Vec::with_capacity(fresh.len());
        let mut existing = HashSet::new();

        for (index, id) in old.into_iter().enumerate() {
            let key = self.nodes[&id].key.clone();
            if fresh_keys.contains(&key) {
                existing.insert(key);
                kept.push(id);
                continue;
            }

            match report.removed.last_mut() {
                Some(run) if run.end == index => run.end = index + 1,
                _ => report.removed.push(index..index + 1),
            }
            self.destroy(id, &mut report.unchecked);
        }

        let start = kept.len();
        for descriptor in fresh {
            // Also guards against a loader reporting the same key twice
            if !existing.insert(descriptor.key.clone()) {
                continue;
            }
            kept.push(self.create(descriptor, parent));
        }
        report.inserted = start..kept.len();

        (kept, report)
    }

    fn create(&mut self, descriptor: CollectionDescriptor, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            CollectionNode {
                id,
                name: descriptor.name,
                key: descriptor.key,
                checked: false,
                state: ExpandState::Unexpanded,
                open: false,
                children: Vec::new(),
                parent,
                files: descriptor.files,
                loader: descriptor.loader,
            },
        );
        id
    }

    /// Remove `id` and its whole subtree
    fn destroy(&mut self, id: NodeId, unchecked: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        debug!("[CollectionTree] Destroyed '{}'", node.key);
        if node.checked {
            unchecked.push(id);
        }
        for child in node.children {
            self.destroy(child, unchecked);
        }
    }

    fn publish(&mut self, node: Option<NodeId>, report: &ReconcileReport) {
        if report.is_unchanged() {
            return;
        }
        self.observer.notify(ViewEvent::ChildrenReplaced {
            node,
            removed: report.removed.clone(),
            inserted: report.inserted.clone(),
        });
    }

    /// Returns whether the state changed
    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if node.checked == checked {
            return Ok(false);
        }
        node.checked = checked;
        self.observer.notify(ViewEvent::NodeChanged(id));
        Ok(true)
    }

    /// Files of a collection: asked from the loader when there is one,
    /// otherwise the list the descriptor came with
    pub fn load_files(&self, id: NodeId) -> Result<Vec<FileEntry>, TreeError> {
        let node = self.node(id)?;
        match &node.loader {
            Some(loader) => loader.load_files(&node.key).map_err(|source| TreeError::Loader {
                key: node.key.clone(),
                source,
            }),
            None => Ok(node.files.clone()),
        }
    }

    /// Checked nodes in depth-first display order
    pub fn checked(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[&id];
            if node.checked {
                out.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}
