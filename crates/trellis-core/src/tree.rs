//! The rooted element tree and its traversals.
//!
//! A [`Tree`] owns the root and an id index for O(1) lookup. Structural edits
//! made through the tree (or through an element installed in it) are
//! serialized on a writer lock and keep the index and node count in step.
//!
//! Traversals snapshot the structure when they are created and then yield
//! from the snapshot: no lock is held across `next()`, they can be dropped
//! early, and edits made while one is running do not show up in it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::element::{DirtyFlags, Element, ElementId};
use crate::error::TreeError;
use crate::handlers;
use crate::input::Event;
use crate::log_target;
use crate::paint::ClickHandler;
use crate::widget::EventResponse;
use crate::Vec2;

pub(crate) struct TreeShared {
    root: RwLock<Option<Arc<Element>>>,
    index: RwLock<HashMap<ElementId, Arc<Element>>>,
    node_count: AtomicUsize,
    version: AtomicU64,
    structure: Mutex<()>,
}

/// Cheap handle; clones share the same tree.
#[derive(Clone)]
pub struct Tree {
    shared: Arc<TreeShared>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub node_count: usize,
    pub max_depth: usize,
    pub dirty_nodes: usize,
    pub version: u64,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root().map(|r| r.id().clone()))
            .field("node_count", &self.node_count())
            .field("version", &self.version())
            .finish()
    }
}

impl Tree {
    pub fn new() -> Self {
        Tree {
            shared: Arc::new(TreeShared {
                root: RwLock::new(None),
                index: RwLock::new(HashMap::new()),
                node_count: AtomicUsize::new(0),
                version: AtomicU64::new(0),
                structure: Mutex::new(()),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<TreeShared>) -> Self {
        Tree { shared }
    }

    fn owner(&self) -> Weak<TreeShared> {
        Arc::downgrade(&self.shared)
    }

    fn owns(&self, node: &Element) -> bool {
        node.tree().is_some_and(|t| Arc::ptr_eq(&t.shared, &self.shared))
    }

    /// Install `root` and rebuild the id index from it. Fails without side
    /// effects if two nodes share an id or `root` already has a parent.
    pub fn set_root(&self, root: Arc<Element>) -> Result<(), TreeError> {
        let _w = self.shared.structure.lock();
        if root.parent().is_some() {
            return Err(TreeError::AlreadyAttached(root.id().clone()));
        }

        let mut index = HashMap::new();
        for node in std::iter::once(root.clone()).chain(root.descendants()) {
            let id = node.id().clone();
            if index.insert(id.clone(), node).is_some() {
                return Err(TreeError::DuplicateId(id));
            }
        }

        let old = self.shared.root.write().replace(root.clone());
        if let Some(old) = old {
            for node in std::iter::once(old.clone()).chain(old.descendants()) {
                node.set_owner(Weak::new());
            }
        }
        for node in index.values() {
            node.set_owner(self.owner());
        }
        self.shared.node_count.store(index.len(), Ordering::Release);
        *self.shared.index.write() = index;
        self.bump();
        log::debug!(
            target: log_target::TREE,
            "root set to {:?} ({} nodes)",
            root.id(),
            self.node_count()
        );
        Ok(())
    }

    pub fn root(&self) -> Option<Arc<Element>> {
        self.shared.root.read().clone()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<Element>> {
        self.shared.index.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.shared.index.read().contains_key(id)
    }

    /// Insert `child` (and its subtree) under `parent` at `index`, clamped to
    /// the child count.
    pub fn insert(
        &self,
        parent: &Arc<Element>,
        child: Arc<Element>,
        index: usize,
    ) -> Result<(), TreeError> {
        let _w = self.shared.structure.lock();
        if !self.owns(parent) {
            return Err(TreeError::NotInstalled(parent.id().clone()));
        }
        if child.parent().is_some() || self.owns(&child) {
            return Err(TreeError::AlreadyAttached(child.id().clone()));
        }
        if Arc::ptr_eq(parent, &child) || parent.ancestors().any(|a| Arc::ptr_eq(&a, &child)) {
            return Err(TreeError::Cycle {
                parent: parent.id().clone(),
                child: child.id().clone(),
            });
        }

        let incoming: Vec<Arc<Element>> =
            std::iter::once(child.clone()).chain(child.descendants()).collect();
        {
            let index = self.shared.index.read();
            let mut seen = std::collections::HashSet::new();
            for node in &incoming {
                if index.contains_key(node.id().as_str()) || !seen.insert(node.id().clone()) {
                    return Err(TreeError::DuplicateId(node.id().clone()));
                }
            }
        }

        parent.attach(child, index);
        {
            let mut idx = self.shared.index.write();
            for node in &incoming {
                node.set_owner(self.owner());
                idx.insert(node.id().clone(), node.clone());
            }
        }
        self.shared
            .node_count
            .fetch_add(incoming.len(), Ordering::AcqRel);
        self.bump();
        Ok(())
    }

    /// Detach `node` and drop it and every descendant from the index. False
    /// for the root or a node not installed in this tree.
    pub fn remove(&self, node: &Arc<Element>) -> bool {
        let _w = self.shared.structure.lock();
        if !self.owns(node) {
            return false;
        }
        let Some(parent) = node.parent() else {
            return false;
        };

        let outgoing: Vec<Arc<Element>> =
            std::iter::once(node.clone()).chain(node.descendants()).collect();
        if !parent.detach(node) {
            return false;
        }
        {
            let mut idx = self.shared.index.write();
            for n in &outgoing {
                idx.remove(n.id().as_str());
                n.set_owner(Weak::new());
            }
        }
        self.shared
            .node_count
            .fetch_sub(outgoing.len(), Ordering::AcqRel);
        self.bump();
        log::trace!(
            target: log_target::TREE,
            "removed {:?} ({} nodes)",
            node.id(),
            outgoing.len()
        );
        true
    }

    pub fn node_count(&self) -> usize {
        self.shared.node_count.load(Ordering::Acquire)
    }

    /// Bumped on every structural change.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.shared.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            node_count: self.node_count(),
            version: self.version(),
            ..TreeStats::default()
        };
        for (depth, node) in self.level_order() {
            stats.max_depth = stats.max_depth.max(depth);
            if node.is_dirty() {
                stats.dirty_nodes += 1;
            }
        }
        stats
    }

    // Traversals

    pub fn pre_order(&self) -> PreOrder {
        PreOrder::new(self.root().into_iter().collect())
    }

    pub fn post_order(&self) -> PostOrder {
        PostOrder::new(self.root())
    }

    pub fn bfs(&self) -> Bfs {
        Bfs::new(self.root())
    }

    /// Breadth-first with the depth (root = 0) alongside each node.
    pub fn level_order(&self) -> LevelOrder {
        LevelOrder::new(self.root())
    }

    /// Every node with any dirty flag set, in pre-order.
    pub fn dirty_nodes(&self) -> impl Iterator<Item = Arc<Element>> {
        self.pre_order().filter(|n| n.is_dirty())
    }

    /// Mark every installed node with `flags`.
    pub fn mark_all(&self, flags: DirtyFlags) {
        for node in self.pre_order() {
            node.mark_dirty(flags);
        }
    }

    /// Deliver `event` to widgets from the root down. Positional events only
    /// reach widgets whose absolute bounds contain the position, and arrive
    /// in the widget's local coordinates. Returns the consumer, if any.
    ///
    /// On activation the widget's callback and the element's
    /// [`on_activate`](crate::on_activate) handlers run after the payload
    /// lock is released, batched so effects see every write once.
    pub fn dispatch_event(&self, event: &Event) -> Option<ElementId> {
        let root = self.root()?;
        let mut stack = vec![(root, Vec2::ZERO)];
        while let Some((node, origin)) = stack.pop() {
            let abs = node.bounds().translate(origin);
            let hit = event.position().is_none_or(|p| abs.contains(p));
            if hit {
                let local = event.localized(abs.origin());
                let response = node.with_widget_mut(|w| w.handle_event(&local));
                if response.is_consumed() {
                    log::debug!(
                        target: log_target::WIDGET,
                        "{} consumed by {:?}",
                        event.tag(),
                        node.id()
                    );
                    if let EventResponse::Activated(callback) = response {
                        activate(node.id(), callback);
                    }
                    return Some(node.id().clone());
                }
            }
            for child in node.children().into_iter().rev() {
                stack.push((child, abs.origin()));
            }
        }
        None
    }

    /// Dispose every payload from the root down and empty the tree.
    pub fn dispose(&self) {
        let _w = self.shared.structure.lock();
        let root = self.shared.root.write().take();
        let nodes: Vec<Arc<Element>> = self.shared.index.write().drain().map(|(_, n)| n).collect();
        for n in &nodes {
            n.set_owner(Weak::new());
            handlers::forget(n.id());
        }
        if let Some(root) = root {
            root.dispose();
        }
        self.shared.node_count.store(0, Ordering::Release);
        self.bump();
    }
}

fn activate(id: &ElementId, callback: Option<ClickHandler>) {
    let ran = crate::batch_value(|| {
        if let Some(f) = &callback {
            f();
        }
        handlers::fire(id)
    });
    log::trace!(
        target: log_target::WIDGET,
        "{id:?} activated ({} handler(s))",
        ran + usize::from(callback.is_some())
    );
}

/// Parent, grandparent, ... up to the root.
pub struct Ancestors {
    next: Option<Arc<Element>>,
}

impl Ancestors {
    pub(crate) fn new(start: Option<Arc<Element>>) -> Self {
        Ancestors { next: start }
    }
}

impl Iterator for Ancestors {
    type Item = Arc<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next.take()?;
        self.next = cur.parent();
        Some(cur)
    }
}

/// Depth-first, parent before children, left to right.
pub struct PreOrder {
    nodes: std::vec::IntoIter<Arc<Element>>,
}

impl PreOrder {
    /// Traverse each of `roots` in order.
    pub(crate) fn new(mut roots: Vec<Arc<Element>>) -> Self {
        roots.reverse();
        let mut stack = roots;
        let mut nodes = Vec::new();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            nodes.push(node);
        }
        PreOrder {
            nodes: nodes.into_iter(),
        }
    }
}

impl Iterator for PreOrder {
    type Item = Arc<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

/// Depth-first, every node after all of its descendants.
pub struct PostOrder {
    nodes: std::vec::IntoIter<Arc<Element>>,
}

impl PostOrder {
    fn new(root: Option<Arc<Element>>) -> Self {
        // (node, children already pushed)
        let mut stack: Vec<(Arc<Element>, bool)> = root.map(|r| (r, false)).into_iter().collect();
        let mut nodes = Vec::new();
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                nodes.push(node);
                continue;
            }
            let children = node.children();
            stack.push((node, true));
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }
        PostOrder {
            nodes: nodes.into_iter(),
        }
    }
}

impl Iterator for PostOrder {
    type Item = Arc<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

pub struct Bfs {
    inner: LevelOrder,
}

impl Bfs {
    fn new(root: Option<Arc<Element>>) -> Self {
        Bfs {
            inner: LevelOrder::new(root),
        }
    }
}

impl Iterator for Bfs {
    type Item = Arc<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, node)| node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct LevelOrder {
    nodes: std::vec::IntoIter<(usize, Arc<Element>)>,
}

impl LevelOrder {
    fn new(root: Option<Arc<Element>>) -> Self {
        let mut queue: VecDeque<(usize, Arc<Element>)> = root.map(|r| (0, r)).into_iter().collect();
        let mut nodes = Vec::new();
        while let Some((depth, node)) = queue.pop_front() {
            queue.extend(node.children().into_iter().map(|c| (depth + 1, c)));
            nodes.push((depth, node));
        }
        LevelOrder {
            nodes: nodes.into_iter(),
        }
    }
}

impl Iterator for LevelOrder {
    type Item = (usize, Arc<Element>);

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}
