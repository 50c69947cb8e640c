//! Elements: the nodes of the element tree.
//!
//! Strong references flow from parent to children only. The parent link is a
//! `Weak` observation that reads as `None` once the parent is gone, so
//! detached subtrees never keep their old ancestors alive.
//!
//! Dirty state is an atomic bitset. Marking a node dirty bumps its version
//! when the set actually changes and marks the parent `CHILDREN`-dirty, which
//! recurses to the root; clearing never touches the version.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::error::TreeError;
use crate::log_target;
use crate::render_api::PaintContext;
use crate::tree::{Ancestors, PreOrder, Tree, TreeShared};
use crate::widget::Widget;
use crate::{Rect, Size, Vec2};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u8 {
        const LAYOUT = 1 << 0;
        const PAINT = 1 << 1;
        const CHILDREN = 1 << 2;
        const PROPERTIES = 1 << 3;
        const TRANSFORM = 1 << 4;
    }
}

/// Stable identity of an element; also the key paint commands are diffed by.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(Arc<str>);

impl ElementId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        ElementId(Arc::from(s))
    }
}

impl From<String> for ElementId {
    fn from(s: String) -> Self {
        ElementId(Arc::from(s))
    }
}

impl Borrow<str> for ElementId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Children = SmallVec<[Arc<Element>; 4]>;

pub struct Element {
    id: ElementId,
    widget: RwLock<Box<dyn Widget>>,
    children: RwLock<Children>,
    parent: RwLock<Weak<Element>>,
    owner: RwLock<Weak<TreeShared>>,
    bounds: RwLock<Rect>,
    z_index: AtomicI32,
    dirty: AtomicU8,
    version: AtomicU64,
    measured: Mutex<Option<Size>>,
    disposed: AtomicBool,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("widget", &self.widget.read().debug_name())
            .field("bounds", &self.bounds())
            .field("dirty", &self.dirty_flags())
            .field("version", &self.version())
            .field("children", &self.children.read().len())
            .finish()
    }
}

impl Element {
    /// A detached element. New elements start `LAYOUT | PAINT` dirty.
    pub fn new(id: impl Into<ElementId>, widget: impl Widget) -> Arc<Element> {
        Self::from_boxed(id, Box::new(widget))
    }

    pub fn from_boxed(id: impl Into<ElementId>, widget: Box<dyn Widget>) -> Arc<Element> {
        Arc::new(Element {
            id: id.into(),
            widget: RwLock::new(widget),
            children: RwLock::new(SmallVec::new()),
            parent: RwLock::new(Weak::new()),
            owner: RwLock::new(Weak::new()),
            bounds: RwLock::new(Rect::default()),
            z_index: AtomicI32::new(0),
            dirty: AtomicU8::new((DirtyFlags::LAYOUT | DirtyFlags::PAINT).bits()),
            version: AtomicU64::new(0),
            measured: Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// Build a detached element with `children` already attached.
    pub fn with_children(
        id: impl Into<ElementId>,
        widget: impl Widget,
        children: impl IntoIterator<Item = Arc<Element>>,
    ) -> Arc<Element> {
        let el = Element::new(id, widget);
        for child in children {
            el.attach(child, usize::MAX);
        }
        el
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn parent(&self) -> Option<Arc<Element>> {
        self.parent.read().upgrade()
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<Arc<Element>> {
        self.children.read().iter().cloned().collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    /// The tree this element is installed in, if any.
    pub fn tree(&self) -> Option<Tree> {
        self.owner.read().upgrade().map(Tree::from_shared)
    }

    pub(crate) fn set_owner(&self, owner: Weak<TreeShared>) {
        *self.owner.write() = owner;
    }

    // Geometry

    /// Bounds relative to the parent.
    pub fn bounds(&self) -> Rect {
        *self.bounds.read()
    }

    pub fn set_bounds(&self, rect: Rect) {
        *self.bounds.write() = rect;
    }

    pub fn set_size(&self, size: Size) {
        let mut b = self.bounds.write();
        b.w = size.width;
        b.h = size.height;
    }

    pub fn set_position(&self, pos: Vec2) {
        let mut b = self.bounds.write();
        b.x = pos.x;
        b.y = pos.y;
    }

    pub fn z_index(&self) -> i32 {
        self.z_index.load(Ordering::Relaxed)
    }

    pub fn set_z_index(&self, z: i32) {
        if self.z_index.swap(z, Ordering::AcqRel) != z {
            self.mark_dirty(DirtyFlags::PAINT);
        }
    }

    /// Size recorded by the last measure pass.
    pub fn cached_size(&self) -> Option<Size> {
        *self.measured.lock()
    }

    pub fn set_cached_size(&self, size: Option<Size>) {
        *self.measured.lock() = size;
    }

    // Dirty tracking

    pub fn dirty_flags(&self) -> DirtyFlags {
        DirtyFlags::from_bits_truncate(self.dirty.load(Ordering::Acquire))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire) != 0
    }

    /// True if any of `flags` is set.
    pub fn has_dirty(&self, flags: DirtyFlags) -> bool {
        self.dirty_flags().intersects(flags)
    }

    pub fn mark_dirty(&self, flags: DirtyFlags) {
        let bits = flags.bits();
        let prev = self.dirty.fetch_or(bits, Ordering::AcqRel);
        if prev | bits == prev {
            return;
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        log::trace!(target: log_target::TREE, "{:?} dirty {:?}", self.id, flags);
        if let Some(parent) = self.parent() {
            parent.mark_dirty(DirtyFlags::CHILDREN);
        }
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(0, Ordering::Release);
    }

    pub fn clear_dirty_flags(&self, flags: DirtyFlags) {
        self.dirty.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    // Widget access

    pub fn with_widget<R>(&self, f: impl FnOnce(&dyn Widget) -> R) -> R {
        f(&**self.widget.read())
    }

    pub fn with_widget_mut<R>(&self, f: impl FnOnce(&mut dyn Widget) -> R) -> R {
        f(&mut **self.widget.write())
    }

    /// Mutate the payload as a `W` and mark `flags`. Returns false (and marks
    /// nothing) when the payload is not a `W`.
    pub fn update_widget<W: Widget>(&self, flags: DirtyFlags, f: impl FnOnce(&mut W)) -> bool {
        let updated = {
            let mut w = self.widget.write();
            match w.downcast_mut::<W>() {
                Some(w) => {
                    f(w);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.mark_dirty(flags);
        } else {
            log::warn!(
                target: log_target::WIDGET,
                "{:?} payload is not a {}",
                self.id,
                std::any::type_name::<W>()
            );
        }
        updated
    }

    pub fn read_widget<W: Widget, R>(&self, f: impl FnOnce(&W) -> R) -> Option<R> {
        let w = self.widget.read();
        w.downcast_ref::<W>().map(f)
    }

    // Navigation

    /// Parent, grandparent, ... up to the root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors::new(self.parent())
    }

    /// All descendants depth-first, left to right, excluding `self`.
    pub fn descendants(&self) -> PreOrder {
        PreOrder::new(self.children())
    }

    /// The parent's other children, in insertion order.
    pub fn siblings(&self) -> impl Iterator<Item = Arc<Element>> + use<'_> {
        let all = self.parent().map(|p| p.children()).unwrap_or_default();
        all.into_iter()
            .filter(move |c| !std::ptr::eq(Arc::as_ptr(c), self as *const Element))
    }

    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    // Structure

    /// Append `child`. Goes through the owning tree when installed, so the
    /// id index stays in sync.
    pub fn add_child(self: &Arc<Self>, child: Arc<Element>) -> Result<(), TreeError> {
        self.insert_child(usize::MAX, child)
    }

    /// Insert `child` at `index`, clamped to the child count.
    pub fn insert_child(self: &Arc<Self>, index: usize, child: Arc<Element>) -> Result<(), TreeError> {
        if let Some(tree) = self.tree() {
            return tree.insert(self, child, index);
        }
        if child.parent().is_some() {
            return Err(TreeError::AlreadyAttached(child.id.clone()));
        }
        if Arc::ptr_eq(self, &child) || self.ancestors().any(|a| Arc::ptr_eq(&a, &child)) {
            return Err(TreeError::Cycle {
                parent: self.id.clone(),
                child: child.id.clone(),
            });
        }
        self.attach(child, index);
        Ok(())
    }

    /// Detach `child` (and its subtree). False if it is not a child of `self`.
    pub fn remove_child(&self, child: &Arc<Element>) -> bool {
        let is_child = child
            .parent()
            .is_some_and(|p| std::ptr::eq(Arc::as_ptr(&p), self as *const Element));
        if !is_child {
            return false;
        }
        if let Some(tree) = self.tree() {
            return tree.remove(child);
        }
        self.detach(child)
    }

    /// Link without checks or index maintenance.
    pub(crate) fn attach(self: &Arc<Self>, child: Arc<Element>, index: usize) {
        *child.parent.write() = Arc::downgrade(self);
        {
            let mut kids = self.children.write();
            let at = index.min(kids.len());
            kids.insert(at, child);
        }
        self.mark_dirty(DirtyFlags::CHILDREN | DirtyFlags::LAYOUT);
    }

    pub(crate) fn detach(&self, child: &Arc<Element>) -> bool {
        let removed = {
            let mut kids = self.children.write();
            match kids.iter().position(|c| Arc::ptr_eq(c, child)) {
                Some(pos) => {
                    kids.remove(pos);
                    true
                }
                None => false,
            }
        };
        if removed {
            *child.parent.write() = Weak::new();
            self.mark_dirty(DirtyFlags::CHILDREN | DirtyFlags::LAYOUT);
        }
        removed
    }

    // Painting and disposal

    /// Paint this subtree immediate-mode, children after their parent.
    /// `origin` is the absolute position of this element's parent.
    pub fn paint_subtree(&self, origin: Vec2, cx: &mut dyn PaintContext) {
        let abs = self.bounds().translate(origin);
        self.with_widget(|w| w.paint(&self.id, abs, cx));
        for child in self.children() {
            child.paint_subtree(abs.origin(), cx);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Dispose children first, then this element's payload. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for child in self.children() {
            child.dispose();
        }
        self.widget.write().dispose();
        log::trace!(target: log_target::WIDGET, "disposed {:?}", self.id);
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        // Best effort for payloads nobody disposed explicitly.
        if !*self.disposed.get_mut() {
            self.widget.get_mut().dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Constraints, Widget};
    use std::sync::atomic::AtomicUsize;

    struct Plain;
    impl Widget for Plain {
        fn measure(&self, _: Constraints) -> Size {
            Size::new(1.0, 1.0)
        }
    }

    struct Counted(Arc<AtomicUsize>);
    impl Widget for Counted {
        fn measure(&self, _: Constraints) -> Size {
            Size::ZERO
        }
        fn dispose(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn mark_dirty_propagates_children_flag_and_bumps_version_once() {
        let leaf = Element::new("leaf", Plain);
        let mid = Element::with_children("mid", Plain, [leaf.clone()]);
        let root = Element::with_children("root", Plain, [mid.clone()]);
        for n in [&root, &mid, &leaf] {
            n.clear_dirty();
        }
        let v = leaf.version();

        leaf.mark_dirty(DirtyFlags::LAYOUT);
        leaf.mark_dirty(DirtyFlags::LAYOUT);
        assert_eq!(leaf.version(), v + 1);
        assert!(mid.has_dirty(DirtyFlags::CHILDREN));
        assert!(root.has_dirty(DirtyFlags::CHILDREN));
        assert!(!root.has_dirty(DirtyFlags::LAYOUT));

        let before = leaf.version();
        leaf.clear_dirty();
        assert!(!leaf.is_dirty());
        assert_eq!(leaf.version(), before);
    }

    #[test]
    fn parent_link_is_weak() {
        let child = Element::new("child", Plain);
        {
            let parent = Element::with_children("parent", Plain, [child.clone()]);
            assert_eq!(child.parent().map(|p| p.id().clone()), Some(ElementId::from("parent")));
            drop(parent);
        }
        assert!(child.parent().is_none());
    }

    #[test]
    fn siblings_exclude_self_in_insertion_order() {
        let a = Element::new("a", Plain);
        let b = Element::new("b", Plain);
        let c = Element::new("c", Plain);
        let _p = Element::with_children("p", Plain, [a.clone(), b.clone(), c.clone()]);
        let ids: Vec<String> = b.siblings().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn insert_rejects_cycles_and_second_parents() {
        let a = Element::new("a", Plain);
        let b = Element::new("b", Plain);
        a.add_child(b.clone()).unwrap();
        assert!(matches!(b.add_child(a.clone()), Err(TreeError::Cycle { .. })));
        let other = Element::new("other", Plain);
        assert!(matches!(
            other.add_child(b.clone()),
            Err(TreeError::AlreadyAttached(_))
        ));
        assert!(a.remove_child(&b));
        assert!(!a.remove_child(&b));
        other.add_child(b).unwrap();
    }

    #[test]
    fn insert_index_is_clamped() {
        let p = Element::new("p", Plain);
        p.insert_child(10, Element::new("x", Plain)).unwrap();
        p.insert_child(0, Element::new("y", Plain)).unwrap();
        let ids: Vec<String> = p.children().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["y", "x"]);
    }

    #[test]
    fn dispose_cascades_and_drop_does_not_double_dispose() {
        let hits = Arc::new(AtomicUsize::new(0));
        let leaf = Element::new("leaf", Counted(hits.clone()));
        let root = Element::with_children("root", Counted(hits.clone()), [leaf]);
        root.dispose();
        root.dispose();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        drop(root);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn orphaned_payload_is_disposed_on_drop() {
        let hits = Arc::new(AtomicUsize::new(0));
        drop(Element::new("x", Counted(hits.clone())));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
