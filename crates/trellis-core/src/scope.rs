use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::reactive::{self, EffectId};

thread_local! {
    static CURRENT_SCOPE: RefCell<Option<Weak<ScopeInner>>> = const { RefCell::new(None) };
}

/// Ownership boundary for effects and memos.
///
/// Effects created while a scope is current belong to it; disposing the scope
/// disposes child scopes first, then its effects, then runs its disposers.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    disposers: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<Scope>>,
    effects: RefCell<Vec<EffectId>>,
}

impl ScopeInner {
    fn teardown(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.inner.teardown();
        }

        let effects = std::mem::take(&mut *self.effects.borrow_mut());
        for id in effects {
            reactive::dispose_effect(id);
        }

        let disposers = std::mem::take(&mut *self.disposers.borrow_mut());
        for disposer in disposers {
            disposer();
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner::default()),
        }
    }

    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore(Option<Weak<ScopeInner>>);
        impl Drop for Restore {
            fn drop(&mut self) {
                let prev = self.0.take();
                let _ = CURRENT_SCOPE.try_with(|current| *current.borrow_mut() = prev);
            }
        }

        let prev = CURRENT_SCOPE.with(|current| {
            current
                .borrow_mut()
                .replace(Rc::downgrade(&self.inner))
        });
        let _restore = Restore(prev);
        f()
    }

    pub fn add_disposer(&self, disposer: impl FnOnce() + 'static) {
        self.inner.disposers.borrow_mut().push(Box::new(disposer));
    }

    pub(crate) fn own_effect(&self, id: EffectId) {
        self.inner.effects.borrow_mut().push(id);
    }

    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    pub fn child(&self) -> Scope {
        let child = Scope::new();
        self.inner.children.borrow_mut().push(child.clone());
        child
    }

    /// Tear the scope down. Safe to call more than once.
    pub fn dispose(&self) {
        self.inner.teardown();
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub fn current_scope() -> Option<Scope> {
    CURRENT_SCOPE.with(|current| {
        current
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade().map(|inner| Scope { inner }))
    })
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{effect, on_cleanup, signal};
    use std::cell::Cell;

    #[test]
    fn dispose_cascades_children_before_parent() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let parent = Scope::new();
        let child = parent.child();
        parent.add_disposer({
            let order = order.clone();
            move || order.borrow_mut().push("parent")
        });
        child.add_disposer({
            let order = order.clone();
            move || order.borrow_mut().push("child")
        });
        parent.dispose();
        parent.dispose();
        assert_eq!(*order.borrow(), vec!["child", "parent"]);
    }

    #[test]
    fn effects_created_in_scope_are_disposed_with_it() {
        let s = signal(0);
        let runs = Rc::new(Cell::new(0));
        let scope = Scope::new();
        let e = scope.run(|| {
            effect({
                let s = s.clone();
                let runs = runs.clone();
                move || {
                    s.get();
                    runs.set(runs.get() + 1);
                }
            })
        });
        assert_eq!(scope.effect_count(), 1);
        s.set(1);
        assert_eq!(runs.get(), 2);
        scope.dispose();
        assert!(!e.is_active());
        s.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn on_cleanup_outside_effect_lands_on_scope() {
        let hit = Rc::new(Cell::new(false));
        let scope = Scope::new();
        scope.run(|| {
            let hit = hit.clone();
            on_cleanup(move || hit.set(true));
        });
        assert!(!hit.get());
        scope.dispose();
        assert!(hit.get());
        assert!(current_scope().is_none());
    }
}
