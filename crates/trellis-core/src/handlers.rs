//! Activation handlers kept on the reactive thread.
//!
//! Widget payloads are `Send + Sync`, so they cannot capture a [`Signal`].
//! Handlers registered with [`on_activate`] can: they live in a per-thread
//! table keyed by element id and are run by
//! [`Tree::dispatch_event`](crate::Tree::dispatch_event) on the dispatching
//! thread, inside one [`batch`](crate::batch), after the widget that was
//! activated has been released.
//!
//! [`Signal`]: crate::Signal

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::effects::Dispose;
use crate::element::ElementId;
use crate::log_target;

type Handler = Rc<dyn Fn()>;

#[derive(Default)]
struct Registry {
    next_key: u64,
    by_element: HashMap<ElementId, Vec<(u64, Handler)>>,
}

thread_local! {
    static HANDLERS: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Run `f` each time the element `id` is activated (a button click) by an
/// event dispatched on this thread.
///
/// The handler stays registered until the returned [`Dispose`] runs, the
/// [`Scope`](crate::Scope) current at registration is disposed, or the tree
/// holding the element is disposed.
pub fn on_activate(id: impl Into<ElementId>, f: impl Fn() + 'static) -> Dispose {
    let id = id.into();
    let key = HANDLERS.with(|h| {
        let mut h = h.borrow_mut();
        h.next_key += 1;
        let key = h.next_key;
        h.by_element
            .entry(id.clone())
            .or_default()
            .push((key, Rc::new(f)));
        key
    });
    log::trace!(target: log_target::WIDGET, "activation handler #{key} on {id:?}");

    let dispose = Dispose::new(move || {
        let _ = HANDLERS.try_with(|h| {
            if let Ok(mut h) = h.try_borrow_mut()
                && let Some(list) = h.by_element.get_mut(&id)
            {
                list.retain(|(k, _)| *k != key);
                if list.is_empty() {
                    h.by_element.remove(&id);
                }
            }
        });
    });
    if let Some(scope) = crate::scope::current_scope() {
        let dispose = dispose.clone();
        scope.add_disposer(move || dispose.run());
    }
    dispose
}

/// Handlers currently registered for `id` on this thread.
pub fn activation_handler_count(id: &str) -> usize {
    HANDLERS.with(|h| h.borrow().by_element.get(id).map_or(0, Vec::len))
}

/// Run the handlers for `id`; returns how many ran. The table is not
/// borrowed while they run, so a handler may register or dispose handlers.
pub(crate) fn fire(id: &ElementId) -> usize {
    let handlers: Vec<Handler> = HANDLERS.with(|h| {
        h.borrow()
            .by_element
            .get(id)
            .map(|list| list.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default()
    });
    for f in &handlers {
        f();
    }
    handlers.len()
}

/// Drop every handler registered for `id` on this thread.
pub(crate) fn forget(id: &ElementId) {
    let _ = HANDLERS.try_with(|h| {
        if let Ok(mut h) = h.try_borrow_mut() {
            h.by_element.remove(id);
        }
    });
}
