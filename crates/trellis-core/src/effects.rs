use std::cell::RefCell;
use std::rc::Rc;

use crate::reactive::{self, EffectId, SourceId, Start};

pub use crate::reactive::EffectOptions;

#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }
}

/// Handle to a reactive effect.
///
/// The effect lives until [`dispose`](Effect::dispose) is called or the
/// [`Scope`](crate::scope::Scope) that was current at creation is disposed;
/// dropping the handle does not stop it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Effect {
    id: EffectId,
}

impl Effect {
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Run the body now, re-establishing its dependencies.
    pub fn run(&self) -> bool {
        reactive::run_effect(self.id)
    }

    pub fn dispose(&self) {
        reactive::dispose_effect(self.id)
    }

    /// Register a callback to run before the next re-run and on dispose.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        reactive::effect_on_cleanup(self.id, Box::new(f))
    }

    pub fn is_active(&self) -> bool {
        reactive::effect_is_active(self.id)
    }

    pub fn is_dirty(&self) -> bool {
        reactive::effect_is_dirty(self.id)
    }

    pub fn is_running(&self) -> bool {
        reactive::effect_is_running(self.id)
    }

    /// Sources read during the last run.
    pub fn dependencies(&self) -> Vec<SourceId> {
        reactive::effect_dependencies(self.id)
            .into_iter()
            .map(|(s, _)| s)
            .collect()
    }
}

/// Create an effect that runs now and again whenever a source it read
/// changes.
pub fn effect(body: impl FnMut() + 'static) -> Effect {
    effect_with(EffectOptions::default(), body)
}

pub fn effect_with(options: EffectOptions, body: impl FnMut() + 'static) -> Effect {
    let start = if options.immediate {
        Start::Now
    } else {
        Start::Scheduled
    };
    Effect {
        id: reactive::new_effect(Box::new(body), options, false, start),
    }
}

/// Register cleanup on the running effect, or on the current scope when no
/// effect is running. With neither, `f` runs immediately.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    if let Some(id) = reactive::current_effect() {
        reactive::effect_on_cleanup(id, Box::new(f));
    } else if let Some(scope) = crate::scope::current_scope() {
        scope.add_disposer(f);
    } else {
        log::debug!(target: crate::log_target::EFFECT, "on_cleanup outside any owner; running now");
        f();
    }
}

/// Effect sugar returning a [`Dispose`] guard.
pub fn watch(body: impl FnMut() + 'static) -> Dispose {
    let e = effect(body);
    Dispose::new(move || e.dispose())
}

pub use crate::reactive::untrack;
