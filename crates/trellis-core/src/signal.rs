use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::effects::{Dispose, EffectOptions, effect_with};
use crate::reactive::{self, SourceId};

type EqFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// Observable, reactive value.
///
/// Cloning a `Signal` creates another handle to the same cell. Reads through
/// [`get`](Signal::get) / [`with`](Signal::with) inside an effect or memo
/// register a dependency; [`peek`](Signal::peek) does not.
pub struct Signal<T: 'static>(Rc<Inner<T>>);

struct Inner<T> {
    value: RefCell<T>,
    source: SourceId,
    eq: Option<EqFn<T>>,
    /// Version at dispose time.
    retired: Cell<Option<u64>>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        reactive::dispose_source(self.source);
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &self.0.value.borrow())
            .field("version", &self.version())
            .finish()
    }
}

impl<T> Signal<T> {
    /// A signal that notifies on every write.
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// A signal whose writes are dropped when `eq(old, new)` holds.
    pub fn with_equality(value: T, eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::build(value, Some(Box::new(eq)))
    }

    fn build(value: T, eq: Option<EqFn<T>>) -> Self {
        Self(Rc::new(Inner {
            value: RefCell::new(value),
            source: reactive::new_source(),
            eq,
            retired: Cell::new(None),
        }))
    }

    pub fn id(&self) -> SourceId {
        self.0.source
    }

    /// Number of notifications emitted so far. Frozen by
    /// [`dispose`](Signal::dispose).
    pub fn version(&self) -> u64 {
        reactive::source_version(self.0.source)
            .or(self.0.retired.get())
            .unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        reactive::observer_count(self.0.source)
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        reactive::register_source_read(self.0.source);
        self.0.value.borrow().clone()
    }

    /// Read without registering a dependency.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Tracked read by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        reactive::register_source_read(self.0.source);
        f(&self.0.value.borrow())
    }

    pub fn set(&self, v: T) {
        if let Some(eq) = &self.0.eq
            && eq(&self.0.value.borrow(), &v)
        {
            log::trace!(target: crate::log_target::SIGNAL, "set on {:?} is a no-op", self.0.source);
            return;
        }
        *self.0.value.borrow_mut() = v;
        reactive::source_changed(self.0.source);
    }

    /// Mutate in place. Always notifies; the equality predicate only guards
    /// [`set`](Signal::set).
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        f(&mut self.0.value.borrow_mut());
        reactive::source_changed(self.0.source);
    }

    /// Calls `f` with the new value after each notification (not for the
    /// current value). `f` must not write this same signal.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Dispose {
        let weak: Weak<Inner<T>> = Rc::downgrade(&self.0);
        let mut first = true;
        let effect = effect_with(EffectOptions::default(), move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            reactive::register_source_read(inner.source);
            if std::mem::take(&mut first) {
                return;
            }
            f(&inner.value.borrow());
        });
        Dispose::new(move || effect.dispose())
    }

    /// Break every observer edge now. Later writes still store the value but
    /// notify nobody.
    pub fn dispose(&self) {
        if let Some(v) = reactive::source_version(self.0.source) {
            self.0.retired.set(Some(v));
        }
        reactive::dispose_source(self.0.source);
    }
}

impl<T: PartialEq> Signal<T> {
    /// A signal that ignores writes equal to the current value.
    pub fn distinct(value: T) -> Self {
        Self::with_equality(value, |a, b| a == b)
    }
}

pub fn signal<T>(t: T) -> Signal<T> {
    Signal::new(t)
}
