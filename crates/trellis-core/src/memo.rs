//! Lazily recomputed derived values.
//!
//! A [`Memo`] caches the result of a computation over signals (or other
//! memos). It is a source in its own right, so effects that read it re-run
//! when it is invalidated.
//!
//! # Invariants
//!
//! 1. The computation runs only on a [`get`](Memo::get) while stale; an
//!    unchanged memo returns its cache.
//! 2. [`version`](Memo::version) increments by exactly one per computed value.
//! 3. Invalidation is eager (the stale flag flips as soon as a dependency
//!    changes, even inside a batch); recomputation is lazy.
//!
//! # Failure modes
//!
//! - **Computation panics**: the previous cache is kept and the memo stays
//!   stale, so the next `get` retries.
//! - **Reading itself during computation**: logged; the previous cache is
//!   returned if there is one, otherwise the read fails with
//!   [`ReactiveError::Cycle`] ([`try_get`](Memo::try_get)) or panics
//!   ([`get`](Memo::get)).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ReactiveError;
use crate::log_target;
use crate::reactive::{self, EffectId, EffectOptions, SourceId, Start};

pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

struct MemoInner<T> {
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<Option<T>>,
    stale: Cell<bool>,
    computing: Cell<bool>,
    version: Cell<u64>,
    source: SourceId,
    tracker: Cell<Option<EffectId>>,
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            reactive::dispose_effect(tracker);
        }
        reactive::dispose_source(self.source);
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("cached", &self.inner.cached.borrow())
            .field("stale", &self.inner.stale.get())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + 'static> Memo<T> {
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new(MemoInner {
            compute: Box::new(compute),
            cached: RefCell::new(None),
            stale: Cell::new(true),
            computing: Cell::new(false),
            version: Cell::new(0),
            source: reactive::new_source(),
            tracker: Cell::new(None),
        });

        let weak: Weak<MemoInner<T>> = Rc::downgrade(&inner);
        let tracker = reactive::new_effect(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.stale.set(true);
                    log::trace!(target: log_target::MEMO, "memo {:?} stale", inner.source);
                    reactive::source_changed(inner.source);
                }
            }),
            EffectOptions::default(),
            true,
            Start::Idle,
        );
        inner.tracker.set(Some(tracker));

        Self { inner }
    }

    pub fn id(&self) -> SourceId {
        self.inner.source
    }

    /// Tracked read; recomputes when stale.
    ///
    /// # Panics
    ///
    /// If the computation reads this memo before it has ever produced a
    /// value. Use [`try_get`](Memo::try_get) to get the error instead.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    /// Tracked read that reports a first-value self-dependency as an error.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        reactive::register_source_read(self.inner.source);
        self.try_peek()
    }

    /// Untracked read; still recomputes when stale.
    ///
    /// # Panics
    ///
    /// Under the same condition as [`get`](Memo::get).
    pub fn peek(&self) -> T {
        match self.try_peek() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_peek(&self) -> Result<T, ReactiveError> {
        if !self.inner.stale.get()
            && let Some(v) = self.inner.cached.borrow().as_ref()
        {
            return Ok(v.clone());
        }
        self.recompute()
    }

    fn recompute(&self) -> Result<T, ReactiveError> {
        let inner = &self.inner;
        if inner.computing.get() {
            log::error!(
                target: log_target::MEMO,
                "memo {:?} read itself while computing",
                inner.source
            );
            return inner
                .cached
                .borrow()
                .clone()
                .ok_or(ReactiveError::Cycle(inner.source));
        }

        struct Computing<'a>(&'a Cell<bool>);
        impl Drop for Computing<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }
        inner.computing.set(true);
        let _computing = Computing(&inner.computing);

        let value = match inner.tracker.get() {
            Some(tracker) => reactive::track_as(tracker, || (inner.compute)()),
            None => (inner.compute)(),
        };
        *inner.cached.borrow_mut() = Some(value.clone());
        inner.stale.set(false);
        inner.version.set(inner.version.get() + 1);
        log::trace!(
            target: log_target::MEMO,
            "memo {:?} computed v{}",
            inner.source,
            inner.version.get()
        );
        Ok(value)
    }

    /// Force the next read to recompute and notify observers now.
    pub fn invalidate(&self) {
        self.inner.stale.set(true);
        reactive::source_changed(self.inner.source);
    }

    pub fn is_stale(&self) -> bool {
        self.inner.stale.get()
    }

    /// Number of values computed so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Sources the last computation read.
    pub fn dependencies(&self) -> Vec<SourceId> {
        self.inner
            .tracker
            .get()
            .map(|t| {
                reactive::effect_dependencies(t)
                    .into_iter()
                    .map(|(s, _)| s)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn memo<T: Clone + 'static>(compute: impl Fn() -> T + 'static) -> Memo<T> {
    Memo::new(compute)
}
