//! The dependency graph behind signals, effects and memos.
//!
//! One graph lives per thread. Sources (signals, memos) and effects are slots
//! in generational arenas, so a handle that outlives its slot resolves to
//! nothing instead of aliasing a newer node. User code (effect bodies,
//! cleanups, the schedule hook) is never invoked while the graph is borrowed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use slotmap::{SlotMap, new_key_type};

use crate::log_target;

new_key_type! {
    /// A signal or memo in the dependency graph.
    pub struct SourceId;
    /// An effect (including the internal tracker of a memo).
    pub struct EffectId;
}

/// Upper bound on back-to-back re-runs of one effect that keeps invalidating
/// itself. Hitting it leaves the effect dirty and logs an error.
pub const MAX_EFFECT_RERUNS: usize = 100;

thread_local! {
    static GRAPH: RefCell<DepGraph> = RefCell::new(DepGraph::default());
}

/// When and how an effect runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectOptions {
    /// Run the body once on creation. When false the effect is queued and
    /// first runs on the next [`flush_effects`].
    pub immediate: bool,
    /// Invalidations hand the effect to the scheduler instead of running it
    /// synchronously.
    pub deferred: bool,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            deferred: false,
        }
    }
}

impl EffectOptions {
    pub fn deferred() -> Self {
        Self {
            immediate: true,
            deferred: true,
        }
    }

    pub fn lazy() -> Self {
        Self {
            immediate: false,
            deferred: false,
        }
    }
}

/// How a freshly created effect starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Start {
    Now,
    Scheduled,
    /// Clean and idle until something invalidates it (memo trackers).
    Idle,
}

type Body = Rc<RefCell<Box<dyn FnMut()>>>;

struct SourceNode {
    version: u64,
    observers: IndexSet<EffectId>,
}

struct EffectNode {
    body: Body,
    options: EffectOptions,
    /// Runs synchronously even inside a batch.
    eager: bool,
    active: bool,
    dirty: bool,
    running: bool,
    queued: bool,
    deps: IndexMap<SourceId, u64>,
    cleanups: Vec<Box<dyn FnOnce()>>,
}

#[derive(Default)]
struct DepGraph {
    sources: SlotMap<SourceId, SourceNode>,
    effects: SlotMap<EffectId, EffectNode>,
    /// Tracking stack; `None` frames come from `untrack`.
    stack: Vec<Option<EffectId>>,
    batch_depth: usize,
    batched: IndexSet<SourceId>,
    queue: VecDeque<EffectId>,
    draining: bool,
    schedule_hook: Option<Rc<dyn Fn()>>,
}

impl DepGraph {
    fn current(&self) -> Option<EffectId> {
        self.stack.last().copied().flatten()
    }

    fn remove_all_edges_for(&mut self, id: EffectId) -> Option<Vec<Box<dyn FnOnce()>>> {
        let node = self.effects.get_mut(id)?;
        let deps = std::mem::take(&mut node.deps);
        let cleanups = std::mem::take(&mut node.cleanups);
        for (src, _) in deps {
            if let Some(s) = self.sources.get_mut(src) {
                s.observers.shift_remove(&id);
            }
        }
        Some(cleanups)
    }

    /// Queue `id` for the scheduler. Returns the hook when the queue was armed.
    fn enqueue(&mut self, id: EffectId) -> Option<Rc<dyn Fn()>> {
        let node = self.effects.get_mut(id)?;
        if node.queued {
            return None;
        }
        node.queued = true;
        let armed = self.queue.is_empty() && !self.draining;
        self.queue.push_back(id);
        log::trace!(target: log_target::SCHEDULER, "queued effect {id:?}");
        if armed {
            self.schedule_hook.clone()
        } else {
            None
        }
    }
}

fn with_graph<R>(f: impl FnOnce(&mut DepGraph) -> R) -> R {
    GRAPH.with(|g| f(&mut g.borrow_mut()))
}

/// Like [`with_graph`] but quiet during thread teardown, for use from `Drop`.
fn try_with_graph(f: impl FnOnce(&mut DepGraph)) {
    let _ = GRAPH.try_with(|g| {
        if let Ok(mut g) = g.try_borrow_mut() {
            f(&mut g);
        }
    });
}

fn call_hook(hook: Option<Rc<dyn Fn()>>) {
    if let Some(hook) = hook {
        hook();
    }
}

// Sources

pub(crate) fn new_source() -> SourceId {
    with_graph(|g| {
        g.sources.insert(SourceNode {
            version: 0,
            observers: IndexSet::new(),
        })
    })
}

/// Drop a source and every observer edge pointing at it.
pub(crate) fn dispose_source(id: SourceId) {
    try_with_graph(|g| {
        if let Some(node) = g.sources.remove(id) {
            for obs in node.observers {
                if let Some(e) = g.effects.get_mut(obs) {
                    e.deps.shift_remove(&id);
                }
            }
            g.batched.shift_remove(&id);
            log::trace!(target: log_target::SIGNAL, "disposed source {id:?}");
        }
    });
}

/// `None` once the source is disposed.
pub fn source_version(id: SourceId) -> Option<u64> {
    with_graph(|g| g.sources.get(id).map(|s| s.version))
}

pub fn observer_count(id: SourceId) -> usize {
    with_graph(|g| g.sources.get(id).map(|s| s.observers.len()).unwrap_or(0))
}

/// Record a read of `id` against the current effect, if any.
pub fn register_source_read(id: SourceId) {
    with_graph(|g| {
        let Some(obs) = g.current() else {
            return;
        };
        if !g.effects.contains_key(obs) {
            return;
        }
        let Some(src) = g.sources.get_mut(id) else {
            return;
        };
        src.observers.insert(obs);
        let version = src.version;
        if let Some(e) = g.effects.get_mut(obs) {
            e.deps.insert(id, version);
        }
    });
}

/// Bump the version of `id` and notify its observers.
pub fn source_changed(id: SourceId) {
    enum Plan {
        Nothing,
        Batched(Vec<EffectId>),
        Now(Vec<EffectId>, Option<Rc<dyn Fn()>>),
    }

    let plan = with_graph(|g| {
        let Some(src) = g.sources.get_mut(id) else {
            return Plan::Nothing;
        };
        src.version += 1;
        let version = src.version;
        let observers: Vec<EffectId> = src.observers.iter().copied().collect();
        log::trace!(
            target: log_target::SIGNAL,
            "source {id:?} -> v{version}, {} observer(s)",
            observers.len()
        );

        for obs in &observers {
            if let Some(e) = g.effects.get_mut(*obs) {
                e.dirty = true;
            }
        }

        if g.batch_depth > 0 {
            g.batched.insert(id);
            let eager = observers
                .into_iter()
                .filter(|o| g.effects.get(*o).is_some_and(|e| e.eager))
                .collect();
            return Plan::Batched(eager);
        }

        let mut hook = None;
        let mut run_now = Vec::with_capacity(observers.len());
        for obs in observers {
            let Some(e) = g.effects.get(obs) else {
                continue;
            };
            if !e.active {
                continue;
            }
            if e.options.deferred && !e.eager {
                if let Some(h) = g.enqueue(obs) {
                    hook = Some(h);
                }
            } else {
                run_now.push(obs);
            }
        }
        Plan::Now(run_now, hook)
    });

    match plan {
        Plan::Nothing => {}
        Plan::Batched(eager) => {
            for e in eager {
                if needs_run(e) {
                    run_effect(e);
                }
            }
        }
        Plan::Now(run_now, hook) => {
            call_hook(hook);
            // A memo tracker earlier in the list may already have re-run a
            // later observer through the memo's own notification.
            for e in run_now {
                if needs_run(e) {
                    run_effect(e);
                }
            }
        }
    }
}

// Effects

pub(crate) fn new_effect(
    body: Box<dyn FnMut()>,
    options: EffectOptions,
    eager: bool,
    start: Start,
) -> EffectId {
    let id = with_graph(|g| {
        g.effects.insert(EffectNode {
            body: Rc::new(RefCell::new(body)),
            options,
            eager,
            active: true,
            dirty: start != Start::Idle,
            running: false,
            queued: false,
            deps: IndexMap::new(),
            cleanups: Vec::new(),
        })
    });
    log::debug!(target: log_target::EFFECT, "created effect {id:?} ({options:?})");

    if let Some(scope) = crate::scope::current_scope() {
        scope.own_effect(id);
    }

    match start {
        Start::Now => {
            run_effect(id);
        }
        Start::Scheduled => {
            let hook = with_graph(|g| g.enqueue(id));
            call_hook(hook);
        }
        Start::Idle => {}
    }
    id
}

struct RunGuard {
    id: EffectId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let panicking = std::thread::panicking();
        let mut hook = None;
        try_with_graph(|g| {
            g.stack.pop();
            let requeue = match g.effects.get_mut(self.id) {
                Some(node) => {
                    node.running = false;
                    if panicking {
                        node.dirty = true;
                    }
                    panicking && node.options.deferred
                }
                None => false,
            };
            if requeue {
                hook = g.enqueue(self.id);
            }
        });
        if panicking {
            log::error!(target: log_target::EFFECT, "effect {:?} panicked; left dirty", self.id);
        } else {
            call_hook(hook);
        }
    }
}

/// Run an effect now. Returns false if it is disposed, inactive or already
/// running (the re-entrant invalidation is coalesced into one re-run after
/// the current body returns).
pub fn run_effect(id: EffectId) -> bool {
    let mut ran = false;
    for _ in 0..=MAX_EFFECT_RERUNS {
        let prepared = with_graph(|g| {
            let node = g.effects.get_mut(id)?;
            if !node.active {
                return None;
            }
            if node.running {
                node.dirty = true;
                return None;
            }
            node.running = true;
            node.dirty = false;
            let body = node.body.clone();
            let cleanups = g.remove_all_edges_for(id).unwrap_or_default();
            Some((body, cleanups))
        });
        let Some((body, cleanups)) = prepared else {
            return ran;
        };

        {
            // Pushed before cleanups so the guard's pop is always balanced.
            with_graph(|g| g.stack.push(None));
            let _guard = RunGuard { id };
            for cleanup in cleanups {
                cleanup();
            }
            with_graph(|g| {
                if let Some(top) = g.stack.last_mut() {
                    *top = Some(id);
                }
            });
            log::trace!(target: log_target::EFFECT, "running effect {id:?}");
            (body.borrow_mut())();
        }
        ran = true;

        let again = with_graph(|g| g.effects.get(id).is_some_and(|e| e.active && e.dirty));
        if !again {
            return true;
        }
    }
    log::error!(
        target: log_target::EFFECT,
        "effect {id:?} still invalidating itself after {MAX_EFFECT_RERUNS} re-runs; leaving it dirty"
    );
    ran
}

/// Dispose an effect: run its cleanups and break every dependency edge.
/// Safe to call repeatedly.
pub fn dispose_effect(id: EffectId) {
    let mut cleanups = None;
    try_with_graph(|g| {
        cleanups = g.remove_all_edges_for(id);
        if let Some(node) = g.effects.remove(id) {
            log::debug!(target: log_target::EFFECT, "disposed effect {id:?}");
            if node.queued {
                g.queue.retain(|q| *q != id);
            }
        }
    });
    for cleanup in cleanups.into_iter().flatten() {
        cleanup();
    }
}

pub fn effect_on_cleanup(id: EffectId, f: Box<dyn FnOnce()>) {
    let leftover = with_graph(|g| match g.effects.get_mut(id) {
        Some(node) => {
            node.cleanups.push(f);
            None
        }
        None => Some(f),
    });
    // Registered on a disposed effect: nothing will ever run it later.
    if let Some(f) = leftover {
        f();
    }
}

fn needs_run(id: EffectId) -> bool {
    with_graph(|g| g.effects.get(id).is_some_and(|e| e.active && e.dirty))
}

pub fn effect_is_active(id: EffectId) -> bool {
    with_graph(|g| g.effects.get(id).is_some_and(|e| e.active))
}

pub fn effect_is_dirty(id: EffectId) -> bool {
    with_graph(|g| g.effects.get(id).is_some_and(|e| e.dirty))
}

pub fn effect_is_running(id: EffectId) -> bool {
    with_graph(|g| g.effects.get(id).is_some_and(|e| e.running))
}

/// Sources read during the effect's last run, with the version seen.
pub fn effect_dependencies(id: EffectId) -> Vec<(SourceId, u64)> {
    with_graph(|g| {
        g.effects
            .get(id)
            .map(|e| e.deps.iter().map(|(s, v)| (*s, *v)).collect())
            .unwrap_or_default()
    })
}

/// The effect whose body is executing on this thread, if any.
pub fn current_effect() -> Option<EffectId> {
    with_graph(|g| g.current())
}

struct StackFrame;

impl Drop for StackFrame {
    fn drop(&mut self) {
        try_with_graph(|g| {
            g.stack.pop();
        });
    }
}

/// Run `f` without registering any reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    with_graph(|g| g.stack.push(None));
    let _frame = StackFrame;
    f()
}

/// Run `f` with `id` as the tracker, replacing its previous dependencies.
pub(crate) fn track_as<R>(id: EffectId, f: impl FnOnce() -> R) -> R {
    let cleanups = with_graph(|g| g.remove_all_edges_for(id));
    for cleanup in cleanups.into_iter().flatten() {
        cleanup();
    }
    with_graph(|g| g.stack.push(Some(id)));
    let _frame = StackFrame;
    f()
}

// Batching

pub(crate) fn begin_batch() {
    with_graph(|g| g.batch_depth += 1);
}

/// Leave a batch; returns true when this closed the outermost one.
pub(crate) fn end_batch() -> bool {
    let mut outermost = false;
    try_with_graph(|g| {
        g.batch_depth = g.batch_depth.saturating_sub(1);
        outermost = g.batch_depth == 0;
    });
    outermost
}

pub fn batch_depth() -> usize {
    with_graph(|g| g.batch_depth)
}

/// Run every effect observing a source written during the batch, each at
/// most once.
pub(crate) fn flush_batch() {
    let (pending, hook) = with_graph(|g| {
        let sources = std::mem::take(&mut g.batched);
        let mut pending: IndexSet<EffectId> = IndexSet::new();
        for src in sources {
            if let Some(node) = g.sources.get(src) {
                pending.extend(node.observers.iter().copied());
            }
        }
        let mut hook = None;
        let mut immediate = IndexSet::with_capacity(pending.len());
        for e in pending {
            let (deferred, runnable) = match g.effects.get(e) {
                Some(node) => (node.options.deferred && !node.eager, node.active && node.dirty),
                None => continue,
            };
            if !deferred {
                immediate.insert(e);
            } else if runnable && let Some(h) = g.enqueue(e) {
                hook = Some(h);
            }
        }
        (immediate, hook)
    });
    if pending.is_empty() && hook.is_none() {
        return;
    }
    log::debug!(
        target: log_target::BATCH,
        "flushing batch: {} pending effect(s)",
        pending.len()
    );
    call_hook(hook);
    for e in pending {
        // An earlier effect may already have re-run this one synchronously.
        if needs_run(e) {
            run_effect(e);
        }
    }
}

// Scheduler

struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        try_with_graph(|g| g.draining = false);
    }
}

/// Drain the deferred-effect queue to a fixpoint. Effects queued while
/// draining are included. Re-entrant calls return immediately.
pub fn flush_effects() {
    let leftover_batch = with_graph(|g| g.batch_depth == 0 && !g.batched.is_empty());
    if leftover_batch {
        flush_batch();
    }

    let entered = with_graph(|g| {
        if g.draining {
            false
        } else {
            g.draining = true;
            true
        }
    });
    if !entered {
        return;
    }
    let _guard = DrainGuard;
    let mut ran = 0usize;
    loop {
        let next = with_graph(|g| {
            let id = g.queue.pop_front()?;
            let node = g.effects.get_mut(id);
            let runnable = match node {
                Some(node) => {
                    node.queued = false;
                    node.active && node.dirty
                }
                None => false,
            };
            Some((id, runnable))
        });
        match next {
            None => break,
            Some((id, true)) => {
                run_effect(id);
                ran += 1;
            }
            Some((_, false)) => {}
        }
    }
    if ran > 0 {
        log::debug!(target: log_target::SCHEDULER, "drained {ran} deferred effect(s)");
    }
}

pub fn has_pending_effects() -> bool {
    with_graph(|g| !g.queue.is_empty() || (g.batch_depth == 0 && !g.batched.is_empty()))
}

/// Install a callback invoked each time the deferred queue goes from empty to
/// non-empty, so a host can request a tick that calls [`flush_effects`].
pub fn set_schedule_hook(hook: Option<Rc<dyn Fn()>>) {
    with_graph(|g| g.schedule_hook = hook);
}
