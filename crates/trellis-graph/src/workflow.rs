//! Staged multipass execution over a [`Dag`].
//!
//! A [`Workflow`] is a list of [`Pass`]es. Each pass names the passes it must
//! run after; the workflow orders them with a topological sort and hands
//! every pass the results of the passes that already finished. A level whose
//! passes all declare themselves independent runs through
//! [`Dag::parallel_process`]; anything else runs one pass at a time in
//! registration order.
//!
//! Every pass runs under a [`StagePolicy`]: an optional timeout (enforced
//! through the pass's [`CancelToken`]) and a retry budget with linear
//! backoff.

use std::sync::Arc;

use indexmap::IndexMap;
use web_time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::dag::Dag;
use crate::error::{Cancelled, WorkflowError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagePolicy {
    pub timeout: Option<Duration>,
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// Retry `n` waits `backoff * n`.
    pub backoff: Duration,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: 0,
            backoff: Duration::from_secs(1),
        }
    }
}

impl StagePolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Results of the passes that have finished, in completion order.
#[derive(Debug)]
pub struct PassHistory<R> {
    results: IndexMap<String, R>,
}

impl<R> Default for PassHistory<R> {
    fn default() -> Self {
        Self {
            results: IndexMap::new(),
        }
    }
}

impl<R> PassHistory<R> {
    pub fn get(&self, stage: &str) -> Option<&R> {
        self.results.get(stage)
    }

    pub fn last(&self) -> Option<(&str, &R)> {
        self.results.last().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &R)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_inner(self) -> IndexMap<String, R> {
        self.results
    }

    fn record(&mut self, stage: String, result: R) {
        self.results.insert(stage, result);
    }
}

/// One stage of a [`Workflow`] over a shared context `C`, producing `R`.
pub trait Pass<C: ?Sized, R>: Send + Sync {
    fn name(&self) -> &str;

    /// Stages that must finish first.
    fn after(&self) -> Vec<String> {
        Vec::new()
    }

    /// May run concurrently with other independent stages of its level.
    fn independent(&self) -> bool {
        false
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::default()
    }

    /// Long-running passes should poll `cancel` and return its error.
    fn run(&self, cx: &C, history: &PassHistory<R>, cancel: &CancelToken) -> anyhow::Result<R>;
}

type PassFn<C, R> =
    dyn Fn(&C, &PassHistory<R>, &CancelToken) -> anyhow::Result<R> + Send + Sync;

/// A [`Pass`] built from a closure.
pub struct FnPass<C: ?Sized, R> {
    name: String,
    after: Vec<String>,
    independent: bool,
    policy: StagePolicy,
    f: Box<PassFn<C, R>>,
}

impl<C: ?Sized, R> FnPass<C, R> {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&C, &PassHistory<R>, &CancelToken) -> anyhow::Result<R> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            after: Vec::new(),
            independent: false,
            policy: StagePolicy::default(),
            f: Box::new(f),
        }
    }

    pub fn after(mut self, stage: impl Into<String>) -> Self {
        self.after.push(stage.into());
        self
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }

    pub fn policy(mut self, policy: StagePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<C: ?Sized, R> Pass<C, R> for FnPass<C, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn after(&self) -> Vec<String> {
        self.after.clone()
    }

    fn independent(&self) -> bool {
        self.independent
    }

    fn policy(&self) -> StagePolicy {
        self.policy
    }

    fn run(&self, cx: &C, history: &PassHistory<R>, cancel: &CancelToken) -> anyhow::Result<R> {
        (self.f)(cx, history, cancel)
    }
}

pub struct Workflow<C: ?Sized, R> {
    passes: IndexMap<String, Arc<dyn Pass<C, R>>>,
}

impl<C: ?Sized, R> Default for Workflow<C, R> {
    fn default() -> Self {
        Self {
            passes: IndexMap::new(),
        }
    }
}

impl<C: ?Sized, R> std::fmt::Debug for Workflow<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("passes", &self.passes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C, R> Workflow<C, R>
where
    C: ?Sized + Sync,
    R: Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: impl Pass<C, R> + 'static) -> Result<&mut Self, WorkflowError> {
        self.add_shared(Arc::new(pass))
    }

    pub fn add_shared(&mut self, pass: Arc<dyn Pass<C, R>>) -> Result<&mut Self, WorkflowError> {
        let name = pass.name().to_string();
        if self.passes.contains_key(&name) {
            return Err(WorkflowError::DuplicateStage(name));
        }
        self.passes.insert(name, pass);
        Ok(self)
    }

    /// Unregister a pass; passes that name it in `after` stop planning until
    /// it is added back.
    pub fn remove(&mut self, stage: &str) -> Option<Arc<dyn Pass<C, R>>> {
        self.passes.shift_remove(stage)
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.passes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// The dependency graph of the registered passes.
    pub fn graph(&self) -> Result<Dag<String, Arc<dyn Pass<C, R>>>, WorkflowError> {
        let dag = Dag::new();
        for (name, pass) in &self.passes {
            dag.add_node(name.clone(), pass.clone())?;
        }
        for (name, pass) in &self.passes {
            for dep in pass.after() {
                if !self.passes.contains_key(&dep) {
                    return Err(WorkflowError::UnknownStage {
                        stage: name.clone(),
                        missing: dep,
                    });
                }
                dag.add_edge(dep, name.clone())?;
            }
        }
        Ok(dag)
    }

    /// Stage names grouped by level, in execution order.
    pub fn plan(&self) -> Result<Vec<Vec<String>>, WorkflowError> {
        Ok(self.graph()?.levels()?)
    }

    /// Run every pass once, in dependency order. Stops at the first pass
    /// that fails for good.
    pub fn run(&self, cx: &C, cancel: &CancelToken) -> Result<PassHistory<R>, WorkflowError> {
        let levels = self.plan()?;
        let mut history = PassHistory::default();
        for level in levels {
            let passes: Vec<Arc<dyn Pass<C, R>>> = level
                .iter()
                .filter_map(|name| self.passes.get(name).cloned())
                .collect();

            if passes.len() > 1 && passes.iter().all(|p| p.independent()) {
                let batch: Dag<String, Arc<dyn Pass<C, R>>> = Dag::new();
                for p in &passes {
                    batch.add_node(p.name().to_string(), p.clone())?;
                }
                log::debug!(
                    target: crate::LOG_TARGET,
                    "running {} independent stage(s) in parallel: {level:?}",
                    passes.len()
                );
                let seen = &history;
                let results =
                    batch.parallel_process(|_, pass| run_pass(pass.as_ref(), cx, seen, cancel))?;
                for (name, r) in results {
                    history.record(name, r);
                }
            } else {
                for pass in passes {
                    let r = run_pass(pass.as_ref(), cx, &history, cancel)?;
                    history.record(pass.name().to_string(), r);
                }
            }
        }
        Ok(history)
    }
}

fn run_pass<C: ?Sized, R>(
    pass: &dyn Pass<C, R>,
    cx: &C,
    history: &PassHistory<R>,
    cancel: &CancelToken,
) -> Result<R, WorkflowError> {
    let stage = pass.name().to_string();
    let policy = pass.policy();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        if cancel.check().is_err() {
            return Err(WorkflowError::Cancelled { stage });
        }
        let token = match policy.timeout {
            Some(t) => cancel.child_with_timeout(t),
            None => cancel.child(),
        };

        let started = Instant::now();
        log::trace!(target: crate::LOG_TARGET, "stage `{stage}` attempt {attempt}");
        let result = pass.run(cx, history, &token);
        if cancel.check().is_err() {
            return Err(WorkflowError::Cancelled { stage });
        }

        let err = match result {
            Ok(r) => {
                log::trace!(
                    target: crate::LOG_TARGET,
                    "stage `{stage}` done in {:?}",
                    started.elapsed()
                );
                return Ok(r);
            }
            Err(e) => e,
        };

        let timed_out = token.check() == Err(Cancelled::DeadlineExceeded)
            || err.downcast_ref::<Cancelled>() == Some(&Cancelled::DeadlineExceeded);
        if attempt > policy.retries {
            return Err(match (timed_out, policy.timeout) {
                (true, Some(after)) => WorkflowError::Timeout { stage, after },
                _ => WorkflowError::StageFailed {
                    stage,
                    attempts: attempt,
                    source: err,
                },
            });
        }

        let wait = policy.backoff_for(attempt);
        log::warn!(
            target: crate::LOG_TARGET,
            "stage `{stage}` failed (attempt {attempt}/{}): {err:#}; retrying in {wait:?}",
            policy.retries + 1
        );
        if cancel.sleep(wait).is_err() {
            return Err(WorkflowError::Cancelled { stage });
        }
    }
}
