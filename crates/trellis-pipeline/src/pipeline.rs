use std::sync::atomic::{AtomicU64, Ordering};

use trellis_core::log_target;
use trellis_core::{Constraints, DirtyFlags, PaintCommand, Renderer, Tree};
use trellis_graph::{CancelToken, Pass, Workflow, WorkflowError};
use web_time::Instant;

use crate::config::{FrameMode, FrameReport, PipelineConfig};
use crate::error::PipelineError;
use crate::stages::{
    COMMIT, CommitStage, FrameContext, MARK, MarkStage, MeasureStage, PlaceStage, StageOutput,
};

/// Turns a dirty tree into renderer calls.
///
/// The four built-in stages are registered on construction; extra stages can
/// be added with [`add_stage`](Pipeline::add_stage) and are scheduled by
/// their declared dependencies.
pub struct Pipeline {
    cx: FrameContext,
    workflow: Workflow<FrameContext, StageOutput>,
    frames: AtomicU64,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cx", &self.cx)
            .field("stages", &self.stages())
            .field("frames", &self.frame_count())
            .finish()
    }
}

impl Pipeline {
    pub fn new(tree: Tree, renderer: Box<dyn Renderer>, config: PipelineConfig) -> Self {
        let mut workflow = Workflow::new();
        workflow
            .add(MarkStage)
            .and_then(|w| w.add(MeasureStage))
            .and_then(|w| w.add(PlaceStage))
            .and_then(|w| w.add(CommitStage))
            .expect("built-in stage names are distinct and added in dependency order");
        Self {
            cx: FrameContext::new(tree, renderer, config),
            workflow,
            frames: AtomicU64::new(0),
        }
    }

    /// Register an extra stage. It must name the stages it runs after; a
    /// stage with unknown dependencies is rejected and not kept.
    pub fn add_stage(
        &mut self,
        stage: impl Pass<FrameContext, StageOutput> + 'static,
    ) -> Result<&mut Self, PipelineError> {
        let name = stage.name().to_string();
        self.workflow.add(stage)?;
        if let Err(e) = self.workflow.plan() {
            self.workflow.remove(&name);
            return Err(e.into());
        }
        log::debug!(target: log_target::PIPELINE, "stage `{name}` added");
        Ok(self)
    }

    pub fn stages(&self) -> Vec<String> {
        self.workflow.stages().map(str::to_string).collect()
    }

    /// Stage names grouped by dependency level.
    pub fn plan(&self) -> Result<Vec<Vec<String>>, WorkflowError> {
        self.workflow.plan()
    }

    pub fn run(&self) -> Result<FrameReport, PipelineError> {
        self.run_with(&CancelToken::new())
    }

    /// Run every stage once. On error the tree keeps its dirty flags, so the
    /// next run redoes the same work.
    pub fn run_with(&self, cancel: &CancelToken) -> Result<FrameReport, PipelineError> {
        if self.cx.tree().root().is_none() {
            return Err(PipelineError::NoRoot);
        }
        let started = Instant::now();
        let history = self.workflow.run(&self.cx, cancel).map_err(|e| {
            let e = PipelineError::from(e);
            log::warn!(target: log_target::PIPELINE, "frame aborted: {e}");
            e
        })?;

        let frame = self.frames.fetch_add(1, Ordering::AcqRel) + 1;
        let dirty_frontier = match history.get(MARK) {
            Some(StageOutput::Frontier(ids)) => ids.len(),
            _ => 0,
        };
        let (mode, commands, updates) = match history.get(COMMIT) {
            Some(StageOutput::Committed(c)) => (c.mode, c.commands, c.updates),
            _ => (FrameMode::Skipped, 0, 0),
        };
        let report = FrameReport {
            frame,
            mode,
            commands,
            updates,
            dirty_frontier,
            duration: started.elapsed(),
        };
        log::debug!(target: log_target::PIPELINE, "frame {frame}: {report:?}");
        Ok(report)
    }

    pub fn tree(&self) -> &Tree {
        self.cx.tree()
    }

    pub fn context(&self) -> &FrameContext {
        &self.cx
    }

    pub fn config(&self) -> PipelineConfig {
        self.cx.config()
    }

    /// Leaf sizes depend on the constraints, so every node is re-measured.
    pub fn set_root_constraints(&self, constraints: Constraints) {
        if self.cx.config().root_constraints == constraints {
            return;
        }
        self.cx.update_config(|c| c.root_constraints = constraints);
        self.cx.tree().mark_all(DirtyFlags::LAYOUT);
    }

    /// Completed frames.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn previous_commands(&self) -> Option<Vec<PaintCommand>> {
        self.cx.previous_commands()
    }

    pub fn invalidate_previous(&self) {
        self.cx.invalidate_previous();
    }

    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut dyn Renderer) -> R) -> R {
        self.cx.with_renderer(f)
    }
}
