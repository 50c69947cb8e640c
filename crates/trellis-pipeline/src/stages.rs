//! The built-in frame stages.
//!
//! Each stage is a [`Pass`] over a shared [`FrameContext`]. They run in the
//! order mark, measure, place, commit; only commit talks to the renderer.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use trellis_core::log_target;
use trellis_core::{
    DirtyFlags, Element, ElementId, FrameDiff, PaintCommand, Renderer, Size, Tree, Vec2,
};
use trellis_graph::{CancelToken, Pass, PassHistory};

use crate::config::{FrameMode, PipelineConfig};
use crate::layout;

pub const MARK: &str = "mark";
pub const MEASURE: &str = "measure";
pub const PLACE: &str = "place";
pub const COMMIT: &str = "commit";

/// State every stage sees: the tree, the renderer and the last committed
/// command list.
pub struct FrameContext {
    tree: Tree,
    config: RwLock<PipelineConfig>,
    renderer: Mutex<Box<dyn Renderer>>,
    previous: Mutex<Option<Vec<PaintCommand>>>,
}

impl FrameContext {
    pub(crate) fn new(tree: Tree, renderer: Box<dyn Renderer>, config: PipelineConfig) -> Self {
        Self {
            tree,
            config: RwLock::new(config),
            renderer: Mutex::new(renderer),
            previous: Mutex::new(None),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> PipelineConfig {
        *self.config.read()
    }

    pub(crate) fn update_config(&self, f: impl FnOnce(&mut PipelineConfig)) {
        f(&mut self.config.write());
    }

    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut dyn Renderer) -> R) -> R {
        f(&mut **self.renderer.lock())
    }

    /// The command list of the last successful commit.
    pub fn previous_commands(&self) -> Option<Vec<PaintCommand>> {
        self.previous.lock().clone()
    }

    /// Forget the last commit so the next one is a full repaint.
    pub fn invalidate_previous(&self) {
        *self.previous.lock() = None;
    }
}

impl fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameContext")
            .field("tree", &self.tree)
            .field("config", &self.config())
            .field("renderer", &self.renderer.lock().name())
            .field(
                "previous",
                &self.previous.lock().as_ref().map(|p| p.len()),
            )
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommitOutcome {
    pub mode: FrameMode,
    pub commands: usize,
    pub updates: usize,
}

/// What a stage hands to the stages after it.
#[derive(Clone)]
pub enum StageOutput {
    /// Ids of every dirty node after marking, in pre-order.
    Frontier(Vec<ElementId>),
    Measured { measured: usize, reused: usize },
    Placed(usize),
    Committed(CommitOutcome),
    /// Results of stages added with `Pipeline::add_stage`.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutput::Frontier(ids) => f.debug_tuple("Frontier").field(ids).finish(),
            StageOutput::Measured { measured, reused } => f
                .debug_struct("Measured")
                .field("measured", measured)
                .field("reused", reused)
                .finish(),
            StageOutput::Placed(n) => f.debug_tuple("Placed").field(n).finish(),
            StageOutput::Committed(c) => f.debug_tuple("Committed").field(c).finish(),
            StageOutput::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Propagates `LAYOUT` from every dirty node to all of its ancestors.
pub struct MarkStage;

impl Pass<FrameContext, StageOutput> for MarkStage {
    fn name(&self) -> &str {
        MARK
    }

    fn run(
        &self,
        cx: &FrameContext,
        _history: &PassHistory<StageOutput>,
        cancel: &CancelToken,
    ) -> anyhow::Result<StageOutput> {
        let dirty: Vec<Arc<Element>> = cx.tree.dirty_nodes().collect();
        for node in &dirty {
            cancel.check()?;
            for ancestor in node.ancestors() {
                ancestor.mark_dirty(DirtyFlags::LAYOUT);
            }
        }
        let frontier: Vec<ElementId> = cx.tree.dirty_nodes().map(|n| n.id().clone()).collect();
        log::debug!(
            target: log_target::PIPELINE,
            "mark: {} dirty, frontier {}",
            dirty.len(),
            frontier.len()
        );
        Ok(StageOutput::Frontier(frontier))
    }
}

/// Sizes every node bottom-up; clean nodes keep their cached size.
pub struct MeasureStage;

impl Pass<FrameContext, StageOutput> for MeasureStage {
    fn name(&self) -> &str {
        MEASURE
    }

    fn after(&self) -> Vec<String> {
        vec![MARK.to_string()]
    }

    fn run(
        &self,
        cx: &FrameContext,
        _history: &PassHistory<StageOutput>,
        cancel: &CancelToken,
    ) -> anyhow::Result<StageOutput> {
        let constraints = cx.config().root_constraints;
        let (mut measured, mut reused) = (0, 0);
        for node in cx.tree.post_order() {
            cancel.check()?;
            if !node.has_dirty(DirtyFlags::LAYOUT | DirtyFlags::PROPERTIES)
                && let Some(size) = node.cached_size()
            {
                node.set_size(size);
                reused += 1;
                continue;
            }
            let size = measure_node(&node, constraints);
            node.set_cached_size(Some(size));
            node.set_size(size);
            measured += 1;
        }
        log::debug!(
            target: log_target::PIPELINE,
            "measure: {measured} measured, {reused} reused"
        );
        Ok(StageOutput::Measured { measured, reused })
    }
}

fn measure_node(node: &Element, constraints: trellis_core::Constraints) -> Size {
    let children: Vec<Size> = node.children().iter().map(|c| c.bounds().size()).collect();
    node.with_widget(|w| {
        layout::container_size(w.layout(), &children).unwrap_or_else(|| {
            match w.intrinsic_size() {
                Some(s) => constraints.constrain(s),
                None => w.measure(constraints),
            }
        })
    })
}

/// Positions children relative to their parent, top-down.
pub struct PlaceStage;

impl Pass<FrameContext, StageOutput> for PlaceStage {
    fn name(&self) -> &str {
        PLACE
    }

    fn after(&self) -> Vec<String> {
        vec![MEASURE.to_string()]
    }

    fn run(
        &self,
        cx: &FrameContext,
        _history: &PassHistory<StageOutput>,
        cancel: &CancelToken,
    ) -> anyhow::Result<StageOutput> {
        if let Some(root) = cx.tree.root() {
            root.set_position(Vec2::ZERO);
        }
        let mut placed = 0;
        for node in cx.tree.pre_order() {
            cancel.check()?;
            let children = node.children();
            if children.is_empty() {
                continue;
            }
            let sizes: Vec<Size> = children.iter().map(|c| c.bounds().size()).collect();
            let offsets = node.with_widget(|w| layout::child_offsets(w.layout(), &sizes));
            for (child, at) in children.iter().zip(offsets) {
                child.set_position(at);
                placed += 1;
            }
        }
        Ok(StageOutput::Placed(placed))
    }
}

/// Flattens the tree into paint commands and hands them to the renderer,
/// patching when the renderer accepts it.
pub struct CommitStage;

impl Pass<FrameContext, StageOutput> for CommitStage {
    fn name(&self) -> &str {
        COMMIT
    }

    fn after(&self) -> Vec<String> {
        vec![PLACE.to_string()]
    }

    fn run(
        &self,
        cx: &FrameContext,
        _history: &PassHistory<StageOutput>,
        cancel: &CancelToken,
    ) -> anyhow::Result<StageOutput> {
        let mut commands = Vec::new();
        if let Some(root) = cx.tree.root() {
            collect_commands(&root, Vec2::ZERO, &mut commands);
        }
        cancel.check()?;

        let mut renderer = cx.renderer.lock();
        let mut previous = cx.previous.lock();
        let diff = previous
            .as_deref()
            .map(|prev| trellis_core::diff(prev, &commands));

        let (mode, updates) = match diff {
            None => {
                full_repaint(&mut **renderer, &commands, &mut previous)?;
                (FrameMode::Full, 0)
            }
            Some(FrameDiff::Unchanged) => (FrameMode::Skipped, 0),
            Some(FrameDiff::Structural {
                added,
                removed,
                reordered,
            }) => {
                log::debug!(
                    target: log_target::RENDER,
                    "structural change (+{} -{} reordered={reordered}); full repaint",
                    added.len(),
                    removed.len()
                );
                full_repaint(&mut **renderer, &commands, &mut previous)?;
                (FrameMode::Full, 0)
            }
            Some(FrameDiff::Patch(updates)) => {
                for u in &updates {
                    log::trace!(target: log_target::UPDATE, "{:?} {:?}", u.kind, u.id);
                }
                let mode = match renderer.apply_updates(&updates, &commands) {
                    Ok(true) => FrameMode::Patched,
                    Ok(false) => {
                        log::debug!(
                            target: log_target::RENDER,
                            "{} declined {} update(s); full repaint",
                            renderer.name(),
                            updates.len()
                        );
                        full_repaint(&mut **renderer, &commands, &mut previous)?;
                        FrameMode::Full
                    }
                    Err(e) => {
                        log::warn!(
                            target: log_target::RENDER,
                            "{} failed to apply updates: {e}; full repaint",
                            renderer.name()
                        );
                        full_repaint(&mut **renderer, &commands, &mut previous)?;
                        FrameMode::Full
                    }
                };
                (mode, updates.len())
            }
        };

        let outcome = CommitOutcome {
            mode,
            commands: commands.len(),
            updates,
        };
        *previous = Some(commands);
        drop(previous);
        drop(renderer);

        if cx.config().clear_dirty_on_commit {
            for node in cx.tree.pre_order() {
                node.clear_dirty();
            }
        }
        log::debug!(
            target: log_target::PIPELINE,
            "commit: {:?}, {} command(s), {} update(s)",
            outcome.mode,
            outcome.commands,
            outcome.updates
        );
        Ok(StageOutput::Committed(outcome))
    }
}

/// Parent before children, depth-first, with absolute bounds.
fn collect_commands(node: &Element, origin: Vec2, out: &mut Vec<PaintCommand>) {
    let abs = node.bounds().translate(origin);
    if let Some(cmd) = node.with_widget(|w| w.command(node.id(), abs)) {
        out.push(cmd);
    }
    for child in node.children() {
        collect_commands(&child, abs.origin(), out);
    }
}

/// On failure the previous list is dropped: the surface is in an unknown
/// state and the next commit must repaint fully.
fn full_repaint(
    renderer: &mut dyn Renderer,
    commands: &[PaintCommand],
    previous: &mut Option<Vec<PaintCommand>>,
) -> anyhow::Result<()> {
    renderer.begin_frame();
    for cmd in commands {
        renderer.paint(cmd);
    }
    if let Err(e) = renderer.end_frame() {
        log::error!(target: log_target::RENDER, "{} end_frame failed: {e}", renderer.name());
        *previous = None;
        return Err(e.into());
    }
    log::trace!(
        target: log_target::RENDER,
        "{} painted {} command(s)",
        renderer.name(),
        commands.len()
    );
    Ok(())
}
