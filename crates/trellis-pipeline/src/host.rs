use trellis_core::log_target;
use trellis_core::{
    Constraints, ElementId, Event, Renderer, SurfaceHandle, Tree, flush_effects,
};
use trellis_graph::CancelToken;
use web_time::Instant;

use crate::config::{FrameMode, FrameReport, PipelineConfig};
use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// Drives a [`Pipeline`] against one surface: attaches the renderer, ticks
/// frames, forwards input and resizes.
///
/// The surface size becomes the root constraints.
pub struct Host {
    pipeline: Pipeline,
    surface: SurfaceHandle,
    cancel: CancelToken,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("surface", &self.surface)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl Host {
    /// Fails if the renderer cannot attach to `surface`.
    pub fn new(
        tree: Tree,
        mut renderer: Box<dyn Renderer>,
        surface: SurfaceHandle,
        mut config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if let Err(e) = renderer.init(&surface) {
            log::error!(target: log_target::RENDER, "{} init failed: {e}", renderer.name());
            return Err(e.into());
        }
        log::info!(
            target: log_target::APP,
            "{} renderer on `{}` {:?}",
            renderer.name(),
            surface.label,
            surface.size
        );
        config.root_constraints = surface_constraints(&surface);
        Ok(Self {
            pipeline: Pipeline::new(tree, renderer, config),
            surface,
            cancel: CancelToken::new(),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn tree(&self) -> &Tree {
        self.pipeline.tree()
    }

    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    /// Cancelling it aborts the current and every later frame.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// True before the first frame and whenever anything in the tree is
    /// dirty.
    pub fn needs_frame(&self) -> bool {
        self.pipeline.previous_commands().is_none()
            || self.tree().root().is_some_and(|r| r.is_dirty())
    }

    /// Flush deferred effects, then run the pipeline if anything changed.
    pub fn frame(&mut self) -> Result<FrameReport, PipelineError> {
        let started = Instant::now();
        flush_effects();
        if !self.needs_frame() {
            log::trace!(target: log_target::SCHEDULER, "clean tree; frame skipped");
            return Ok(FrameReport {
                frame: self.pipeline.frame_count(),
                mode: FrameMode::Skipped,
                commands: self
                    .pipeline
                    .previous_commands()
                    .map_or(0, |p| p.len()),
                updates: 0,
                dirty_frontier: 0,
                duration: started.elapsed(),
            });
        }
        self.pipeline.run_with(&self.cancel)
    }

    /// Deliver an input event; returns the element that consumed it.
    pub fn dispatch(&self, event: &Event) -> Option<ElementId> {
        let hit = self.tree().dispatch_event(event);
        if hit.is_none() {
            log::trace!(target: log_target::WIDGET, "{} not consumed", event.tag());
        }
        hit
    }

    /// Resize the surface. Everything is re-measured and the next frame is a
    /// full repaint.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.surface.size == (width, height) {
            return;
        }
        log::info!(target: log_target::RENDER, "resize {:?} -> {:?}", self.surface.size, (width, height));
        self.surface.size = (width, height);
        self.pipeline.with_renderer(|r| r.resize(width, height));
        self.pipeline
            .set_root_constraints(surface_constraints(&self.surface));
        self.pipeline.invalidate_previous();
    }

    /// Cancel pending work and dispose every widget.
    pub fn shutdown(self) {
        self.cancel.cancel();
        self.tree().dispose();
        log::info!(target: log_target::APP, "host on `{}` shut down", self.surface.label);
    }
}

fn surface_constraints(surface: &SurfaceHandle) -> Constraints {
    Constraints::new(surface.size.0 as f32, surface.size.1 as f32)
}
