//! Renderers that draw nowhere, for tests and tooling.
//!
//! Both keep their observable state behind an `Arc<Mutex<_>>` handle taken
//! before the renderer is boxed and handed to a pipeline, so a test can
//! inspect what reached the backend.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use trellis_core::log_target;
use trellis_core::{
    CommandKind, ElementId, PaintCommand, RenderError, Renderer, SurfaceHandle,
};

use crate::canvas::RecordingCanvas;

/// Counters every headless renderer keeps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub inits: usize,
    pub full_repaints: usize,
    pub painted: usize,
    /// `apply_updates` calls that were accepted.
    pub patches: usize,
    /// `apply_updates` calls that asked for a full repaint.
    pub rejected_patches: usize,
    pub resizes: Vec<(u32, u32)>,
}

/// What a [`RetainedRenderer`] currently shows.
#[derive(Debug, Default)]
pub struct RetainedState {
    pub surface: Option<SurfaceHandle>,
    /// One retained node per element, in paint order.
    pub nodes: IndexMap<ElementId, PaintCommand>,
    /// Every accepted update, in arrival order.
    pub applied: Vec<PaintCommand>,
    pub stats: RenderStats,
    /// Make the next `apply_updates` fail with a backend error.
    pub fail_next_update: bool,
}

impl RetainedState {
    pub fn node(&self, id: &str) -> Option<&PaintCommand> {
        self.nodes.get(id)
    }
}

/// A DOM-like renderer: keeps one node per element and patches nodes in
/// place when it can.
#[derive(Default)]
pub struct RetainedRenderer {
    state: Arc<Mutex<RetainedState>>,
    in_frame: bool,
}

impl RetainedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<Mutex<RetainedState>> {
        self.state.clone()
    }
}

fn check_surface(name: &str, surface: &SurfaceHandle) -> Result<(), RenderError> {
    if surface.label.is_empty() || surface.size.0 == 0 || surface.size.1 == 0 {
        return Err(RenderError::Init {
            renderer: name.to_string(),
            surface: surface.label.clone(),
            reason: format!("unusable surface {:?}", surface.size),
        });
    }
    Ok(())
}

impl Renderer for RetainedRenderer {
    fn init(&mut self, surface: &SurfaceHandle) -> Result<(), RenderError> {
        check_surface(self.name(), surface)?;
        let mut st = self.state.lock();
        st.surface = Some(surface.clone());
        st.stats.inits += 1;
        log::info!(target: log_target::RENDER, "retained renderer attached to {}", surface.label);
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.in_frame = true;
        self.state.lock().nodes.clear();
    }

    fn paint(&mut self, command: &PaintCommand) {
        let mut st = self.state.lock();
        st.stats.painted += 1;
        st.nodes.insert(command.id.clone(), command.clone());
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        let mut st = self.state.lock();
        if st.surface.is_none() {
            return Err(RenderError::NotInitialized);
        }
        if !std::mem::take(&mut self.in_frame) {
            return Err(RenderError::Backend("end_frame without begin_frame".into()));
        }
        st.stats.full_repaints += 1;
        Ok(())
    }

    fn apply_updates(
        &mut self,
        updates: &[PaintCommand],
        _full: &[PaintCommand],
    ) -> Result<bool, RenderError> {
        let mut st = self.state.lock();
        if std::mem::take(&mut st.fail_next_update) {
            return Err(RenderError::Backend("injected update failure".into()));
        }
        if updates.iter().any(|u| !st.nodes.contains_key(&u.id)) {
            st.stats.rejected_patches += 1;
            return Ok(false);
        }
        for u in updates {
            let Some(node) = st.nodes.get_mut(&u.id) else {
                continue;
            };
            match u.kind {
                CommandKind::UpdateText => node.text = u.text.clone(),
                CommandKind::UpdateColor => node.color = u.color,
                CommandKind::UpdateBackground => node.background = u.background,
                CommandKind::UpdateBorder => node.border = u.border,
                CommandKind::UpdateShadow => node.shadow = u.shadow,
                CommandKind::UpdateBounds => node.bounds = u.bounds,
                _ => *node = u.clone(),
            }
            log::trace!(target: log_target::UPDATE, "{:?} {:?}", u.kind, u.id);
        }
        st.applied.extend(updates.iter().cloned());
        st.stats.patches += 1;
        Ok(true)
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut st = self.state.lock();
        if let Some(s) = st.surface.as_mut() {
            s.size = (width, height);
        }
        st.stats.resizes.push((width, height));
    }

    fn name(&self) -> &str {
        "retained"
    }
}

/// What an [`ImmediateRenderer`] drew in its last full frame.
#[derive(Debug, Default)]
pub struct ImmediateState {
    pub surface: Option<SurfaceHandle>,
    pub canvas: RecordingCanvas,
    /// Commands of the last completed frame, in paint order.
    pub frame: Vec<ElementId>,
    pub stats: RenderStats,
}

/// A canvas-like renderer: every change needs a full repaint, which it
/// replays into a [`RecordingCanvas`].
#[derive(Default)]
pub struct ImmediateRenderer {
    state: Arc<Mutex<ImmediateState>>,
    pending: Vec<ElementId>,
}

impl ImmediateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<Mutex<ImmediateState>> {
        self.state.clone()
    }
}

impl Renderer for ImmediateRenderer {
    fn init(&mut self, surface: &SurfaceHandle) -> Result<(), RenderError> {
        check_surface(self.name(), surface)?;
        let mut st = self.state.lock();
        st.surface = Some(surface.clone());
        st.stats.inits += 1;
        log::info!(target: log_target::RENDER, "immediate renderer attached to {}", surface.label);
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.pending.clear();
        self.state.lock().canvas.clear();
    }

    fn paint(&mut self, command: &PaintCommand) {
        let mut st = self.state.lock();
        command.draw(&mut st.canvas);
        st.stats.painted += 1;
        self.pending.push(command.id.clone());
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        let mut st = self.state.lock();
        if st.surface.is_none() {
            return Err(RenderError::NotInitialized);
        }
        st.frame = std::mem::take(&mut self.pending);
        st.stats.full_repaints += 1;
        Ok(())
    }

    fn apply_updates(
        &mut self,
        _updates: &[PaintCommand],
        _full: &[PaintCommand],
    ) -> Result<bool, RenderError> {
        self.state.lock().stats.rejected_patches += 1;
        Ok(false)
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut st = self.state.lock();
        if let Some(s) = st.surface.as_mut() {
            s.size = (width, height);
        }
        st.stats.resizes.push((width, height));
    }

    fn name(&self) -> &str {
        "immediate"
    }
}
