use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::RenderError;
use crate::paint::PaintCommand;
use crate::{Color, Rect, Transform, Vec2};

/// Opaque handle to whatever a renderer draws into (a DOM node, a canvas, a
/// window). Only the renderer interprets `raw`.
#[derive(Clone)]
pub struct SurfaceHandle {
    pub label: String,
    pub size: (u32, u32),
    pub raw: Option<Arc<dyn Any + Send + Sync>>,
}

impl SurfaceHandle {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            size: (width, height),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: Arc<dyn Any + Send + Sync>) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn raw_as<T: Any>(&self) -> Option<&T> {
        self.raw.as_deref().and_then(|r| r.downcast_ref::<T>())
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("label", &self.label)
            .field("size", &self.size)
            .finish()
    }
}

/// Backend that materializes paint commands.
///
/// A full repaint is `begin_frame`, one `paint` per command, `end_frame`.
/// Retained backends may also accept targeted updates through
/// `apply_updates`; returning `Ok(false)` asks the caller for a full repaint
/// instead, and an error is treated the same way.
pub trait Renderer: Send {
    fn init(&mut self, surface: &SurfaceHandle) -> Result<(), RenderError>;
    fn begin_frame(&mut self);
    fn paint(&mut self, command: &PaintCommand);
    fn end_frame(&mut self) -> Result<(), RenderError>;
    fn apply_updates(
        &mut self,
        updates: &[PaintCommand],
        full: &[PaintCommand],
    ) -> Result<bool, RenderError>;
    fn resize(&mut self, width: u32, height: u32);
    fn name(&self) -> &str;
}

/// Immediate-mode drawing primitives a renderer hands to widgets.
pub trait PaintContext {
    fn draw_rect(&mut self, bounds: Rect, color: Color);
    fn draw_text(&mut self, text: &str, offset: Vec2, color: Color);
    fn draw_path(&mut self, points: &[Vec2], color: Color, width: f32);
    fn push_transform(&mut self, transform: Transform);
    fn pop_transform(&mut self);
    fn push_clip(&mut self, rect: Rect);
    fn pop_clip(&mut self);
}
