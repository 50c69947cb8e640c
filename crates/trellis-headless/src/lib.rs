//! Headless backends for Trellis.
//!
//! - [`RetainedRenderer`] behaves like a DOM: it keeps a node per element and
//!   applies targeted updates in place.
//! - [`ImmediateRenderer`] behaves like a canvas: it rejects every selective
//!   update and replays full frames into a [`RecordingCanvas`].
//!
//! Both expose their state through a shared handle so tests can observe what
//! the pipeline sent. The [`widgets`] module has a few fixed-metric widgets
//! for building trees without a text stack.

pub mod canvas;
pub mod renderer;
pub mod widgets;

pub use canvas::{DrawOp, RecordingCanvas};
pub use renderer::{
    ImmediateRenderer, ImmediateState, RenderStats, RetainedRenderer, RetainedState,
};
pub use widgets::{Block, Button, Label, Spacer, Stack};
