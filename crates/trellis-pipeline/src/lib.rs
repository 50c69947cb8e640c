//! # Frame pipeline
//!
//! Turns a dirty element tree into renderer calls in four stages:
//!
//! 1. **mark**: every dirty node's ancestors become `LAYOUT` dirty;
//! 2. **measure**: post-order sizing, containers from their children and
//!    leaves from `Widget::measure` under the root constraints;
//! 3. **place**: pre-order positioning relative to the parent;
//! 4. **commit**: the tree is flattened into paint commands and diffed
//!    against the last frame. The renderer receives targeted updates when
//!    it accepts them and a full `begin_frame`/`paint`/`end_frame` otherwise.
//!
//! The stages are [`Pass`](trellis_graph::Pass)es scheduled through a
//! [`Workflow`](trellis_graph::Workflow), so extra stages can be added with
//! [`Pipeline::add_stage`]. [`Host`] wraps a pipeline with a renderer's
//! lifecycle and input dispatch.

pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod pipeline;
pub mod stages;

pub use config::{FrameMode, FrameReport, PipelineConfig};
pub use error::PipelineError;
pub use host::Host;
pub use pipeline::Pipeline;
pub use stages::{
    COMMIT, CommitOutcome, CommitStage, FrameContext, MARK, MEASURE, MarkStage, MeasureStage,
    PLACE, PlaceStage, StageOutput,
};
