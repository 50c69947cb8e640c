//! # Signals, Effects, and the Element Tree
//!
//! Trellis is split in two halves that meet at the element tree:
//!
//! - a fine-grained reactive graph: `Signal<T>`, `Memo<T>`, `effect`,
//!   `batch`, and a deferred scheduler;
//! - a retained element tree with dirty flags, which the pipeline crate turns
//!   into a stream of paint commands for a pluggable `Renderer`.
//!
//! ## Signals
//!
//! ```rust
//! use trellis_core::*;
//!
//! let count = signal(0);
//! count.set(1);
//! count.update(|v| *v += 1);
//! assert_eq!(count.get(), 2);
//! ```
//!
//! Reads inside an effect or memo register a dependency; `peek` and
//! `untrack` read without one.
//!
//! ## Effects
//!
//! ```rust
//! use std::{cell::Cell, rc::Rc};
//! use trellis_core::*;
//!
//! let name = signal("Jane".to_string());
//! let runs = Rc::new(Cell::new(0));
//! let e = {
//!     let (name, runs) = (name.clone(), runs.clone());
//!     effect(move || {
//!         let _ = name.get();
//!         runs.set(runs.get() + 1);
//!     })
//! };
//! name.set("John".into());
//! assert_eq!(runs.get(), 2);
//! e.dispose();
//! name.set("Jim".into());
//! assert_eq!(runs.get(), 2);
//! ```
//!
//! Effects re-run synchronously on each write unless they were created with
//! `EffectOptions::deferred()`, in which case they wait for `flush_effects`.
//! Writing a signal from inside its own observer is allowed; the re-run is
//! coalesced and happens once the current body returns.
//!
//! ## Memos and batches
//!
//! ```rust
//! use trellis_core::*;
//!
//! let a = signal(2);
//! let b = signal(3);
//! let sum = {
//!     let (a, b) = (a.clone(), b.clone());
//!     memo(move || a.get() + b.get())
//! };
//! assert_eq!(sum.get(), 5);
//! batch(|| {
//!     a.set(10);
//!     b.set(20);
//! });
//! assert_eq!(sum.get(), 30);
//! ```
//!
//! `batch` defers notifications until the outermost batch closes; every
//! affected effect then runs at most once.
//!
//! ## Elements
//!
//! Elements hold a `Widget` payload, strong children and a weak parent. A
//! `Tree` adds an id index and serialized structural edits. `mark_dirty`
//! flags propagate `CHILDREN` up to the root so a pipeline can find the dirty
//! frontier from the top.
//!
//! Widget payloads are `Send + Sync` and cannot hold signals; event handlers
//! that write signals are registered per element with `on_activate` and run
//! on the thread that dispatches the event.

pub mod batch;
pub mod color;
pub mod effects;
pub mod element;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod input;
pub mod log_target;
pub mod memo;
pub mod paint;
pub mod prelude;
pub mod reactive;
pub mod render_api;
pub mod scope;
pub mod signal;
pub mod tests;
pub mod tree;
pub mod widget;

pub use batch::*;
pub use color::*;
pub use effects::*;
pub use element::*;
pub use error::*;
pub use geometry::*;
pub use handlers::{activation_handler_count, on_activate};
pub use input::*;
pub use log_target::LogLevel;
pub use memo::*;
pub use paint::*;
pub use reactive::{
    EffectId, EffectOptions, MAX_EFFECT_RERUNS, SourceId, batch_depth, current_effect,
    flush_effects, has_pending_effects, set_schedule_hook,
};
pub use render_api::*;
pub use scope::*;
pub use signal::*;
pub use tree::*;
pub use widget::*;
