//! # Graph utilities
//!
//! Small scheduling building blocks the frame pipeline is assembled from:
//!
//! - [`Dag`]: a thread-safe directed acyclic graph that rejects cycle-forming
//!   edges, with topological sort, traversals and a level-parallel processor.
//! - [`Workflow`]: an ordered set of [`Pass`]es scheduled through a `Dag`,
//!   each seeing the results of the passes before it.
//! - [`CancelToken`]: cooperative cancellation with optional deadlines.
//!
//! ```rust
//! use trellis_graph::Dag;
//!
//! let g: Dag<&str, ()> = Dag::new();
//! for n in ["fetch", "parse", "render"] {
//!     g.add_node(n, ()).unwrap();
//! }
//! g.add_edge("fetch", "parse").unwrap();
//! g.add_edge("parse", "render").unwrap();
//! assert!(g.add_edge("render", "fetch").is_err());
//! assert_eq!(g.topological_sort().unwrap(), ["fetch", "parse", "render"]);
//! ```

pub mod cancel;
pub mod dag;
pub mod error;
pub mod workflow;

pub use cancel::CancelToken;
pub use dag::{Dag, NodeKey};
pub use error::{Cancelled, GraphError, WorkflowError};
pub use workflow::{FnPass, Pass, PassHistory, StagePolicy, Workflow};

pub(crate) const LOG_TARGET: &str = "trellis::graph";
