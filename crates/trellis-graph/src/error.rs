use std::fmt::Debug;

use thiserror::Error;
use web_time::Duration;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError<K: Debug> {
    #[error("node {0:?} already exists")]
    DuplicateNode(K),
    #[error("unknown node {0:?}")]
    UnknownNode(K),
    #[error("edge {from:?} -> {to:?} would create a cycle")]
    Cycle { from: K, to: K },
    #[error("graph contains a cycle through {0:?}")]
    CycleDetected(Vec<K>),
}

/// Returned by [`CancelToken::check`](crate::CancelToken::check).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    #[error("cancelled")]
    Requested,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("stage `{0}` is registered twice")]
    DuplicateStage(String),
    #[error("stage `{stage}` runs after unknown stage `{missing}`")]
    UnknownStage { stage: String, missing: String },
    #[error("stage ordering is invalid: {0}")]
    Graph(#[from] GraphError<String>),
    #[error("stage `{stage}` was cancelled")]
    Cancelled { stage: String },
    #[error("stage `{stage}` timed out after {after:?}")]
    Timeout { stage: String, after: Duration },
    #[error("stage `{stage}` failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl WorkflowError {
    /// Name of the stage the error came from, if it came from one.
    pub fn stage(&self) -> Option<&str> {
        match self {
            WorkflowError::Cancelled { stage }
            | WorkflowError::Timeout { stage, .. }
            | WorkflowError::StageFailed { stage, .. }
            | WorkflowError::UnknownStage { stage, .. } => Some(stage),
            WorkflowError::DuplicateStage(stage) => Some(stage),
            WorkflowError::Graph(_) => None,
        }
    }
}
