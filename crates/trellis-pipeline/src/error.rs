use thiserror::Error;
use trellis_core::RenderError;
use trellis_graph::{Cancelled, WorkflowError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no root element installed")]
    NoRoot,
    #[error("frame cancelled during `{stage}`")]
    Cancelled { stage: String },
    #[error("stage `{stage}` failed: {source:#}")]
    Stage {
        stage: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("renderer error: {0}")]
    Render(#[from] RenderError),
    /// Stage registration or ordering problems.
    #[error(transparent)]
    Config(WorkflowError),
}

impl From<WorkflowError> for PipelineError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Cancelled { stage } | WorkflowError::Timeout { stage, .. } => {
                PipelineError::Cancelled { stage }
            }
            WorkflowError::StageFailed { stage, source, .. } => unwrap_stage_error(stage, source),
            other => PipelineError::Config(other),
        }
    }
}

/// Recover the typed error a built-in stage raised through `anyhow`.
fn unwrap_stage_error(stage: String, source: anyhow::Error) -> PipelineError {
    let source = match source.downcast::<PipelineError>() {
        Ok(e) => return e,
        Err(source) => source,
    };
    let source = match source.downcast::<RenderError>() {
        Ok(e) => return PipelineError::Render(e),
        Err(source) => source,
    };
    if source.downcast_ref::<Cancelled>().is_some() {
        return PipelineError::Cancelled { stage };
    }
    PipelineError::Stage { stage, source }
}
