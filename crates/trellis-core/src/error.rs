use thiserror::Error;

use crate::ElementId;
use crate::reactive::SourceId;

/// Structural misuse of the element tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("element id `{0}` is already present in the tree")]
    DuplicateId(ElementId),
    #[error("element `{0}` is not installed in this tree")]
    NotInstalled(ElementId),
    #[error("element `{0}` already has a parent")]
    AlreadyAttached(ElementId),
    #[error("inserting `{child}` under `{parent}` would create a cycle")]
    Cycle { parent: ElementId, child: ElementId },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer `{renderer}` failed to attach to surface `{surface}`: {reason}")]
    Init {
        renderer: String,
        surface: String,
        reason: String,
    },
    #[error("renderer used before init")]
    NotInitialized,
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveError {
    #[error("memo {0:?} read itself while computing its first value")]
    Cycle(SourceId),
}
