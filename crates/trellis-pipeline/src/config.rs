use trellis_core::Constraints;
use web_time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Handed to leaf widgets' `measure`.
    pub root_constraints: Constraints,
    /// Reset every node's dirty flags after a successful commit.
    pub clear_dirty_on_commit: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root_constraints: Constraints::default(),
            clear_dirty_on_commit: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMode {
    /// begin_frame / paint* / end_frame.
    Full,
    /// The renderer accepted targeted updates.
    Patched,
    /// Nothing changed; the renderer was not called.
    Skipped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub mode: FrameMode,
    /// Commands in the frame's full list.
    pub commands: usize,
    /// Update commands produced by the diff (zero on a first frame).
    pub updates: usize,
    /// Nodes that were dirty when the frame started.
    pub dirty_frontier: usize,
    pub duration: Duration,
}
