//! Log categories.
//!
//! Every record the framework emits goes through the `log` facade with one of
//! these targets, so a sink can filter per category (`trellis::effect=trace`)
//! or the whole framework (`trellis=warn`). Filtering belongs to the sink; the
//! core never inspects the environment.

pub const SIGNAL: &str = "trellis::signal";
pub const EFFECT: &str = "trellis::effect";
pub const MEMO: &str = "trellis::memo";
pub const BATCH: &str = "trellis::batch";
pub const SCHEDULER: &str = "trellis::scheduler";
pub const TREE: &str = "trellis::tree";
pub const RENDER: &str = "trellis::render";
pub const PIPELINE: &str = "trellis::pipeline";
pub const UPDATE: &str = "trellis::update";
pub const WIDGET: &str = "trellis::widget";
pub const GRAPH: &str = "trellis::graph";
pub const APP: &str = "trellis::app";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Silent,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Silent => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        level.to_level_filter()
    }
}
