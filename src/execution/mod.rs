/// Work item execution
///
/// A small execution engine for restored or freshly configured graphs. Actions
/// see the build only through an `ExecutionContext`, which reports
/// configuration-only operations to the capability monitor.
use crate::graph::WorkItemPath;

pub mod context;
mod pool;
mod runner;

pub use context::ExecutionContext;
pub use pool::WorkerPool;
pub use runner::{ActionRunner, ProcessRunner};

/// Outcome of one execution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// In completion order
    pub completed: Vec<WorkItemPath>,
    pub skipped: Vec<WorkItemPath>,
    pub failed: Vec<WorkItemPath>,
}
