/// Per-invocation build parameters
///
/// Decided once when the build starts (from config, environment and CLI) and
/// passed by reference to everything that needs it. Never mutated mid-build.
use crate::graph::WorkItemPath;
use crate::problems::Tolerance;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartParameter {
    /// Whether the configuration cache is enabled for this build
    pub enabled: bool,
    pub tolerance: Tolerance,
    /// Requested work items (empty = everything)
    pub requested: Vec<WorkItemPath>,
    /// Work items skipped during execution
    pub excluded: Vec<WorkItemPath>,
}

impl StartParameter {
    pub fn new(enabled: bool, tolerance: Tolerance) -> Self {
        Self {
            enabled,
            tolerance,
            requested: Vec::new(),
            excluded: Vec::new(),
        }
    }

    pub fn with_requested<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<WorkItemPath>,
    {
        self.requested = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<WorkItemPath>,
    {
        self.excluded = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_excluded(&self, path: &WorkItemPath) -> bool {
        self.excluded.contains(path)
    }
}
