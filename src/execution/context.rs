use std::fmt::Display;
use std::path::Path;

use crate::graph::{Graph, WorkItem, WorkItemPath};
use crate::problems::{CapabilityAccessMonitor, TraceSource};

/// Invocation descriptions used when reporting configuration-only accesses
pub mod invocations {
    pub const LIVE_DEPENDENCIES: &str = "WorkItem.live_dependencies()";
    pub const PROJECT: &str = "WorkItem.project()";
    pub const ADD_BUILD_LISTENER: &str = "Build.add_listener()";
}

/// What an action sees of the build while its work item executes
///
/// Reading the item itself and its captured dependency paths is always fine.
/// Operations that reach back into configuration-time state go through the
/// capability monitor first; they still succeed.
pub struct ExecutionContext<'a> {
    item: &'a WorkItem,
    graph: &'a Graph,
    monitor: &'a CapabilityAccessMonitor,
    project_dir: &'a Path,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        item: &'a WorkItem,
        graph: &'a Graph,
        monitor: &'a CapabilityAccessMonitor,
        project_dir: &'a Path,
    ) -> Self {
        Self {
            item,
            graph,
            monitor,
            project_dir,
        }
    }

    pub fn item(&self) -> &'a WorkItem {
        self.item
    }

    /// Working directory for actions
    pub fn working_dir(&self) -> &'a Path {
        self.project_dir
    }

    /// Dependency paths captured at configuration time
    pub fn dependency_paths(&self) -> &'a [WorkItemPath] {
        &self.item.dependencies
    }

    /// Resolve the dependencies against the live graph
    pub fn live_dependencies(&self) -> Vec<&'a WorkItem> {
        self.monitor.on_dependency_graph_access(
            invocations::LIVE_DEPENDENCIES,
            TraceSource::WorkItem(self.item),
        );

        self.item
            .dependencies
            .iter()
            .filter_map(|path| self.graph.get(path))
            .collect()
    }

    /// Project-scope state: the project directory
    pub fn project(&self) -> &'a Path {
        self.monitor
            .on_project_access(invocations::PROJECT, TraceSource::WorkItem(self.item));
        self.project_dir
    }

    /// Register a build-scoped listener. Registration after configuration has
    /// no effect on the running build.
    pub fn add_build_listener(&self, listener: &dyn Display, trusted: bool) {
        self.monitor.on_listener_registration(
            listener,
            invocations::ADD_BUILD_LISTENER,
            TraceSource::WorkItem(self.item),
            trusted,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::{ProblemsCollector, Tolerance};
    use crate::start_parameter::StartParameter;
    use std::sync::Arc;

    fn graph() -> Graph {
        Graph::from_iter([
            WorkItem::new(":lib", "DefaultTask"),
            WorkItem::new(":app", "Exec_Decorated").depends_on(":lib"),
        ])
    }

    fn monitor(enabled: bool) -> CapabilityAccessMonitor {
        let collector = Arc::new(ProblemsCollector::new(Tolerance::Warn));
        CapabilityAccessMonitor::new(&StartParameter::new(enabled, Tolerance::Warn), collector)
    }

    #[test]
    fn test_safe_accessors_are_not_reported() {
        let graph = graph();
        let monitor = monitor(true);
        let _armed = monitor.arm();
        let item = graph.get(&":app".into()).unwrap();
        let context = ExecutionContext::new(item, &graph, &monitor, Path::new("/work"));

        assert_eq!(context.dependency_paths(), &[WorkItemPath::new(":lib")]);
        assert_eq!(context.working_dir(), Path::new("/work"));
        assert!(monitor.problems().is_empty());
    }

    #[test]
    fn test_configuration_only_accesses_are_reported() {
        let graph = graph();
        let monitor = monitor(true);
        let _armed = monitor.arm();
        let item = graph.get(&":app".into()).unwrap();
        let context = ExecutionContext::new(item, &graph, &monitor, Path::new("/work"));

        let live = context.live_dependencies();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].path.as_str(), ":lib");
        assert_eq!(context.project(), Path::new("/work"));
        context.add_build_listener(&"BuildFinishedListener", false);
        context.add_build_listener(&"InternalProgressListener", true);

        let problems = monitor.problems().problems();
        assert_eq!(problems.len(), 3);
        assert!(problems
            .iter()
            .all(|p| p.trace.work_item_path() == Some(":app")));
        assert_eq!(
            problems[0].message.render(),
            "invocation of `WorkItem.live_dependencies()` at execution time is unsupported."
        );
    }

    #[test]
    fn test_disabled_monitor_reports_nothing() {
        let graph = graph();
        let monitor = monitor(false);
        let _armed = monitor.arm();
        let item = graph.get(&":app".into()).unwrap();
        let context = ExecutionContext::new(item, &graph, &monitor, Path::new("/work"));

        context.live_dependencies();
        context.project();
        assert!(monitor.problems().is_empty());
    }
}
