use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;
use tracing::{debug, info, warn};

use super::context::ExecutionContext;
use super::runner::{ActionRunner, ProcessRunner};
use super::ExecutionSummary;
use crate::controller::Executor;
use crate::graph::{Graph, WorkItem, WorkItemPath};
use crate::logging::{operations, status};
use crate::problems::CapabilityAccessMonitor;

type Completion<'g> = (&'g WorkItemPath, Result<()>);

/// Runs the graph on a fixed number of worker threads
///
/// The calling thread coordinates: it hands ready items (all dependencies
/// finished) to the workers in path order and collects results. Items without
/// a dependency relation run concurrently.
pub struct WorkerPool<R = ProcessRunner> {
    runner: R,
    workers: usize,
    project_dir: PathBuf,
    excluded: BTreeSet<WorkItemPath>,
}

impl WorkerPool<ProcessRunner> {
    pub fn with_process_runner(project_dir: impl Into<PathBuf>) -> Self {
        Self::new(ProcessRunner, project_dir)
    }
}

impl<R: ActionRunner> WorkerPool<R> {
    pub fn new(runner: R, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workers: num_cpus::get(),
            project_dir: project_dir.into(),
            excluded: BTreeSet::new(),
        }
    }

    /// Number of worker threads (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_excluded<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<WorkItemPath>,
    {
        self.excluded.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn run_item(
        &self,
        item: &WorkItem,
        graph: &Graph,
        monitor: &CapabilityAccessMonitor,
    ) -> Result<()> {
        let context = ExecutionContext::new(item, graph, monitor, &self.project_dir);
        // A panicking action fails its item instead of taking the worker down
        panic::catch_unwind(AssertUnwindSafe(|| self.runner.run(&context)))
            .unwrap_or_else(|_| Err(anyhow!("{} panicked", item.path)))
    }

    fn coordinate<'g>(
        &self,
        graph: &'g Graph,
        jobs: Sender<&'g WorkItem>,
        done: Receiver<Completion<'g>>,
    ) -> Result<ExecutionSummary> {
        let dependents = graph.dependents();
        let mut waiting: BTreeMap<&WorkItemPath, usize> = graph
            .items()
            .map(|item| (&item.path, item.dependencies.len()))
            .collect();
        let mut ready: BTreeSet<&WorkItemPath> = BTreeSet::new();
        waiting.retain(|path, count| {
            if *count == 0 {
                ready.insert(*path);
                false
            } else {
                true
            }
        });

        let mut summary = ExecutionSummary::default();
        let mut failure: Option<anyhow::Error> = None;
        let mut in_flight = 0usize;

        let release = |path: &WorkItemPath,
                       ready: &mut BTreeSet<&'g WorkItemPath>,
                       waiting: &mut BTreeMap<&'g WorkItemPath, usize>| {
            for dependent in dependents.get(path).into_iter().flatten() {
                if let Some(count) = waiting.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        waiting.remove(dependent);
                        ready.insert(*dependent);
                    }
                }
            }
        };

        loop {
            while let Some(path) = ready.pop_first() {
                if self.excluded.contains(path) {
                    debug!(
                        operation = operations::EXECUTE_ITEM,
                        item = %path,
                        status = status::SKIPPED,
                        "Skipping excluded work item"
                    );
                    summary.skipped.push(path.clone());
                    release(path, &mut ready, &mut waiting);
                    continue;
                }

                let item = graph
                    .get(path)
                    .ok_or_else(|| anyhow!("Work item disappeared from graph: {}", path))?;
                jobs.send(item)
                    .map_err(|_| anyhow!("Worker pool shut down unexpectedly"))?;
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let (path, result) = done
                .recv()
                .map_err(|_| anyhow!("Worker pool shut down unexpectedly"))?;
            in_flight -= 1;

            match result {
                Ok(()) => {
                    info!(
                        operation = operations::EXECUTE_ITEM,
                        item = %path,
                        status = status::SUCCESS,
                        "> {}",
                        path
                    );
                    summary.completed.push(path.clone());
                    release(path, &mut ready, &mut waiting);
                }
                Err(e) => {
                    // Dependents of a failed item are never released
                    warn!(
                        operation = operations::EXECUTE_ITEM,
                        item = %path,
                        status = status::FAILED,
                        "{:#}",
                        e
                    );
                    summary.failed.push(path.clone());
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        drop(jobs);

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

impl<R: ActionRunner> Executor for WorkerPool<R> {
    fn execute(&self, graph: &Graph, monitor: &CapabilityAccessMonitor) -> Result<ExecutionSummary> {
        graph.validate()?;

        let workers = self.workers.min(graph.len().max(1));
        debug!(
            operation = operations::EXECUTE,
            items = graph.len(),
            workers,
            "Starting worker pool"
        );

        let (job_tx, job_rx) = unbounded::<&WorkItem>();
        let (done_tx, done_rx) = unbounded::<Completion<'_>>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for item in job_rx.iter() {
                        let result = self.run_item(item, graph, monitor);
                        if done_tx.send((&item.path, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            // Dropping the job sender (inside coordinate) lets the workers exit
            self.coordinate(graph, job_tx, done_rx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::{ProblemsCollector, Tolerance};
    use crate::start_parameter::StartParameter;
    use std::sync::{Arc, Mutex};

    fn succeed(_: &ExecutionContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Records every item it runs; fails the ones listed
    #[derive(Default)]
    struct Recording {
        ran: Mutex<Vec<String>>,
        failing: Vec<&'static str>,
    }

    impl ActionRunner for Recording {
        fn run(&self, context: &ExecutionContext<'_>) -> Result<()> {
            let path = context.item().path.as_str();
            self.ran.lock().unwrap().push(path.to_string());
            if self.failing.iter().any(|f| *f == path) {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn panics_on_a(context: &ExecutionContext<'_>) -> Result<()> {
        if context.item().path.as_str() == ":a" {
            panic!("action blew up");
        }
        Ok(())
    }

    fn monitor() -> CapabilityAccessMonitor {
        CapabilityAccessMonitor::new(
            &StartParameter::new(true, Tolerance::Warn),
            Arc::new(ProblemsCollector::new(Tolerance::Warn)),
        )
    }

    fn diamond() -> Graph {
        Graph::from_iter([
            WorkItem::new(":base", "DefaultTask"),
            WorkItem::new(":left", "DefaultTask").depends_on(":base"),
            WorkItem::new(":right", "DefaultTask").depends_on(":base"),
            WorkItem::new(":top", "DefaultTask")
                .depends_on(":left")
                .depends_on(":right"),
        ])
    }

    fn position(summary: &ExecutionSummary, path: &str) -> usize {
        summary
            .completed
            .iter()
            .position(|p| p.as_str() == path)
            .unwrap()
    }

    #[test]
    fn test_runs_every_item_after_its_dependencies() {
        let graph = diamond();
        for workers in [1, 2, 8] {
            let pool = WorkerPool::new(succeed, "/tmp").with_workers(workers);
            let summary = pool.execute(&graph, &monitor()).unwrap();

            assert_eq!(summary.completed.len(), 4);
            assert!(position(&summary, ":base") < position(&summary, ":left"));
            assert!(position(&summary, ":base") < position(&summary, ":right"));
            assert!(position(&summary, ":left") < position(&summary, ":top"));
            assert!(position(&summary, ":right") < position(&summary, ":top"));
        }
    }

    #[test]
    fn test_single_worker_runs_in_path_order() {
        let graph = Graph::from_iter([
            WorkItem::new(":c", "DefaultTask"),
            WorkItem::new(":a", "DefaultTask"),
            WorkItem::new(":b", "DefaultTask"),
        ]);
        let pool = WorkerPool::new(succeed, "/tmp").with_workers(1);

        let summary = pool.execute(&graph, &monitor()).unwrap();
        let order: Vec<&str> = summary.completed.iter().map(|p| p.as_str()).collect();
        assert_eq!(order, vec![":a", ":b", ":c"]);
    }

    #[test]
    fn test_failure_stops_dependents() {
        let graph = Graph::from_iter([
            WorkItem::new(":broken", "DefaultTask"),
            WorkItem::new(":after", "DefaultTask").depends_on(":broken"),
            WorkItem::new(":independent", "DefaultTask"),
        ]);
        let runner = Recording {
            failing: vec![":broken"],
            ..Default::default()
        };
        let pool = WorkerPool::new(runner, "/tmp").with_workers(2);

        let err = pool.execute(&graph, &monitor()).unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let ran = pool.runner.ran.lock().unwrap();
        assert!(ran.contains(&":independent".to_string()));
        assert!(!ran.contains(&":after".to_string()));
    }

    #[test]
    fn test_panicking_action_fails_its_item() {
        let graph = Graph::from_iter([
            WorkItem::new(":a", "DefaultTask"),
            WorkItem::new(":b", "DefaultTask"),
            WorkItem::new(":c", "DefaultTask").depends_on(":a"),
        ]);
        let pool = WorkerPool::new(panics_on_a, "/tmp").with_workers(2);

        let err = pool.execute(&graph, &monitor()).unwrap_err();
        assert_eq!(err.to_string(), ":a panicked");
    }

    #[test]
    fn test_panicking_action_with_single_worker() {
        let graph = Graph::from_iter([
            WorkItem::new(":a", "DefaultTask"),
            WorkItem::new(":b", "DefaultTask"),
        ]);
        let pool = WorkerPool::new(panics_on_a, "/tmp").with_workers(1);

        assert!(pool.execute(&graph, &monitor()).is_err());
    }

    #[test]
    fn test_excluded_items_are_skipped() {
        let graph = diamond();
        let pool = WorkerPool::new(succeed, "/tmp")
            .with_workers(2)
            .with_excluded([":left"]);

        let summary = pool.execute(&graph, &monitor()).unwrap();
        assert_eq!(summary.skipped, vec![WorkItemPath::new(":left")]);
        assert_eq!(summary.completed.len(), 3);
        assert!(position(&summary, ":right") < position(&summary, ":top"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let graph = Graph::from_iter([
            WorkItem::new(":a", "DefaultTask").depends_on(":b"),
            WorkItem::new(":b", "DefaultTask").depends_on(":a"),
        ]);
        let pool = WorkerPool::new(succeed, "/tmp");

        let err = pool.execute(&graph, &monitor()).unwrap_err();
        assert!(err.to_string().contains("Cyclic dependency detected"));
    }
}
