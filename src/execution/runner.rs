use anyhow::{bail, Context, Result};
use std::env;
use std::process::Command;
use tracing::debug;

use super::context::ExecutionContext;
use crate::graph::{ActionSpec, Capability};

/// Runs the action of one work item
pub trait ActionRunner: Send + Sync {
    fn run(&self, context: &ExecutionContext<'_>) -> Result<()>;
}

impl<F> ActionRunner for F
where
    F: Fn(&ExecutionContext<'_>) -> Result<()> + Send + Sync,
{
    fn run(&self, context: &ExecutionContext<'_>) -> Result<()> {
        self(context)
    }
}

/// Executes `exec` actions as child processes in the project directory.
/// Items without an action are lifecycle items and succeed immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ActionRunner for ProcessRunner {
    fn run(&self, context: &ExecutionContext<'_>) -> Result<()> {
        let item = context.item();
        let Some(action) = &item.action else {
            return Ok(());
        };

        match action {
            ActionSpec::Exec { program, args } => {
                let cwd = context.working_dir();

                // Resolve from PATH, or relative to the project for "./tool"
                let program_path = which::which_in(program, env::var_os("PATH"), cwd)
                    .with_context(|| format!("Could not find '{}' for {}", program, item.path))?;

                debug!(
                    operation = "execution.exec",
                    item = %item.path,
                    program = %program_path.display(),
                    args = ?args,
                    "Spawning action"
                );

                let status = Command::new(&program_path)
                    .args(args)
                    .current_dir(cwd)
                    .status()
                    .with_context(|| format!("Failed to spawn {}", program_path.display()))?;

                if !status.success() {
                    bail!(
                        "{} failed: {} exited with code {}",
                        item.path,
                        program,
                        status.code().unwrap_or(-1)
                    );
                }

                Ok(())
            }
            ActionSpec::Inspect { capability } => {
                match capability {
                    Capability::Project => {
                        let project = context.project();
                        debug!(item = %item.path, project = %project.display(), "Read project");
                    }
                    Capability::LiveDependencies => {
                        let dependencies = context.live_dependencies();
                        debug!(
                            item = %item.path,
                            dependencies = dependencies.len(),
                            "Resolved live dependencies"
                        );
                    }
                    Capability::BuildListener { listener } => {
                        context.add_build_listener(listener, false);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, WorkItem};
    use crate::problems::{CapabilityAccessMonitor, ProblemsCollector, Tolerance};
    use crate::start_parameter::StartParameter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn run_item(item: WorkItem, dir: &TempDir) -> Result<()> {
        let graph = Graph::from_iter([item]);
        let monitor = CapabilityAccessMonitor::new(
            &StartParameter::default(),
            Arc::new(ProblemsCollector::new(Tolerance::Warn)),
        );
        let item = graph.items().next().unwrap();
        ProcessRunner.run(&ExecutionContext::new(item, &graph, &monitor, dir.path()))
    }

    #[test]
    fn test_lifecycle_item_succeeds() {
        let temp = TempDir::new().unwrap();
        assert!(run_item(WorkItem::new(":assemble", "DefaultTask"), &temp).is_ok());
    }

    #[test]
    fn test_missing_program() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new(":x", "Exec").with_action(ActionSpec::Exec {
            program: "planstore-definitely-missing-tool".to_string(),
            args: vec![],
        });

        let err = run_item(item, &temp).unwrap_err();
        assert!(err.to_string().contains("planstore-definitely-missing-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_runs_in_project_dir() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new(":touch", "Exec").with_action(ActionSpec::Exec {
            program: "touch".to_string(),
            args: vec!["marker.txt".to_string()],
        });

        run_item(item, &temp).unwrap();
        assert!(temp.path().join("marker.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_failure() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new(":fail", "Exec").with_action(ActionSpec::Exec {
            program: "false".to_string(),
            args: vec![],
        });

        let err = run_item(item, &temp).unwrap_err();
        assert_eq!(err.to_string(), ":fail failed: false exited with code 1");
    }

    #[test]
    fn test_inspect_reports_to_monitor() {
        let temp = TempDir::new().unwrap();
        let graph = Graph::from_iter([
            WorkItem::new(":project", "DefaultTask").with_action(ActionSpec::Inspect {
                capability: Capability::Project,
            }),
            WorkItem::new(":listener", "DefaultTask").with_action(ActionSpec::Inspect {
                capability: Capability::BuildListener {
                    listener: "ScanListener".to_string(),
                },
            }),
        ]);
        let collector = Arc::new(ProblemsCollector::new(Tolerance::Warn));
        let monitor = CapabilityAccessMonitor::new(
            &StartParameter::new(true, Tolerance::Warn),
            Arc::clone(&collector),
        );
        let _armed = monitor.arm();

        for item in graph.items() {
            ProcessRunner
                .run(&ExecutionContext::new(item, &graph, &monitor, temp.path()))
                .unwrap();
        }

        assert_eq!(collector.len(), 2);
    }
}
