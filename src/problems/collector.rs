/// Problems collection and reporting
///
/// One collector lives for the duration of a build. Worker threads append to
/// it concurrently; the report groups identical problems and orders groups by
/// their trace and message, so report contents do not depend on thread
/// interleaving.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

use super::message::StructuredMessage;
use super::trace::PropertyTrace;
use crate::logging::operations;

/// How capability problems affect the build outcome
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    /// Report problems, build succeeds
    #[default]
    Warn,
    /// Report problems, build fails if there are any
    Fail,
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => f.write_str("warn"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

impl std::str::FromStr for Tolerance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            _ => Err(anyhow::anyhow!(
                "Invalid problems mode: {}. Must be one of: warn, fail",
                s
            )),
        }
    }
}

/// Failure attached to a problem when user code did something unsupported
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidUserCode(pub String);

#[derive(Debug, Clone)]
pub struct PropertyProblem {
    pub trace: PropertyTrace,
    pub message: StructuredMessage,
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl PropertyProblem {
    pub fn new(trace: PropertyTrace, message: StructuredMessage) -> Self {
        Self {
            trace,
            message,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }
}

impl fmt::Display for PropertyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.trace, self.message)
    }
}

#[derive(Debug)]
pub struct ProblemsCollector {
    tolerance: Tolerance,
    problems: Mutex<Vec<PropertyProblem>>,
}

impl ProblemsCollector {
    pub fn new(tolerance: Tolerance) -> Self {
        Self {
            tolerance,
            problems: Mutex::new(Vec::new()),
        }
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Record a problem. Safe to call from any worker thread.
    pub fn on_problem(&self, problem: PropertyProblem) {
        debug!(
            operation = operations::PROBLEMS_RECORD,
            trace = %problem.trace,
            "{}",
            problem.message
        );
        self.lock().push(problem);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the recorded problems, in recording order
    pub fn problems(&self) -> Vec<PropertyProblem> {
        self.lock().clone()
    }

    pub fn should_fail_build(&self) -> bool {
        self.tolerance == Tolerance::Fail && !self.is_empty()
    }

    pub fn report(&self) -> ProblemsReport {
        let problems = self.lock();

        let mut groups: BTreeMap<(PropertyTrace, StructuredMessage), ProblemGroup> =
            BTreeMap::new();

        for problem in problems.iter() {
            let cause = problem.cause.as_ref().map(|c| c.to_string());
            let group = groups
                .entry((problem.trace.clone(), problem.message.clone()))
                .or_insert_with(|| ProblemGroup {
                    location: problem.trace.to_string(),
                    trace: problem.trace.clone(),
                    message: problem.message.clone(),
                    rendered: problem.message.render(),
                    count: 0,
                    cause: None,
                });

            group.count += 1;
            // Smallest cause wins so the pick is independent of arrival order
            if let Some(cause) = cause {
                match &group.cause {
                    Some(existing) if *existing <= cause => {}
                    _ => group.cause = Some(cause),
                }
            }
        }

        let total = problems.len();
        ProblemsReport {
            total,
            tolerance: self.tolerance,
            failed: self.tolerance == Tolerance::Fail && total > 0,
            groups: groups.into_values().collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PropertyProblem>> {
        // A panicking worker must not hide the problems recorded so far
        self.problems.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProblemGroup {
    pub location: String,
    pub trace: PropertyTrace,
    pub message: StructuredMessage,
    pub rendered: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProblemsReport {
    pub total: usize,
    pub tolerance: Tolerance,
    pub failed: bool,
    pub groups: Vec<ProblemGroup>,
}

impl ProblemsReport {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn unique(&self) -> usize {
        self.groups.len()
    }

    /// Human-readable summary, one line per distinct problem
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = format!(
            "{} {} found with the configuration cache, {} of which {} unique.\n",
            self.total,
            if self.total == 1 { "problem was" } else { "problems were" },
            self.unique(),
            if self.unique() == 1 { "seems" } else { "seem" },
        );

        for group in &self.groups {
            out.push_str(&format!("- {}: {}", group.location, group.rendered));
            if group.count > 1 {
                out.push_str(&format!(" ({} occurrences)", group.count));
            }
            out.push('\n');
        }

        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create report directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn problem(path: &str, text: &str) -> PropertyProblem {
        PropertyProblem::new(
            PropertyTrace::WorkItem {
                type_name: "DefaultTask".to_string(),
                path: path.to_string(),
            },
            StructuredMessage::text(text),
        )
    }

    #[test]
    fn test_report_groups_and_counts() {
        let collector = ProblemsCollector::new(Tolerance::Warn);
        collector.on_problem(problem(":b", "boom"));
        collector.on_problem(problem(":a", "boom"));
        collector.on_problem(problem(":b", "boom"));
        collector.on_problem(PropertyProblem::new(
            PropertyTrace::Unknown,
            StructuredMessage::text("boom"),
        ));

        let report = collector.report();
        assert_eq!(report.total, 4);
        assert_eq!(report.unique(), 3);

        let counts: Vec<(&str, usize)> = report
            .groups
            .iter()
            .map(|g| (g.location.as_str(), g.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("unknown location", 1),
                ("task `:a` of type `DefaultTask`", 1),
                ("task `:b` of type `DefaultTask`", 2),
            ]
        );
    }

    #[test]
    fn test_problems_keep_recording_order() {
        let collector = ProblemsCollector::new(Tolerance::Warn);
        collector.on_problem(problem(":z", "first"));
        collector.on_problem(problem(":a", "second"));

        let messages: Vec<String> = collector
            .problems()
            .iter()
            .map(|p| p.message.render())
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_should_fail_build() {
        let warn = ProblemsCollector::new(Tolerance::Warn);
        let fail = ProblemsCollector::new(Tolerance::Fail);
        assert!(!warn.should_fail_build());
        assert!(!fail.should_fail_build());

        warn.on_problem(problem(":a", "boom"));
        fail.on_problem(problem(":a", "boom"));
        assert!(!warn.should_fail_build());
        assert!(fail.should_fail_build());
        assert!(fail.report().failed);
    }

    #[test]
    fn test_render() {
        let collector = ProblemsCollector::new(Tolerance::Warn);
        assert_eq!(collector.report().render(), "");

        collector.on_problem(problem(":a", "boom"));
        collector.on_problem(problem(":a", "boom"));

        let text = collector.report().render();
        assert!(text.starts_with("2 problems were found with the configuration cache, 1 of which seems unique."));
        assert!(text.contains("- task `:a` of type `DefaultTask`: boom (2 occurrences)"));
    }

    #[test]
    fn test_cause_is_reported() {
        let collector = ProblemsCollector::new(Tolerance::Warn);
        collector.on_problem(
            problem(":a", "boom").with_cause(InvalidUserCode("Invocation failed".to_string())),
        );

        let report = collector.report();
        assert_eq!(report.groups[0].cause.as_deref(), Some("Invocation failed"));
    }

    #[test]
    fn test_concurrent_appends() {
        let collector = Arc::new(ProblemsCollector::new(Tolerance::Warn));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        collector.on_problem(problem(&format!(":t{}", t % 4), "boom"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let report = collector.report();
        assert_eq!(report.total, 400);
        assert_eq!(report.unique(), 4);
        assert!(report.groups.iter().all(|g| g.count == 100));
    }

    #[test]
    fn test_write_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reports/problems.json");

        let collector = ProblemsCollector::new(Tolerance::Fail);
        collector.on_problem(problem(":a", "boom"));
        collector.report().write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["tolerance"], "fail");
        assert_eq!(json["failed"], true);
        assert_eq!(json["groups"][0]["trace"]["kind"], "work_item");
        assert_eq!(json["groups"][0]["trace"]["path"], ":a");
    }
}
