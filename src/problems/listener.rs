/// Execution-time capability access monitoring
///
/// Some operations are only meaningful while the plan is being configured:
/// reading a work item's live dependency set, touching project state,
/// registering build-scoped listeners. When the plan is served from the
/// cache those operations observe a frozen graph, so the execution engine
/// reports them here. The monitor only records; the calling code proceeds
/// unchanged.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::collector::{InvalidUserCode, ProblemsCollector, PropertyProblem};
use super::message::StructuredMessage;
use super::trace::TraceSource;
use crate::start_parameter::StartParameter;

#[derive(Debug)]
pub struct CapabilityAccessMonitor {
    enabled: bool,
    armed: AtomicBool,
    problems: Arc<ProblemsCollector>,
}

impl CapabilityAccessMonitor {
    pub fn new(start_parameter: &StartParameter, problems: Arc<ProblemsCollector>) -> Self {
        Self {
            enabled: start_parameter.enabled,
            armed: AtomicBool::new(false),
            problems,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Arm the monitor for the execution phase; disarmed when the guard drops
    pub fn arm(&self) -> ArmedGuard<'_> {
        self.armed.store(true, Ordering::Release);
        ArmedGuard { monitor: self }
    }

    pub fn problems(&self) -> &Arc<ProblemsCollector> {
        &self.problems
    }

    /// A work item's live dependency set was read by identity
    pub fn on_dependency_graph_access(&self, invocation: &str, source: TraceSource<'_>) {
        self.on_execution_time_access(invocation, source);
    }

    /// Project-scope state was touched
    pub fn on_project_access(&self, invocation: &str, source: TraceSource<'_>) {
        self.on_execution_time_access(invocation, source);
    }

    /// A build-scoped listener was registered. Trusted (framework-internal)
    /// listeners are exempt.
    pub fn on_listener_registration(
        &self,
        listener: &dyn fmt::Display,
        invocation: &str,
        source: TraceSource<'_>,
        trusted: bool,
    ) {
        if !self.should_report() || trusted {
            return;
        }

        let cause = InvalidUserCode(format!(
            "Listener registration '{}' by {} is unsupported.",
            invocation, source
        ));
        let listener = listener.to_string();
        let message = StructuredMessage::build(|b| {
            b.text("registration of listener ")
                .reference(listener)
                .text(" on ")
                .reference(invocation)
                .text(" is unsupported");
        });

        self.problems
            .on_problem(PropertyProblem::new(source.trace(), message).with_cause(cause));
    }

    fn on_execution_time_access(&self, invocation: &str, source: TraceSource<'_>) {
        if !self.should_report() {
            return;
        }

        let cause = InvalidUserCode(format!(
            "Invocation of '{}' by {} at execution time is unsupported.",
            invocation, source
        ));

        self.problems.on_problem(
            PropertyProblem::new(source.trace(), execution_time_access_message(invocation))
                .with_cause(cause),
        );
    }

    fn should_report(&self) -> bool {
        self.enabled && self.is_armed()
    }
}

fn execution_time_access_message(invocation: &str) -> StructuredMessage {
    StructuredMessage::build(|b| {
        b.text("invocation of ")
            .reference(invocation)
            .text(" at execution time is unsupported.");
    })
}

/// Keeps the monitor armed while alive
#[must_use = "the monitor is disarmed as soon as the guard is dropped"]
pub struct ArmedGuard<'a> {
    monitor: &'a CapabilityAccessMonitor,
}

impl Drop for ArmedGuard<'_> {
    fn drop(&mut self) {
        self.monitor.armed.store(false, Ordering::Release);
    }
}
