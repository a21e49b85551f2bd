//! Configuration cache problems
//!
//! Diagnostics raised when build logic uses configuration-only capabilities
//! at execution time:
//!
//! - [`StructuredMessage`]: rich text with typed references
//! - [`PropertyTrace`]: where a problem originated
//! - [`ProblemsCollector`]: per-build aggregation and reporting
//! - [`CapabilityAccessMonitor`]: turns capability accesses into problems

mod collector;
mod listener;
mod message;
mod trace;

pub use collector::{
    InvalidUserCode, ProblemGroup, ProblemsCollector, ProblemsReport, PropertyProblem, Tolerance,
};
pub use listener::{ArmedGuard, CapabilityAccessMonitor};
pub use message::{Fragment, MessageBuilder, StructuredMessage};
pub use trace::{PropertyTrace, TraceSource};
