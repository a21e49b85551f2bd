// Library interface for Planstore
// This allows integration tests and external code to use Planstore's modules

pub mod cli;
pub mod cli_utils;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod controller;
pub mod execution;
pub mod fingerprint;
pub mod graph;
pub mod logging;
pub mod manifest;
pub mod problems;
pub mod snapshot;
pub mod start_parameter;
pub mod storage;

// Re-export commonly used types
pub use config::PlanStoreConfig;
pub use config_discovery::{discover_config, load_config_with_discovery};
pub use controller::{
    BuildOutcome, CacheController, CacheOutcome, CacheState, Configurator, Executor, MissReason,
};
pub use execution::{ExecutionContext, ExecutionSummary, WorkerPool};
pub use fingerprint::{CacheKey, Fingerprint, FingerprintInputs};
pub use graph::{CapturedValue, Graph, GraphError, WorkItem, WorkItemPath};
pub use manifest::PlanManifest;
pub use problems::{CapabilityAccessMonitor, ProblemsCollector, ProblemsReport, Tolerance};
pub use snapshot::{DecodeError, GraphSnapshotReader, GraphSnapshotWriter, WriteError};
pub use start_parameter::StartParameter;
pub use storage::{default_cache_dir, PlanStore};
