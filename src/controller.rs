/// Configuration cache controller
///
/// Decides per build whether the stored plan can be reused (HIT) or the build
/// has to be configured from its scripts again (MISS), then executes the plan
/// with the capability monitor armed and reports what the monitor saw.
///
/// ```text
/// Idle -> Warm -> Restoring -> Executing -> Reporting -> Idle
///    \                 \
///     -> Cold <---------+
///          \
///           -> Configuring -> Writing -> Executing
/// ```
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::execution::ExecutionSummary;
use crate::fingerprint::{CacheKey, Fingerprint, FingerprintInputs};
use crate::graph::{Graph, WorkItemPath};
use crate::logging::{operations, status};
use crate::problems::{CapabilityAccessMonitor, ProblemsCollector, ProblemsReport};
use crate::snapshot::{GraphSnapshotReader, GraphSnapshotWriter, StoreHandle, FORMAT_VERSION};
use crate::start_parameter::StartParameter;
use crate::storage::PlanStore;

/// Builds the work item graph from the user's build scripts
pub trait Configurator {
    /// Everything graph construction depends on. Must be cheap compared to
    /// `configure`; it runs on every build.
    fn fingerprint_inputs(&self, start_parameter: &StartParameter) -> Result<FingerprintInputs>;

    fn configure(&self, start_parameter: &StartParameter) -> Result<Graph>;
}

/// Runs a configured or restored graph
pub trait Executor {
    fn execute(&self, graph: &Graph, monitor: &CapabilityAccessMonitor)
        -> Result<ExecutionSummary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Idle,
    Cold,
    Warm,
    Configuring,
    Writing,
    Restoring,
    Executing,
    Reporting,
}

impl CacheState {
    pub fn can_transition_to(self, next: CacheState) -> bool {
        use CacheState::*;
        matches!(
            (self, next),
            (Idle, Cold)
                | (Idle, Warm)
                | (Warm, Restoring)
                | (Restoring, Executing)
                | (Restoring, Cold)
                | (Cold, Configuring)
                | (Configuring, Writing)
                | (Configuring, Executing)
                | (Writing, Executing)
                | (Executing, Reporting)
                | (Reporting, Idle)
        )
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Configuring => "configuring",
            Self::Writing => "writing",
            Self::Restoring => "restoring",
            Self::Executing => "executing",
            Self::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

/// Why the stored plan was not used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    Disabled,
    NoEntry,
    Refreshed,
    FingerprintChanged,
    FingerprintUnavailable(String),
    Unusable(String),
    StoreUnavailable(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "configuration cache is disabled"),
            Self::NoEntry => write!(f, "no configuration cache entry for this build"),
            Self::Refreshed => write!(f, "configuration cache entry discarded on request"),
            Self::FingerprintChanged => write!(f, "build inputs have changed"),
            Self::FingerprintUnavailable(e) => {
                write!(f, "build inputs could not be fingerprinted: {}", e)
            }
            Self::Unusable(e) => write!(f, "configuration cache entry is unusable: {}", e),
            Self::StoreUnavailable(e) => write!(f, "plan store is unavailable: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss(MissReason),
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss(_) => write!(f, "MISS"),
        }
    }
}

/// What a build would do, without configuring or executing anything
#[derive(Debug, Clone)]
pub struct Probe {
    pub key: CacheKey,
    pub fingerprint: Option<Fingerprint>,
    pub stored_fingerprint: Option<Fingerprint>,
    pub outcome: CacheOutcome,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub key: CacheKey,
    pub cache: CacheOutcome,
    /// Entry written by this build (cold builds with the cache enabled)
    pub stored: Option<StoreHandle>,
    pub execution: Result<ExecutionSummary>,
    pub report: ProblemsReport,
}

impl BuildOutcome {
    /// Execution succeeded and the problems tolerance was not exceeded
    pub fn success(&self) -> bool {
        self.execution.is_ok() && !self.report.failed
    }

    pub fn summary(&self) -> Option<&ExecutionSummary> {
        self.execution.as_ref().ok()
    }
}

/// Result of looking up the store for the current fingerprint
enum Lookup {
    Restored(Graph),
    Cold(MissReason),
}

pub struct CacheController {
    start_parameter: StartParameter,
    /// Error text when the store could not be opened; builds still run
    store: Result<PlanStore, String>,
    project_dir: PathBuf,
    key: CacheKey,
    refresh: bool,
    state: CacheState,
    history: Vec<CacheState>,
}

impl CacheController {
    pub fn new(
        start_parameter: StartParameter,
        store: PlanStore,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_store(start_parameter, Ok(store), project_dir)
    }

    /// Controller for a build whose plan store could not be opened. Every
    /// build configures and nothing is persisted.
    pub fn without_store(
        start_parameter: StartParameter,
        reason: impl Into<String>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_store(start_parameter, Err(reason.into()), project_dir)
    }

    fn with_store(
        start_parameter: StartParameter,
        store: Result<PlanStore, String>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        let project_dir = project_dir.into();
        let key = CacheKey::compute(&project_dir, &start_parameter);

        Self {
            start_parameter,
            store,
            project_dir,
            key,
            refresh: false,
            state: CacheState::Idle,
            history: vec![CacheState::Idle],
        }
    }

    /// Discard this build's entry before looking it up
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn start_parameter(&self) -> &StartParameter {
        &self.start_parameter
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// States visited by the last build, starting at `Idle`
    pub fn history(&self) -> &[CacheState] {
        &self.history
    }

    fn transition(&mut self, next: CacheState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid cache state transition {} -> {}",
            self.state,
            next
        );
        debug!(cache_key = %self.key, from = %self.state, to = %next, "Cache state transition");
        self.state = next;
        self.history.push(next);
    }

    fn fingerprint<C: Configurator + ?Sized>(&self, configurator: &C) -> Result<Fingerprint> {
        let inputs = configurator
            .fingerprint_inputs(&self.start_parameter)?
            .value("planstore.format_version", FORMAT_VERSION.to_string())
            .value("planstore.requested", join_paths(&self.start_parameter.requested))
            .value("planstore.excluded", join_paths(&self.start_parameter.excluded));

        Fingerprint::compute(&inputs)
    }

    /// Compare the current fingerprint with the stored one; restore on match
    fn lookup(&mut self, store: &PlanStore, fingerprint: &Fingerprint) -> Lookup {
        let reader = GraphSnapshotReader::new(store);

        let stored = match reader.stored_fingerprint(&self.key) {
            Ok(stored) => stored,
            Err(e) if e.is_missing() => return Lookup::Cold(MissReason::NoEntry),
            Err(e) => return Lookup::Cold(MissReason::Unusable(e.to_string())),
        };

        if stored != *fingerprint {
            debug!(
                cache_key = %self.key,
                stored = stored.short(),
                current = fingerprint.short(),
                "Fingerprint changed"
            );
            return Lookup::Cold(MissReason::FingerprintChanged);
        }

        self.transition(CacheState::Warm);
        self.transition(CacheState::Restoring);

        match reader.read(&self.key) {
            Ok((graph, _)) => Lookup::Restored(graph),
            Err(e) => {
                warn!(
                    operation = operations::SNAPSHOT_READ,
                    cache_key = %self.key,
                    status = status::ERROR,
                    "Discarding configuration cache entry: {}",
                    e
                );
                Lookup::Cold(MissReason::Unusable(e.to_string()))
            }
        }
    }

    fn configure<C: Configurator + ?Sized>(&mut self, configurator: &C) -> Result<Graph> {
        self.transition(CacheState::Configuring);
        info!(operation = operations::CONFIGURE, cache_key = %self.key, "Configuring build");

        let graph = configurator
            .configure(&self.start_parameter)
            .context("Failed to configure build")?;
        graph.validate().context("Configured graph is invalid")?;

        Ok(graph)
    }

    /// Enabled cache with a usable store: restore on a fingerprint match,
    /// otherwise configure and write a new entry
    fn restore_or_configure<C: Configurator + ?Sized>(
        &mut self,
        store: &PlanStore,
        configurator: &C,
    ) -> Result<(Graph, CacheOutcome, Option<StoreHandle>)> {
        if self.refresh {
            match store.remove(&self.key) {
                Ok(true) => info!(cache_key = %self.key, "Discarded configuration cache entry"),
                Ok(false) => {}
                Err(e) => warn!(
                    operation = operations::STORE_REMOVE,
                    cache_key = %self.key,
                    status = status::ERROR,
                    "Failed to discard configuration cache entry: {}",
                    e
                ),
            }
        }

        let fingerprint = match self.fingerprint(configurator) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                // Without a fingerprint nothing can be validated later,
                // so the configured graph is not stored either
                warn!(
                    operation = operations::CACHE_CHECK,
                    cache_key = %self.key,
                    status = status::MISS,
                    "Cannot fingerprint build inputs: {:#}",
                    e
                );
                self.transition(CacheState::Cold);
                let graph = self.configure(configurator)?;
                let reason = MissReason::FingerprintUnavailable(format!("{:#}", e));
                return Ok((graph, CacheOutcome::Miss(reason), None));
            }
        };

        let lookup = if self.refresh {
            Lookup::Cold(MissReason::Refreshed)
        } else {
            self.lookup(store, &fingerprint)
        };

        let reason = match lookup {
            Lookup::Restored(graph) => {
                info!(
                    operation = operations::CACHE_CHECK,
                    cache_key = %self.key,
                    fingerprint = fingerprint.short(),
                    status = status::HIT,
                    "Reusing configuration cache"
                );
                return Ok((graph, CacheOutcome::Hit, None));
            }
            Lookup::Cold(reason) => reason,
        };

        info!(
            operation = operations::CACHE_CHECK,
            cache_key = %self.key,
            fingerprint = fingerprint.short(),
            status = status::MISS,
            reason = %reason,
            "Configuration cache miss: {}",
            reason
        );
        self.transition(CacheState::Cold);
        let graph = self.configure(configurator)?;

        self.transition(CacheState::Writing);
        let stored = match GraphSnapshotWriter::new(store, &self.key).write(&graph, &fingerprint) {
            Ok(handle) => Some(handle),
            // The in-memory graph still executes
            Err(e) if e.is_store_failure() => {
                warn!(
                    operation = operations::SNAPSHOT_WRITE,
                    cache_key = %self.key,
                    status = status::ERROR,
                    "{:#}",
                    anyhow::Error::from(e)
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok((graph, CacheOutcome::Miss(reason), stored))
    }

    /// Decide HIT or MISS without configuring or executing
    pub fn probe<C: Configurator + ?Sized>(&self, configurator: &C) -> Probe {
        let miss = |reason, fingerprint, stored_fingerprint| Probe {
            key: self.key.clone(),
            fingerprint,
            stored_fingerprint,
            outcome: CacheOutcome::Miss(reason),
        };

        if !self.start_parameter.enabled {
            return miss(MissReason::Disabled, None, None);
        }
        let store = match &self.store {
            Ok(store) => store,
            Err(reason) => {
                return miss(MissReason::StoreUnavailable(reason.clone()), None, None)
            }
        };
        if self.refresh {
            return miss(MissReason::Refreshed, None, None);
        }

        let fingerprint = match self.fingerprint(configurator) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                let reason = MissReason::FingerprintUnavailable(format!("{:#}", e));
                return miss(reason, None, None);
            }
        };

        let reader = GraphSnapshotReader::new(store);
        let stored = match reader.stored_fingerprint(&self.key) {
            Ok(stored) => stored,
            Err(e) if e.is_missing() => return miss(MissReason::NoEntry, Some(fingerprint), None),
            Err(e) => {
                return miss(MissReason::Unusable(e.to_string()), Some(fingerprint), None)
            }
        };

        if stored != fingerprint {
            return miss(MissReason::FingerprintChanged, Some(fingerprint), Some(stored));
        }

        match reader.read(&self.key) {
            Ok(_) => Probe {
                key: self.key.clone(),
                fingerprint: Some(fingerprint),
                stored_fingerprint: Some(stored),
                outcome: CacheOutcome::Hit,
            },
            Err(e) => miss(MissReason::Unusable(e.to_string()), Some(fingerprint), Some(stored)),
        }
    }

    /// Run one build. Errors are fatal build errors (configuration failed,
    /// invalid graph, unsupported captured value); execution failures and
    /// capability problems are part of the outcome.
    pub fn run<C, E>(&mut self, configurator: &C, executor: &E) -> Result<BuildOutcome>
    where
        C: Configurator + ?Sized,
        E: Executor + ?Sized,
    {
        self.state = CacheState::Idle;
        self.history = vec![CacheState::Idle];

        let result = self.run_build(configurator, executor);
        if result.is_err() {
            self.state = CacheState::Idle;
        }
        result
    }

    fn run_build<C, E>(&mut self, configurator: &C, executor: &E) -> Result<BuildOutcome>
    where
        C: Configurator + ?Sized,
        E: Executor + ?Sized,
    {
        let problems = Arc::new(ProblemsCollector::new(self.start_parameter.tolerance));
        let monitor = CapabilityAccessMonitor::new(&self.start_parameter, Arc::clone(&problems));

        let (graph, cache, stored) = if !self.start_parameter.enabled {
            self.transition(CacheState::Cold);
            let graph = self.configure(configurator)?;
            (graph, CacheOutcome::Miss(MissReason::Disabled), None)
        } else {
            match self.store.clone() {
                Ok(store) => self.restore_or_configure(&store, configurator)?,
                Err(reason) => {
                    warn!(
                        operation = operations::CACHE_CHECK,
                        cache_key = %self.key,
                        status = status::MISS,
                        "Plan store unavailable, configuring without storing: {}",
                        reason
                    );
                    self.transition(CacheState::Cold);
                    let graph = self.configure(configurator)?;
                    (graph, CacheOutcome::Miss(MissReason::StoreUnavailable(reason)), None)
                }
            }
        };

        self.transition(CacheState::Executing);
        let execution = {
            let _armed = monitor.arm();
            executor.execute(&graph, &monitor)
        };

        self.transition(CacheState::Reporting);
        let report = problems.report();
        if report.is_empty() {
            debug!(operation = operations::REPORT, "No configuration cache problems");
        } else {
            warn!(
                operation = operations::REPORT,
                total = report.total,
                unique = report.unique(),
                failed = report.failed,
                "Configuration cache problems found"
            );
        }

        self.transition(CacheState::Idle);

        Ok(BuildOutcome {
            key: self.key.clone(),
            cache,
            stored,
            execution,
            report,
        })
    }
}

fn join_paths(paths: &[WorkItemPath]) -> String {
    paths
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
