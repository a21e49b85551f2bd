//! Structured logging utilities for planstore
//!
//! All logs use structured fields for easy parsing and analysis.
//!
//! # Log Format Conventions
//!
//! - `operation`: The operation being performed (e.g., "cache.check", "snapshot.write")
//! - `status`: The result status ("hit", "miss", "success", "failed")
//! - `cache_key`: Store key of the plan ("plan-0123456789abcdef")
//! - `fingerprint`: Shortened input fingerprint
//! - `item`: Work item path
//!
//! # Examples
//!
//! ```rust
//! use planstore::logging::{operations, status};
//! use tracing::info;
//!
//! info!(
//!     operation = operations::CACHE_CHECK,
//!     status = status::HIT,
//!     cache_key = "plan-0123456789abcdef",
//!     "Reusing configuration cache"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Shows "planstore" instead of the full module path
struct PlanStoreFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for PlanStoreFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(
                writer,
                "{}{:5}(planstore)\x1b[0m: ",
                level_style,
                meta.level()
            )?;
        } else {
            write!(writer, "{:5}(planstore): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI/production)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse from environment variable (PLANSTORE_LOG_FORMAT)
    pub fn from_env() -> Self {
        let value = std::env::var("PLANSTORE_LOG_FORMAT").unwrap_or_default();
        Self::parse(&value).unwrap_or_else(|| {
            // Default: pretty for dev, compact for CI
            if std::env::var("CI").is_ok() {
                Self::Compact
            } else {
                Self::Pretty
            }
        })
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Initialize the global tracing subscriber from the environment
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn")
/// - `PLANSTORE_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
pub fn init() {
    init_with("info", None);
}

/// Like [`init`], with defaults from the config file. `RUST_LOG` and
/// `PLANSTORE_LOG_FORMAT` still win.
pub fn init_with(default_level: &str, default_format: Option<LogFormat>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = match std::env::var("PLANSTORE_LOG_FORMAT") {
        Ok(value) if LogFormat::parse(&value).is_some() => LogFormat::from_env(),
        _ => default_format.unwrap_or_else(LogFormat::from_env),
    };

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(PlanStoreFormatter { with_ansi: true })
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(PlanStoreFormatter { with_ansi: false })
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(false)
                        .with_writer(io::stderr)
                        .json(),
                )
                .init();
        }
    }
}

/// Standard field names for consistent logging
#[allow(dead_code)]
pub mod fields {
    /// Operation name (e.g., "cache.check", "snapshot.write")
    pub const OPERATION: &str = "operation";
    /// Status (e.g., "hit", "miss", "success")
    pub const STATUS: &str = "status";
    /// Store key of the plan
    pub const CACHE_KEY: &str = "cache_key";
    /// Shortened input fingerprint
    pub const FINGERPRINT: &str = "fingerprint";
    /// Work item path
    pub const ITEM: &str = "item";
    /// Size in bytes
    pub const SIZE_BYTES: &str = "size_bytes";
    /// Why the cache could not be reused
    pub const REASON: &str = "reason";
}

/// Operation names for consistent logging
pub mod operations {
    pub const CACHE_CHECK: &str = "cache.check";
    pub const CONFIGURE: &str = "configure";
    pub const SNAPSHOT_ENCODE: &str = "snapshot.encode";
    pub const SNAPSHOT_WRITE: &str = "snapshot.write";
    pub const SNAPSHOT_READ: &str = "snapshot.read";
    pub const STORE_PUT: &str = "store.put";
    pub const STORE_REMOVE: &str = "store.remove";
    pub const EXECUTE: &str = "execute";
    pub const EXECUTE_ITEM: &str = "execute.item";
    pub const PROBLEMS_RECORD: &str = "problems.record";
    pub const REPORT: &str = "report";
}

/// Status values for consistent logging
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const FAILED: &str = "failed";
    pub const SKIPPED: &str = "skipped";
    pub const ERROR: &str = "error";
}
