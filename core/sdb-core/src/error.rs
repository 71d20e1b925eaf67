//! Error types for sdb-core operations.

use std::path::PathBuf;

/// All errors that can abort a single monitoring invocation.
///
/// None of these are recovered locally. They propagate to the binary, which
/// logs them and exits non-zero; the next scheduled poll is the retry.
#[derive(Debug, thiserror::Error)]
pub enum SdbError {
    // ─────────────────────────────────────────────────────────────────────
    // Dispatch Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Missing argument for {operation}: {argument}")]
    MissingArgument {
        operation: String,
        argument: &'static str,
    },

    #[error("Instance not found in configuration: {0}")]
    UnknownInstance(String),

    // ─────────────────────────────────────────────────────────────────────
    // Aggregation Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Malformed timestamp {value:?}: {source}")]
    MalformedTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Cannot take the 95th percentile of an empty {metric} sample")]
    OutOfRange { metric: &'static str },

    #[error("Invalid snapshot record: {context}: {details}")]
    InvalidRecord { context: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Upstream Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Snapshot fetch failed: {context}: {details}")]
    UpstreamFetch { context: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file not found (searched: {0})")]
    ConfigNotFound(String),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Cache and I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("No cached report: {0}")]
    CacheMiss(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using SdbError.
pub type Result<T> = std::result::Result<T, SdbError>;
