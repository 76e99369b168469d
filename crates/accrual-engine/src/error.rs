//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and shutdown so
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: accrual_core::ConfigError,
    },

    /// The catalog could not be read or was rejected.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: accrual_core::CatalogError,
    },

    /// The scheduler rejected its configuration.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: accrual_core::SchedulerError,
    },

    /// The final snapshot could not be encoded.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The underlying snapshot error.
        #[from]
        source: accrual_core::SnapshotError,
    },

    /// Writing the snapshot failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
