//! Snapshot serialization for the persistence collaborator.
//!
//! A [`SimulationSnapshot`] is a flat map of resource and task state keyed
//! by id. Decimals serialize as strings and timestamps as epoch
//! milliseconds, so `from_json(to_json(s)) == s`.

use accrual_tasks::TaskError;
use accrual_types::{ErrorKind, ResourceId, SimulationSnapshot, TaskId};

/// Errors that can occur when encoding, decoding or restoring a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot is not valid JSON for this schema.
    #[error("snapshot JSON error: {source}")]
    Json {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// The snapshot breaks a task invariant, for example two tasks in
    /// progress.
    #[error("inconsistent snapshot: {reason}")]
    Inconsistent {
        /// Explanation of the inconsistency.
        reason: String,
    },

    /// The registry rejected the snapshot for another reason.
    #[error("task error: {source}")]
    Task {
        /// The underlying task error.
        source: TaskError,
    },
}

impl From<TaskError> for SnapshotError {
    fn from(source: TaskError) -> Self {
        match source {
            TaskError::InconsistentState { reason } => Self::Inconsistent { reason },
            other => Self::Task { source: other },
        }
    }
}

impl SnapshotError {
    /// Category of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Json { .. } => ErrorKind::Validation,
            Self::Inconsistent { .. } => ErrorKind::State,
            Self::Task { source } => source.kind(),
        }
    }
}

/// Ids in a restored snapshot that the simulation does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Skipped resource entries.
    pub unknown_resources: Vec<ResourceId>,
    /// Skipped task entries.
    pub unknown_tasks: Vec<TaskId>,
}

impl RestoreReport {
    /// Whether every entry was applied.
    pub fn is_complete(&self) -> bool {
        self.unknown_resources.is_empty() && self.unknown_tasks.is_empty()
    }
}

/// Encode a snapshot as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`SnapshotError::Json`] if serialization fails.
pub fn to_json(snapshot: &SimulationSnapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Decode a snapshot from JSON.
///
/// # Errors
///
/// Returns [`SnapshotError::Json`] if the input does not match the schema.
pub fn from_json(json: &str) -> Result<SimulationSnapshot, SnapshotError> {
    Ok(serde_json::from_str(json)?)
}
