//! Error types for the `accrual-tasks` crate.

use accrual_ledger::LedgerError;
use accrual_types::{ErrorKind, TaskId, TaskStatus};

/// Errors returned by task lifecycle operations.
///
/// Every variant is produced before any state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task id is empty or whitespace.
    #[error("task id must not be blank")]
    InvalidId,

    /// A task definition failed validation at registration.
    #[error("invalid task definition {id}: {reason}")]
    InvalidDefinition {
        /// The offending task.
        id: TaskId,
        /// Explanation of what is wrong.
        reason: String,
    },

    /// A task with this id is already registered.
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),

    /// No task with this id is registered.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Another task is already in progress.
    #[error("cannot start {requested}: task {active} is already in progress")]
    TaskBusy {
        /// The task the caller tried to start.
        requested: TaskId,
        /// The task currently in progress.
        active: TaskId,
    },

    /// The task is not in the `AVAILABLE` state.
    #[error("task {id} is not available (status {status})")]
    TaskNotAvailable {
        /// The task.
        id: TaskId,
        /// Its current status.
        status: TaskStatus,
    },

    /// The ledger cannot pay the task's cost.
    #[error("insufficient resources to start {0}")]
    InsufficientResources(TaskId),

    /// One or more requirements evaluated false.
    #[error("requirements not met for {id} ({unmet} unmet)")]
    RequirementsNotMet {
        /// The task.
        id: TaskId,
        /// Number of requirements that evaluated false.
        unmet: usize,
    },

    /// The operation is not valid from the task's current status.
    #[error("cannot {operation} task {id} from status {status}")]
    InvalidTransition {
        /// The task.
        id: TaskId,
        /// The attempted operation.
        operation: &'static str,
        /// The task's current status.
        status: TaskStatus,
    },

    /// Restored runtime state violates a registry invariant.
    #[error("inconsistent task state: {reason}")]
    InconsistentState {
        /// Explanation of the inconsistency.
        reason: String,
    },

    /// A ledger operation failed.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },
}

impl TaskError {
    /// Category of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId | Self::InvalidDefinition { .. } | Self::DuplicateTask(_) => {
                ErrorKind::Validation
            }
            Self::TaskNotFound(_) => ErrorKind::NotFound,
            Self::TaskBusy { .. }
            | Self::TaskNotAvailable { .. }
            | Self::InsufficientResources(_)
            | Self::RequirementsNotMet { .. }
            | Self::InvalidTransition { .. }
            | Self::InconsistentState { .. } => ErrorKind::State,
            Self::Ledger { source } => source.kind(),
        }
    }
}
