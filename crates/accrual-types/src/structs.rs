//! Core records of the Accrual simulation.
//!
//! Covers the data-defined [`Resource`] and [`TaskDefinition`] records, the
//! mutable [`TaskRuntime`] state, the ephemeral [`TickSample`], and the flat
//! snapshot types handed to persistence and rendering collaborators.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::TaskStatus;
use crate::ids::{ResourceId, StructureId, TaskId};
use crate::requirement::Requirement;

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A named resource held by the ledger.
///
/// Invariant: `0 <= amount <= max_amount` after every accrual and every
/// applied delta. `max_amount = None` means unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Resource {
    /// Unique identifier.
    pub id: ResourceId,
    /// Human-readable name.
    pub name: String,
    /// Current amount.
    #[serde(default)]
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Signed accrual rate per simulated second.
    #[serde(default)]
    #[ts(as = "String")]
    pub per_second: Decimal,
    /// Upper bound, if any.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub max_amount: Option<Decimal>,
    /// Whether the resource is visible and spendable.
    #[serde(default = "default_true")]
    pub unlocked: bool,
    /// Free-form grouping used by the renderer.
    #[serde(default)]
    pub category: String,
}

/// Persisted state of one resource (the parts that change during a session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourceSnapshot {
    /// Current amount.
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Signed accrual rate per simulated second.
    #[ts(as = "String")]
    pub per_second: Decimal,
    /// Upper bound, if any.
    #[ts(as = "Option<String>")]
    pub max_amount: Option<Decimal>,
    /// Whether the resource is unlocked.
    pub unlocked: bool,
}

impl From<&Resource> for ResourceSnapshot {
    fn from(resource: &Resource) -> Self {
        Self {
            amount: resource.amount,
            per_second: resource.per_second,
            max_amount: resource.max_amount,
            unlocked: resource.unlocked,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Static, data-defined description of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskDefinition {
    /// Unique identifier.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Free-form grouping used by the renderer.
    #[serde(default)]
    pub category: String,
    /// Flavor text shown by the renderer.
    #[serde(default)]
    pub description: String,
    /// Wall-clock duration of one run, in seconds.
    #[ts(as = "String")]
    pub duration_seconds: Decimal,
    /// Resources deducted when the task starts.
    #[serde(default)]
    #[ts(as = "BTreeMap<ResourceId, String>")]
    pub cost: BTreeMap<ResourceId, Decimal>,
    /// Resources granted when the task completes.
    #[serde(default)]
    #[ts(as = "BTreeMap<ResourceId, String>")]
    pub rewards: BTreeMap<ResourceId, Decimal>,
    /// Ordered predicates that must all hold to unlock the task.
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// Whether the task can run more than once.
    #[serde(default)]
    pub repeatable: bool,
    /// Delay before a completed repeatable task is reset for reuse.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub cooldown_seconds: Option<Decimal>,
    /// Start `AVAILABLE` instead of `LOCKED`.
    #[serde(default)]
    pub unlocked: bool,
}

/// Mutable runtime state of a task.
///
/// Invariant: `start_time` and `end_time` are `Some` if and only if
/// `status == InProgress`, and `end_time - start_time` equals the task
/// duration in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskRuntime {
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Progress percentage in `[0, 100]`.
    #[ts(as = "String")]
    pub progress: Decimal,
    /// Wall-clock start, epoch milliseconds.
    #[ts(type = "number | null")]
    pub start_time: Option<i64>,
    /// Wall-clock end, epoch milliseconds.
    #[ts(type = "number | null")]
    pub end_time: Option<i64>,
    /// How many times the task has completed.
    pub completion_count: u32,
    /// When the pending cooldown reset is due, epoch milliseconds.
    #[serde(default)]
    #[ts(type = "number | null")]
    pub reset_due_at: Option<i64>,
}

impl TaskRuntime {
    /// Fresh runtime state with the given initial status.
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Read-only progress view of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskProgress {
    /// The task.
    pub task_id: TaskId,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Progress percentage in `[0, 100]`.
    #[ts(as = "String")]
    pub progress: Decimal,
    /// Seconds until completion; zero unless the task is in progress.
    #[ts(as = "String")]
    pub time_remaining_seconds: Decimal,
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One scheduler iteration. Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickSample {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Real seconds since the previous tick, after stale-delta clamping.
    #[ts(as = "String")]
    pub real_delta_seconds: Decimal,
    /// `real_delta_seconds * time_scale`.
    #[ts(as = "String")]
    pub simulated_delta_seconds: Decimal,
    /// Wall-clock time of the sample, epoch milliseconds.
    #[ts(type = "number")]
    pub now_ms: i64,
}

// ---------------------------------------------------------------------------
// Progression and snapshots
// ---------------------------------------------------------------------------

/// Progression state written by external collaborators and read by
/// requirement evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Progression {
    /// Global game stage.
    #[serde(default)]
    pub game_stage: u32,
    /// Level of each known structure.
    #[serde(default)]
    pub structure_levels: BTreeMap<StructureId, u32>,
}

/// Full state export consumed by persistence and rendering.
///
/// Flat maps keyed by id. Amounts are exact decimals, timestamps are epoch
/// milliseconds, so a JSON round trip is lossless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationSnapshot {
    /// Wall-clock time the snapshot was taken, epoch milliseconds.
    #[ts(type = "number")]
    pub taken_at_ms: i64,
    /// Number of ticks run when the snapshot was taken.
    pub tick: u64,
    /// Resource state keyed by id.
    pub resources: BTreeMap<ResourceId, ResourceSnapshot>,
    /// Task runtime state keyed by id.
    pub tasks: BTreeMap<TaskId, TaskRuntime>,
    /// The single in-progress task, if any.
    pub active_task: Option<TaskId>,
    /// Collaborator-owned progression state.
    #[serde(default)]
    pub progression: Progression,
}

const fn default_true() -> bool {
    true
}
