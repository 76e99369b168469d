//! Task registry and lifecycle state machine.
//!
//! The [`TaskRegistry`] exclusively owns every [`Task`] and the id of the
//! single active task. The active task is held by id, never by reference, so
//! resetting or restoring the registry cannot leave it dangling.
//!
//! # Transitions
//!
//! | Operation | From | To |
//! |-----------|------|----|
//! | `unlock` | `LOCKED` | `AVAILABLE` |
//! | `start` | `AVAILABLE` | `IN_PROGRESS` |
//! | `advance` / `complete` | `IN_PROGRESS` | `COMPLETED`, or `AVAILABLE` if repeatable |
//! | `cancel` | `IN_PROGRESS` | `AVAILABLE` |
//! | `reset` | `COMPLETED` / `AVAILABLE` | `AVAILABLE` (progress cleared) |
//!
//! Task timing is anchored to wall-clock epoch milliseconds supplied by the
//! caller. It is never derived from accumulated simulation deltas, so a time
//! scale applied to resource accrual does not change how long a task takes.

use std::collections::BTreeMap;

use accrual_ledger::{ApplyReport, RepeatCapacity, ResourceLedger};
use accrual_types::{
    Progression, ResourceId, StructureId, TaskDefinition, TaskId, TaskProgress, TaskRuntime,
    TaskStatus,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};

use crate::effects::EffectPipeline;
use crate::error::TaskError;
use crate::requirement::{self, RequirementState};

/// Percentage at which a task is complete.
const FULL_PROGRESS: Decimal = Decimal::ONE_HUNDRED;

/// Decimal places kept on stored progress values.
const PROGRESS_SCALE: u32 = 4;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A task definition paired with its runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    definition: TaskDefinition,
    runtime: TaskRuntime,
    /// Cached `duration_seconds` in milliseconds.
    duration_ms: i64,
    /// Cached `cooldown_seconds` in milliseconds.
    cooldown_ms: Option<i64>,
}

impl Task {
    /// The task's identifier.
    pub const fn id(&self) -> &TaskId {
        &self.definition.id
    }

    /// The static definition.
    pub const fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    /// The runtime state.
    pub const fn runtime(&self) -> &TaskRuntime {
        &self.runtime
    }

    /// Current lifecycle status.
    pub const fn status(&self) -> TaskStatus {
        self.runtime.status
    }

    /// Wall-clock duration in milliseconds.
    pub const fn duration_ms(&self) -> i64 {
        self.duration_ms
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// The completed task.
    pub task_id: TaskId,
    /// Completion count after this completion.
    pub completion_count: u32,
    /// Status the task was left in.
    pub status: TaskStatus,
    /// Rewards applied by the effect pipeline.
    pub rewards: ApplyReport,
    /// When the deferred cooldown reset is due, if one was scheduled.
    pub reset_due_at: Option<i64>,
}

/// Result of advancing the active task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Still running, at this progress percentage.
    InProgress {
        /// Progress in `[0, 100)`.
        progress: Decimal,
    },
    /// Reached 100% and completed during this call.
    Completed(CompletionOutcome),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds task definitions and runtime state, and drives the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    /// Tasks in registration order.
    tasks: Vec<Task>,
    /// Position of each task in `tasks`.
    index: BTreeMap<TaskId, usize>,
    /// The single `IN_PROGRESS` task, if any.
    active: Option<TaskId>,
    /// Applies costs and rewards inside `start` and `complete`.
    effects: EffectPipeline,
}

/// Requirement view over the ledger, the progression state and the
/// registry's own completion counts.
struct EvaluationView<'a> {
    ledger: &'a ResourceLedger,
    progression: &'a Progression,
    registry: &'a TaskRegistry,
}

impl RequirementState for EvaluationView<'_> {
    fn resource_amount(&self, id: &ResourceId) -> Option<Decimal> {
        self.ledger.amount(id)
    }

    fn structure_level(&self, id: &StructureId) -> Option<u32> {
        self.progression.structure_levels.get(id).copied()
    }

    fn game_stage(&self) -> u32 {
        self.progression.game_stage
    }

    fn task_completion_count(&self, id: &TaskId) -> Option<u32> {
        self.registry
            .get(id)
            .map(|task| task.runtime.completion_count)
    }
}

impl TaskRegistry {
    /// Create an empty registry using the given effect pipeline.
    pub fn new(effects: EffectPipeline) -> Self {
        Self {
            tasks: Vec::new(),
            index: BTreeMap::new(),
            active: None,
            effects,
        }
    }

    /// Register a task definition.
    ///
    /// The task starts `AVAILABLE` if the definition sets `unlocked`, and
    /// `LOCKED` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::DuplicateTask`] for a taken id, or
    /// [`TaskError::InvalidId`] / [`TaskError::InvalidDefinition`] when the
    /// definition is malformed.
    pub fn register(&mut self, definition: TaskDefinition) -> Result<(), TaskError> {
        let (duration_ms, cooldown_ms) = validate_definition(&definition)?;
        if self.index.contains_key(&definition.id) {
            return Err(TaskError::DuplicateTask(definition.id));
        }
        let status = if definition.unlocked {
            TaskStatus::Available
        } else {
            TaskStatus::Locked
        };
        debug!(task_id = %definition.id, %status, "Task registered");
        self.index.insert(definition.id.clone(), self.tasks.len());
        self.tasks.push(Task {
            definition,
            runtime: TaskRuntime::with_status(status),
            duration_ms,
            cooldown_ms,
        });
        Ok(())
    }

    /// Return the number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Return whether no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).and_then(|&i| self.tasks.get(i))
    }

    /// Iterate over tasks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// The id of the task currently in progress.
    pub const fn active_task(&self) -> Option<&TaskId> {
        self.active.as_ref()
    }

    /// The effect pipeline and its journal.
    pub const fn effects(&self) -> &EffectPipeline {
        &self.effects
    }

    fn lookup(&self, id: &TaskId) -> Result<usize, TaskError> {
        if id.is_blank() {
            return Err(TaskError::InvalidId);
        }
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| TaskError::TaskNotFound(id.clone()))
    }

    fn task_mut(&mut self, idx: usize, id: &TaskId) -> Result<&mut Task, TaskError> {
        self.tasks
            .get_mut(idx)
            .ok_or_else(|| TaskError::TaskNotFound(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether the ledger can currently pay the task's cost. Unknown tasks
    /// are not affordable.
    pub fn can_afford(&self, id: &TaskId, ledger: &ResourceLedger) -> bool {
        self.get(id)
            .is_some_and(|task| ledger.can_afford(&task.definition.cost))
    }

    /// How many times the task's cost could be paid right now.
    pub fn max_affordable_runs(&self, id: &TaskId, ledger: &ResourceLedger) -> Option<RepeatCapacity> {
        self.get(id)
            .map(|task| ledger.max_repeatable_actions(&task.definition.cost))
    }

    /// Progress view of a task at wall-clock time `now_ms`.
    pub fn progress(&self, id: &TaskId, now_ms: i64) -> Option<TaskProgress> {
        let task = self.get(id)?;
        let time_remaining_seconds = match (task.runtime.status, task.runtime.end_time) {
            (TaskStatus::InProgress, Some(end)) => {
                Decimal::new(end.saturating_sub(now_ms).max(0), 3)
            }
            _ => Decimal::ZERO,
        };
        Some(TaskProgress {
            task_id: task.definition.id.clone(),
            status: task.runtime.status,
            progress: task.runtime.progress,
            time_remaining_seconds,
        })
    }

    /// Earliest pending cooldown reset, epoch milliseconds.
    pub fn next_reset_due(&self) -> Option<i64> {
        self.tasks.iter().filter_map(|t| t.runtime.reset_due_at).min()
    }

    // -----------------------------------------------------------------------
    // Unlocking
    // -----------------------------------------------------------------------

    /// Unlock a task whose requirements all hold.
    ///
    /// Returns `Ok(true)` if the task moved to `AVAILABLE`, and `Ok(false)`
    /// if it was already unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown id and
    /// [`TaskError::RequirementsNotMet`] if any requirement is false.
    pub fn unlock(
        &mut self,
        id: &TaskId,
        ledger: &ResourceLedger,
        progression: &Progression,
    ) -> Result<bool, TaskError> {
        let idx = self.lookup(id)?;
        let Some(task) = self.tasks.get(idx) else {
            return Err(TaskError::TaskNotFound(id.clone()));
        };
        if task.runtime.status != TaskStatus::Locked {
            return Ok(false);
        }

        let view = EvaluationView {
            ledger,
            progression,
            registry: self,
        };
        let unmet = requirement::count_unmet(&task.definition.requirements, &view);
        if unmet > 0 {
            debug!(task_id = %id, unmet, "Unlock rejected");
            return Err(TaskError::RequirementsNotMet {
                id: id.clone(),
                unmet,
            });
        }

        self.task_mut(idx, id)?.runtime.status = TaskStatus::Available;
        info!(task_id = %id, "Task unlocked");
        Ok(true)
    }

    /// Unlock every `LOCKED` task whose requirements hold.
    ///
    /// Tasks are evaluated in registration order against the state as it
    /// was at the start of the sweep. Returns the ids unlocked.
    pub fn check_all_requirements(
        &mut self,
        ledger: &ResourceLedger,
        progression: &Progression,
    ) -> Vec<TaskId> {
        let view = EvaluationView {
            ledger,
            progression,
            registry: self,
        };
        let eligible: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.runtime.status == TaskStatus::Locked)
            .filter(|(_, task)| requirement::all_satisfied(&task.definition.requirements, &view))
            .map(|(idx, _)| idx)
            .collect();

        let mut unlocked = Vec::with_capacity(eligible.len());
        for idx in eligible {
            if let Some(task) = self.tasks.get_mut(idx) {
                task.runtime.status = TaskStatus::Available;
                info!(task_id = %task.definition.id, "Task unlocked");
                unlocked.push(task.definition.id.clone());
            }
        }
        unlocked
    }

    // -----------------------------------------------------------------------
    // Start / advance / complete / cancel
    // -----------------------------------------------------------------------

    /// Start an available task, deducting its cost.
    ///
    /// # Errors
    ///
    /// [`TaskError::TaskNotFound`], [`TaskError::TaskBusy`],
    /// [`TaskError::TaskNotAvailable`] or
    /// [`TaskError::InsufficientResources`]. On error nothing is mutated.
    pub fn start(
        &mut self,
        id: &TaskId,
        ledger: &mut ResourceLedger,
        now_ms: i64,
    ) -> Result<(), TaskError> {
        let idx = self.lookup(id)?;
        if let Some(active) = self.active.as_ref().filter(|active| *active != id) {
            debug!(task_id = %id, active = %active, "Start rejected: busy");
            return Err(TaskError::TaskBusy {
                requested: id.clone(),
                active: active.clone(),
            });
        }
        let Some(task) = self.tasks.get(idx) else {
            return Err(TaskError::TaskNotFound(id.clone()));
        };
        if task.runtime.status != TaskStatus::Available {
            debug!(task_id = %id, status = %task.runtime.status, "Start rejected: not available");
            return Err(TaskError::TaskNotAvailable {
                id: id.clone(),
                status: task.runtime.status,
            });
        }
        if !ledger.can_afford(&task.definition.cost) {
            debug!(task_id = %id, "Start rejected: insufficient resources");
            return Err(TaskError::InsufficientResources(id.clone()));
        }
        let end_ms = now_ms.saturating_add(task.duration_ms);

        // Validation done; from here on the transition always succeeds.
        let definition = task.definition.clone();
        let report = self.effects.on_task_start(&definition, ledger, now_ms);
        if !report.is_clean() {
            warn!(task_id = %id, errors = report.errors.len(), "Cost applied with errors");
        }

        let task = self.task_mut(idx, id)?;
        task.runtime.status = TaskStatus::InProgress;
        task.runtime.progress = Decimal::ZERO;
        task.runtime.start_time = Some(now_ms);
        task.runtime.end_time = Some(end_ms);
        task.runtime.reset_due_at = None;
        self.active = Some(id.clone());

        info!(task_id = %id, start_ms = now_ms, end_ms, "Task started");
        Ok(())
    }

    /// Recompute the progress of an in-progress task from wall-clock time,
    /// completing it when it reaches 100%.
    ///
    /// `progress = clamp((now - start) / (end - start) * 100, 0, 100)`.
    ///
    /// # Errors
    ///
    /// [`TaskError::TaskNotFound`] or [`TaskError::InvalidTransition`] if the
    /// task is not in progress.
    pub fn advance(
        &mut self,
        id: &TaskId,
        ledger: &mut ResourceLedger,
        now_ms: i64,
    ) -> Result<AdvanceOutcome, TaskError> {
        let idx = self.lookup(id)?;
        let task = self.task_mut(idx, id)?;
        let (Some(start), Some(end), TaskStatus::InProgress) = (
            task.runtime.start_time,
            task.runtime.end_time,
            task.runtime.status,
        ) else {
            return Err(TaskError::InvalidTransition {
                id: id.clone(),
                operation: "advance",
                status: task.runtime.status,
            });
        };

        let progress = wall_clock_progress(start, end, now_ms);
        task.runtime.progress = progress;
        if progress >= FULL_PROGRESS {
            return self
                .complete(id, ledger, now_ms)
                .map(AdvanceOutcome::Completed);
        }
        Ok(AdvanceOutcome::InProgress { progress })
    }

    /// Advance the active task, if there is one.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`TaskRegistry::advance`].
    pub fn advance_active(
        &mut self,
        ledger: &mut ResourceLedger,
        now_ms: i64,
    ) -> Result<Option<AdvanceOutcome>, TaskError> {
        let Some(active) = self.active.clone() else {
            return Ok(None);
        };
        self.advance(&active, ledger, now_ms).map(Some)
    }

    /// Complete an in-progress task and grant its rewards.
    ///
    /// Repeatable tasks return to `AVAILABLE` straight away. With a
    /// cooldown, their progress stays at 100% until the deferred reset at
    /// `now + cooldown`; without one, progress is cleared immediately.
    /// Non-repeatable tasks stay `COMPLETED`.
    ///
    /// # Errors
    ///
    /// [`TaskError::TaskNotFound`] or [`TaskError::InvalidTransition`] if the
    /// task is not in progress.
    pub fn complete(
        &mut self,
        id: &TaskId,
        ledger: &mut ResourceLedger,
        now_ms: i64,
    ) -> Result<CompletionOutcome, TaskError> {
        let idx = self.lookup(id)?;
        let Some(task) = self.tasks.get(idx) else {
            return Err(TaskError::TaskNotFound(id.clone()));
        };
        if task.runtime.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                id: id.clone(),
                operation: "complete",
                status: task.runtime.status,
            });
        }

        let definition = task.definition.clone();
        let cooldown_ms = task.cooldown_ms;
        let rewards = self.effects.on_task_complete(&definition, ledger, now_ms);

        let task = self.task_mut(idx, id)?;
        let runtime = &mut task.runtime;
        runtime.completion_count = runtime.completion_count.saturating_add(1);
        runtime.start_time = None;
        runtime.end_time = None;
        runtime.progress = FULL_PROGRESS;
        runtime.reset_due_at = None;

        if definition.repeatable {
            runtime.status = TaskStatus::Available;
            match cooldown_ms {
                Some(cooldown) => {
                    runtime.reset_due_at = Some(now_ms.saturating_add(cooldown));
                }
                None => runtime.progress = Decimal::ZERO,
            }
        } else {
            runtime.status = TaskStatus::Completed;
        }

        let outcome = CompletionOutcome {
            task_id: id.clone(),
            completion_count: runtime.completion_count,
            status: runtime.status,
            rewards,
            reset_due_at: runtime.reset_due_at,
        };
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }

        info!(
            task_id = %id,
            completion_count = outcome.completion_count,
            status = %outcome.status,
            reset_due_at = outcome.reset_due_at,
            "Task completed"
        );
        Ok(outcome)
    }

    /// Cancel an in-progress task. The cost is not refunded.
    ///
    /// # Errors
    ///
    /// [`TaskError::TaskNotFound`] or [`TaskError::InvalidTransition`] if the
    /// task is not in progress.
    pub fn cancel(&mut self, id: &TaskId) -> Result<(), TaskError> {
        let idx = self.lookup(id)?;
        let task = self.task_mut(idx, id)?;
        if task.runtime.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                id: id.clone(),
                operation: "cancel",
                status: task.runtime.status,
            });
        }
        task.runtime.status = TaskStatus::Available;
        task.runtime.progress = Decimal::ZERO;
        task.runtime.start_time = None;
        task.runtime.end_time = None;
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        info!(task_id = %id, "Task cancelled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deferred resets
    // -----------------------------------------------------------------------

    /// Clear a repeatable task's progress for reuse.
    ///
    /// Returns `Ok(false)` without touching anything unless the task is
    /// repeatable and `COMPLETED` or `AVAILABLE`, so a reset that fires after
    /// the task was restarted cannot clobber the new run.
    ///
    /// # Errors
    ///
    /// [`TaskError::TaskNotFound`] for an unknown id.
    pub fn reset(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        let idx = self.lookup(id)?;
        let task = self.task_mut(idx, id)?;
        task.runtime.reset_due_at = None;
        if !task.definition.repeatable
            || !matches!(
                task.runtime.status,
                TaskStatus::Completed | TaskStatus::Available
            )
        {
            debug!(task_id = %id, status = %task.runtime.status, "Reset skipped");
            return Ok(false);
        }
        task.runtime.status = TaskStatus::Available;
        task.runtime.progress = Decimal::ZERO;
        task.runtime.start_time = None;
        task.runtime.end_time = None;
        debug!(task_id = %id, "Task reset");
        Ok(true)
    }

    /// Run every reset due at or before `now_ms`. Returns the ids reset.
    pub fn run_due_resets(&mut self, now_ms: i64) -> Vec<TaskId> {
        let due: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.runtime.reset_due_at.is_some_and(|at| at <= now_ms))
            .map(|t| t.definition.id.clone())
            .collect();
        due.into_iter()
            .filter(|id| matches!(self.reset(id), Ok(true)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Export the runtime state of every task.
    pub fn snapshot(&self) -> BTreeMap<TaskId, TaskRuntime> {
        self.tasks
            .iter()
            .map(|t| (t.definition.id.clone(), t.runtime.clone()))
            .collect()
    }

    /// Overwrite runtime state from a snapshot.
    ///
    /// The whole snapshot is validated first; entries for unknown tasks are
    /// skipped and returned.
    ///
    /// # Errors
    ///
    /// [`TaskError::InconsistentState`] if more than one task is in
    /// progress, `active` disagrees with the statuses, or an entry breaks the
    /// timestamp invariant: timestamps are present only while in progress,
    /// and then span exactly the task's duration. Nothing is mutated on
    /// error.
    pub fn restore(
        &mut self,
        tasks: &BTreeMap<TaskId, TaskRuntime>,
        active: Option<&TaskId>,
    ) -> Result<Vec<TaskId>, TaskError> {
        let inconsistent = |reason: String| TaskError::InconsistentState { reason };

        let mut in_progress: Vec<&TaskId> = Vec::new();
        for (id, runtime) in tasks {
            let Some(task) = self.get(id) else {
                continue;
            };
            let untimed = runtime.start_time.is_none() && runtime.end_time.is_none();
            match (runtime.status, runtime.start_time, runtime.end_time) {
                (TaskStatus::InProgress, Some(start), Some(end)) => {
                    if end.checked_sub(start) != Some(task.duration_ms) {
                        return Err(inconsistent(format!(
                            "{id} spans {start}..{end} but its duration is {} ms",
                            task.duration_ms
                        )));
                    }
                    in_progress.push(id);
                }
                (TaskStatus::InProgress, _, _) => {
                    return Err(inconsistent(format!("{id} is in progress without timestamps")));
                }
                _ if !untimed => {
                    return Err(inconsistent(format!(
                        "{id} has timestamps but status {}",
                        runtime.status
                    )));
                }
                _ => {}
            }
            if runtime.progress < Decimal::ZERO || runtime.progress > FULL_PROGRESS {
                return Err(inconsistent(format!(
                    "{id} progress {} outside [0, 100]",
                    runtime.progress
                )));
            }
        }
        if in_progress.len() > 1 {
            return Err(inconsistent(format!(
                "{} tasks in progress",
                in_progress.len()
            )));
        }
        if in_progress.first().copied() != active {
            return Err(inconsistent(format!(
                "active task {active:?} does not match in-progress task {:?}",
                in_progress.first()
            )));
        }

        let mut unknown = Vec::new();
        for (id, runtime) in tasks {
            match self.index.get(id).and_then(|&i| self.tasks.get_mut(i)) {
                Some(task) => task.runtime = runtime.clone(),
                None => {
                    warn!(task_id = %id, "Snapshot entry for unknown task skipped");
                    unknown.push(id.clone());
                }
            }
        }
        self.active = active.cloned();
        Ok(unknown)
    }
}

/// Progress percentage at `now_ms` for a run spanning `[start, end]`.
fn wall_clock_progress(start: i64, end: i64, now_ms: i64) -> Decimal {
    let total = end.saturating_sub(start);
    if total <= 0 {
        return FULL_PROGRESS;
    }
    let elapsed = now_ms.saturating_sub(start);
    Decimal::from(elapsed)
        .checked_mul(FULL_PROGRESS)
        .and_then(|scaled| scaled.checked_div(Decimal::from(total)))
        .unwrap_or(FULL_PROGRESS)
        .clamp(Decimal::ZERO, FULL_PROGRESS)
        .round_dp_with_strategy(PROGRESS_SCALE, RoundingStrategy::ToZero)
}

/// Convert seconds to whole milliseconds.
fn seconds_to_ms(seconds: Decimal) -> Option<i64> {
    seconds
        .checked_mul(Decimal::ONE_THOUSAND)
        .map(|ms| ms.round())
        .and_then(|ms| ms.to_i64())
}

/// Validate a definition and return its duration and cooldown in ms.
fn validate_definition(definition: &TaskDefinition) -> Result<(i64, Option<i64>), TaskError> {
    if definition.id.is_blank() {
        return Err(TaskError::InvalidId);
    }
    let invalid = |reason: String| TaskError::InvalidDefinition {
        id: definition.id.clone(),
        reason,
    };

    let duration_ms = seconds_to_ms(definition.duration_seconds)
        .filter(|ms| *ms > 0)
        .ok_or_else(|| {
            invalid(format!(
                "duration_seconds must be positive, got {}",
                definition.duration_seconds
            ))
        })?;

    let cooldown_ms = match definition.cooldown_seconds {
        None => None,
        Some(c) if c.is_zero() => None,
        Some(c) => Some(
            seconds_to_ms(c)
                .filter(|ms| *ms > 0)
                .ok_or_else(|| invalid(format!("cooldown_seconds must not be negative, got {c}")))?,
        ),
    };

    for (label, map) in [("cost", &definition.cost), ("reward", &definition.rewards)] {
        if let Some((id, amount)) = map.iter().find(|(_, amount)| **amount < Decimal::ZERO) {
            return Err(invalid(format!("{label} for {id} must not be negative, got {amount}")));
        }
    }
    Ok((duration_ms, cooldown_ms))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::panic)]
mod tests {
    use accrual_types::{ComparisonOperator, Requirement, Resource};
    use rust_decimal_macros::dec;

    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn rid(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn tid(s: &str) -> TaskId {
        TaskId::from(s)
    }

    fn ledger() -> ResourceLedger {
        let mut ledger = ResourceLedger::new();
        ledger
            .register(Resource {
                id: rid("solidarity"),
                name: String::from("Solidarity"),
                amount: dec!(100),
                per_second: dec!(1),
                max_amount: None,
                unlocked: true,
                category: String::new(),
            })
            .unwrap();
        ledger
    }

    fn definition(id: &str, cost: Decimal, reward: Decimal) -> TaskDefinition {
        TaskDefinition {
            id: tid(id),
            name: id.to_owned(),
            category: String::new(),
            description: String::new(),
            duration_seconds: dec!(60),
            cost: [(rid("solidarity"), cost)].into_iter().collect(),
            rewards: [(rid("solidarity"), reward)].into_iter().collect(),
            requirements: Vec::new(),
            repeatable: false,
            cooldown_seconds: None,
            unlocked: true,
        }
    }

    fn registry(defs: Vec<TaskDefinition>) -> TaskRegistry {
        let mut registry = TaskRegistry::default();
        for def in defs {
            registry.register(def).unwrap();
        }
        registry
    }

    fn status(registry: &TaskRegistry, id: &str) -> TaskStatus {
        registry.get(&tid(id)).unwrap().status()
    }

    #[test]
    fn start_deducts_cost_and_sets_timestamps() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(10), dec!(30))]);

        reg.start(&tid("organize"), &mut ledger, T0).unwrap();

        let task = reg.get(&tid("organize")).unwrap();
        assert_eq!(task.status(), TaskStatus::InProgress);
        assert_eq!(task.runtime().start_time, Some(T0));
        assert_eq!(task.runtime().end_time, Some(T0 + 60_000));
        assert_eq!(task.runtime().progress, Decimal::ZERO);
        assert_eq!(reg.active_task(), Some(&tid("organize")));
        assert_eq!(ledger.amount(&rid("solidarity")), Some(dec!(90)));
    }

    #[test]
    fn start_while_busy_has_no_side_effects() {
        let mut ledger = ledger();
        let mut reg = registry(vec![
            definition("a", dec!(10), dec!(0)),
            definition("b", dec!(10), dec!(0)),
        ]);
        reg.start(&tid("a"), &mut ledger, T0).unwrap();
        let before_ledger = ledger.snapshot();
        let before_b = reg.get(&tid("b")).unwrap().clone();

        let err = reg.start(&tid("b"), &mut ledger, T0 + 1).unwrap_err();
        assert!(matches!(err, TaskError::TaskBusy { .. }));
        assert_eq!(ledger.snapshot(), before_ledger);
        assert_eq!(reg.get(&tid("b")).unwrap(), &before_b);
        assert_eq!(reg.active_task(), Some(&tid("a")));
    }

    #[test]
    fn start_failures() {
        let mut ledger = ledger();
        let mut locked = definition("locked", dec!(0), dec!(0));
        locked.unlocked = false;
        let mut reg = registry(vec![definition("pricey", dec!(1000), dec!(0)), locked]);

        assert!(matches!(
            reg.start(&tid("ghost"), &mut ledger, T0),
            Err(TaskError::TaskNotFound(_))
        ));
        assert!(matches!(
            reg.start(&tid(""), &mut ledger, T0),
            Err(TaskError::InvalidId)
        ));
        assert!(matches!(
            reg.start(&tid("locked"), &mut ledger, T0),
            Err(TaskError::TaskNotAvailable { .. })
        ));
        assert!(matches!(
            reg.start(&tid("pricey"), &mut ledger, T0),
            Err(TaskError::InsufficientResources(_))
        ));
        assert_eq!(ledger.amount(&rid("solidarity")), Some(dec!(100)));
        assert_eq!(reg.active_task(), None);
    }

    #[test]
    fn cancel_restores_available_without_refund() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(10), dec!(30))]);
        reg.start(&tid("organize"), &mut ledger, T0).unwrap();
        reg.cancel(&tid("organize")).unwrap();

        let task = reg.get(&tid("organize")).unwrap();
        assert_eq!(task.status(), TaskStatus::Available);
        assert_eq!(task.runtime().progress, Decimal::ZERO);
        assert_eq!(task.runtime().start_time, None);
        assert_eq!(task.runtime().end_time, None);
        assert_eq!(reg.active_task(), None);
        assert_eq!(ledger.amount(&rid("solidarity")), Some(dec!(90)));

        assert!(matches!(
            reg.cancel(&tid("organize")),
            Err(TaskError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn advance_is_wall_clock_and_completes_at_end() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(10), dec!(30))]);
        reg.start(&tid("organize"), &mut ledger, T0).unwrap();

        let mut last = Decimal::ZERO;
        for secs in [0_i64, 15, 30, 45, 59] {
            let outcome = reg.advance(&tid("organize"), &mut ledger, T0 + secs * 1000).unwrap();
            let AdvanceOutcome::InProgress { progress } = outcome else {
                panic!("completed early at {secs}s");
            };
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(last, dec!(98.3333));

        let outcome = reg.advance(&tid("organize"), &mut ledger, T0 + 60_000).unwrap();
        let AdvanceOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done.completion_count, 1);
        assert_eq!(done.status, TaskStatus::Completed);
        let task = reg.get(&tid("organize")).unwrap();
        assert_eq!(task.runtime().progress, dec!(100));
        assert_eq!(reg.active_task(), None);
        assert_eq!(ledger.amount(&rid("solidarity")), Some(dec!(120)));
    }

    #[test]
    fn completed_non_repeatable_is_terminal() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(0), dec!(0))]);
        reg.start(&tid("organize"), &mut ledger, T0).unwrap();
        reg.complete(&tid("organize"), &mut ledger, T0).unwrap();

        assert!(matches!(
            reg.start(&tid("organize"), &mut ledger, T0),
            Err(TaskError::TaskNotAvailable { .. })
        ));
        assert!(!reg.reset(&tid("organize")).unwrap());
        assert_eq!(status(&reg, "organize"), TaskStatus::Completed);
    }

    #[test]
    fn repeatable_with_cooldown_is_available_immediately() {
        let mut ledger = ledger();
        let mut def = definition("strike", dec!(0), dec!(5));
        def.repeatable = true;
        def.cooldown_seconds = Some(dec!(120));
        let mut reg = registry(vec![def]);

        reg.start(&tid("strike"), &mut ledger, T0).unwrap();
        let done = reg.complete(&tid("strike"), &mut ledger, T0 + 60_000).unwrap();
        assert_eq!(done.status, TaskStatus::Available);
        assert_eq!(done.completion_count, 1);
        assert_eq!(done.reset_due_at, Some(T0 + 180_000));
        assert_eq!(reg.next_reset_due(), Some(T0 + 180_000));

        // Nothing is due yet.
        assert!(reg.run_due_resets(T0 + 179_999).is_empty());
        assert_eq!(reg.get(&tid("strike")).unwrap().runtime().progress, dec!(100));

        let reset = reg.run_due_resets(T0 + 180_000);
        assert_eq!(reset, vec![tid("strike")]);
        let task = reg.get(&tid("strike")).unwrap();
        assert_eq!(task.runtime().progress, Decimal::ZERO);
        assert_eq!(task.runtime().completion_count, 1);
        assert_eq!(reg.next_reset_due(), None);
    }

    #[test]
    fn restart_during_cooldown_cancels_pending_reset() {
        let mut ledger = ledger();
        let mut def = definition("strike", dec!(0), dec!(0));
        def.repeatable = true;
        def.cooldown_seconds = Some(dec!(120));
        let mut reg = registry(vec![def]);

        reg.start(&tid("strike"), &mut ledger, T0).unwrap();
        reg.complete(&tid("strike"), &mut ledger, T0).unwrap();
        reg.start(&tid("strike"), &mut ledger, T0 + 1_000).unwrap();

        assert!(reg.run_due_resets(T0 + 500_000).is_empty());
        assert_eq!(status(&reg, "strike"), TaskStatus::InProgress);
        // An explicit reset of the running task is a no-op as well.
        assert!(!reg.reset(&tid("strike")).unwrap());
        assert_eq!(status(&reg, "strike"), TaskStatus::InProgress);
    }

    #[test]
    fn repeatable_without_cooldown_clears_progress() {
        let mut ledger = ledger();
        let mut def = definition("canvass", dec!(0), dec!(1));
        def.repeatable = true;
        let mut reg = registry(vec![def]);

        for expected in 1..=3_u32 {
            reg.start(&tid("canvass"), &mut ledger, T0).unwrap();
            let done = reg.complete(&tid("canvass"), &mut ledger, T0 + 60_000).unwrap();
            assert_eq!(done.completion_count, expected);
            assert_eq!(done.reset_due_at, None);
            let task = reg.get(&tid("canvass")).unwrap();
            assert_eq!(task.status(), TaskStatus::Available);
            assert_eq!(task.runtime().progress, Decimal::ZERO);
        }
        assert_eq!(reg.effects().applied_count(), 6);
    }

    #[test]
    fn complete_requires_in_progress() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(0), dec!(30))]);
        let err = reg.complete(&tid("organize"), &mut ledger, T0).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { operation: "complete", .. }));
        assert_eq!(ledger.amount(&rid("solidarity")), Some(dec!(100)));
    }

    #[test]
    fn unlock_checks_requirements() {
        let mut ledger = ledger();
        let progression = Progression::default();
        let mut def = definition("rally", dec!(0), dec!(0));
        def.unlocked = false;
        def.requirements = vec![Requirement::ResourceAmount {
            target: rid("solidarity"),
            value: dec!(150),
            operator: ComparisonOperator::Gte,
        }];
        let mut reg = registry(vec![def]);

        let err = reg.unlock(&tid("rally"), &ledger, &progression).unwrap_err();
        assert!(matches!(err, TaskError::RequirementsNotMet { unmet: 1, .. }));
        assert_eq!(status(&reg, "rally"), TaskStatus::Locked);

        let _ = ledger.apply(&[(rid("solidarity"), dec!(50))].into_iter().collect());
        assert!(reg.unlock(&tid("rally"), &ledger, &progression).unwrap());
        assert!(!reg.unlock(&tid("rally"), &ledger, &progression).unwrap());
        assert_eq!(status(&reg, "rally"), TaskStatus::Available);
    }

    #[test]
    fn check_all_unlocks_only_eligible_in_order() {
        let ledger = ledger();
        let progression = Progression::default();
        let mut met = definition("met", dec!(0), dec!(0));
        met.unlocked = false;
        met.requirements = vec![Requirement::ResourceAmount {
            target: rid("solidarity"),
            value: dec!(100),
            operator: ComparisonOperator::Gte,
        }];
        let mut unmet = definition("unmet", dec!(0), dec!(0));
        unmet.unlocked = false;
        unmet.requirements = vec![Requirement::GameStage {
            value: dec!(3),
            operator: ComparisonOperator::Gte,
        }];
        let mut free = definition("free", dec!(0), dec!(0));
        free.unlocked = false;
        let mut reg = registry(vec![met, unmet, free]);

        let unlocked = reg.check_all_requirements(&ledger, &progression);
        assert_eq!(unlocked, vec![tid("met"), tid("free")]);
        assert_eq!(status(&reg, "unmet"), TaskStatus::Locked);
        assert!(reg.check_all_requirements(&ledger, &progression).is_empty());
    }

    #[test]
    fn completion_count_requirement_reads_registry() {
        let mut ledger = ledger();
        let progression = Progression::default();
        let mut follow_up = definition("follow_up", dec!(0), dec!(0));
        follow_up.unlocked = false;
        follow_up.requirements = vec![Requirement::TaskCompletionCount {
            target: tid("organize"),
            value: dec!(1),
            operator: ComparisonOperator::Gte,
        }];
        let mut reg = registry(vec![definition("organize", dec!(0), dec!(0)), follow_up]);

        assert!(reg.check_all_requirements(&ledger, &progression).is_empty());
        reg.start(&tid("organize"), &mut ledger, T0).unwrap();
        reg.complete(&tid("organize"), &mut ledger, T0).unwrap();
        assert_eq!(
            reg.check_all_requirements(&ledger, &progression),
            vec![tid("follow_up")]
        );
    }

    #[test]
    fn progress_view_reports_time_remaining() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(0), dec!(0))]);
        reg.start(&tid("organize"), &mut ledger, T0).unwrap();
        let _ = reg.advance(&tid("organize"), &mut ledger, T0 + 15_000).unwrap();

        let view = reg.progress(&tid("organize"), T0 + 15_000).unwrap();
        assert_eq!(view.status, TaskStatus::InProgress);
        assert_eq!(view.progress, dec!(25));
        assert_eq!(view.time_remaining_seconds, dec!(45));
        assert!(reg.progress(&tid("ghost"), T0).is_none());
    }

    #[test]
    fn register_rejects_bad_definitions() {
        let mut reg = TaskRegistry::default();
        let mut zero = definition("zero", dec!(0), dec!(0));
        zero.duration_seconds = Decimal::ZERO;
        assert!(matches!(reg.register(zero), Err(TaskError::InvalidDefinition { .. })));

        let negative = definition("neg", dec!(-1), dec!(0));
        assert!(matches!(reg.register(negative), Err(TaskError::InvalidDefinition { .. })));

        reg.register(definition("ok", dec!(0), dec!(0))).unwrap();
        assert!(matches!(
            reg.register(definition("ok", dec!(0), dec!(0))),
            Err(TaskError::DuplicateTask(_))
        ));
    }

    #[test]
    fn restore_rejects_two_in_progress() {
        let mut reg = registry(vec![
            definition("a", dec!(0), dec!(0)),
            definition("b", dec!(0), dec!(0)),
        ]);
        let running = TaskRuntime {
            status: TaskStatus::InProgress,
            progress: Decimal::ZERO,
            start_time: Some(T0),
            end_time: Some(T0 + 60_000),
            completion_count: 0,
            reset_due_at: None,
        };
        let mut snapshot = BTreeMap::new();
        snapshot.insert(tid("a"), running.clone());
        snapshot.insert(tid("b"), running);
        let before = reg.snapshot();

        let err = reg.restore(&snapshot, Some(&tid("a"))).unwrap_err();
        assert!(matches!(err, TaskError::InconsistentState { .. }));
        assert_eq!(reg.snapshot(), before);
    }

    #[test]
    fn restore_rejects_a_span_that_differs_from_the_duration() {
        let mut reg = registry(vec![definition("a", dec!(0), dec!(0))]);
        let mut snapshot = BTreeMap::new();
        snapshot.insert(
            tid("a"),
            TaskRuntime {
                status: TaskStatus::InProgress,
                progress: Decimal::ZERO,
                start_time: Some(T0),
                end_time: Some(T0 + 1_000),
                completion_count: 0,
                reset_due_at: None,
            },
        );
        let before = reg.snapshot();

        let err = reg.restore(&snapshot, Some(&tid("a"))).unwrap_err();
        assert!(matches!(err, TaskError::InconsistentState { .. }));
        assert_eq!(reg.snapshot(), before);
        assert_eq!(reg.active_task(), None);
    }

    #[test]
    fn restore_round_trips_and_skips_unknown() {
        let mut ledger = ledger();
        let mut reg = registry(vec![definition("organize", dec!(10), dec!(0))]);
        reg.start(&tid("organize"), &mut ledger, T0).unwrap();
        let mut snapshot = reg.snapshot();
        snapshot.insert(tid("ghost"), TaskRuntime::default());

        let mut fresh = registry(vec![definition("organize", dec!(10), dec!(0))]);
        let unknown = fresh.restore(&snapshot, Some(&tid("organize"))).unwrap();
        assert_eq!(unknown, vec![tid("ghost")]);
        assert_eq!(fresh.active_task(), Some(&tid("organize")));
        assert_eq!(
            fresh.get(&tid("organize")).unwrap().runtime(),
            reg.get(&tid("organize")).unwrap().runtime()
        );
    }
}
