//! The simulation context and its command surface.
//!
//! A [`Simulation`] is built explicitly and passed to whoever needs it.
//! There are no global managers. It owns the [`Scheduler`] and the
//! [`SimulationState`] the scheduler's handlers mutate, and it exposes the
//! commands UI and tooling collaborators use (`start_task`, `cancel_task`,
//! and so on). Commands and ticks both take `&mut self`, so they never
//! interleave.

use std::sync::Arc;

use accrual_ledger::{LedgerError, RepeatCapacity, ResourceLedger};
use accrual_tasks::{CompletionOutcome, EffectPipeline, TaskError, TaskRegistry};
use accrual_types::{
    Progression, ResourceId, SimulationSnapshot, StructureId, TaskId, TaskProgress, TickSample,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogError};
use crate::clock::TimeSource;
use crate::config::SimulationConfig;
use crate::handlers::{RequirementSweep, ResourceAccrual, TaskProgress as TaskProgressHandler};
use crate::scheduler::{HandlerToken, Scheduler, SchedulerError, TickHandler};
use crate::snapshot::{RestoreReport, SnapshotError};

/// The state tick handlers operate on.
#[derive(Debug, Clone, Default)]
pub struct SimulationState {
    /// Every resource.
    pub ledger: ResourceLedger,
    /// Every task, the active task id, and the effect pipeline.
    pub tasks: TaskRegistry,
    /// Collaborator-owned progression inputs for requirement evaluation.
    pub progression: Progression,
}

impl SimulationState {
    /// Empty state whose effect journal keeps `journal_capacity` records.
    pub fn new(journal_capacity: usize) -> Self {
        Self {
            ledger: ResourceLedger::new(),
            tasks: TaskRegistry::new(EffectPipeline::new(journal_capacity)),
            progression: Progression::default(),
        }
    }
}

/// The simulation context.
#[derive(Debug)]
pub struct Simulation {
    scheduler: Scheduler,
    state: SimulationState,
    journal_capacity: usize,
}

impl Simulation {
    /// Build an empty simulation with the built-in handlers registered.
    ///
    /// The handlers run in this order: resource accrual, task progress,
    /// requirement sweep. The scheduler is started when
    /// `scheduler.autostart` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] if the scheduler
    /// configuration is out of range.
    pub fn new(
        config: &SimulationConfig,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, SchedulerError> {
        let mut scheduler = Scheduler::new(time, &config.scheduler)?;
        let _ = scheduler.register(Box::new(ResourceAccrual));
        let _ = scheduler.register(Box::new(TaskProgressHandler));
        let _ = scheduler.register(Box::new(RequirementSweep));
        if config.scheduler.autostart {
            scheduler.start(config.scheduler.tick_rate_hz)?;
        }
        Ok(Self {
            scheduler,
            state: SimulationState::new(config.effects.journal_capacity),
            journal_capacity: config.effects.journal_capacity,
        })
    }

    /// Replace all resources and tasks with the catalog's.
    ///
    /// The catalog is validated and loaded into fresh state first; the live
    /// state is only replaced if everything loads.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`]; the simulation is unchanged.
    pub fn load_catalog(&mut self, catalog: Catalog) -> Result<(), CatalogError> {
        catalog.validate()?;
        let mut fresh = SimulationState::new(self.journal_capacity);
        let resource_count = catalog.resources.len();
        let task_count = catalog.tasks.len();
        for resource in catalog.resources {
            fresh.ledger.register(resource)?;
        }
        for task in catalog.tasks {
            fresh.tasks.register(task)?;
        }
        fresh.progression = self.state.progression.clone();
        self.state = fresh;
        info!(resources = resource_count, tasks = task_count, "Catalog loaded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The scheduler.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The scheduler, for start/stop, pause and rate changes.
    pub const fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Read-only view of the whole state.
    pub const fn state(&self) -> &SimulationState {
        &self.state
    }

    /// The resource ledger.
    pub const fn ledger(&self) -> &ResourceLedger {
        &self.state.ledger
    }

    /// The task registry.
    pub const fn tasks(&self) -> &TaskRegistry {
        &self.state.tasks
    }

    /// The progression inputs.
    pub const fn progression(&self) -> &Progression {
        &self.state.progression
    }

    /// Current wall-clock time, epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.scheduler.now_ms()
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Run one scheduler iteration. Returns the sample if one was
    /// dispatched.
    pub fn tick(&mut self) -> Option<TickSample> {
        self.scheduler.tick(&mut self.state)
    }

    /// Add a tick handler after the built-in ones.
    pub fn register_handler(&mut self, handler: Box<dyn TickHandler>) -> HandlerToken {
        self.scheduler.register(handler)
    }

    /// Remove a tick handler. Returns whether it was registered.
    pub fn unregister_handler(&mut self, token: HandlerToken) -> bool {
        self.scheduler.unregister(token)
    }

    /// Apply every cooldown reset due by now. Returns the ids reset.
    pub fn run_due_resets(&mut self) -> Vec<TaskId> {
        let now = self.now_ms();
        let reset = self.state.tasks.run_due_resets(now);
        if !reset.is_empty() {
            debug!(count = reset.len(), "Deferred resets applied");
        }
        reset
    }

    /// Earliest pending cooldown reset, epoch milliseconds.
    pub fn next_reset_due(&self) -> Option<i64> {
        self.state.tasks.next_reset_due()
    }

    // -----------------------------------------------------------------------
    // Task commands
    // -----------------------------------------------------------------------

    /// Start a task now, deducting its cost.
    ///
    /// # Errors
    ///
    /// See [`TaskRegistry::start`].
    pub fn start_task(&mut self, id: &TaskId) -> Result<(), TaskError> {
        let now = self.now_ms();
        self.state.tasks.start(id, &mut self.state.ledger, now)
    }

    /// Cancel the in-progress task. The cost is not refunded.
    ///
    /// # Errors
    ///
    /// See [`TaskRegistry::cancel`].
    pub fn cancel_task(&mut self, id: &TaskId) -> Result<(), TaskError> {
        self.state.tasks.cancel(id)
    }

    /// Complete an in-progress task immediately, then unlock any tasks the
    /// rewards made eligible.
    ///
    /// # Errors
    ///
    /// See [`TaskRegistry::complete`].
    pub fn complete_task(&mut self, id: &TaskId) -> Result<CompletionOutcome, TaskError> {
        let now = self.now_ms();
        let outcome = self.state.tasks.complete(id, &mut self.state.ledger, now)?;
        let _ = self.check_all_requirements();
        Ok(outcome)
    }

    /// Unlock a task whose requirements hold.
    ///
    /// # Errors
    ///
    /// See [`TaskRegistry::unlock`].
    pub fn unlock_task(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        self.state
            .tasks
            .unlock(id, &self.state.ledger, &self.state.progression)
    }

    /// Whether the task's cost is affordable right now.
    pub fn can_afford_task(&self, id: &TaskId) -> bool {
        self.state.tasks.can_afford(id, &self.state.ledger)
    }

    /// How many times the task's cost could be paid right now.
    pub fn max_affordable_runs(&self, id: &TaskId) -> Option<RepeatCapacity> {
        self.state.tasks.max_affordable_runs(id, &self.state.ledger)
    }

    /// Progress view of a task as of now.
    pub fn task_progress(&self, id: &TaskId) -> Option<TaskProgress> {
        self.state.tasks.progress(id, self.now_ms())
    }

    /// Unlock every eligible locked task. Returns how many were unlocked.
    pub fn check_all_requirements(&mut self) -> usize {
        self.state
            .tasks
            .check_all_requirements(&self.state.ledger, &self.state.progression)
            .len()
    }

    // -----------------------------------------------------------------------
    // Collaborator inputs
    // -----------------------------------------------------------------------

    /// Set the global game stage.
    pub fn set_game_stage(&mut self, stage: u32) {
        self.state.progression.game_stage = stage;
        debug!(stage, "Game stage set");
    }

    /// Set the level of a structure.
    pub fn set_structure_level(&mut self, id: StructureId, level: u32) {
        debug!(structure = %id, level, "Structure level set");
        self.state.progression.structure_levels.insert(id, level);
    }

    /// Unlock a resource. Returns whether it was locked.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ResourceNotFound`] for an unknown id.
    pub fn unlock_resource(&mut self, id: &ResourceId) -> Result<bool, LedgerError> {
        self.state.ledger.unlock(id)
    }

    /// Change a resource's accrual rate.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ResourceNotFound`] for an unknown id.
    pub fn set_resource_rate(
        &mut self,
        id: &ResourceId,
        per_second: Decimal,
    ) -> Result<(), LedgerError> {
        self.state.ledger.set_per_second(id, per_second)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Export the full state. Never mutates anything.
    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            taken_at_ms: self.now_ms(),
            tick: self.scheduler.tick_count(),
            resources: self.state.ledger.snapshot(),
            tasks: self.state.tasks.snapshot(),
            active_task: self.state.tasks.active_task().cloned(),
            progression: self.state.progression.clone(),
        }
    }

    /// Apply a snapshot taken from a simulation loaded with the same
    /// catalog.
    ///
    /// Unknown ids are skipped and reported.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Inconsistent`] if the task state breaks a
    /// registry invariant; nothing is mutated in that case.
    pub fn restore(&mut self, snapshot: &SimulationSnapshot) -> Result<RestoreReport, SnapshotError> {
        let unknown_tasks = self
            .state
            .tasks
            .restore(&snapshot.tasks, snapshot.active_task.as_ref())?;
        let unknown_resources = self.state.ledger.restore(&snapshot.resources);
        self.state.progression = snapshot.progression.clone();
        self.scheduler.set_tick_count(snapshot.tick);
        info!(
            tick = snapshot.tick,
            taken_at_ms = snapshot.taken_at_ms,
            unknown_resources = unknown_resources.len(),
            unknown_tasks = unknown_tasks.len(),
            "Snapshot restored"
        );
        Ok(RestoreReport {
            unknown_resources,
            unknown_tasks,
        })
    }
}
