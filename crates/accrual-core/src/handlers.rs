//! Built-in tick handlers.
//!
//! [`Simulation::new`](crate::simulation::Simulation::new) registers these
//! in the order below, so every tick first accrues resources for the
//! elapsed simulated time, then advances the active task (granting rewards
//! if it completes), then unlocks newly eligible tasks.

use accrual_tasks::AdvanceOutcome;
use accrual_types::TickSample;
use tracing::debug;

use crate::scheduler::{HandlerError, TickHandler};
use crate::simulation::SimulationState;

/// Name of [`ResourceAccrual`].
pub const RESOURCE_ACCRUAL: &str = "resource_accrual";
/// Name of [`TaskProgress`].
pub const TASK_PROGRESS: &str = "task_progress";
/// Name of [`RequirementSweep`].
pub const REQUIREMENT_SWEEP: &str = "requirement_sweep";

/// Accrues every resource by the simulated delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceAccrual;

impl TickHandler for ResourceAccrual {
    fn name(&self) -> &str {
        RESOURCE_ACCRUAL
    }

    fn on_tick(
        &mut self,
        sample: &TickSample,
        state: &mut SimulationState,
    ) -> Result<(), HandlerError> {
        state.ledger.accrue(sample.simulated_delta_seconds)?;
        Ok(())
    }
}

/// Advances the active task against wall-clock time.
///
/// Uses `sample.now_ms`, never the simulated delta, so a time scale does
/// not shorten tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskProgress;

impl TickHandler for TaskProgress {
    fn name(&self) -> &str {
        TASK_PROGRESS
    }

    fn on_tick(
        &mut self,
        sample: &TickSample,
        state: &mut SimulationState,
    ) -> Result<(), HandlerError> {
        let outcome = state
            .tasks
            .advance_active(&mut state.ledger, sample.now_ms)?;
        if let Some(AdvanceOutcome::Completed(done)) = outcome {
            let unlocked = state
                .tasks
                .check_all_requirements(&state.ledger, &state.progression);
            debug!(
                tick = sample.tick,
                task_id = %done.task_id,
                unlocked = unlocked.len(),
                "Active task completed during tick"
            );
        }
        Ok(())
    }
}

/// Unlocks tasks whose requirements became true through accrual or
/// progression changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementSweep;

impl TickHandler for RequirementSweep {
    fn name(&self) -> &str {
        REQUIREMENT_SWEEP
    }

    fn on_tick(
        &mut self,
        _sample: &TickSample,
        state: &mut SimulationState,
    ) -> Result<(), HandlerError> {
        let _ = state
            .tasks
            .check_all_requirements(&state.ledger, &state.progression);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use accrual_ledger::ResourceLedger;
    use accrual_types::{Resource, ResourceId, TaskDefinition, TaskId, TaskStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn sample(now_ms: i64, delta: Decimal) -> TickSample {
        TickSample {
            tick: 1,
            real_delta_seconds: delta,
            simulated_delta_seconds: delta,
            now_ms,
        }
    }

    fn state() -> SimulationState {
        let mut ledger = ResourceLedger::new();
        ledger
            .register(Resource {
                id: ResourceId::from("solidarity"),
                name: String::from("Solidarity"),
                amount: dec!(0),
                per_second: dec!(2),
                max_amount: Some(dec!(10)),
                unlocked: true,
                category: String::new(),
            })
            .unwrap();
        let mut state = SimulationState {
            ledger,
            ..SimulationState::default()
        };
        state
            .tasks
            .register(TaskDefinition {
                id: TaskId::from("rally"),
                name: String::from("Rally"),
                category: String::new(),
                description: String::new(),
                duration_seconds: dec!(10),
                cost: Default::default(),
                rewards: Default::default(),
                requirements: Vec::new(),
                repeatable: false,
                cooldown_seconds: None,
                unlocked: false,
            })
            .unwrap();
        state
    }

    #[test]
    fn accrual_uses_simulated_delta() {
        let mut state = state();
        ResourceAccrual
            .on_tick(&sample(0, dec!(3)), &mut state)
            .unwrap();
        assert_eq!(state.ledger.amount(&ResourceId::from("solidarity")), Some(dec!(6)));

        // Clamped to max.
        ResourceAccrual
            .on_tick(&sample(0, dec!(3)), &mut state)
            .unwrap();
        assert_eq!(state.ledger.amount(&ResourceId::from("solidarity")), Some(dec!(10)));
    }

    #[test]
    fn sweep_unlocks_requirement_free_tasks() {
        let mut state = state();
        RequirementSweep
            .on_tick(&sample(0, dec!(0)), &mut state)
            .unwrap();
        let task = state.tasks.get(&TaskId::from("rally")).unwrap();
        assert_eq!(task.status(), TaskStatus::Available);
    }

    #[test]
    fn progress_without_active_task_is_a_no_op() {
        let mut state = state();
        TaskProgress.on_tick(&sample(0, dec!(1)), &mut state).unwrap();
        assert_eq!(state.tasks.active_task(), None);
    }
}
