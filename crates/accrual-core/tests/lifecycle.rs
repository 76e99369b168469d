//! End-to-end tests of the scheduler, ledger and task lifecycle working
//! together through the `Simulation` context.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use accrual_core::snapshot;
use accrual_core::{Catalog, ManualTimeSource, Simulation, SimulationConfig, SnapshotError};
use accrual_tasks::TaskError;
use accrual_types::{ResourceId, TaskId, TaskStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const T0: i64 = 1_700_000_000_000;

const CATALOG: &str = r"
resources:
  - { id: solidarity, name: Solidarity, amount: 100, per_second: 1 }
  - { id: funds, name: Funds, amount: 5, per_second: -2, max_amount: 20 }
  - { id: morale, name: Morale, amount: 40, per_second: 3, max_amount: 50 }
tasks:
  - id: organize
    name: Organize
    duration_seconds: 60
    cost: { solidarity: 10 }
    rewards: { solidarity: 30 }
    unlocked: true
  - id: leaflet
    name: Leaflet
    duration_seconds: 30
    cost: { solidarity: 5 }
    unlocked: true
  - id: strike
    name: Strike
    duration_seconds: 10
    rewards: { funds: 1 }
    repeatable: true
    cooldown_seconds: 120
    unlocked: true
  - id: rally
    name: Rally
    duration_seconds: 10
    requirements:
      - { kind: resource_amount, target: solidarity, value: 100 }
  - id: march
    name: March
    duration_seconds: 10
    requirements:
      - { kind: resource_amount, target: solidarity, value: 1000 }
";

fn solidarity() -> ResourceId {
    ResourceId::from("solidarity")
}

fn simulation_with(config: &SimulationConfig, time: &ManualTimeSource) -> Simulation {
    let mut sim = Simulation::new(config, Arc::new(time.clone())).unwrap();
    sim.load_catalog(Catalog::parse(CATALOG).unwrap()).unwrap();
    sim
}

fn simulation(time: &ManualTimeSource) -> Simulation {
    simulation_with(&SimulationConfig::default(), time)
}

#[test]
fn accrual_keeps_amounts_within_bounds() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    for secs in [1, 2, 5, 30, 600] {
        time.advance_secs(secs);
        let _ = sim.tick();
        for resource in sim.ledger().iter() {
            assert!(resource.amount >= Decimal::ZERO, "{} went negative", resource.id);
            if let Some(max) = resource.max_amount {
                assert!(resource.amount <= max, "{} exceeded its max", resource.id);
            }
        }
    }
    assert_eq!(sim.ledger().amount(&ResourceId::from("funds")), Some(Decimal::ZERO));
    assert_eq!(sim.ledger().amount(&ResourceId::from("morale")), Some(dec!(50)));
}

#[test]
fn start_then_cancel_restores_task_without_refund() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    let id = TaskId::from("organize");

    sim.start_task(&id).unwrap();
    sim.cancel_task(&id).unwrap();

    let task = sim.tasks().get(&id).unwrap();
    assert_eq!(task.status(), TaskStatus::Available);
    assert_eq!(task.runtime().progress, Decimal::ZERO);
    assert_eq!(sim.tasks().active_task(), None);
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(90)));
}

#[test]
fn starting_while_busy_mutates_nothing() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    sim.start_task(&TaskId::from("organize")).unwrap();

    let before = sim.snapshot();
    let err = sim.start_task(&TaskId::from("leaflet")).unwrap_err();
    assert!(matches!(err, TaskError::TaskBusy { .. }));
    assert_eq!(sim.snapshot(), before);
}

#[test]
fn progress_is_wall_clock_and_ignores_time_scale() {
    let mut config = SimulationConfig::default();
    config.scheduler.time_scale = dec!(10);
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation_with(&config, &time);
    let id = TaskId::from("organize");
    sim.start_task(&id).unwrap();

    let mut last = Decimal::ZERO;
    for _ in 0..59 {
        time.advance_secs(1);
        let _ = sim.tick();
        let progress = sim.task_progress(&id).unwrap();
        assert_eq!(progress.status, TaskStatus::InProgress);
        assert!(progress.progress >= last);
        last = progress.progress;
    }
    assert!(last < dec!(100));

    time.advance_secs(1);
    let _ = sim.tick();
    let task = sim.tasks().get(&id).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.runtime().progress, dec!(100));
    assert_eq!(task.runtime().completion_count, 1);
}

#[test]
fn solidarity_scenario_accrues_and_rewards_once() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    let id = TaskId::from("organize");

    sim.start_task(&id).unwrap();
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(90)));

    time.advance_secs(60);
    let sample = sim.tick().unwrap();
    assert_eq!(sample.real_delta_seconds, dec!(60));

    // 90 + 60 accrued + 30 reward.
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(180)));
    let task = sim.tasks().get(&id).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.runtime().completion_count, 1);
    assert_eq!(sim.tasks().active_task(), None);

    // Further ticks only accrue.
    time.advance_secs(1);
    let _ = sim.tick();
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(181)));
    assert_eq!(sim.tasks().effects().applied_count(), 2);
}

#[test]
fn cancel_before_the_completing_tick_wins() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    let id = TaskId::from("organize");
    sim.start_task(&id).unwrap();

    // The duration has elapsed but no tick has observed it yet.
    time.advance_secs(61);
    sim.cancel_task(&id).unwrap();
    let _ = sim.tick();

    let task = sim.tasks().get(&id).unwrap();
    assert_eq!(task.status(), TaskStatus::Available);
    assert_eq!(task.runtime().completion_count, 0);
    assert_eq!(task.runtime().progress, Decimal::ZERO);
    assert_eq!(sim.tasks().active_task(), None);
    // 90 after the cost, plus 61 accrued, and no reward.
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(151)));
    assert_eq!(sim.tasks().effects().applied_count(), 1);
}

#[test]
fn repeatable_task_is_available_immediately_and_counts_once() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    let id = TaskId::from("strike");

    for expected in 1..=3_u32 {
        sim.start_task(&id).unwrap();
        time.advance_secs(10);
        let _ = sim.tick();
        let task = sim.tasks().get(&id).unwrap();
        assert_eq!(task.status(), TaskStatus::Available);
        assert_eq!(task.runtime().completion_count, expected);
    }

    // The last completion's reset is pending until its cooldown elapses.
    let due = sim.next_reset_due().unwrap();
    assert_eq!(due, sim.now_ms() + 120_000);
    time.advance_secs(120);
    assert_eq!(sim.run_due_resets(), vec![id.clone()]);
    assert_eq!(sim.tasks().get(&id).unwrap().runtime().completion_count, 3);
}

#[test]
fn requirement_sweep_unlocks_exactly_the_eligible_task() {
    let mut config = SimulationConfig::default();
    config.scheduler.autostart = false;
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation_with(&config, &time);

    assert_eq!(sim.check_all_requirements(), 1);
    assert_eq!(
        sim.tasks().get(&TaskId::from("rally")).unwrap().status(),
        TaskStatus::Available
    );
    assert_eq!(
        sim.tasks().get(&TaskId::from("march")).unwrap().status(),
        TaskStatus::Locked
    );
    assert_eq!(sim.check_all_requirements(), 0);
}

#[test]
fn long_suspension_is_clamped_to_the_ceiling() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    time.advance_secs(3_600);
    let sample = sim.tick().unwrap();
    assert_eq!(sample.real_delta_seconds, dec!(300));
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(400)));
    assert_eq!(sim.scheduler().stats().clamped_deltas, 1);
}

#[test]
fn pause_stops_accrual_and_resume_skips_the_gap() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    sim.scheduler_mut().pause();
    time.advance_secs(50);
    assert!(sim.tick().is_none());
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(100)));

    time.advance_secs(50);
    sim.scheduler_mut().resume();
    time.advance_secs(2);
    let _ = sim.tick();
    assert_eq!(sim.ledger().amount(&solidarity()), Some(dec!(102)));
}

#[test]
fn snapshot_round_trips_into_a_fresh_simulation() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    sim.start_task(&TaskId::from("organize")).unwrap();
    time.advance_secs(15);
    let _ = sim.tick();

    let json = snapshot::to_json(&sim.snapshot()).unwrap();
    let decoded = snapshot::from_json(&json).unwrap();

    let mut restored = simulation(&time);
    let report = restored.restore(&decoded).unwrap();
    assert!(report.is_complete());
    assert_eq!(restored.snapshot(), sim.snapshot());

    // The restored task keeps running against wall-clock time.
    time.advance_secs(45);
    let _ = restored.tick();
    assert_eq!(
        restored.tasks().get(&TaskId::from("organize")).unwrap().status(),
        TaskStatus::Completed
    );
}

#[test]
fn inconsistent_snapshot_is_rejected_without_mutation() {
    let time = ManualTimeSource::new(T0);
    let mut sim = simulation(&time);
    sim.start_task(&TaskId::from("organize")).unwrap();
    let mut bad = sim.snapshot();
    bad.active_task = None;

    let mut other = simulation(&time);
    let before = other.snapshot();
    let err = other.restore(&bad).unwrap_err();
    assert!(matches!(err, SnapshotError::Inconsistent { .. }));
    assert_eq!(other.snapshot(), before);
}
