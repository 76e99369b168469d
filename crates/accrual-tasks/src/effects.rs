//! The effect pipeline: the single authority that turns a lifecycle
//! transition into a resource delta.
//!
//! [`TaskRegistry`] owns the pipeline and calls it synchronously inside
//! `start` and `complete`. Nothing else applies task costs or rewards, so
//! each transition moves resources exactly once.
//!
//! The pipeline keeps a bounded, append-only journal of what it applied.
//! The journal is diagnostic only; it is not part of the snapshot.
//!
//! [`TaskRegistry`]: crate::registry::TaskRegistry

use std::collections::{BTreeMap, VecDeque};

use accrual_ledger::{ApplyReport, ResourceLedger};
use accrual_types::{EffectKind, ResourceId, TaskDefinition, TaskId};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Default number of records retained in the journal.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 256;

/// One applied effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectRecord {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// The transition the effect belongs to.
    pub kind: EffectKind,
    /// The task that transitioned.
    pub task_id: TaskId,
    /// Net change applied per resource, after clamping.
    pub applied: BTreeMap<ResourceId, Decimal>,
    /// Wall-clock time of the transition, epoch milliseconds.
    pub at_ms: i64,
}

/// Applies task costs and rewards to the ledger.
#[derive(Debug, Clone)]
pub struct EffectPipeline {
    /// Most recent records, oldest first.
    journal: VecDeque<EffectRecord>,
    /// Maximum records retained.
    capacity: usize,
    /// Sequence number of the last applied effect.
    sequence: u64,
}

impl Default for EffectPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl EffectPipeline {
    /// Create a pipeline retaining at most `capacity` journal records.
    pub fn new(capacity: usize) -> Self {
        Self {
            journal: VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY)),
            capacity,
            sequence: 0,
        }
    }

    /// Deduct the task's cost. Called once, when the task starts.
    pub fn on_task_start(
        &mut self,
        task: &TaskDefinition,
        ledger: &mut ResourceLedger,
        at_ms: i64,
    ) -> ApplyReport {
        let deltas: BTreeMap<ResourceId, Decimal> = task
            .cost
            .iter()
            .map(|(id, amount)| (id.clone(), -*amount))
            .collect();
        self.apply(EffectKind::TaskStart, &task.id, &deltas, ledger, at_ms)
    }

    /// Grant the task's rewards. Called once, when the task completes.
    pub fn on_task_complete(
        &mut self,
        task: &TaskDefinition,
        ledger: &mut ResourceLedger,
        at_ms: i64,
    ) -> ApplyReport {
        self.apply(EffectKind::TaskComplete, &task.id, &task.rewards, ledger, at_ms)
    }

    fn apply(
        &mut self,
        kind: EffectKind,
        task_id: &TaskId,
        deltas: &BTreeMap<ResourceId, Decimal>,
        ledger: &mut ResourceLedger,
        at_ms: i64,
    ) -> ApplyReport {
        let report = ledger.apply(deltas);
        for err in &report.errors {
            warn!(task_id = %task_id, ?kind, %err, "Effect entry not applied");
        }

        self.sequence = self.sequence.saturating_add(1);
        debug!(task_id = %task_id, ?kind, sequence = self.sequence, "Effect applied");

        if self.capacity > 0 {
            while self.journal.len() >= self.capacity {
                self.journal.pop_front();
            }
            self.journal.push_back(EffectRecord {
                sequence: self.sequence,
                kind,
                task_id: task_id.clone(),
                applied: report.applied.clone(),
                at_ms,
            });
        }
        report
    }

    /// Total number of effects applied since creation.
    pub const fn applied_count(&self) -> u64 {
        self.sequence
    }

    /// Retained journal records, oldest first.
    pub fn journal(&self) -> impl Iterator<Item = &EffectRecord> {
        self.journal.iter()
    }

    /// Retained records for one task, oldest first.
    pub fn records_for<'a>(&'a self, task_id: &'a TaskId) -> impl Iterator<Item = &'a EffectRecord> {
        self.journal.iter().filter(move |r| &r.task_id == task_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use accrual_types::Resource;
    use rust_decimal_macros::dec;

    use super::*;

    fn ledger() -> ResourceLedger {
        let mut ledger = ResourceLedger::new();
        ledger
            .register(Resource {
                id: ResourceId::from("solidarity"),
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

    fn task() -> TaskDefinition {
        TaskDefinition {
            id: TaskId::from("organize"),
            name: String::from("Organize"),
            category: String::new(),
            description: String::new(),
            duration_seconds: dec!(60),
            cost: [(ResourceId::from("solidarity"), dec!(10))].into_iter().collect(),
            rewards: [(ResourceId::from("solidarity"), dec!(30))].into_iter().collect(),
            requirements: Vec::new(),
            repeatable: false,
            cooldown_seconds: None,
            unlocked: true,
        }
    }

    #[test]
    fn start_deducts_and_complete_rewards() {
        let mut ledger = ledger();
        let mut pipeline = EffectPipeline::default();
        let task = task();

        let report = pipeline.on_task_start(&task, &mut ledger, 0);
        assert!(report.is_clean());
        assert_eq!(ledger.amount(&ResourceId::from("solidarity")), Some(dec!(90)));

        let report = pipeline.on_task_complete(&task, &mut ledger, 60_000);
        assert!(report.is_clean());
        assert_eq!(ledger.amount(&ResourceId::from("solidarity")), Some(dec!(120)));

        let kinds: Vec<EffectKind> = pipeline.journal().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![EffectKind::TaskStart, EffectKind::TaskComplete]);
        assert_eq!(pipeline.applied_count(), 2);
    }

    #[test]
    fn journal_is_bounded() {
        let mut ledger = ledger();
        let mut pipeline = EffectPipeline::new(2);
        let task = task();
        for i in 0..5 {
            let _ = pipeline.on_task_complete(&task, &mut ledger, i);
        }
        let sequences: Vec<u64> = pipeline.journal().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![4, 5]);
        assert_eq!(pipeline.applied_count(), 5);
        assert_eq!(pipeline.records_for(&TaskId::from("organize")).count(), 2);
    }
}
