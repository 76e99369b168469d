//! Pure requirement evaluation.
//!
//! Each [`Requirement`] kind has its own predicate. Evaluation reads state
//! through [`RequirementState`] and never mutates anything. A target that
//! does not exist (unknown resource, structure or task) is simply not
//! satisfied.

use accrual_types::{ComparisonOperator, Requirement, ResourceId, StructureId, TaskId};
use rust_decimal::Decimal;

/// Read access to the state requirements are evaluated against.
pub trait RequirementState {
    /// Current amount of a resource, if it exists.
    fn resource_amount(&self, id: &ResourceId) -> Option<Decimal>;

    /// Current level of a structure, if it is known.
    fn structure_level(&self, id: &StructureId) -> Option<u32>;

    /// Current game stage.
    fn game_stage(&self) -> u32;

    /// Completion count of a task, if it exists.
    fn task_completion_count(&self, id: &TaskId) -> Option<u32>;
}

/// Evaluate a single requirement.
pub fn evaluate(requirement: &Requirement, state: &dyn RequirementState) -> bool {
    match requirement {
        Requirement::ResourceAmount {
            target,
            value,
            operator,
        } => resource_amount_met(state, target, *value, *operator),
        Requirement::StructureLevel {
            target,
            value,
            operator,
        } => structure_level_met(state, target, *value, *operator),
        Requirement::GameStage { value, operator } => game_stage_met(state, *value, *operator),
        Requirement::TaskCompletionCount {
            target,
            value,
            operator,
        } => completion_count_met(state, target, *value, *operator),
    }
}

/// Whether every requirement holds. An empty list is vacuously satisfied.
pub fn all_satisfied(requirements: &[Requirement], state: &dyn RequirementState) -> bool {
    requirements.iter().all(|r| evaluate(r, state))
}

/// Number of requirements that evaluate false.
pub fn count_unmet(requirements: &[Requirement], state: &dyn RequirementState) -> usize {
    requirements.iter().filter(|r| !evaluate(r, state)).count()
}

fn resource_amount_met(
    state: &dyn RequirementState,
    target: &ResourceId,
    value: Decimal,
    operator: ComparisonOperator,
) -> bool {
    state
        .resource_amount(target)
        .is_some_and(|amount| operator.compare(amount, value))
}

fn structure_level_met(
    state: &dyn RequirementState,
    target: &StructureId,
    value: Decimal,
    operator: ComparisonOperator,
) -> bool {
    state
        .structure_level(target)
        .is_some_and(|level| operator.compare(Decimal::from(level), value))
}

fn game_stage_met(state: &dyn RequirementState, value: Decimal, operator: ComparisonOperator) -> bool {
    operator.compare(Decimal::from(state.game_stage()), value)
}

fn completion_count_met(
    state: &dyn RequirementState,
    target: &TaskId,
    value: Decimal,
    operator: ComparisonOperator,
) -> bool {
    state
        .task_completion_count(target)
        .is_some_and(|count| operator.compare(Decimal::from(count), value))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal_macros::dec;

    use super::*;

    #[derive(Default)]
    struct FixedState {
        amounts: BTreeMap<ResourceId, Decimal>,
        levels: BTreeMap<StructureId, u32>,
        stage: u32,
        completions: BTreeMap<TaskId, u32>,
    }

    impl RequirementState for FixedState {
        fn resource_amount(&self, id: &ResourceId) -> Option<Decimal> {
            self.amounts.get(id).copied()
        }
        fn structure_level(&self, id: &StructureId) -> Option<u32> {
            self.levels.get(id).copied()
        }
        fn game_stage(&self) -> u32 {
            self.stage
        }
        fn task_completion_count(&self, id: &TaskId) -> Option<u32> {
            self.completions.get(id).copied()
        }
    }

    fn state() -> FixedState {
        let mut s = FixedState {
            stage: 2,
            ..FixedState::default()
        };
        s.amounts.insert(ResourceId::from("solidarity"), dec!(50));
        s.levels.insert(StructureId::from("union_hall"), 1);
        s.completions.insert(TaskId::from("organize"), 3);
        s
    }

    #[test]
    fn resource_amount_requirement() {
        let s = state();
        let met = Requirement::ResourceAmount {
            target: ResourceId::from("solidarity"),
            value: dec!(50),
            operator: ComparisonOperator::Gte,
        };
        let unmet = Requirement::ResourceAmount {
            target: ResourceId::from("solidarity"),
            value: dec!(50),
            operator: ComparisonOperator::Gt,
        };
        assert!(evaluate(&met, &s));
        assert!(!evaluate(&unmet, &s));
    }

    #[test]
    fn missing_targets_are_not_satisfied() {
        let s = state();
        let reqs = [
            Requirement::ResourceAmount {
                target: ResourceId::from("ghost"),
                value: dec!(0),
                operator: ComparisonOperator::Gte,
            },
            Requirement::StructureLevel {
                target: StructureId::from("ghost"),
                value: dec!(0),
                operator: ComparisonOperator::Gte,
            },
            Requirement::TaskCompletionCount {
                target: TaskId::from("ghost"),
                value: dec!(0),
                operator: ComparisonOperator::Gte,
            },
        ];
        for req in &reqs {
            assert!(!evaluate(req, &s), "{req:?} should not be satisfied");
        }
        assert_eq!(count_unmet(&reqs, &s), 3);
    }

    #[test]
    fn stage_level_and_count_requirements() {
        let s = state();
        assert!(evaluate(
            &Requirement::GameStage {
                value: dec!(2),
                operator: ComparisonOperator::Eq,
            },
            &s
        ));
        assert!(evaluate(
            &Requirement::StructureLevel {
                target: StructureId::from("union_hall"),
                value: dec!(2),
                operator: ComparisonOperator::Lt,
            },
            &s
        ));
        assert!(evaluate(
            &Requirement::TaskCompletionCount {
                target: TaskId::from("organize"),
                value: dec!(3),
                operator: ComparisonOperator::Gte,
            },
            &s
        ));
    }

    #[test]
    fn empty_list_is_vacuously_true() {
        assert!(all_satisfied(&[], &state()));
    }
}
