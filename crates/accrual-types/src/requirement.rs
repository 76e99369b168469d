//! Requirements gating the `LOCKED -> AVAILABLE` task transition.
//!
//! A requirement is a closed tagged variant over the four kinds of state a
//! task can depend on. Evaluation lives in `accrual-tasks`; this module only
//! defines the shape.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::ComparisonOperator;
use crate::ids::{ResourceId, StructureId, TaskId};

/// A pure predicate over simulation state.
///
/// Serialized with a `kind` tag:
///
/// ```yaml
/// - { kind: resource_amount, target: solidarity, value: 50, operator: gte }
/// - { kind: game_stage, value: 1 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Requirement {
    /// The amount of a resource compared against `value`.
    ResourceAmount {
        /// Resource whose amount is observed.
        target: ResourceId,
        /// Threshold.
        #[ts(as = "String")]
        value: Decimal,
        /// Comparison applied as `amount <op> value`.
        #[serde(default)]
        operator: ComparisonOperator,
    },
    /// The level of a structure compared against `value`.
    StructureLevel {
        /// Structure whose level is observed.
        target: StructureId,
        /// Threshold.
        #[ts(as = "String")]
        value: Decimal,
        /// Comparison applied as `level <op> value`.
        #[serde(default)]
        operator: ComparisonOperator,
    },
    /// The global game stage compared against `value`.
    GameStage {
        /// Threshold.
        #[ts(as = "String")]
        value: Decimal,
        /// Comparison applied as `stage <op> value`.
        #[serde(default)]
        operator: ComparisonOperator,
    },
    /// How many times a task has completed, compared against `value`.
    TaskCompletionCount {
        /// Task whose completion count is observed.
        target: TaskId,
        /// Threshold.
        #[ts(as = "String")]
        value: Decimal,
        /// Comparison applied as `count <op> value`.
        #[serde(default)]
        operator: ComparisonOperator,
    },
}

impl Requirement {
    /// Threshold the observed value is compared against.
    pub const fn value(&self) -> Decimal {
        match self {
            Self::ResourceAmount { value, .. }
            | Self::StructureLevel { value, .. }
            | Self::GameStage { value, .. }
            | Self::TaskCompletionCount { value, .. } => *value,
        }
    }

    /// Comparison operator of the requirement.
    pub const fn operator(&self) -> ComparisonOperator {
        match self {
            Self::ResourceAmount { operator, .. }
            | Self::StructureLevel { operator, .. }
            | Self::GameStage { operator, .. }
            | Self::TaskCompletionCount { operator, .. } => *operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn operator_defaults_to_gte() {
        let json = r#"{"kind":"game_stage","value":"2"}"#;
        let req: Result<Requirement, _> = serde_json::from_str(json);
        assert!(req.is_ok());
        if let Ok(req) = req {
            assert_eq!(req.operator(), ComparisonOperator::Gte);
            assert_eq!(req.value(), dec!(2));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{"kind":"moon_phase","value":"1"}"#;
        let req: Result<Requirement, _> = serde_json::from_str(json);
        assert!(req.is_err());
    }
}
