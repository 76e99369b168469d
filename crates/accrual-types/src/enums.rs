//! Enumeration types for the Accrual simulation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Task lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
///
/// ```text
/// LOCKED -> AVAILABLE -> IN_PROGRESS -> COMPLETED
///                ^            |             |
///                +-- cancel --+             |
///                +------ repeatable --------+
/// ```
///
/// `Completed` is terminal for non-repeatable tasks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum TaskStatus {
    /// Requirements have not been met yet.
    #[default]
    Locked,
    /// Unlocked and startable.
    Available,
    /// The single active task.
    InProgress,
    /// Finished. Terminal unless the task is repeatable.
    Completed,
}

impl TaskStatus {
    /// Return the wire name of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::Available => "AVAILABLE",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requirement comparison
// ---------------------------------------------------------------------------

/// Comparison applied between observed state and a requirement threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ComparisonOperator {
    /// `observed == threshold`
    Eq,
    /// `observed != threshold`
    Ne,
    /// `observed > threshold`
    Gt,
    /// `observed >= threshold`
    #[default]
    Gte,
    /// `observed < threshold`
    Lt,
    /// `observed <= threshold`
    Lte,
}

impl ComparisonOperator {
    /// Compare an observed value against a threshold.
    pub fn compare(self, observed: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Eq => observed == threshold,
            Self::Ne => observed != threshold,
            Self::Gt => observed > threshold,
            Self::Gte => observed >= threshold,
            Self::Lt => observed < threshold,
            Self::Lte => observed <= threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// The lifecycle transition an effect was applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EffectKind {
    /// Cost deducted when a task started.
    TaskStart,
    /// Rewards granted when a task completed.
    TaskComplete,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Category of a failed operation.
///
/// Every crate-level error maps onto one of these so callers can branch on
/// the category without matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, rejected before any mutation.
    Validation,
    /// The operation would violate an invariant; rejected before mutation.
    State,
    /// Unknown resource or task id.
    NotFound,
    /// Invalid configuration; the previous configuration is retained.
    Configuration,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn operators_compare() {
        assert!(ComparisonOperator::Gte.compare(dec!(5), dec!(5)));
        assert!(!ComparisonOperator::Gt.compare(dec!(5), dec!(5)));
        assert!(ComparisonOperator::Lt.compare(dec!(4.5), dec!(5)));
        assert!(ComparisonOperator::Lte.compare(dec!(5), dec!(5)));
        assert!(ComparisonOperator::Eq.compare(dec!(2.0), dec!(2)));
        assert!(ComparisonOperator::Ne.compare(dec!(1), dec!(2)));
    }

    #[test]
    fn default_operator_is_gte() {
        assert_eq!(ComparisonOperator::default(), ComparisonOperator::Gte);
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&TaskStatus::InProgress).ok();
        assert_eq!(json.as_deref(), Some("\"IN_PROGRESS\""));
        assert_eq!(TaskStatus::Available.to_string(), "AVAILABLE");
    }
}
