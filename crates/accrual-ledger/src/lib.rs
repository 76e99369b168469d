//! Resource ledger for the Accrual simulation.
//!
//! The [`ResourceLedger`] exclusively owns every [`Resource`] record. Amounts
//! change in exactly two ways:
//!
//! - **Accrual** -- `amount += per_second * delta` for every resource, once
//!   per tick, all-or-nothing.
//! - **Applied deltas** -- task costs and rewards routed through the effect
//!   pipeline in `accrual-tasks`.
//!
//! Both paths clamp the result to `[0, max_amount]`. All quantities are
//! [`Decimal`]; there is no floating point in the ledger.
//!
//! # Usage
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use accrual_ledger::ResourceLedger;
//! use accrual_types::{Resource, ResourceId};
//! use rust_decimal::Decimal;
//!
//! let mut ledger = ResourceLedger::new();
//! ledger
//!     .register(Resource {
//!         id: ResourceId::from("solidarity"),
//!         name: "Solidarity".to_owned(),
//!         amount: Decimal::new(100, 0),
//!         per_second: Decimal::ONE,
//!         max_amount: None,
//!         unlocked: true,
//!         category: "core".to_owned(),
//!     })
//!     .ok();
//!
//! ledger.accrue(Decimal::new(10, 0)).ok();
//! assert_eq!(ledger.amount(&ResourceId::from("solidarity")), Some(Decimal::new(110, 0)));
//!
//! let mut cost = BTreeMap::new();
//! cost.insert(ResourceId::from("solidarity"), Decimal::new(50, 0));
//! assert!(ledger.can_afford(&cost));
//! ```
//!
//! [`Resource`]: accrual_types::Resource
//! [`Decimal`]: rust_decimal::Decimal

pub mod ledger;

pub use ledger::{ApplyReport, RepeatCapacity, ResourceLedger};

use accrual_types::{ErrorKind, ResourceId};
use rust_decimal::Decimal;

/// Errors that can occur on ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The resource id is not registered.
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// A resource with this id is already registered.
    #[error("duplicate resource id: {0}")]
    DuplicateResource(ResourceId),

    /// The resource record violates a ledger invariant.
    #[error("invalid resource {id}: {reason}")]
    InvalidResource {
        /// The offending resource.
        id: ResourceId,
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Accrual was requested for a negative time delta.
    #[error("accrual delta must not be negative, got {delta}")]
    NegativeDelta {
        /// The rejected delta in seconds.
        delta: Decimal,
    },

    /// Checked decimal arithmetic overflowed.
    #[error("arithmetic overflow while updating {resource}")]
    ArithmeticOverflow {
        /// The resource being updated.
        resource: ResourceId,
    },
}

impl LedgerError {
    /// Category of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateResource(_) | Self::InvalidResource { .. } | Self::NegativeDelta { .. } => {
                ErrorKind::Validation
            }
            Self::ArithmeticOverflow { .. } => ErrorKind::State,
        }
    }
}
