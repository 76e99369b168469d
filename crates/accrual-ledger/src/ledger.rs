//! The resource ledger: amounts, rates, bounds and unlock flags.
//!
//! # Design
//!
//! - **Exclusive ownership**: resource records live only here; other
//!   components read through `&ResourceLedger` or a snapshot.
//! - **Clamped**: every mutation leaves `0 <= amount <= max_amount`.
//! - **All-or-nothing accrual**: new amounts are computed for every
//!   resource before any is written, so an overflow leaves the ledger
//!   untouched.
//! - **Best-effort deltas**: [`ResourceLedger::apply`] applies every known
//!   entry and reports unknown ids instead of aborting.

use std::collections::BTreeMap;

use accrual_types::{Resource, ResourceId, ResourceSnapshot};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, warn};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// How many times a cost can be paid from current amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCapacity {
    /// The cost is empty (or all zero): it can be paid indefinitely.
    Unlimited,
    /// The cost can be paid this many times.
    Limited(u64),
}

impl RepeatCapacity {
    /// Whether the cost can be paid at least `runs` times.
    pub const fn allows(self, runs: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(n) => n >= runs,
        }
    }
}

/// Outcome of [`ResourceLedger::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Net change actually applied per resource, after clamping.
    pub applied: BTreeMap<ResourceId, Decimal>,
    /// Per-entry failures. The remaining entries were still applied.
    pub errors: Vec<LedgerError>,
}

impl ApplyReport {
    /// Whether every entry was applied.
    pub const fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Holds every named resource and applies accrual and deltas to it.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    /// Resources keyed by id. Iteration order is id order, which keeps
    /// accrual and snapshots deterministic.
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceLedger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// Register a resource. Called once per resource at catalog load.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateResource`] if the id is taken, or
    /// [`LedgerError::InvalidResource`] if the id is blank, the amount is
    /// negative, or the amount exceeds the upper bound.
    pub fn register(&mut self, resource: Resource) -> Result<(), LedgerError> {
        validate_resource(&resource)?;
        if self.resources.contains_key(&resource.id) {
            return Err(LedgerError::DuplicateResource(resource.id));
        }
        debug!(resource = %resource.id, amount = %resource.amount, "Resource registered");
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Return the number of registered resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Return whether no resources are registered.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether the id is registered.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Look up a resource.
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Current amount of a resource.
    pub fn amount(&self, id: &ResourceId) -> Option<Decimal> {
        self.resources.get(id).map(|r| r.amount)
    }

    /// Iterate over resources in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    // -----------------------------------------------------------------------
    // Accrual
    // -----------------------------------------------------------------------

    /// Advance every resource by `delta_seconds` of simulated time.
    ///
    /// `amount = clamp(amount + per_second * delta_seconds, 0, max_amount)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NegativeDelta`] for a negative delta and
    /// [`LedgerError::ArithmeticOverflow`] if any product or sum overflows.
    /// On error no resource is modified.
    pub fn accrue(&mut self, delta_seconds: Decimal) -> Result<(), LedgerError> {
        if delta_seconds < Decimal::ZERO {
            return Err(LedgerError::NegativeDelta {
                delta: delta_seconds,
            });
        }
        if delta_seconds.is_zero() {
            return Ok(());
        }

        let mut next = Vec::with_capacity(self.resources.len());
        for resource in self.resources.values() {
            if resource.per_second.is_zero() {
                continue;
            }
            let overflow = || LedgerError::ArithmeticOverflow {
                resource: resource.id.clone(),
            };
            let gained = resource
                .per_second
                .checked_mul(delta_seconds)
                .ok_or_else(overflow)?;
            let raw = resource.amount.checked_add(gained).ok_or_else(overflow)?;
            next.push((resource.id.clone(), clamp_amount(raw, resource.max_amount)));
        }

        for (id, amount) in next {
            if let Some(resource) = self.resources.get_mut(&id) {
                resource.amount = amount;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Costs and deltas
    // -----------------------------------------------------------------------

    /// Whether every referenced resource is unlocked and holds at least the
    /// required amount. An empty cost is always affordable.
    pub fn can_afford(&self, cost: &BTreeMap<ResourceId, Decimal>) -> bool {
        cost.iter().all(|(id, required)| {
            self.resources
                .get(id)
                .is_some_and(|r| r.unlocked && r.amount >= *required)
        })
    }

    /// Adjust amounts by signed deltas, clamping each result to its bounds.
    ///
    /// Unknown ids are reported in [`ApplyReport::errors`] and skipped; the
    /// other entries are still applied. Locked resources take deltas too.
    pub fn apply(&mut self, deltas: &BTreeMap<ResourceId, Decimal>) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (id, delta) in deltas {
            let Some(resource) = self.resources.get_mut(id) else {
                warn!(resource = %id, %delta, "Delta for unknown resource skipped");
                report.errors.push(LedgerError::ResourceNotFound(id.clone()));
                continue;
            };
            let Some(raw) = resource.amount.checked_add(*delta) else {
                warn!(resource = %id, %delta, "Delta overflowed; skipped");
                report.errors.push(LedgerError::ArithmeticOverflow {
                    resource: id.clone(),
                });
                continue;
            };
            let before = resource.amount;
            resource.amount = clamp_amount(raw, resource.max_amount);
            let change = resource.amount.checked_sub(before).unwrap_or(Decimal::ZERO);
            report.applied.insert(id.clone(), change);
        }
        report
    }

    /// How many times `cost` can be paid from current amounts.
    ///
    /// The minimum over positive-cost entries of `floor(amount / cost)`.
    /// Zero-cost entries are ignored, so empty or all-zero costs are
    /// [`RepeatCapacity::Unlimited`]. A positive cost naming a missing or
    /// locked resource is `Limited(0)`. Counts too large for `u64` saturate.
    pub fn max_repeatable_actions(&self, cost: &BTreeMap<ResourceId, Decimal>) -> RepeatCapacity {
        let mut capacity = RepeatCapacity::Unlimited;
        for (id, required) in cost {
            if *required <= Decimal::ZERO {
                continue;
            }
            let Some(resource) = self.resources.get(id).filter(|r| r.unlocked) else {
                return RepeatCapacity::Limited(0);
            };
            // Amounts are never negative, so a quotient that does not fit
            // (or overflows the division) saturates.
            let runs = resource
                .amount
                .checked_div(*required)
                .map_or(u64::MAX, |q| q.floor().to_u64().unwrap_or(u64::MAX));
            capacity = match capacity {
                RepeatCapacity::Unlimited => RepeatCapacity::Limited(runs),
                RepeatCapacity::Limited(n) => RepeatCapacity::Limited(n.min(runs)),
            };
        }
        capacity
    }

    // -----------------------------------------------------------------------
    // Resource mutation
    // -----------------------------------------------------------------------

    /// Mark a resource unlocked. Returns `true` if it was locked before.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ResourceNotFound`] for an unknown id.
    pub fn unlock(&mut self, id: &ResourceId) -> Result<bool, LedgerError> {
        let resource = self.get_mut(id)?;
        let was_locked = !resource.unlocked;
        resource.unlocked = true;
        Ok(was_locked)
    }

    /// Replace the accrual rate of a resource.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ResourceNotFound`] for an unknown id.
    pub fn set_per_second(&mut self, id: &ResourceId, per_second: Decimal) -> Result<(), LedgerError> {
        self.get_mut(id)?.per_second = per_second;
        Ok(())
    }

    /// Replace the upper bound of a resource, clamping the current amount.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ResourceNotFound`] for an unknown id, or
    /// [`LedgerError::InvalidResource`] for a negative bound.
    pub fn set_max_amount(
        &mut self,
        id: &ResourceId,
        max_amount: Option<Decimal>,
    ) -> Result<(), LedgerError> {
        if let Some(max) = max_amount.filter(|m| *m < Decimal::ZERO) {
            return Err(LedgerError::InvalidResource {
                id: id.clone(),
                reason: format!("max_amount must not be negative, got {max}"),
            });
        }
        let resource = self.get_mut(id)?;
        resource.max_amount = max_amount;
        resource.amount = clamp_amount(resource.amount, max_amount);
        Ok(())
    }

    fn get_mut(&mut self, id: &ResourceId) -> Result<&mut Resource, LedgerError> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| LedgerError::ResourceNotFound(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Export the mutable state of every resource.
    pub fn snapshot(&self) -> BTreeMap<ResourceId, ResourceSnapshot> {
        self.resources
            .iter()
            .map(|(id, r)| (id.clone(), ResourceSnapshot::from(r)))
            .collect()
    }

    /// Overwrite resource state from a snapshot.
    ///
    /// Entries for unknown resources are skipped and returned. Restored
    /// amounts are clamped to their bounds.
    pub fn restore(&mut self, snapshot: &BTreeMap<ResourceId, ResourceSnapshot>) -> Vec<ResourceId> {
        let mut unknown = Vec::new();
        for (id, state) in snapshot {
            let Some(resource) = self.resources.get_mut(id) else {
                warn!(resource = %id, "Snapshot entry for unknown resource skipped");
                unknown.push(id.clone());
                continue;
            };
            resource.per_second = state.per_second;
            resource.max_amount = state.max_amount;
            resource.unlocked = state.unlocked;
            resource.amount = clamp_amount(state.amount, state.max_amount);
        }
        unknown
    }
}

/// Clamp an amount to `[0, max]`.
fn clamp_amount(amount: Decimal, max: Option<Decimal>) -> Decimal {
    let floored = amount.max(Decimal::ZERO);
    match max {
        Some(max) => floored.min(max.max(Decimal::ZERO)),
        None => floored,
    }
}

fn validate_resource(resource: &Resource) -> Result<(), LedgerError> {
    let invalid = |reason: String| LedgerError::InvalidResource {
        id: resource.id.clone(),
        reason,
    };
    if resource.id.is_blank() {
        return Err(invalid("id must not be blank".to_owned()));
    }
    if resource.amount < Decimal::ZERO {
        return Err(invalid(format!(
            "amount must not be negative, got {}",
            resource.amount
        )));
    }
    if let Some(max) = resource.max_amount {
        if max < Decimal::ZERO {
            return Err(invalid(format!("max_amount must not be negative, got {max}")));
        }
        if resource.amount > max {
            return Err(invalid(format!(
                "amount {} exceeds max_amount {max}",
                resource.amount
            )));
        }
    }
    Ok(())
}
