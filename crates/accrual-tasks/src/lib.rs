//! Task registry, lifecycle state machine, and effect pipeline for the
//! Accrual simulation.
//!
//! # Modules
//!
//! - [`error`] -- [`TaskError`] and its mapping onto the error taxonomy.
//! - [`requirement`] -- Pure evaluation of [`Requirement`] predicates.
//! - [`effects`] -- [`EffectPipeline`], the only path that applies task
//!   costs and rewards to the ledger.
//! - [`registry`] -- [`TaskRegistry`]: task records, the single active task,
//!   and the `LOCKED -> AVAILABLE -> IN_PROGRESS -> COMPLETED` transitions.
//!
//! # Lifecycle
//!
//! Every transition validates before it mutates. A failed `start` leaves
//! the ledger and the task untouched; a successful one deducts the cost
//! through the pipeline inside the same call, so there is no second path
//! that could apply it again.
//!
//! [`Requirement`]: accrual_types::Requirement

pub mod effects;
pub mod error;
pub mod registry;
pub mod requirement;

pub use effects::{EffectPipeline, EffectRecord};
pub use error::TaskError;
pub use registry::{AdvanceOutcome, CompletionOutcome, Task, TaskRegistry};
pub use requirement::{RequirementState, all_satisfied, evaluate};
