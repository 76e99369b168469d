//! Shared type definitions for the Accrual incremental simulation.
//!
//! This crate is the single source of truth for the data model used across
//! the Accrual workspace. Renderer-facing types flow downstream to
//! `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe string wrappers for data-defined identifiers
//! - [`enums`] -- Task status, comparison operators, effect kinds, error kinds
//! - [`requirement`] -- The closed [`Requirement`] variant gating unlocks
//! - [`structs`] -- Resources, task definitions, runtime state, tick samples
//!   and snapshots

pub mod enums;
pub mod ids;
pub mod requirement;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ComparisonOperator, EffectKind, ErrorKind, TaskStatus};
pub use ids::{ResourceId, StructureId, TaskId};
pub use requirement::Requirement;
pub use structs::{
    Progression, Resource, ResourceSnapshot, SimulationSnapshot, TaskDefinition, TaskProgress,
    TaskRuntime, TickSample,
};
