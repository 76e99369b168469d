//! The data-defined catalog of resources and tasks.
//!
//! The simulation never decides what exists. A [`Catalog`] is read from
//! YAML (`catalog.yaml`), validated as a whole, and only then loaded into a
//! [`Simulation`](crate::simulation::Simulation).

use std::collections::BTreeSet;
use std::path::Path;

use accrual_ledger::LedgerError;
use accrual_tasks::TaskError;
use accrual_types::{ErrorKind, Requirement, Resource, ResourceId, TaskDefinition, TaskId};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Errors that can occur when loading or validating a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Failed to read the catalog file from disk.
    #[error("failed to read catalog file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse catalog YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// Two resources share an id.
    #[error("duplicate resource id: {0}")]
    DuplicateResource(ResourceId),

    /// Two tasks share an id.
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),

    /// A task references a resource the catalog does not define.
    #[error("task {task} references unknown resource {resource}")]
    UnknownResource {
        /// The referencing task.
        task: TaskId,
        /// The missing resource.
        resource: ResourceId,
    },

    /// A task requirement references a task the catalog does not define.
    #[error("task {task} references unknown task {target}")]
    UnknownTask {
        /// The referencing task.
        task: TaskId,
        /// The missing task.
        target: TaskId,
    },

    /// A task definition is malformed.
    #[error("invalid task {id}: {reason}")]
    InvalidTask {
        /// The offending task.
        id: TaskId,
        /// Explanation of what is wrong.
        reason: String,
    },

    /// The ledger rejected a resource.
    #[error("resource rejected: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// The registry rejected a task.
    #[error("task rejected: {source}")]
    Task {
        /// The underlying task error.
        #[from]
        source: TaskError,
    },
}

impl From<serde_yml::Error> for CatalogError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl CatalogError {
    /// Category of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Yaml { .. } => ErrorKind::Configuration,
            Self::UnknownResource { .. } | Self::UnknownTask { .. } => ErrorKind::NotFound,
            Self::DuplicateResource(_) | Self::DuplicateTask(_) | Self::InvalidTask { .. } => {
                ErrorKind::Validation
            }
            Self::Ledger { source } => source.kind(),
            Self::Task { source } => source.kind(),
        }
    }
}

/// Resources and tasks, in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Catalog {
    /// Resource definitions.
    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Task definitions, in registration order.
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

impl Catalog {
    /// Load a catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the file cannot be read, or
    /// [`CatalogError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a catalog from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, CatalogError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Check ids, references and numeric ranges across the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut resource_ids = BTreeSet::new();
        for resource in &self.resources {
            if !resource_ids.insert(&resource.id) {
                return Err(CatalogError::DuplicateResource(resource.id.clone()));
            }
        }

        let mut task_ids = BTreeSet::new();
        for task in &self.tasks {
            if task.id.is_blank() {
                return Err(CatalogError::Task {
                    source: TaskError::InvalidId,
                });
            }
            if !task_ids.insert(&task.id) {
                return Err(CatalogError::DuplicateTask(task.id.clone()));
            }
        }

        for task in &self.tasks {
            validate_task(task, &resource_ids, &task_ids)?;
        }
        Ok(())
    }
}

fn validate_task(
    task: &TaskDefinition,
    resources: &BTreeSet<&ResourceId>,
    tasks: &BTreeSet<&TaskId>,
) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidTask {
        id: task.id.clone(),
        reason,
    };
    let unknown_resource = |resource: &ResourceId| CatalogError::UnknownResource {
        task: task.id.clone(),
        resource: resource.clone(),
    };

    if task.duration_seconds <= Decimal::ZERO {
        return Err(invalid(format!(
            "duration_seconds must be positive, got {}",
            task.duration_seconds
        )));
    }
    if let Some(cooldown) = task.cooldown_seconds.filter(|c| *c < Decimal::ZERO) {
        return Err(invalid(format!(
            "cooldown_seconds must not be negative, got {cooldown}"
        )));
    }

    for (label, entries) in [("cost", &task.cost), ("reward", &task.rewards)] {
        for (resource, amount) in entries {
            if !resources.contains(resource) {
                return Err(unknown_resource(resource));
            }
            if *amount < Decimal::ZERO {
                return Err(invalid(format!(
                    "{label} for {resource} must not be negative, got {amount}"
                )));
            }
        }
    }

    for requirement in &task.requirements {
        match requirement {
            Requirement::ResourceAmount { target, .. } if !resources.contains(target) => {
                return Err(unknown_resource(target));
            }
            Requirement::TaskCompletionCount { target, .. } if !tasks.contains(target) => {
                return Err(CatalogError::UnknownTask {
                    task: task.id.clone(),
                    target: target.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}
