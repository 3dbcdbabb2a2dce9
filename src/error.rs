//! Typed failures surfaced to engine callers.
//!
//! The taxonomy maps onto caller-side HTTP handling (NotFound -> 404,
//! BadRequest -> 400, Conflict -> 409) but the engine never formats
//! user-facing messages beyond a short machine-readable reason.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced task or dependency does not exist, or is not visible to the
    /// requester. Ownership checks fold into this variant so that cross-user
    /// probes cannot distinguish "missing" from "someone else's".
    #[error("not found: {0}")]
    NotFound(String),

    /// Well-formed operation that violates a structural invariant
    /// (self-dependency, self-parenting, would-create-cycle).
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Duplicate dependency edge.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn task_not_found(task_id: &str) -> Self {
        EngineError::NotFound(format!("task {task_id}"))
    }

    pub fn dependency_not_found(dependency_id: &str) -> Self {
        EngineError::NotFound(format!("dependency {dependency_id}"))
    }

    pub fn self_dependency(task_id: &str) -> Self {
        EngineError::BadRequest(format!("task {task_id} cannot depend on itself"))
    }

    pub fn dependency_cycle(task_id: &str, depends_on_id: &str) -> Self {
        EngineError::BadRequest(format!(
            "dependency {task_id} -> {depends_on_id} would create a circular reference"
        ))
    }

    pub fn self_parent(task_id: &str) -> Self {
        EngineError::BadRequest(format!("task {task_id} cannot be its own parent"))
    }

    pub fn hierarchy_cycle(task_id: &str, parent_id: &str) -> Self {
        EngineError::BadRequest(format!(
            "parenting {task_id} under {parent_id} would create a circular hierarchy"
        ))
    }

    pub fn duplicate_dependency(task_id: &str, depends_on_id: &str) -> Self {
        EngineError::Conflict(format!(
            "dependency {task_id} -> {depends_on_id} already exists"
        ))
    }

    pub fn has_subtasks(task_id: &str) -> Self {
        EngineError::BadRequest(format!(
            "task {task_id} has subtasks; re-parent or delete them first"
        ))
    }

    pub fn not_a_template(task_id: &str) -> Self {
        EngineError::BadRequest(format!("task {task_id} is not a recurring template"))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
