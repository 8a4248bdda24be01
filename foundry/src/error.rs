//! Typed errors that callers branch on.
//!
//! Everything else travels as `anyhow::Error`; these are attached to it and
//! recovered with `downcast_ref`.

use thiserror::Error;

/// A plan document failed schema or semantic validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plan rejected: {}", .reasons.join("; "))]
pub struct PlanRejected {
    pub reasons: Vec<String>,
}

/// A task is missing configuration its agent cannot run without.
///
/// Aborts the current plan only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error in task {task_index} ({agent}): {message}")]
pub struct ConfigurationError {
    pub task_index: usize,
    pub agent: String,
    pub message: String,
}

/// The Generator or Planner returned an error or a failure sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("generator failure: {message}")]
pub struct GeneratorFailure {
    pub message: String,
}

impl GeneratorFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
