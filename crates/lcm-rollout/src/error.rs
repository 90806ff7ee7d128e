//! Reconciliation error types.

use lcm_state::StateError;
use thiserror::Error;

/// Errors that end (or, for `Decode`, blemish) a reconciliation pass.
///
/// Nothing is retried in-process; the scheduler requeues the group.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A referenced site, common set, or expected policy is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A policy template payload is malformed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A concurrent writer changed the object since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("state store error: {0}")]
    State(StateError),
}

impl From<StateError> for ReconcileError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(what) => Self::NotFound(what),
            StateError::Conflict(what) => Self::Conflict(what),
            other => Self::State(other),
        }
    }
}

impl ReconcileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
