//! Error taxonomy for network construction and queries.

use thiserror::Error;

use crate::variable::VariableId;

/// Errors raised by CPT access, graph construction and probability queries.
///
/// Construction errors (`DuplicateId`, `SelfLoop`, `CycleDetected`, ...) always
/// leave the graph unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("variable `{id}` already exists")]
    DuplicateId { id: VariableId },

    #[error("unknown variable `{id}`")]
    UnknownVariable { id: VariableId },

    #[error("cannot add self-loop on `{id}`")]
    SelfLoop { id: VariableId },

    #[error("edge `{parent}` -> `{child}` would create a cycle")]
    CycleDetected {
        parent: VariableId,
        child: VariableId,
    },

    #[error("`{state}` is not a state of `{id}`")]
    InvalidState { id: VariableId, state: String },

    #[error("variable `{id}` must have at least one state")]
    EmptyStates { id: VariableId },

    #[error("variable `{id}` lists state `{state}` more than once")]
    DuplicateState { id: VariableId, state: String },

    #[error("probability {value} is outside [0, 1]")]
    OutOfRange { value: f64 },

    #[error("index error: {0}")]
    IndexError(String),

    #[error("invalid CPT shape {dimensions:?}: need at least one dimension, all non-zero, and a size that fits in usize")]
    InvalidShape { dimensions: Vec<usize> },

    #[error("CPT for `{id}` has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        id: VariableId,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("no CPT attached to `{id}`")]
    MissingCpt { id: VariableId },

    #[error("missing state for parent `{parent}` of `{id}`")]
    MissingParentAssignment { id: VariableId, parent: VariableId },

    #[error("assignment has no state for `{id}`")]
    MissingAssignment { id: VariableId },
}

impl NetworkError {
    /// Whether this error only says that one enumerated assignment cannot be
    /// scored (missing CPT or missing state), as opposed to a malformed query.
    pub fn is_assignment_gap(&self) -> bool {
        matches!(
            self,
            NetworkError::MissingCpt { .. }
                | NetworkError::MissingParentAssignment { .. }
                | NetworkError::MissingAssignment { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
