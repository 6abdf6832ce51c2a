//! Error types for planout-experiments
//!
//! Definition errors (malformed trees, unbound variables, type mismatches)
//! always reach the caller. Missing unit identity is not an error: the facade
//! degrades to the control value and logs a warning instead.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Experiment engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed operator node (unknown op, missing field, bad choice set)
    #[error("Invalid operator: {0}\nFix the experiment definition before evaluating it again")]
    InvalidOperator(String),

    /// `get` of a name that was never bound
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    /// Operand type mismatch inside an operator
    #[error("Type mismatch in '{op}': {detail}")]
    TypeMismatch {
        /// Operator name as written in the definition
        op: String,
        /// What was expected and what was found
        detail: String,
    },

    /// Definition JSON could not be parsed or serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store layer failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Internal user id did not resolve to a user
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Experiment lookup by name or id failed
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Builder or loaded configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn type_mismatch(op: &str, detail: impl Into<String>) -> Self {
        Self::TypeMismatch {
            op: op.to_string(),
            detail: detail.into(),
        }
    }
}
