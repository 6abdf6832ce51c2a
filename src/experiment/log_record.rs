//! Experiment Log - free-form events written from a trial

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Append-only log entry for an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentLog {
    id: u64,
    experiment_id: u64,
    data: Value,
    created_at: DateTime<Utc>,
}

impl ExperimentLog {
    /// Create a log entry.
    #[must_use]
    pub const fn new(id: u64, experiment_id: u64, data: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            experiment_id,
            data,
            created_at,
        }
    }

    /// Get the entry ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> u64 {
        self.experiment_id
    }

    /// Get the logged data.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
