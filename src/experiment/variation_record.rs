//! Variation Record - one observed (key, value) outcome of an experiment

use crate::text::python_str;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text form of an assigned value as stored on a variation.
///
/// Python's `str()` of the value, matching rows written by the legacy
/// system: `"blue"` becomes `blue`, `true` becomes `True` and `[1, 2]` stays
/// `[1, 2]`.
#[must_use]
pub fn variation_value(value: &Value) -> String {
    python_str(value)
}

/// Variation Record is unique per (experiment, key, value).
///
/// Variations are created lazily the first time a unit is exposed to the
/// outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variation {
    id: u64,
    experiment_id: u64,
    key: String,
    value: String,
    created_at: DateTime<Utc>,
}

impl Variation {
    /// Create a variation record.
    ///
    /// # Arguments
    ///
    /// * `id` - Store-assigned identifier
    /// * `experiment_id` - Parent experiment
    /// * `key` - Variable name
    /// * `value` - Text form of the assigned value, see [`variation_value`]
    /// * `created_at` - Creation timestamp
    #[must_use]
    pub fn new(
        id: u64,
        experiment_id: u64,
        key: impl Into<String>,
        value: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            experiment_id,
            key: key.into(),
            value: value.into(),
            created_at,
        }
    }

    /// Get the variation ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> u64 {
        self.experiment_id
    }

    /// Get the variable name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the stored value text.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Display for Variation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' = '{}' on experiment {}",
            self.key, self.value, self.experiment_id
        )
    }
}
