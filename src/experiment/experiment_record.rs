//! Experiment Record - named, salted container for one definition

use crate::script::Script;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key used when a non-object control value seeds a new experiment.
pub const SINGLE_VALUE_KEY: &str = "single_value";

/// Experiment Record holds the definition evaluated for every unit.
///
/// The salt is always the experiment name. Renaming an experiment would
/// reshuffle every unit, so the name is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    id: u64,
    name: String,
    definition: Script,
    goal_ids: Vec<u64>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Experiment {
    /// Create an experiment with the empty definition `{"op": "seq", "seq": []}`.
    ///
    /// # Arguments
    ///
    /// * `id` - Store-assigned identifier
    /// * `name` - Unique name, also the hashing salt
    /// * `created_at` - Creation timestamp
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            definition: Script::empty(),
            goal_ids: Vec::new(),
            created_at,
            modified_at: created_at,
        }
    }

    /// Create a builder for an experiment with a custom definition.
    #[must_use]
    pub fn builder(id: u64, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the hashing salt (always the name).
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.name
    }

    /// Get the definition.
    #[must_use]
    pub const fn definition(&self) -> &Script {
        &self.definition
    }

    /// Replace the definition.
    pub fn set_definition(&mut self, definition: Script) {
        self.definition = definition;
    }

    /// Goals whose results are reported for this experiment.
    #[must_use]
    pub fn goal_ids(&self) -> &[u64] {
        &self.goal_ids
    }

    /// Attach a goal; attaching twice is a no-op.
    pub fn attach_goal(&mut self, goal_id: u64) {
        if !self.goal_ids.contains(&goal_id) {
            self.goal_ids.push(goal_id);
        }
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the last modification timestamp.
    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Record a modification time.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.modified_at = at;
    }

    /// Append `set key = value` to the definition.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if the definition root is not a `seq`
    pub fn add_variable(&mut self, key: impl Into<String>, value: &Value) -> Result<()> {
        self.definition.append_set(key, value)
    }

    /// Seed the definition with control values.
    ///
    /// An object adds one variable per entry; anything else is stored under
    /// [`SINGLE_VALUE_KEY`].
    ///
    /// # Errors
    /// Returns `InvalidOperator` if the definition root is not a `seq`
    pub fn set_from_control(&mut self, control: &Value) -> Result<()> {
        match control {
            Value::Object(entries) => {
                for (key, value) in entries {
                    self.add_variable(key.clone(), value)?;
                }
                Ok(())
            }
            other => self.add_variable(SINGLE_VALUE_KEY, other),
        }
    }

    /// Variables the definition can bind.
    #[must_use]
    pub fn output_variables(&self) -> Vec<String> {
        self.definition.output_variables()
    }

    /// Evaluate the definition for `inputs` without logging anything.
    ///
    /// # Errors
    /// Propagates evaluation errors
    pub fn params(&self, inputs: Map<String, Value>) -> Result<BTreeMap<String, Value>> {
        self.definition.params(self.salt(), inputs)
    }
}

impl std::fmt::Display for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: u64,
    name: String,
    definition: Script,
    created_at: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            definition: Script::empty(),
            created_at: Utc::now(),
        }
    }

    /// Set the definition.
    #[must_use]
    pub fn definition(mut self, definition: Script) -> Self {
        self.definition = definition;
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the `Experiment`.
    #[must_use]
    pub fn build(self) -> Experiment {
        let mut experiment = Experiment::new(self.id, self.name, self.created_at);
        experiment.definition = self.definition;
        experiment
    }
}
