//! # planout-experiments: Deterministic Experiment Assignment
//!
//! **Version**: 0.1.0
//!
//! Assigns units (usually users) to experiment variations with salted
//! hashing, so the same unit always receives the same assignment without any
//! decision being stored ahead of time. Experiments are defined as trees of
//! PlanOut-compatible JSON operators; exposures and goal achievements are
//! written through a pluggable [`store::ExperimentStore`] and aggregated into
//! per-variation results.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: closed operator set, malformed trees rejected at parse time
//! - **Jidoka**: exposures logged at most once per trial
//! - **Genchi Genbutsu**: results recomputed from raw exposure and achievement facts
//!
//! ## Example Usage
//!
//! ```rust
//! use planout_experiments::experiment::UnitIdentity;
//! use planout_experiments::store::MemoryStore;
//! use planout_experiments::Experiments;
//! use serde_json::{json, Map};
//!
//! let experiments = Experiments::builder(MemoryStore::new()).build()?;
//!
//! let unit = UnitIdentity::external("abc-123", "device_id");
//! let text = experiments.get_experiment_value(
//!     "signup_button",
//!     "button_text",
//!     Some(&unit),
//!     json!("Sign up"),
//!     Map::new(),
//! )?;
//! assert_eq!(text, json!("Sign up"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod clock;
pub mod config;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod random;
pub mod results;
pub mod script;
pub mod store;
pub mod text;
pub mod trial;

pub use config::Config;
pub use error::{Error, Result};

use clock::{Clock, SystemClock};
use experiment::{
    EventMeta, Experiment, ExperimentResult, Goal, GoalAchievement, NewGoalAchievement,
    RelatedObject, UnitIdentity, User,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use store::ExperimentStore;
use tracing::{info, warn};
use trial::{unit_inputs, Trial};

/// Entry point tying a store, a clock and a configuration together.
pub struct Experiments<S: ExperimentStore> {
    store: S,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<S: ExperimentStore> Experiments<S> {
    /// Create a builder around `store`.
    #[must_use]
    pub fn builder(store: S) -> ExperimentsBuilder<S> {
        ExperimentsBuilder::new(store)
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch an experiment by name, creating it on first reference.
    ///
    /// A new experiment is seeded from `control`: one variable per object
    /// entry, or the whole value under
    /// [`SINGLE_VALUE_KEY`](experiment::SINGLE_VALUE_KEY). An existing
    /// experiment is returned unchanged.
    ///
    /// # Errors
    /// Store errors, `InvalidOperator` if `control` holds a malformed operator
    pub fn get_experiment(&self, name: &str, control: &Value) -> Result<Experiment> {
        let (mut experiment, created) = self.store.get_or_create_experiment(name)?;
        if created {
            experiment.set_from_control(control)?;
            self.store.update_experiment(&experiment)?;
            info!(
                experiment = name,
                variables = ?experiment.output_variables(),
                "experiment created from control"
            );
        }
        Ok(experiment)
    }

    /// Value of `key` in experiment `name` for `unit`.
    ///
    /// Creates the experiment with `{key: control_value}` if needed. Without
    /// a complete unit identity nothing is evaluated or logged and
    /// `control_value` comes back. The control value is also returned when
    /// the definition does not bind `key`.
    ///
    /// # Errors
    /// Evaluation and store errors, `UserNotFound` for an unknown user
    pub fn get_experiment_value(
        &self,
        name: &str,
        key: &str,
        unit: Option<&UnitIdentity>,
        control_value: Value,
        extra_inputs: Map<String, Value>,
    ) -> Result<Value> {
        let mut control = Map::new();
        control.insert(key.to_string(), control_value.clone());
        let experiment = self.get_experiment(name, &Value::Object(control))?;

        let Some(unit) = unit.filter(|unit| unit.is_complete()) else {
            warn!(experiment = name, key, "no unit identity given, returning control value");
            return Ok(control_value);
        };

        let mut trial = self.trial_for_unit(experiment, unit, extra_inputs);
        trial.get_or(&self.store, key, control_value)
    }

    /// Trial for an internal user.
    #[must_use]
    pub fn trial_for_user(
        &self,
        experiment: Experiment,
        user: &User,
        extra_inputs: Map<String, Value>,
    ) -> Trial {
        self.trial_for_unit(experiment, &UnitIdentity::user(user.clone()), extra_inputs)
    }

    /// Trial for a raw identifier of the given type.
    #[must_use]
    pub fn trial_for_identifier(
        &self,
        experiment: Experiment,
        identifier: &str,
        identifier_type: &str,
        extra_inputs: Map<String, Value>,
    ) -> Trial {
        self.trial_for_unit(
            experiment,
            &UnitIdentity::external(identifier, identifier_type),
            extra_inputs,
        )
    }

    /// Trial for any unit. Unit inputs take precedence over `extra_inputs`.
    #[must_use]
    pub fn trial_for_unit(
        &self,
        experiment: Experiment,
        unit: &UnitIdentity,
        mut extra_inputs: Map<String, Value>,
    ) -> Trial {
        extra_inputs.extend(unit_inputs(unit, &self.config.internal_identifier_type));
        self.trial(experiment, extra_inputs)
    }

    /// Trial with raw inputs, configured like every facade trial.
    #[must_use]
    pub fn trial(&self, experiment: Experiment, inputs: Map<String, Value>) -> Trial {
        let trial = Trial::new(experiment, inputs)
            .with_clock(Arc::clone(&self.clock))
            .with_internal_identifier_type(self.config.internal_identifier_type.as_str())
            .with_event_source(self.config.data_source.clone(), self.config.app_version.clone());
        if self.config.auto_exposure_log {
            trial
        } else {
            trial.without_auto_exposure()
        }
    }

    /// Record that `unit` reached goal `goal_name`, creating the goal if
    /// needed.
    ///
    /// Returns `None` without writing anything when the unit identity is
    /// incomplete.
    ///
    /// # Errors
    /// Store errors
    pub fn log_achievement(
        &self,
        goal_name: &str,
        unit: &UnitIdentity,
        value: f64,
        related: Option<RelatedObject>,
    ) -> Result<Option<GoalAchievement>> {
        if !unit.is_complete() {
            warn!(goal = goal_name, "no unit identity given, achievement dropped");
            return Ok(None);
        }
        let goal = self.store.get_or_create_goal(goal_name)?;
        let mut achievement =
            NewGoalAchievement::new(goal.id(), unit.clone(), self.event_meta()).with_value(value);
        if let Some(related) = related {
            achievement = achievement.with_related(related.content_type, related.object_id);
        }
        self.store.create_goal_achievement(achievement).map(Some)
    }

    /// Attach goal `goal_name` to experiment `experiment_name`.
    ///
    /// # Errors
    /// `ExperimentNotFound` for an unknown experiment, store errors
    pub fn attach_goal(&self, experiment_name: &str, goal_name: &str) -> Result<Goal> {
        let experiment = self.require_experiment(experiment_name)?;
        let goal = self.store.get_or_create_goal(goal_name)?;
        self.store.attach_goal(experiment.id(), goal.id())?;
        Ok(goal)
    }

    /// Results per attached goal and variation of `experiment_name`.
    ///
    /// # Errors
    /// `ExperimentNotFound` for an unknown experiment, store errors
    pub fn goal_results(&self, experiment_name: &str) -> Result<Vec<(Goal, Vec<ExperimentResult>)>> {
        let experiment = self.require_experiment(experiment_name)?;
        results::goal_results(&self.store, experiment.id(), self.clock.now())
    }

    /// Count how `key` would be assigned across `units` without logging.
    ///
    /// # Errors
    /// `ExperimentNotFound` for an unknown experiment, evaluation errors
    pub fn preview_distribution(
        &self,
        experiment_name: &str,
        key: &str,
        units: &[Value],
    ) -> Result<BTreeMap<String, usize>> {
        let experiment = self.require_experiment(experiment_name)?;
        results::preview_distribution(&experiment, key, units)
    }

    fn require_experiment(&self, name: &str) -> Result<Experiment> {
        self.store
            .get_experiment(name)?
            .ok_or_else(|| Error::ExperimentNotFound(name.to_string()))
    }

    fn event_meta(&self) -> EventMeta {
        let mut meta = EventMeta::new(self.clock.now());
        if let Some(data_source) = &self.config.data_source {
            meta = meta.with_data_source(data_source.as_str());
        }
        if let Some(app_version) = &self.config.app_version {
            meta = meta.with_app_version(app_version.as_str());
        }
        meta
    }
}

/// Experiments builder
pub struct ExperimentsBuilder<S: ExperimentStore> {
    store: S,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<S: ExperimentStore> ExperimentsBuilder<S> {
    /// Builder with the system clock and default configuration.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: Config::default(),
        }
    }

    /// Set the time source for event timestamps
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the identifier type resolved to internal users
    #[must_use]
    pub fn internal_identifier_type(mut self, identifier_type: impl Into<String>) -> Self {
        self.config.internal_identifier_type = identifier_type.into();
        self
    }

    /// Enable or disable exposure logging on first value access
    #[must_use]
    pub const fn auto_exposure_log(mut self, enabled: bool) -> Self {
        self.config.auto_exposure_log = enabled;
        self
    }

    /// Set the data source recorded on events
    #[must_use]
    pub fn data_source(mut self, data_source: impl Into<String>) -> Self {
        self.config.data_source = Some(data_source.into());
        self
    }

    /// Set the app version recorded on events
    #[must_use]
    pub fn app_version(mut self, app_version: impl Into<String>) -> Self {
        self.config.app_version = Some(app_version.into());
        self
    }

    /// Build the facade
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate
    pub fn build(self) -> Result<Experiments<S>> {
        self.config.validate()?;
        Ok(Experiments {
            store: self.store,
            clock: self.clock,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn experiments() -> Experiments<MemoryStore> {
        Experiments::builder(MemoryStore::new()).build().unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let experiments = experiments();
        assert_eq!(experiments.config(), &Config::default());
    }

    #[test]
    fn test_builder_rejects_empty_identifier_type() {
        let result = Experiments::builder(MemoryStore::new())
            .internal_identifier_type("")
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_get_experiment_seeds_only_once() {
        let experiments = experiments();
        let first = experiments
            .get_experiment("exp", &json!({"color": "red"}))
            .unwrap();
        let second = experiments
            .get_experiment("exp", &json!({"color": "blue", "size": 2}))
            .unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(second.output_variables(), vec!["color"]);
    }

    #[test]
    fn test_user_trials_use_legacy_identifier_type() {
        let experiments = experiments();
        let experiment = experiments.get_experiment("exp", &json!({"color": "red"})).unwrap();
        let trial = experiments.trial_for_user(experiment, &User::new(7, "ana"), Map::new());

        assert_eq!(trial.inputs()["user_id"], json!(7));
        assert_eq!(trial.inputs()["user_identifier_type"], json!("django_user_db_id"));
    }

    #[test]
    fn test_value_without_unit_returns_control() {
        let experiments = experiments();
        let value = experiments
            .get_experiment_value("exp", "color", None, json!("red"), Map::new())
            .unwrap();
        assert_eq!(value, json!("red"));

        let incomplete = UnitIdentity::external("", "device_id");
        let value = experiments
            .get_experiment_value("exp", "color", Some(&incomplete), json!("red"), Map::new())
            .unwrap();
        assert_eq!(value, json!("red"));
        assert_eq!(experiments.store().exposure_count(), 0);
        assert_eq!(experiments.store().variation_count(), 0);
    }

    #[test]
    fn test_achievement_metadata_from_config() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let experiments = Experiments::builder(MemoryStore::new())
            .clock(FixedClock(at))
            .data_source("checkout")
            .app_version("1.0.0")
            .build()
            .unwrap();
        let unit = UnitIdentity::external("abc", "device_id");

        let achievement = experiments
            .log_achievement(
                "purchase",
                &unit,
                19.5,
                Some(RelatedObject {
                    content_type: "order".to_string(),
                    object_id: 7,
                }),
            )
            .unwrap()
            .unwrap();
        assert_eq!(achievement.meta().seen_at(), at);
        assert_eq!(achievement.meta().data_source(), Some("checkout"));
        assert_eq!(achievement.related().map(|r| r.object_id), Some(7));

        let dropped = experiments
            .log_achievement("purchase", &UnitIdentity::external("abc", ""), 1.0, None)
            .unwrap();
        assert!(dropped.is_none());
        assert_eq!(experiments.store().achievement_count(), 1);
    }

    #[test]
    fn test_unknown_experiment_lookups() {
        let experiments = experiments();
        assert!(matches!(
            experiments.goal_results("missing"),
            Err(Error::ExperimentNotFound(_))
        ));
        assert!(matches!(
            experiments.attach_goal("missing", "signup"),
            Err(Error::ExperimentNotFound(_))
        ));
        assert!(matches!(
            experiments.preview_distribution("missing", "x", &[]),
            Err(Error::ExperimentNotFound(_))
        ));
    }
}
