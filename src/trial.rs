//! Trial - one evaluation of an experiment for one unit
//!
//! A trial binds an [`Experiment`] to runtime inputs, evaluates the
//! definition lazily on first access and memoizes the result. Exposures are
//! written through the store at most once per trial.
//!
//! ```text
//! Unevaluated ──evaluate──> Evaluated ──log_exposure──> Exposed
//! ```
//!
//! Inputs carry the unit under [`UNIT_INPUT`] and what kind of identifier it
//! is under [`IDENTIFIER_TYPE_INPUT`]. The identifier type decides how the
//! exposure is attributed: the configured internal type resolves a user
//! through the store, anything else is recorded as a raw identifier.

use crate::clock::{Clock, SystemClock};
use crate::experiment::{
    variation_value, EventMeta, Experiment, ExperimentLog, NewExposure, UnitIdentity,
};
use crate::random::unit_string;
use crate::script::{Environment, Evaluator};
use crate::store::ExperimentStore;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Input holding the unit identifier.
pub const UNIT_INPUT: &str = "user_id";

/// Input holding the unit identifier type.
pub const IDENTIFIER_TYPE_INPUT: &str = "user_identifier_type";

/// Identifier type that names internal user ids, as written on legacy
/// exposure rows.
pub const DEFAULT_INTERNAL_IDENTIFIER_TYPE: &str = "django_user_db_id";

/// Inputs identifying `unit` to a trial.
///
/// Users are keyed by their id under `internal_identifier_type`; raw
/// identifiers keep their own type.
#[must_use]
pub fn unit_inputs(unit: &UnitIdentity, internal_identifier_type: &str) -> Map<String, Value> {
    let mut inputs = Map::new();
    match unit {
        UnitIdentity::User { user } => {
            inputs.insert(UNIT_INPUT.to_string(), Value::from(user.id()));
            inputs.insert(
                IDENTIFIER_TYPE_INPUT.to_string(),
                Value::from(internal_identifier_type),
            );
        }
        UnitIdentity::External {
            identifier,
            identifier_type,
        } => {
            inputs.insert(UNIT_INPUT.to_string(), Value::from(identifier.as_str()));
            inputs.insert(
                IDENTIFIER_TYPE_INPUT.to_string(),
                Value::from(identifier_type.as_str()),
            );
        }
    }
    inputs
}

/// Values bound by one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    values: BTreeMap<String, Value>,
    in_experiment: bool,
}

impl Assignment {
    /// All bound variables, sorted by name.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// One bound variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// False when a `return` excluded the unit.
    #[must_use]
    pub const fn in_experiment(&self) -> bool {
        self.in_experiment
    }
}

/// Lifecycle of a trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialState {
    /// Definition not evaluated yet
    Unevaluated,
    /// Evaluated, exposures not written
    Evaluated(Assignment),
    /// Evaluated and exposures written
    Exposed(Assignment),
}

impl TrialState {
    /// The assignment, once evaluated.
    #[must_use]
    pub const fn assignment(&self) -> Option<&Assignment> {
        match self {
            Self::Unevaluated => None,
            Self::Evaluated(assignment) | Self::Exposed(assignment) => Some(assignment),
        }
    }

    /// Whether exposures have been written.
    #[must_use]
    pub const fn is_exposed(&self) -> bool {
        matches!(self, Self::Exposed(_))
    }

    fn mark_exposed(&mut self) {
        if let Self::Evaluated(assignment) = std::mem::replace(self, Self::Unevaluated) {
            *self = Self::Exposed(assignment);
        }
    }
}

/// One evaluation of an experiment for one unit.
///
/// # Example
///
/// ```rust
/// use planout_experiments::store::{ExperimentStore, MemoryStore};
/// use planout_experiments::trial::{unit_inputs, Trial};
/// use planout_experiments::experiment::UnitIdentity;
/// use serde_json::json;
///
/// # fn example() -> planout_experiments::Result<()> {
/// let store = MemoryStore::new();
/// let (mut experiment, _) = store.get_or_create_experiment("button_test")?;
/// experiment.add_variable("button_text", &json!("Sign up"))?;
///
/// let unit = UnitIdentity::external("abc-123", "device_id");
/// let mut trial = Trial::new(experiment, unit_inputs(&unit, "django_user_db_id"));
/// assert_eq!(trial.get(&store, "button_text")?, json!("Sign up"));
/// assert!(trial.state().is_exposed());
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Trial {
    experiment: Experiment,
    inputs: Map<String, Value>,
    salt: String,
    overrides: BTreeMap<String, Value>,
    auto_exposure_log: bool,
    internal_identifier_type: String,
    clock: Arc<dyn Clock>,
    data_source: Option<String>,
    app_version: Option<String>,
    state: TrialState,
}

impl Trial {
    /// Create an unevaluated trial salted with the experiment salt.
    #[must_use]
    pub fn new(experiment: Experiment, inputs: Map<String, Value>) -> Self {
        let salt = experiment.salt().to_string();
        Self {
            experiment,
            inputs,
            salt,
            overrides: BTreeMap::new(),
            auto_exposure_log: true,
            internal_identifier_type: DEFAULT_INTERNAL_IDENTIFIER_TYPE.to_string(),
            clock: Arc::new(SystemClock),
            data_source: None,
            app_version: None,
            state: TrialState::Unevaluated,
        }
    }

    /// Hash with `salt` instead of the experiment salt.
    #[must_use]
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Fix variables to given values regardless of the definition.
    #[must_use]
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Value>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Only write exposures on an explicit [`Trial::log_exposure`].
    #[must_use]
    pub const fn without_auto_exposure(mut self) -> Self {
        self.auto_exposure_log = false;
        self
    }

    /// Timestamp exposures with `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Identifier type resolved through [`ExperimentStore::find_user`].
    #[must_use]
    pub fn with_internal_identifier_type(mut self, identifier_type: impl Into<String>) -> Self {
        self.internal_identifier_type = identifier_type.into();
        self
    }

    /// Data source and app version recorded on exposures.
    #[must_use]
    pub fn with_event_source(
        mut self,
        data_source: Option<String>,
        app_version: Option<String>,
    ) -> Self {
        self.data_source = data_source;
        self.app_version = app_version;
        self
    }

    /// The experiment under trial.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Salt used for hashing.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Runtime inputs.
    #[must_use]
    pub const fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &TrialState {
        &self.state
    }

    /// Value of `name`, evaluating and logging exposures on first use.
    ///
    /// # Errors
    /// - `UndefinedVariable`: the definition did not bind `name`
    /// - evaluation and store errors
    pub fn get<S: ExperimentStore + ?Sized>(&mut self, store: &S, name: &str) -> Result<Value> {
        self.lookup(store, name)?
            .ok_or_else(|| Error::UndefinedVariable(name.to_string()))
    }

    /// Value of `name`, or `default` when the definition did not bind it.
    ///
    /// # Errors
    /// Evaluation and store errors
    pub fn get_or<S: ExperimentStore + ?Sized>(
        &mut self,
        store: &S,
        name: &str,
        default: Value,
    ) -> Result<Value> {
        Ok(self.lookup(store, name)?.unwrap_or(default))
    }

    /// Every bound variable, evaluating and logging exposures on first use.
    ///
    /// # Errors
    /// Evaluation and store errors
    pub fn assignment<S: ExperimentStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> Result<BTreeMap<String, Value>> {
        self.prepare(store)?;
        Ok(self
            .state
            .assignment()
            .map(|assignment| assignment.values().clone())
            .unwrap_or_default())
    }

    /// Write one exposure per bound variable.
    ///
    /// Does nothing once exposed, or when a `return` excluded the unit.
    /// Without an identifier type only variations are recorded.
    ///
    /// # Errors
    /// - `UserNotFound`: internal identifier does not resolve; nothing is
    ///   written and the trial stays unexposed
    /// - evaluation and store errors
    pub fn log_exposure<S: ExperimentStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.evaluate()?;
        let Some(assignment) = self.state.assignment() else {
            return Ok(());
        };
        if self.state.is_exposed() {
            return Ok(());
        }
        if !assignment.in_experiment() {
            debug!(experiment = self.experiment.name(), "unit excluded, no exposure");
            return Ok(());
        }

        let unit = self.resolve_unit(store)?;
        self.state.mark_exposed();

        let Some(assignment) = self.state.assignment() else {
            return Ok(());
        };
        for (key, value) in assignment.values() {
            let variation = store.get_or_create_variation(
                self.experiment.id(),
                key,
                &variation_value(value),
            )?;
            if let Some(unit) = &unit {
                store.create_exposure(NewExposure {
                    experiment_id: self.experiment.id(),
                    variation_id: variation.id(),
                    unit: unit.clone(),
                    meta: self.event_meta(),
                })?;
            }
        }
        debug!(
            experiment = self.experiment.name(),
            variables = assignment.values().len(),
            attributed = unit.is_some(),
            "exposure logged"
        );
        Ok(())
    }

    /// Append free-form data to the experiment log.
    ///
    /// # Errors
    /// Store errors
    pub fn log<S: ExperimentStore + ?Sized>(&self, store: &S, data: Value) -> Result<ExperimentLog> {
        store.create_experiment_log(self.experiment.id(), data)
    }

    fn lookup<S: ExperimentStore + ?Sized>(
        &mut self,
        store: &S,
        name: &str,
    ) -> Result<Option<Value>> {
        self.prepare(store)?;
        Ok(self
            .state
            .assignment()
            .and_then(|assignment| assignment.get(name))
            .cloned())
    }

    fn prepare<S: ExperimentStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.evaluate()?;
        if self.auto_exposure_log {
            self.log_exposure(store)?;
        }
        Ok(())
    }

    fn evaluate(&mut self) -> Result<()> {
        if self.state != TrialState::Unevaluated {
            return Ok(());
        }
        let mut env = Environment::new(self.salt.clone(), self.inputs.clone())
            .with_overrides(self.overrides.clone());
        Evaluator::new().run(self.experiment.definition(), &mut env)?;
        let in_experiment = env.in_experiment();
        debug!(
            experiment = self.experiment.name(),
            salt = %self.salt,
            in_experiment,
            "trial evaluated"
        );
        self.state = TrialState::Evaluated(Assignment {
            values: env.into_bindings(),
            in_experiment,
        });
        Ok(())
    }

    fn resolve_unit<S: ExperimentStore + ?Sized>(&self, store: &S) -> Result<Option<UnitIdentity>> {
        let Some(identifier_type) = self
            .inputs
            .get(IDENTIFIER_TYPE_INPUT)
            .filter(|value| !value.is_null())
            .map(unit_string)
        else {
            return Ok(None);
        };
        let Some(identifier) = self.inputs.get(UNIT_INPUT).filter(|value| !value.is_null())
        else {
            warn!(
                experiment = self.experiment.name(),
                identifier_type = %identifier_type,
                "identifier type without a unit id, exposures not attributed"
            );
            return Ok(None);
        };

        if identifier_type == self.internal_identifier_type {
            let id = user_id(identifier).ok_or_else(|| Error::UserNotFound(unit_string(identifier)))?;
            let user = store
                .find_user(id)?
                .ok_or_else(|| Error::UserNotFound(id.to_string()))?;
            Ok(Some(UnitIdentity::user(user)))
        } else {
            Ok(Some(UnitIdentity::external(
                unit_string(identifier),
                identifier_type,
            )))
        }
    }

    fn event_meta(&self) -> EventMeta {
        let mut meta = EventMeta::new(self.clock.now());
        if let Some(data_source) = &self.data_source {
            meta = meta.with_data_source(data_source.as_str());
        }
        if let Some(app_version) = &self.app_version {
            meta = meta.with_app_version(app_version.as_str());
        }
        meta
    }
}

impl fmt::Display for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trial {} of {}", self.salt, self.experiment.name())
    }
}

fn user_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
