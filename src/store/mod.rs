//! Definition & Results Store
//!
//! [`ExperimentStore`] is the persistence boundary of the engine. Trials and
//! the [`Experiments`](crate::Experiments) facade only talk to this trait, so
//! any backend (SQL, KV, remote service) can sit behind it.
//!
//! # Example
//!
//! ```rust
//! use planout_experiments::store::{ExperimentStore, MemoryStore};
//!
//! # fn example() -> planout_experiments::Result<()> {
//! let store = MemoryStore::new();
//!
//! let (experiment, created) = store.get_or_create_experiment("button_test")?;
//! assert!(created);
//!
//! let (again, created) = store.get_or_create_experiment("button_test")?;
//! assert!(!created);
//! assert_eq!(again.id(), experiment.id());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod memory;

pub use memory::MemoryStore;

use crate::experiment::{
    Experiment, ExperimentLog, Exposure, Goal, GoalAchievement, NewExposure, NewGoalAchievement,
    User, Variation,
};
use crate::Result;
use serde_json::Value;

/// Persistence interface for experiments and their facts.
///
/// `get_or_create_*` methods must be atomic upserts: concurrent callers with
/// the same key observe one record.
pub trait ExperimentStore: Send + Sync {
    /// Fetch an experiment by name, creating it with the empty definition if
    /// absent. The flag is `true` when this call created it.
    ///
    /// # Errors
    /// Backend failure
    fn get_or_create_experiment(&self, name: &str) -> Result<(Experiment, bool)>;

    /// Fetch an experiment by name.
    ///
    /// # Errors
    /// Backend failure
    fn get_experiment(&self, name: &str) -> Result<Option<Experiment>>;

    /// Persist a modified experiment (definition, goals, timestamps).
    ///
    /// # Errors
    /// `ExperimentNotFound` if it was never created
    fn update_experiment(&self, experiment: &Experiment) -> Result<()>;

    /// Fetch or create the variation for `(experiment_id, key, value)`.
    ///
    /// # Errors
    /// Backend failure
    fn get_or_create_variation(&self, experiment_id: u64, key: &str, value: &str)
        -> Result<Variation>;

    /// Append an exposure.
    ///
    /// # Errors
    /// Backend failure
    fn create_exposure(&self, exposure: NewExposure) -> Result<Exposure>;

    /// Fetch or create a goal by name.
    ///
    /// # Errors
    /// Backend failure
    fn get_or_create_goal(&self, name: &str) -> Result<Goal>;

    /// Attach a goal to an experiment; attaching twice is a no-op.
    ///
    /// # Errors
    /// `ExperimentNotFound` for an unknown experiment id
    fn attach_goal(&self, experiment_id: u64, goal_id: u64) -> Result<()>;

    /// Append a goal achievement.
    ///
    /// # Errors
    /// Backend failure
    fn create_goal_achievement(&self, achievement: NewGoalAchievement) -> Result<GoalAchievement>;

    /// Variations of an experiment, oldest first.
    ///
    /// # Errors
    /// Backend failure
    fn list_variations(&self, experiment_id: u64) -> Result<Vec<Variation>>;

    /// Goals attached to an experiment, in attach order.
    ///
    /// # Errors
    /// `ExperimentNotFound` for an unknown experiment id
    fn list_goals(&self, experiment_id: u64) -> Result<Vec<Goal>>;

    /// Exposures to a variation, oldest first.
    ///
    /// # Errors
    /// Backend failure
    fn list_exposures(&self, variation_id: u64) -> Result<Vec<Exposure>>;

    /// Achievements of a goal, oldest first.
    ///
    /// # Errors
    /// Backend failure
    fn list_goal_achievements(&self, goal_id: u64) -> Result<Vec<GoalAchievement>>;

    /// Append a free-form log entry to an experiment.
    ///
    /// # Errors
    /// Backend failure
    fn create_experiment_log(&self, experiment_id: u64, data: Value) -> Result<ExperimentLog>;

    /// Resolve an internal user id.
    ///
    /// # Errors
    /// Backend failure (an unknown id is `Ok(None)`)
    fn find_user(&self, id: u64) -> Result<Option<User>>;
}
