//! In-memory experiment store using `DashMap`.
//!
//! This is the default backend - data is lost on process restart.

use super::ExperimentStore;
use crate::clock::{Clock, SystemClock};
use crate::experiment::{
    Experiment, ExperimentLog, Exposure, Goal, GoalAchievement, NewExposure, NewGoalAchievement,
    User, Variation,
};
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde_json::Value;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type FxDashMap<K, V> = DashMap<K, V, FxBuildHasher>;

fn fx_map<K: Eq + Hash, V>() -> FxDashMap<K, V> {
    DashMap::with_hasher(FxBuildHasher::default())
}

/// In-memory experiment store using lock-free concurrent hashmaps.
///
/// Get-or-create operations go through `DashMap` entries, so two threads
/// asking for the same experiment, variation or goal get the same record.
/// Ids come from one shared counter and increase with creation order.
///
/// # Example
///
/// ```rust
/// use planout_experiments::store::{ExperimentStore, MemoryStore};
///
/// # fn example() -> planout_experiments::Result<()> {
/// let store = MemoryStore::new();
/// let (experiment, _) = store.get_or_create_experiment("color_test")?;
/// let a = store.get_or_create_variation(experiment.id(), "color", "red")?;
/// let b = store.get_or_create_variation(experiment.id(), "color", "red")?;
/// assert_eq!(a.id(), b.id());
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    experiments: FxDashMap<String, Experiment>,
    experiment_names: FxDashMap<u64, String>,
    variations: FxDashMap<(u64, String, String), Variation>,
    exposures: FxDashMap<u64, Exposure>,
    goals: FxDashMap<String, Goal>,
    goals_by_id: FxDashMap<u64, Goal>,
    achievements: FxDashMap<u64, GoalAchievement>,
    logs: FxDashMap<u64, ExperimentLog>,
    users: FxDashMap<u64, User>,
}

impl MemoryStore {
    /// Create an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            next_id: AtomicU64::new(1),
            experiments: fx_map(),
            experiment_names: fx_map(),
            variations: fx_map(),
            exposures: fx_map(),
            goals: fx_map(),
            goals_by_id: fx_map(),
            achievements: fx_map(),
            logs: fx_map(),
            users: fx_map(),
        }
    }

    /// Use `clock` for record timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Register an internal user so `find_user` can resolve it.
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id(), user);
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of variations across all experiments.
    #[must_use]
    pub fn variation_count(&self) -> usize {
        self.variations.len()
    }

    /// Number of exposures across all variations.
    #[must_use]
    pub fn exposure_count(&self) -> usize {
        self.exposures.len()
    }

    /// Number of goal achievements.
    #[must_use]
    pub fn achievement_count(&self) -> usize {
        self.achievements.len()
    }

    /// Log entries written for an experiment, oldest first.
    #[must_use]
    pub fn experiment_logs(&self, experiment_id: u64) -> Vec<ExperimentLog> {
        let mut logs: Vec<ExperimentLog> = self
            .logs
            .iter()
            .filter(|entry| entry.experiment_id() == experiment_id)
            .map(|entry| entry.value().clone())
            .collect();
        logs.sort_by_key(ExperimentLog::id);
        logs
    }

    /// Check if the store holds no experiments, goals or facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
            && self.goals.is_empty()
            && self.exposures.is_empty()
            && self.achievements.is_empty()
            && self.logs.is_empty()
    }

    /// Drop every record except registered users.
    pub fn clear(&self) {
        self.experiments.clear();
        self.experiment_names.clear();
        self.variations.clear();
        self.exposures.clear();
        self.goals.clear();
        self.goals_by_id.clear();
        self.achievements.clear();
        self.logs.clear();
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn experiment_name(&self, experiment_id: u64) -> Result<String> {
        self.experiment_names
            .get(&experiment_id)
            .map(|name| name.value().clone())
            .ok_or_else(|| Error::ExperimentNotFound(format!("id {experiment_id}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentStore for MemoryStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<(Experiment, bool)> {
        match self.experiments.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let experiment = Experiment::new(self.next_id(), name, self.clock.now());
                self.experiment_names
                    .insert(experiment.id(), name.to_string());
                debug!(experiment = name, id = experiment.id(), "experiment created");
                Ok((entry.insert(experiment).value().clone(), true))
            }
        }
    }

    fn get_experiment(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self.experiments.get(name).map(|e| e.value().clone()))
    }

    fn update_experiment(&self, experiment: &Experiment) -> Result<()> {
        let mut stored = self
            .experiments
            .get_mut(experiment.name())
            .ok_or_else(|| Error::ExperimentNotFound(experiment.name().to_string()))?;
        let mut updated = experiment.clone();
        updated.touch(self.clock.now());
        *stored = updated;
        Ok(())
    }

    fn get_or_create_variation(
        &self,
        experiment_id: u64,
        key: &str,
        value: &str,
    ) -> Result<Variation> {
        let index = (experiment_id, key.to_string(), value.to_string());
        match self.variations.entry(index) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let variation =
                    Variation::new(self.next_id(), experiment_id, key, value, self.clock.now());
                debug!(experiment_id, key, value, "variation created");
                Ok(entry.insert(variation).value().clone())
            }
        }
    }

    fn create_exposure(&self, exposure: NewExposure) -> Result<Exposure> {
        let exposure = Exposure::from_new(self.next_id(), exposure);
        self.exposures.insert(exposure.id(), exposure.clone());
        Ok(exposure)
    }

    fn get_or_create_goal(&self, name: &str) -> Result<Goal> {
        match self.goals.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let goal = Goal::new(self.next_id(), name, "");
                self.goals_by_id.insert(goal.id(), goal.clone());
                debug!(goal = name, id = goal.id(), "goal created");
                Ok(entry.insert(goal).value().clone())
            }
        }
    }

    fn attach_goal(&self, experiment_id: u64, goal_id: u64) -> Result<()> {
        if !self.goals_by_id.contains_key(&goal_id) {
            return Err(Error::StorageError(format!("unknown goal id {goal_id}")));
        }
        let name = self.experiment_name(experiment_id)?;
        let mut experiment = self
            .experiments
            .get_mut(&name)
            .ok_or(Error::ExperimentNotFound(name))?;
        experiment.attach_goal(goal_id);
        experiment.touch(self.clock.now());
        Ok(())
    }

    fn create_goal_achievement(&self, achievement: NewGoalAchievement) -> Result<GoalAchievement> {
        let achievement = GoalAchievement::from_new(self.next_id(), achievement);
        self.achievements
            .insert(achievement.id(), achievement.clone());
        Ok(achievement)
    }

    fn list_variations(&self, experiment_id: u64) -> Result<Vec<Variation>> {
        let mut variations: Vec<Variation> = self
            .variations
            .iter()
            .filter(|entry| entry.experiment_id() == experiment_id)
            .map(|entry| entry.value().clone())
            .collect();
        variations.sort_by_key(Variation::id);
        Ok(variations)
    }

    fn list_goals(&self, experiment_id: u64) -> Result<Vec<Goal>> {
        let name = self.experiment_name(experiment_id)?;
        let goal_ids = self
            .experiments
            .get(&name)
            .map(|experiment| experiment.goal_ids().to_vec())
            .ok_or(Error::ExperimentNotFound(name))?;
        Ok(goal_ids
            .iter()
            .filter_map(|id| self.goals_by_id.get(id).map(|goal| goal.value().clone()))
            .collect())
    }

    fn list_exposures(&self, variation_id: u64) -> Result<Vec<Exposure>> {
        let mut exposures: Vec<Exposure> = self
            .exposures
            .iter()
            .filter(|entry| entry.variation_id() == variation_id)
            .map(|entry| entry.value().clone())
            .collect();
        exposures.sort_by_key(Exposure::id);
        Ok(exposures)
    }

    fn list_goal_achievements(&self, goal_id: u64) -> Result<Vec<GoalAchievement>> {
        let mut achievements: Vec<GoalAchievement> = self
            .achievements
            .iter()
            .filter(|entry| entry.goal_id() == goal_id)
            .map(|entry| entry.value().clone())
            .collect();
        achievements.sort_by_key(GoalAchievement::id);
        Ok(achievements)
    }

    fn create_experiment_log(&self, experiment_id: u64, data: Value) -> Result<ExperimentLog> {
        let log = ExperimentLog::new(self.next_id(), experiment_id, data, self.clock.now());
        self.logs.insert(log.id(), log.clone());
        Ok(log)
    }

    fn find_user(&self, id: u64) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|user| user.value().clone()))
    }
}
