//! Results - success metrics per variation and goal
//!
//! Counts are recomputed from the append-only exposure and achievement facts
//! on every call. An achievement counts for a variation when its unit was
//! exposed to that variation (same internal user, or same identifier and
//! identifier type).
//!
//! Toyota Way Principles:
//! - Genchi Genbutsu: derive results from raw facts, never cached totals
//! - Jidoka: zero exposures yields a zero rate instead of a division error

use crate::experiment::{
    variation_value, Experiment, ExperimentResult, Exposure, Goal, GoalAchievement, UnitKey,
    Variation,
};
use crate::store::ExperimentStore;
use crate::trial::UNIT_INPUT;
use crate::Result;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Exposure and achievement totals of one variation for one goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariationStats {
    exposures: u64,
    achievements: u64,
    success_value: f64,
}

impl VariationStats {
    /// Load the facts for `variation` and `goal` and count them.
    ///
    /// # Errors
    /// Store errors
    pub fn compute<S: ExperimentStore + ?Sized>(
        store: &S,
        variation: &Variation,
        goal: &Goal,
    ) -> Result<Self> {
        let exposures = store.list_exposures(variation.id())?;
        let achievements = store.list_goal_achievements(goal.id())?;
        Ok(Self::from_facts(&exposures, &achievements))
    }

    /// Count achievements whose unit appears among `exposures`.
    ///
    /// Each achievement counts once even if its unit was exposed repeatedly.
    #[must_use]
    pub fn from_facts(exposures: &[Exposure], achievements: &[GoalAchievement]) -> Self {
        let exposed: FxHashSet<UnitKey<'_>> =
            exposures.iter().map(|exposure| exposure.unit().key()).collect();
        let (count, value) = achievements
            .iter()
            .filter(|achievement| exposed.contains(&achievement.unit().key()))
            .fold((0_u64, 0.0_f64), |(count, value), achievement| {
                (count + 1, value + achievement.value())
            });
        Self {
            exposures: exposures.len() as u64,
            achievements: count,
            success_value: value,
        }
    }

    /// Number of exposures.
    #[must_use]
    pub const fn exposures(&self) -> u64 {
        self.exposures
    }

    /// Number of matching achievements.
    #[must_use]
    pub const fn achievements(&self) -> u64 {
        self.achievements
    }

    /// Sum of matching achievement values.
    #[must_use]
    pub const fn success_value(&self) -> f64 {
        self.success_value
    }

    /// `success_value / exposures`, 0 without exposures.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        if self.exposures == 0 {
            0.0
        } else {
            self.success_value / self.exposures as f64
        }
    }

    /// Rate as a percentage.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.rate() * 100.0
    }

    /// Snapshot record for `variation` and `goal`.
    #[must_use]
    pub const fn to_result(
        &self,
        variation: &Variation,
        goal: &Goal,
        computed_at: DateTime<Utc>,
    ) -> ExperimentResult {
        ExperimentResult::new(
            variation.experiment_id(),
            goal.id(),
            variation.id(),
            computed_at,
        )
        .with_totals(self.exposures, self.achievements, self.success_value)
    }
}

/// Sum of `goal` achievement values by units exposed to `variation`.
///
/// # Errors
/// Store errors
pub fn success_value<S: ExperimentStore + ?Sized>(
    store: &S,
    variation: &Variation,
    goal: &Goal,
) -> Result<f64> {
    Ok(VariationStats::compute(store, variation, goal)?.success_value())
}

/// Success value per exposure, 0 when `variation` has no exposures.
///
/// # Errors
/// Store errors
pub fn success_rate<S: ExperimentStore + ?Sized>(
    store: &S,
    variation: &Variation,
    goal: &Goal,
) -> Result<f64> {
    Ok(VariationStats::compute(store, variation, goal)?.rate())
}

/// Success rate × 100.
///
/// # Errors
/// Store errors
pub fn success_percentage<S: ExperimentStore + ?Sized>(
    store: &S,
    variation: &Variation,
    goal: &Goal,
) -> Result<f64> {
    Ok(VariationStats::compute(store, variation, goal)?.percentage())
}

/// One result per variation of `experiment_id` for `goal`.
///
/// # Errors
/// Store errors
pub fn results_for_goal<S: ExperimentStore + ?Sized>(
    store: &S,
    experiment_id: u64,
    goal: &Goal,
    computed_at: DateTime<Utc>,
) -> Result<Vec<ExperimentResult>> {
    let achievements = store.list_goal_achievements(goal.id())?;
    store
        .list_variations(experiment_id)?
        .iter()
        .map(|variation| {
            let exposures = store.list_exposures(variation.id())?;
            Ok(VariationStats::from_facts(&exposures, &achievements)
                .to_result(variation, goal, computed_at))
        })
        .collect()
}

/// Results for every goal attached to `experiment_id`, in attach order.
///
/// # Errors
/// `ExperimentNotFound` for an unknown experiment, store errors
pub fn goal_results<S: ExperimentStore + ?Sized>(
    store: &S,
    experiment_id: u64,
    computed_at: DateTime<Utc>,
) -> Result<Vec<(Goal, Vec<ExperimentResult>)>> {
    store
        .list_goals(experiment_id)?
        .into_iter()
        .map(|goal| {
            let results = results_for_goal(store, experiment_id, &goal, computed_at)?;
            Ok((goal, results))
        })
        .collect()
}

/// How `key` would be assigned across `units`, without touching a store.
///
/// Maps each assigned value (in variation text form) to the number of units
/// that receive it. Units for which the definition does not bind `key` are
/// left out. Runs in parallel with the `rayon` feature.
///
/// # Errors
/// The first evaluation error
pub fn preview_distribution(
    experiment: &Experiment,
    key: &str,
    units: &[Value],
) -> Result<BTreeMap<String, usize>> {
    let assign = |unit: &Value| -> Result<Option<String>> {
        let mut inputs = Map::new();
        inputs.insert(UNIT_INPUT.to_string(), unit.clone());
        Ok(experiment.params(inputs)?.get(key).map(variation_value))
    };

    #[cfg(feature = "rayon")]
    let assigned: Result<Vec<Option<String>>> = units.par_iter().map(assign).collect();
    #[cfg(not(feature = "rayon"))]
    let assigned: Result<Vec<Option<String>>> = units.iter().map(assign).collect();

    let mut counts = BTreeMap::new();
    for value in assigned?.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{EventMeta, NewExposure, NewGoalAchievement, UnitIdentity, User};
    use crate::script::Script;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn expose(store: &MemoryStore, variation: &Variation, unit: &UnitIdentity) {
        store
            .create_exposure(NewExposure {
                experiment_id: variation.experiment_id(),
                variation_id: variation.id(),
                unit: unit.clone(),
                meta: EventMeta::new(Utc::now()),
            })
            .unwrap();
    }

    fn achieve(store: &MemoryStore, goal: &Goal, unit: &UnitIdentity, value: f64) {
        store
            .create_goal_achievement(
                NewGoalAchievement::new(goal.id(), unit.clone(), EventMeta::new(Utc::now()))
                    .with_value(value),
            )
            .unwrap();
    }

    #[test]
    fn test_stats_without_exposures() {
        let stats = VariationStats::from_facts(&[], &[]);
        assert_eq!(stats.exposures(), 0);
        assert!(stats.rate().abs() < f64::EPSILON);
        assert!(stats.percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_facts_matches_units_across_large_tables() {
        let at = Utc::now();
        let exposures: Vec<Exposure> = (0..5_000_u64)
            .map(|id| {
                Exposure::from_new(
                    id,
                    NewExposure {
                        experiment_id: 1,
                        variation_id: 1,
                        unit: UnitIdentity::external(format!("d{}", id % 2_500), "device_id"),
                        meta: EventMeta::new(at),
                    },
                )
            })
            .collect();
        let achievements: Vec<GoalAchievement> = (0..5_000_u64)
            .map(|id| {
                let unit = if id % 2 == 0 {
                    UnitIdentity::external(format!("d{id}"), "device_id")
                } else {
                    UnitIdentity::external(format!("d{id}"), "ip")
                };
                GoalAchievement::from_new(
                    id,
                    NewGoalAchievement::new(1, unit, EventMeta::new(at)).with_value(2.0),
                )
            })
            .collect();

        let stats = VariationStats::from_facts(&exposures, &achievements);
        assert_eq!(stats.exposures(), 5_000);
        // even ids below 2500 are exposed device ids; odd ids are ip-tagged
        assert_eq!(stats.achievements(), 1_250);
        assert!((stats.success_value() - 2_500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_metrics() {
        let store = MemoryStore::new();
        let (experiment, _) = store.get_or_create_experiment("exp").unwrap();
        let red = store
            .get_or_create_variation(experiment.id(), "color", "red")
            .unwrap();
        let goal = store.get_or_create_goal("purchase").unwrap();

        let alice = UnitIdentity::user(User::new(1, "alice"));
        let bob = UnitIdentity::user(User::new(2, "bob"));
        let device = UnitIdentity::external("abc", "device_id");
        let stranger = UnitIdentity::external("abc", "ip");
        for unit in [&alice, &bob, &device, &device] {
            expose(&store, &red, unit);
        }
        achieve(&store, &goal, &alice, 1.0);
        achieve(&store, &goal, &device, 2.0);
        achieve(&store, &goal, &stranger, 5.0);

        let stats = VariationStats::compute(&store, &red, &goal).unwrap();
        assert_eq!(stats.exposures(), 4);
        assert_eq!(stats.achievements(), 2);
        assert!((success_value(&store, &red, &goal).unwrap() - 3.0).abs() < f64::EPSILON);
        assert!((success_rate(&store, &red, &goal).unwrap() - 0.75).abs() < f64::EPSILON);
        assert!((success_percentage(&store, &red, &goal).unwrap() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_goal_results_per_variation() {
        let store = MemoryStore::new();
        let (experiment, _) = store.get_or_create_experiment("exp").unwrap();
        let red = store
            .get_or_create_variation(experiment.id(), "color", "red")
            .unwrap();
        let blue = store
            .get_or_create_variation(experiment.id(), "color", "blue")
            .unwrap();
        let goal = store.get_or_create_goal("signup").unwrap();
        store.attach_goal(experiment.id(), goal.id()).unwrap();

        let unit = UnitIdentity::external("u1", "device_id");
        expose(&store, &red, &unit);
        achieve(&store, &goal, &unit, 1.0);

        let results = goal_results(&store, experiment.id(), Utc::now()).unwrap();
        assert_eq!(results.len(), 1);
        let (reported_goal, rows) = &results[0];
        assert_eq!(reported_goal.name(), "signup");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].variation_id(), red.id());
        assert!((rows[0].success_percentage() - 100.0).abs() < f64::EPSILON);
        assert_eq!(rows[1].variation_id(), blue.id());
        assert_eq!(rows[1].total_exposures(), 0);
        assert!(rows[1].success_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_preview_distribution() {
        let definition = Script::from_json(&json!({"op": "seq", "seq": [
            {"op": "set", "var": "color", "value":
                {"op": "uniformChoice", "choices": ["red", "blue"],
                 "unit": {"op": "get", "var": "user_id"}}}
        ]}))
        .unwrap();
        let experiment = Experiment::builder(1, "preview").definition(definition).build();
        let units: Vec<Value> = (0..1000).map(Value::from).collect();

        let counts = preview_distribution(&experiment, "color", &units).unwrap();
        assert_eq!(counts.values().sum::<usize>(), 1000);
        assert_eq!(counts.len(), 2);
        assert!(counts["red"] > 400 && counts["red"] < 600);

        let missing = preview_distribution(&experiment, "size", &units).unwrap();
        assert!(missing.is_empty());
    }
}
