//! Experiment Result - derived per (goal, variation) snapshot
//!
//! Not a source of truth: every field is recomputed from exposures and
//! achievements by [`crate::results`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate counts for one variation against one goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentResult {
    experiment_id: u64,
    goal_id: u64,
    variation_id: u64,
    total_exposures: u64,
    total_goal_achievements: u64,
    success_value: f64,
    computed_at: DateTime<Utc>,
}

impl ExperimentResult {
    /// Create a result snapshot.
    #[must_use]
    pub const fn new(
        experiment_id: u64,
        goal_id: u64,
        variation_id: u64,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            experiment_id,
            goal_id,
            variation_id,
            total_exposures: 0,
            total_goal_achievements: 0,
            success_value: 0.0,
            computed_at,
        }
    }

    /// Set the counted totals.
    #[must_use]
    pub const fn with_totals(
        mut self,
        total_exposures: u64,
        total_goal_achievements: u64,
        success_value: f64,
    ) -> Self {
        self.total_exposures = total_exposures;
        self.total_goal_achievements = total_goal_achievements;
        self.success_value = success_value;
        self
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> u64 {
        self.experiment_id
    }

    /// Get the goal ID.
    #[must_use]
    pub const fn goal_id(&self) -> u64 {
        self.goal_id
    }

    /// Get the variation ID.
    #[must_use]
    pub const fn variation_id(&self) -> u64 {
        self.variation_id
    }

    /// Number of exposures to the variation.
    #[must_use]
    pub const fn total_exposures(&self) -> u64 {
        self.total_exposures
    }

    /// Number of achievements by exposed units.
    #[must_use]
    pub const fn total_goal_achievements(&self) -> u64 {
        self.total_goal_achievements
    }

    /// Sum of achievement values by exposed units.
    #[must_use]
    pub const fn success_value(&self) -> f64 {
        self.success_value
    }

    /// `success_value / total_exposures`, 0 without exposures.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_exposures == 0 {
            0.0
        } else {
            self.success_value / self.total_exposures as f64
        }
    }

    /// Success rate as a percentage.
    #[must_use]
    pub fn success_percentage(&self) -> f64 {
        self.success_rate() * 100.0
    }

    /// When the snapshot was computed.
    #[must_use]
    pub const fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_without_exposures_is_zero() {
        let result = ExperimentResult::new(1, 2, 3, Utc::now());
        assert!(result.success_rate().abs() < f64::EPSILON);
        assert!(result.success_percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_and_percentage() {
        let result = ExperimentResult::new(1, 2, 3, Utc::now()).with_totals(4, 1, 1.0);
        assert!((result.success_rate() - 0.25).abs() < f64::EPSILON);
        assert!((result.success_percentage() - 25.0).abs() < f64::EPSILON);
        assert_eq!(result.total_goal_achievements(), 1);
    }
}
