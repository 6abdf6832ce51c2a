//! Goal Records - success criteria and the facts that units met them

use super::{EventMeta, UnitIdentity};
use serde::{Deserialize, Serialize};

/// Value recorded for a plain "goal reached" achievement.
pub const DEFAULT_ACHIEVEMENT_VALUE: f64 = 1.0;

/// Named success criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    id: u64,
    name: String,
    description: String,
}

impl Goal {
    /// Create a goal record.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }

    /// Get the goal ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the goal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Reference to the object an achievement is about (an order, a share, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedObject {
    /// Kind of object
    pub content_type: String,
    /// Object id within that kind
    pub object_id: u64,
}

/// A unit reached a goal, with a magnitude.
///
/// `value` is 1.0 for binary success; larger values weigh the achievement
/// (e.g. revenue).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalAchievement {
    id: u64,
    goal_id: u64,
    unit: UnitIdentity,
    value: f64,
    related: Option<RelatedObject>,
    meta: EventMeta,
}

impl GoalAchievement {
    /// Attach a store-assigned id to a new achievement.
    #[must_use]
    pub fn from_new(id: u64, new: NewGoalAchievement) -> Self {
        Self {
            id,
            goal_id: new.goal_id,
            unit: new.unit,
            value: new.value,
            related: new.related,
            meta: new.meta,
        }
    }

    /// Get the achievement ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the goal ID.
    #[must_use]
    pub const fn goal_id(&self) -> u64 {
        self.goal_id
    }

    /// Get the unit that reached the goal.
    #[must_use]
    pub const fn unit(&self) -> &UnitIdentity {
        &self.unit
    }

    /// Get the achievement value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the related object, if any.
    #[must_use]
    pub const fn related(&self) -> Option<&RelatedObject> {
        self.related.as_ref()
    }

    /// Get the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

impl std::fmt::Display for GoalAchievement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} achieved goal {} {}",
            self.unit, self.goal_id, self.value
        )
    }
}

/// Achievement not yet written to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGoalAchievement {
    /// Goal reached
    pub goal_id: u64,
    /// Unit that reached it
    pub unit: UnitIdentity,
    /// Magnitude, 1.0 for binary success
    pub value: f64,
    /// Object the achievement is about
    pub related: Option<RelatedObject>,
    /// When and where
    pub meta: EventMeta,
}

impl NewGoalAchievement {
    /// Binary-success achievement without a related object.
    #[must_use]
    pub const fn new(goal_id: u64, unit: UnitIdentity, meta: EventMeta) -> Self {
        Self {
            goal_id,
            unit,
            value: DEFAULT_ACHIEVEMENT_VALUE,
            related: None,
            meta,
        }
    }

    /// Set a magnitude.
    #[must_use]
    pub const fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Set the related object.
    #[must_use]
    pub fn with_related(mut self, content_type: impl Into<String>, object_id: u64) -> Self {
        self.related = Some(RelatedObject {
            content_type: content_type.into(),
            object_id,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_new_achievement_defaults_to_binary_success() {
        let new = NewGoalAchievement::new(
            4,
            UnitIdentity::external("abc", "device_id"),
            EventMeta::new(Utc::now()),
        );
        assert!((new.value - DEFAULT_ACHIEVEMENT_VALUE).abs() < f64::EPSILON);
        assert!(new.related.is_none());

        let achievement = GoalAchievement::from_new(1, new.with_value(2.5).with_related("order", 77));
        assert!((achievement.value() - 2.5).abs() < f64::EPSILON);
        assert_eq!(achievement.related().map(|r| r.object_id), Some(77));
        assert_eq!(achievement.to_string(), "device_id: abc achieved goal 4 2.5");
    }
}
