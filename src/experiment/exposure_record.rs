//! Exposure Record - a unit was shown a variation

use super::{EventMeta, UnitIdentity};
use serde::{Deserialize, Serialize};

/// Exposure fact, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exposure {
    id: u64,
    experiment_id: u64,
    variation_id: u64,
    unit: UnitIdentity,
    meta: EventMeta,
}

impl Exposure {
    /// Attach a store-assigned id to a new exposure.
    #[must_use]
    pub fn from_new(id: u64, new: NewExposure) -> Self {
        Self {
            id,
            experiment_id: new.experiment_id,
            variation_id: new.variation_id,
            unit: new.unit,
            meta: new.meta,
        }
    }

    /// Get the exposure ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> u64 {
        self.experiment_id
    }

    /// Get the variation ID.
    #[must_use]
    pub const fn variation_id(&self) -> u64 {
        self.variation_id
    }

    /// Get the exposed unit.
    #[must_use]
    pub const fn unit(&self) -> &UnitIdentity {
        &self.unit
    }

    /// Get the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

impl std::fmt::Display for Exposure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} exposed to variation {}", self.unit, self.variation_id)
    }
}

/// Exposure not yet written to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExposure {
    /// Experiment the unit was exposed to
    pub experiment_id: u64,
    /// Variation the unit received
    pub variation_id: u64,
    /// Exposed unit
    pub unit: UnitIdentity,
    /// When and where
    pub meta: EventMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::User;
    use chrono::Utc;

    #[test]
    fn test_exposure_from_new() {
        let new = NewExposure {
            experiment_id: 1,
            variation_id: 2,
            unit: UnitIdentity::user(User::new(3, "test_user")),
            meta: EventMeta::new(Utc::now()).with_app_version("1.2.0"),
        };
        let exposure = Exposure::from_new(10, new);
        assert_eq!(exposure.id(), 10);
        assert_eq!(exposure.experiment_id(), 1);
        assert_eq!(exposure.variation_id(), 2);
        assert_eq!(exposure.meta().app_version(), Some("1.2.0"));
        assert_eq!(exposure.to_string(), "test_user exposed to variation 2");
    }
}
