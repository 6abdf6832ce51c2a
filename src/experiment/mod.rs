//! Experiment Records
//!
//! Data structures persisted by an [`ExperimentStore`](crate::store::ExperimentStore).
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variation (N) ──< Exposure (N) [append-only]
//!      │
//!      ├──< ExperimentLog (N) [append-only]
//!      └──< Goal (N, attached) ──< GoalAchievement (N) [append-only]
//!
//! ExperimentResult = f(Exposure, GoalAchievement) per (Goal, Variation)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use planout_experiments::experiment::{Experiment, UnitIdentity};
//! use serde_json::{json, Map};
//!
//! let mut experiment = Experiment::builder(1, "button_test").build();
//! experiment.add_variable("button_text", &json!("Sign up")).unwrap();
//!
//! let params = experiment.params(Map::new()).unwrap();
//! assert_eq!(params["button_text"], json!("Sign up"));
//!
//! let unit = UnitIdentity::external("abc-123", "device_id");
//! assert_eq!(unit.to_string(), "device_id: abc-123");
//! ```

mod event;
mod experiment_record;
mod exposure_record;
mod goal_record;
mod log_record;
mod result_record;
mod unit;
mod variation_record;

pub use event::EventMeta;
pub use experiment_record::{Experiment, ExperimentBuilder, SINGLE_VALUE_KEY};
pub use exposure_record::{Exposure, NewExposure};
pub use goal_record::{
    Goal, GoalAchievement, NewGoalAchievement, RelatedObject, DEFAULT_ACHIEVEMENT_VALUE,
};
pub use log_record::ExperimentLog;
pub use result_record::ExperimentResult;
pub use unit::{UnitIdentity, UnitKey, User};
pub use variation_record::{variation_value, Variation};
