//! Event metadata shared by exposures and goal achievements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// When and where an event was observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMeta {
    seen_at: DateTime<Utc>,
    data_source: Option<String>,
    app_version: Option<String>,
    data_meta: Value,
}

impl EventMeta {
    /// Metadata for an event seen at `seen_at`.
    #[must_use]
    pub fn new(seen_at: DateTime<Utc>) -> Self {
        Self {
            seen_at,
            data_source: None,
            app_version: None,
            data_meta: Value::Object(serde_json::Map::new()),
        }
    }

    /// What system or code path reported the event.
    #[must_use]
    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    /// App version that reported the event.
    #[must_use]
    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    /// Free-form extra data.
    #[must_use]
    pub fn with_data_meta(mut self, data_meta: Value) -> Self {
        self.data_meta = data_meta;
        self
    }

    /// Get the observation time.
    #[must_use]
    pub const fn seen_at(&self) -> DateTime<Utc> {
        self.seen_at
    }

    /// Get the data source, if set.
    #[must_use]
    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    /// Get the app version, if set.
    #[must_use]
    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }

    /// Get the extra data.
    #[must_use]
    pub const fn data_meta(&self) -> &Value {
        &self.data_meta
    }
}
