//! Engine configuration
//!
//! Settings shared by every trial the [`Experiments`](crate::Experiments)
//! facade creates. Usually set through the builder; can also be loaded from
//! JSON, where missing fields keep their defaults.

use crate::trial::DEFAULT_INTERNAL_IDENTIFIER_TYPE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Facade configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier type resolved to internal users through the store
    pub internal_identifier_type: String,
    /// Write exposures on first access to a trial value
    pub auto_exposure_log: bool,
    /// Recorded on exposures and achievements
    pub data_source: Option<String>,
    /// Recorded on exposures and achievements
    pub app_version: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            internal_identifier_type: DEFAULT_INTERNAL_IDENTIFIER_TYPE.to_string(),
            auto_exposure_log: true,
            data_source: None,
            app_version: None,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    /// `Json` for malformed text, `InvalidConfig` for invalid values
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values.
    ///
    /// # Errors
    /// `InvalidConfig` for an empty internal identifier type
    pub fn validate(&self) -> Result<()> {
        if self.internal_identifier_type.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "internal_identifier_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.internal_identifier_type, "django_user_db_id");
        assert!(config.auto_exposure_log);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json(r#"{"app_version": "3.0.1"}"#).unwrap();
        assert_eq!(config.app_version.as_deref(), Some("3.0.1"));
        assert_eq!(config.internal_identifier_type, "django_user_db_id");
    }

    #[test]
    fn test_from_json_rejects_empty_identifier_type() {
        let err = Config::from_json(r#"{"internal_identifier_type": " "}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
