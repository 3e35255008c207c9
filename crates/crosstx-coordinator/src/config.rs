use std::time::Duration;

use crosstx_adapters::StreamNaming;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Timeout given to transactions begun without an explicit one.
    pub default_timeout_secs: u64,
    pub streams: StreamNaming,
    pub reaper: ReaperConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: crosstx_core::DEFAULT_TIMEOUT.as_secs(),
            streams: StreamNaming::default(),
            reaper: ReaperConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Parse and validate a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.reaper.enabled && self.reaper.interval_secs == 0 {
            return Err(ConfigError::ZeroReaperInterval);
        }
        Ok(())
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Background rollback of expired transactions. Off unless enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 30,
        }
    }
}

impl ReaperConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() -> anyhow::Result<()> {
        let config = CoordinatorConfig::from_toml_str("")?;

        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.default_timeout(), Duration::from_secs(300));
        assert!(!config.reaper.enabled);
        assert_eq!(config.streams.deletions_suffix, "_deletions");
        Ok(())
    }

    #[test]
    fn partial_document_overrides_only_given_keys() -> anyhow::Result<()> {
        let config = CoordinatorConfig::from_toml_str(
            r#"
default_timeout_secs = 60

[streams]
corrections_suffix = "__fix"

[reaper]
enabled = true
"#,
        )?;

        assert_eq!(config.default_timeout(), Duration::from_secs(60));
        assert_eq!(config.streams.deletions_suffix, "_deletions");
        assert_eq!(config.streams.corrections_suffix, "__fix");
        assert!(config.reaper.enabled);
        assert_eq!(config.reaper.interval(), Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = CoordinatorConfig::from_toml_str("default_timeout_secs = 0");

        assert!(matches!(result, Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn enabled_reaper_needs_an_interval() {
        let result = CoordinatorConfig::from_toml_str("[reaper]\nenabled = true\ninterval_secs = 0");

        assert!(matches!(result, Err(ConfigError::ZeroReaperInterval)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = CoordinatorConfig::from_toml_str("default_timeout_secs = \"soon\"");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
