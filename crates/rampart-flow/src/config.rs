//! Flow-control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// Limits for one resource class (visit, attack, or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimitConfig {
    /// Whether this class is rate limited at all.
    pub enabled: bool,
    /// Events allowed per window.
    pub threshold: u64,
    /// Accounting window.
    pub stat_duration: Duration,
    /// How long a crossing IP stays blocked.
    pub block_duration: Duration,
    /// Extra events tolerated on top of the threshold.
    pub burst_count: u64,
    /// Maximum number of IPs tracked for this class.
    pub params_capacity: usize,
}

impl ResourceLimitConfig {
    fn validate(&self, class: &str) -> FlowResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.threshold == 0 {
            return Err(FlowError::Config(format!("{class}: threshold must be positive")));
        }
        if self.stat_duration.is_zero() {
            return Err(FlowError::Config(format!("{class}: stat duration must be positive")));
        }
        if self.block_duration.is_zero() {
            return Err(FlowError::Config(format!("{class}: block duration must be positive")));
        }
        if self.params_capacity == 0 {
            return Err(FlowError::Config(format!("{class}: params capacity must be positive")));
        }
        Ok(())
    }
}

/// Flow-control configuration: three independent resource classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowControlConfig {
    /// Plain visit-frequency limits.
    pub visit_limit: ResourceLimitConfig,
    /// Detected-attack frequency limits.
    pub attack_limit: ResourceLimitConfig,
    /// Error-response frequency limits.
    pub error_limit: ResourceLimitConfig,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            visit_limit: ResourceLimitConfig {
                enabled: true,
                threshold: 100,
                stat_duration: Duration::from_secs(60),
                block_duration: Duration::from_secs(600),
                burst_count: 10,
                params_capacity: 10_000,
            },
            attack_limit: ResourceLimitConfig {
                enabled: true,
                threshold: 5,
                stat_duration: Duration::from_secs(60),
                block_duration: Duration::from_secs(1_800),
                burst_count: 0,
                params_capacity: 10_000,
            },
            error_limit: ResourceLimitConfig {
                enabled: true,
                threshold: 20,
                stat_duration: Duration::from_secs(60),
                block_duration: Duration::from_secs(900),
                burst_count: 0,
                params_capacity: 10_000,
            },
        }
    }
}

impl FlowControlConfig {
    /// Validate every enabled resource class.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Config` naming the offending class and field.
    pub fn validate(&self) -> FlowResult<()> {
        self.visit_limit.validate("visit limit")?;
        self.attack_limit.validate("attack limit")?;
        self.error_limit.validate("error limit")?;
        Ok(())
    }

    /// Convert from the seconds-based shape stored by the configuration
    /// system.
    #[must_use]
    pub fn from_settings(settings: FlowControlSettings) -> Self {
        Self {
            visit_limit: settings.visit_limit.into(),
            attack_limit: settings.attack_limit.into(),
            error_limit: settings.error_limit.into(),
        }
    }
}

/// One resource class as stored by the configuration system, durations in
/// whole seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimitSettings {
    /// Whether this class is rate limited at all.
    pub enabled: bool,
    /// Events allowed per window.
    pub threshold: u64,
    /// Accounting window, in seconds.
    pub stat_duration: u64,
    /// Block duration, in seconds.
    pub block_duration: u64,
    /// Extra events tolerated on top of the threshold.
    pub burst_count: u64,
    /// Maximum number of IPs tracked for this class.
    pub params_capacity: usize,
}

impl From<ResourceLimitSettings> for ResourceLimitConfig {
    fn from(settings: ResourceLimitSettings) -> Self {
        Self {
            enabled: settings.enabled,
            threshold: settings.threshold,
            stat_duration: Duration::from_secs(settings.stat_duration),
            block_duration: Duration::from_secs(settings.block_duration),
            burst_count: settings.burst_count,
            params_capacity: settings.params_capacity,
        }
    }
}

/// Stored flow-control settings: the raw shape of the configuration record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowControlSettings {
    /// Plain visit-frequency limits.
    pub visit_limit: ResourceLimitSettings,
    /// Detected-attack frequency limits.
    pub attack_limit: ResourceLimitSettings,
    /// Error-response frequency limits.
    pub error_limit: ResourceLimitSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FlowControlConfig::default();
        assert!(config.validate().is_ok());

        assert!(config.visit_limit.enabled);
        assert_eq!(config.visit_limit.threshold, 100);
        assert_eq!(config.visit_limit.stat_duration, Duration::from_secs(60));
        assert_eq!(config.visit_limit.block_duration, Duration::from_secs(600));
        assert_eq!(config.attack_limit.threshold, 5);
        assert_eq!(config.attack_limit.burst_count, 0);
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = FlowControlConfig::default();
        config.attack_limit.threshold = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("attack limit"));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = FlowControlConfig::default();
        config.error_limit.stat_duration = Duration::ZERO;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("error limit"));
    }

    #[test]
    fn test_validate_skips_disabled_classes() {
        let mut config = FlowControlConfig::default();
        config.visit_limit.enabled = false;
        config.visit_limit.threshold = 0;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_settings_converts_seconds() {
        let settings = FlowControlSettings {
            visit_limit: ResourceLimitSettings {
                enabled: true,
                threshold: 50,
                stat_duration: 30,
                block_duration: 300,
                burst_count: 5,
                params_capacity: 1_000,
            },
            attack_limit: ResourceLimitSettings {
                enabled: false,
                threshold: 1,
                stat_duration: 1,
                block_duration: 1,
                burst_count: 0,
                params_capacity: 1,
            },
            error_limit: ResourceLimitSettings {
                enabled: true,
                threshold: 10,
                stat_duration: 60,
                block_duration: 600,
                burst_count: 0,
                params_capacity: 500,
            },
        };

        let config = FlowControlConfig::from_settings(settings);
        assert_eq!(config.visit_limit.threshold, 50);
        assert_eq!(config.visit_limit.stat_duration, Duration::from_secs(30));
        assert_eq!(config.visit_limit.block_duration, Duration::from_secs(300));
        assert!(!config.attack_limit.enabled);
        assert_eq!(config.error_limit.params_capacity, 500);
    }

    #[test]
    fn test_settings_json_field_names() {
        let json = r#"{
            "visitLimit": {"enabled": true, "threshold": 100, "statDuration": 60,
                           "blockDuration": 600, "burstCount": 10, "paramsCapacity": 10000},
            "attackLimit": {"enabled": true, "threshold": 5, "statDuration": 60,
                            "blockDuration": 1800, "burstCount": 0, "paramsCapacity": 10000},
            "errorLimit": {"enabled": true, "threshold": 20, "statDuration": 60,
                           "blockDuration": 900, "burstCount": 0, "paramsCapacity": 10000}
        }"#;

        let settings: FlowControlSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.visit_limit.threshold, 100);
        assert_eq!(settings.attack_limit.block_duration, 1800);
    }
}
