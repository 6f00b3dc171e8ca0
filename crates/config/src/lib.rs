//! Configuration management for the experiment engine

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Statistical defaults applied when an experiment does not override them
    #[serde(default)]
    pub statistics: StatisticalDefaults,

    /// Observability settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        // Override with environment variables (prefixed with EXPERIMENT_)
        figment = figment.merge(Env::prefixed("EXPERIMENT_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let stats = &self.statistics;

        if stats.baseline_conversion_rate <= 0.0 || stats.baseline_conversion_rate >= 1.0 {
            return Err(ConfigError::ValidationError(
                "Baseline conversion rate must be between 0 and 1".to_string(),
            ));
        }

        if stats.confidence <= 0.0 || stats.confidence >= 1.0 {
            return Err(ConfigError::ValidationError(
                "Confidence must be between 0 and 1".to_string(),
            ));
        }

        if stats.power <= 0.0 || stats.power >= 1.0 {
            return Err(ConfigError::ValidationError(
                "Power must be between 0 and 1".to_string(),
            ));
        }

        if stats.min_detectable_effect <= 0.0 {
            return Err(ConfigError::ValidationError(
                "Minimum detectable effect must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            statistics: StatisticalDefaults::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Statistical defaults for sample-size and significance calculations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalDefaults {
    /// Baseline conversion rate assumed when no historical baseline exists
    pub baseline_conversion_rate: f64,

    /// Confidence level for significance decisions (e.g., 0.95)
    pub confidence: f64,

    /// Statistical power for sample-size estimation (1 - beta)
    pub power: f64,

    /// Minimum relative effect the experiment should be able to detect
    pub min_detectable_effect: f64,

    /// Floor on the computed per-variant minimum sample size
    pub min_sample_size: u64,

    /// Maximum experiment duration in seconds
    pub max_duration_secs: u64,
}

impl Default for StatisticalDefaults {
    fn default() -> Self {
        Self {
            baseline_conversion_rate: 0.10,
            confidence: 0.95,
            power: 0.80,
            min_detectable_effect: 0.10,
            min_sample_size: 1000,
            max_duration_secs: 30 * 24 * 3600, // 30 days
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,

    /// Enable structured JSON logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.statistics.confidence, 0.95);
        assert_eq!(config.statistics.baseline_conversion_rate, 0.10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.statistics.confidence = 1.5;
        assert!(config.validate().is_err());

        config.statistics.confidence = 0.95;
        config.statistics.power = 0.0;
        assert!(config.validate().is_err());

        config.statistics.power = 0.8;
        config.statistics.min_detectable_effect = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.statistics.min_sample_size, 1000);
        assert_eq!(config.observability.log_level, "info");
    }
}
