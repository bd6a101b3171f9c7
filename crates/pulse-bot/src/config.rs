//! Application configuration.
//!
//! Loaded from a TOML file layered with `PULSE__`-prefixed environment
//! variables, e.g. `PULSE__OUTPUT=signals.jsonl` or
//! `PULSE__ANALYTICS__GAMMA=0.2`.

use std::collections::HashSet;
use std::path::Path;

use pulse_analytics::AnalyticsConfig;
use pulse_core::PairKey;
use pulse_feed::SourceKind;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PULSE";

/// One tracked pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub dex: String,
    pub pair: String,
    /// Position at startup.
    #[serde(default)]
    pub initial_inventory: f64,
    /// Replaces the global analytics config for this pair.
    #[serde(default)]
    pub analytics: Option<AnalyticsConfig>,
}

impl PairConfig {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.dex.clone(), self.pair.clone())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input venue. Only `jsonl` is readable.
    #[serde(default)]
    pub source: SourceKind,

    /// Input path, `-` for stdin.
    #[serde(default = "default_stdio")]
    pub input: String,

    /// Signal output path, `-` for stdout.
    #[serde(default = "default_stdio")]
    pub output: String,

    /// Start a worker for pairs seen in the input but not configured.
    #[serde(default = "default_auto_register_pairs")]
    pub auto_register_pairs: bool,

    /// Queue depth of each pair worker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds between session summaries.
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,

    /// Analytics config for pairs without an override.
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

fn default_stdio() -> String {
    "-".to_string()
}

fn default_auto_register_pairs() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_summary_interval_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            input: default_stdio(),
            output: default_stdio(),
            auto_register_pairs: default_auto_register_pairs(),
            channel_capacity: default_channel_capacity(),
            summary_interval_secs: default_summary_interval_secs(),
            analytics: AnalyticsConfig::default(),
            pairs: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load `path` if it exists (defaults otherwise), then apply environment
    /// overrides and validate.
    pub fn load(path: &str) -> AppResult<Self> {
        let file_exists = Path::new(path).exists();
        if !file_exists {
            tracing::warn!(path = %path, "Config file not found, using defaults");
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(file_exists))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.channel_capacity == 0 {
            return Err(AppError::Config("channel_capacity must be at least 1".to_string()));
        }
        if self.summary_interval_secs == 0 {
            return Err(AppError::Config(
                "summary_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.pairs.is_empty() && !self.auto_register_pairs {
            return Err(AppError::Config(
                "no pairs configured and auto_register_pairs is disabled".to_string(),
            ));
        }

        self.analytics.validate()?;

        let mut seen = HashSet::new();
        for pair in &self.pairs {
            let key = pair.key();
            if !seen.insert(key.clone()) {
                return Err(AppError::Config(format!("duplicate pair: {key}")));
            }
            if !pair.initial_inventory.is_finite() {
                return Err(AppError::Config(format!(
                    "initial_inventory for {key} must be finite"
                )));
            }
            if let Some(analytics) = &pair.analytics {
                analytics.validate()?;
            }
        }
        Ok(())
    }

    /// Configured pair entry, if any.
    pub fn pair(&self, key: &PairKey) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| p.dex == key.dex && p.pair == key.pair)
    }

    /// Analytics config that applies to `key`.
    pub fn analytics_for(&self, key: &PairKey) -> &AnalyticsConfig {
        self.pair(key)
            .and_then(|p| p.analytics.as_ref())
            .unwrap_or(&self.analytics)
    }
}
