use crate::constants;
use crate::error::{IngestError, Result};
use crate::pipeline::health::HealthThresholds;
use crate::pipeline::ingestion::rate_limiter::Limits;
use crate::pipeline::ingestion::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Rate and retry settings for one source.
///
/// `max_attempts` counts the first call, so a source configured with
/// `max_attempts = 3` is retried at most twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
    pub max_attempts: u32,
    pub initial_delay: f64,
    pub backoff_factor: f64,
    pub max_delay: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: None,
            requests_per_hour: None,
            max_attempts: constants::DEFAULT_MAX_RETRIES + 1,
            initial_delay: constants::DEFAULT_INITIAL_DELAY_SECS,
            backoff_factor: constants::DEFAULT_BACKOFF_FACTOR,
            max_delay: constants::DEFAULT_MAX_DELAY_SECS,
        }
    }
}

impl SourceConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            requests_per_minute: self.requests_per_minute,
            requests_per_hour: self.requests_per_hour,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_attempts.saturating_sub(1),
            initial_delay: Duration::from_secs_f64(self.initial_delay.max(0.0)),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_secs_f64(self.max_delay.max(0.0)),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let bad = |what: String| Err(IngestError::Config(format!("source '{}': {}", name, what)));

        if self.requests_per_minute == Some(0) {
            return bad("requests_per_minute must be positive".into());
        }
        if self.requests_per_hour == Some(0) {
            return bad("requests_per_hour must be positive".into());
        }
        if self.max_attempts == 0 {
            return bad("max_attempts must be at least 1".into());
        }
        if !self.initial_delay.is_finite() || self.initial_delay < 0.0 {
            return bad(format!("initial_delay must be >= 0, got {}", self.initial_delay));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return bad(format!("backoff_factor must be > 1, got {}", self.backoff_factor));
        }
        if !self.max_delay.is_finite() || self.max_delay < 0.0 {
            return bad(format!("max_delay must be >= 0, got {}", self.max_delay));
        }
        Ok(())
    }
}

/// Per-source settings plus health thresholds, read from TOML:
///
/// ```toml
/// [sources.serper]
/// requests_per_minute = 60
/// max_attempts = 3
///
/// [health]
/// stale_threshold_hours = 48
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub health: HealthThresholds,
}

impl Config {
    /// Load from `$VENUE_INGEST_CONFIG`, or `config/sources.toml` when unset.
    /// A missing default file yields the built-in defaults; a missing file
    /// named explicitly through the environment is an error.
    pub fn load() -> Result<Self> {
        match std::env::var(constants::CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path.trim()),
            _ => {
                let path = Path::new(constants::DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_path(path)
                } else {
                    info!(
                        "No config at '{}', every source uses default limits",
                        path.display()
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!(
            "Loaded config for {} sources from '{}'",
            config.sources.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        for (name, source) in &config.sources {
            source.validate(name)?;
        }
        config.health.validate()?;
        Ok(config)
    }

    /// Settings for `name`; unknown sources fall back to the defaults.
    pub fn source(&self, name: &str) -> SourceConfig {
        match self.sources.get(name) {
            Some(cfg) => cfg.clone(),
            None => {
                debug!(source = name, "source not configured, using defaults");
                SourceConfig::default()
            }
        }
    }

    pub fn data_root() -> PathBuf {
        std::env::var(constants::DATA_ROOT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_DATA_ROOT))
    }
}
