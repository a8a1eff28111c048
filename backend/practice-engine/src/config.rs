use serde::Deserialize;
use std::env;

use crate::models::mastery::MasteryParams;
use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub mastery: MasterySettings,
    pub selector: SelectorSettings,
    pub hints: HintSettings,
    pub attempts: AttemptSettings,
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub mongo_uri: String,
    pub mongo_database: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "practice".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasterySettings {
    pub smoothing_alpha: f64,
    pub failure_streak_cap: u32,
    pub demote_streak: u32,
    pub promote_accuracy: f64,
    /// Re-read/recompute rounds allowed when a concurrent writer wins.
    pub max_conflict_retries: u32,
}

impl Default for MasterySettings {
    fn default() -> Self {
        let params = MasteryParams::default();
        Self {
            smoothing_alpha: params.smoothing_alpha,
            failure_streak_cap: params.failure_streak_cap,
            demote_streak: params.demote_streak,
            promote_accuracy: params.promote_accuracy,
            max_conflict_retries: 5,
        }
    }
}

impl MasterySettings {
    pub fn params(&self) -> MasteryParams {
        MasteryParams {
            smoothing_alpha: self.smoothing_alpha,
            failure_streak_cap: self.failure_streak_cap,
            demote_streak: self.demote_streak,
            promote_accuracy: self.promote_accuracy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    pub recency_window_hours: f64,
    pub exact_band_weight: f64,
    pub tag_weight: f64,
    pub recency_weight: f64,
    pub fallback_topic: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            recency_window_hours: 24.0,
            exact_band_weight: 1.0,
            tag_weight: 0.3,
            recency_weight: 0.5,
            fallback_topic: "arrays".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HintSettings {
    /// Base URL of the remote hint provider; delegation is off when unset.
    pub remote_url: Option<String>,
    pub remote_timeout_ms: u64,
}

impl Default for HintSettings {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttemptSettings {
    pub enforce_single_open: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 20,
            max_backoff_ms: 500,
            jitter_max_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: Config = settings.clone().try_deserialize()?;

        // Flat variables kept for deployments that predate the APP__ scheme
        if settings.get_string("database.mongo_uri").is_err() {
            if let Ok(uri) = env::var("MONGO_URI") {
                loaded.database.mongo_uri = uri;
            }
        }
        if settings.get_string("database.mongo_database").is_err() {
            if let Ok(db) = env::var("MONGO_DATABASE") {
                loaded.database.mongo_database = db;
            }
        }
        if loaded.hints.remote_url.is_none() {
            loaded.hints.remote_url = env::var("HINTS_REMOTE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty());
        }

        loaded.validate()?;

        tracing::debug!(
            "Configuration loaded: env={}, alpha={}, recency_window_hours={}, remote_hints={}",
            env,
            loaded.mastery.smoothing_alpha,
            loaded.selector.recency_window_hours,
            loaded.hints.remote_url.is_some()
        );

        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let alpha = self.mastery.smoothing_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(config::ConfigError::Message(format!(
                "mastery.smoothing_alpha must be in (0, 1], got {}",
                alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.mastery.promote_accuracy) {
            return Err(config::ConfigError::Message(format!(
                "mastery.promote_accuracy must be in [0, 1], got {}",
                self.mastery.promote_accuracy
            )));
        }
        if self.mastery.demote_streak == 0 {
            return Err(config::ConfigError::Message(
                "mastery.demote_streak must be at least 1".to_string(),
            ));
        }
        if self.mastery.failure_streak_cap < self.mastery.demote_streak {
            return Err(config::ConfigError::Message(format!(
                "mastery.failure_streak_cap ({}) must not be below mastery.demote_streak ({})",
                self.mastery.failure_streak_cap, self.mastery.demote_streak
            )));
        }
        if self.selector.recency_window_hours <= 0.0 || !self.selector.recency_window_hours.is_finite() {
            return Err(config::ConfigError::Message(format!(
                "selector.recency_window_hours must be positive, got {}",
                self.selector.recency_window_hours
            )));
        }
        for (name, weight) in [
            ("exact_band_weight", self.selector.exact_band_weight),
            ("tag_weight", self.selector.tag_weight),
            ("recency_weight", self.selector.recency_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(config::ConfigError::Message(format!(
                    "selector.{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        if self.selector.fallback_topic.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "selector.fallback_topic must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
