//! Application settings and configuration
//!
//! Settings are read from environment variables (and a `.env` file when
//! present) with sensible defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::schemas::gemini::models;
use crate::services::executor::ExecutorConfig;
use crate::services::gemini::{GeminiConfig, GEMINI_API_BASE};
use crate::services::rotation_state::DEFAULT_STATE_KEY;

/// Longest overload backoff accepted from configuration
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Main settings for the rotating client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub environment: Environment,
    pub log_level: String,

    // Gemini
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    pub gemini_base_url: String,
    pub primary_model: String,
    pub fallback_model: String,
    pub request_timeout_seconds: u64,

    // Rotation
    pub backoff_ms: u64,
    pub state_ttl_seconds: u64,
    pub state_key: String,
    pub store_timeout_ms: u64,
    /// 0 disables the per-call deadline
    pub deadline_seconds: u64,

    /// Shared store; unset keeps rotation state in this process only
    #[serde(skip_serializing)]
    pub redis_url: Option<String>,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let settings = Self {
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            api_keys: load_api_keys(),
            gemini_base_url: env_or_default("GEMINI_BASE_URL", GEMINI_API_BASE),
            primary_model: env_or_default("GEMINI_MODEL", models::GEMINI_2_0_FLASH),
            fallback_model: env_or_default("GEMINI_FALLBACK_MODEL", models::GEMINI_1_5_FLASH),
            request_timeout_seconds: env_or_default("GEMINI_TIMEOUT_SECONDS", "120")
                .parse()
                .context("Invalid GEMINI_TIMEOUT_SECONDS value")?,

            backoff_ms: env_or_default("ROTATION_BACKOFF_MS", "2000")
                .parse()
                .context("Invalid ROTATION_BACKOFF_MS value")?,
            state_ttl_seconds: env_or_default("ROTATION_STATE_TTL_SECONDS", "3600")
                .parse()
                .context("Invalid ROTATION_STATE_TTL_SECONDS value")?,
            state_key: env_or_default("ROTATION_STATE_KEY", DEFAULT_STATE_KEY),
            store_timeout_ms: env_or_default("ROTATION_STORE_TIMEOUT_MS", "1000")
                .parse()
                .context("Invalid ROTATION_STORE_TIMEOUT_MS value")?,
            deadline_seconds: env_or_default("GENERATE_DEADLINE_SECONDS", "60")
                .parse()
                .context("Invalid GENERATE_DEADLINE_SECONDS value")?,

            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.api_keys.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!("No Gemini API keys configured (set GEMINI_API_KEYS or GOOGLE_GEMINI_API_KEY)");
        }

        if self.primary_model.trim().is_empty() || self.fallback_model.trim().is_empty() {
            anyhow::bail!("Primary and fallback model names must be non-empty");
        }

        if self.backoff() > MAX_BACKOFF {
            anyhow::bail!("ROTATION_BACKOFF_MS must be <= {}", MAX_BACKOFF.as_millis());
        }

        if self.state_ttl_seconds == 0 {
            anyhow::bail!("ROTATION_STATE_TTL_SECONDS must be > 0");
        }

        if self.primary_model == self.fallback_model {
            tracing::warn!(model = %self.primary_model, "Fallback model is the same as the primary model");
        }

        if self.environment == Environment::Production && self.redis_url.is_none() {
            tracing::warn!("Running in production without REDIS_URL; rotation state is not shared across instances");
        }

        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        (self.store_timeout_ms > 0).then(|| Duration::from_millis(self.store_timeout_ms))
    }

    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_seconds > 0).then(|| Duration::from_secs(self.deadline_seconds))
    }

    /// Transport configuration for the credential pool
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig::with_keys(self.api_keys.clone())
            .with_base_url(self.gemini_base_url.clone())
            .with_timeout(self.request_timeout_seconds)
    }

    /// Retry/rotation configuration for the executor
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::new()
            .with_models(self.primary_model.clone(), self.fallback_model.clone())
            .with_overload_backoff(self.backoff())
            .with_state_ttl(self.state_ttl())
            .with_deadline(self.deadline())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "info".to_string(),
            api_keys: Vec::new(),
            gemini_base_url: GEMINI_API_BASE.to_string(),
            primary_model: models::GEMINI_2_0_FLASH.to_string(),
            fallback_model: models::GEMINI_1_5_FLASH.to_string(),
            request_timeout_seconds: 120,
            backoff_ms: 2000,
            state_ttl_seconds: 3600,
            state_key: DEFAULT_STATE_KEY.to_string(),
            store_timeout_ms: 1000,
            deadline_seconds: 60,
            redis_url: None,
        }
    }
}

/// Ordered credential list from the environment
fn load_api_keys() -> Vec<String> {
    collect_api_keys(|name| env::var(name).ok())
}

/// `GEMINI_API_KEYS` (comma-separated) wins. Otherwise `GOOGLE_GEMINI_API_KEY`
/// followed by `GOOGLE_GEMINI_API_KEY_2`, `_3`, ... up to the first unset one.
fn collect_api_keys(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    if let Some(list) = lookup("GEMINI_API_KEYS").filter(|v| !v.trim().is_empty()) {
        return split_keys(&list);
    }

    let mut keys: Vec<String> = lookup("GOOGLE_GEMINI_API_KEY").into_iter().collect();
    for n in 2.. {
        match lookup(&format!("GOOGLE_GEMINI_API_KEY_{}", n)) {
            Some(key) => keys.push(key),
            None => break,
        }
    }

    keys.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_keys() -> Settings {
        Settings {
            api_keys: vec!["key1".to_string(), "key2".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.primary_model, "gemini-2.0-flash");
        assert_eq!(settings.backoff(), Duration::from_secs(2));
        assert_eq!(settings.state_key, "gemini:current_key_index");
        assert_eq!(settings.deadline(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_split_keys() {
        assert_eq!(split_keys("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_keys(" , ").is_empty());
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_numbered_keys_follow_the_base_key() {
        let keys = collect_api_keys(lookup_from(&[
            ("GOOGLE_GEMINI_API_KEY", "key-one"),
            ("GOOGLE_GEMINI_API_KEY_2", "key-two"),
            ("GOOGLE_GEMINI_API_KEY_3", " "),
            ("GOOGLE_GEMINI_API_KEY_4", "key-four"),
            ("GOOGLE_GEMINI_API_KEY_6", "after-gap"),
        ]));
        assert_eq!(keys, vec!["key-one", "key-two", "key-four"]);
    }

    #[test]
    fn test_numbered_keys_without_base_key() {
        let keys = collect_api_keys(lookup_from(&[("GOOGLE_GEMINI_API_KEY_2", "key-two")]));
        assert_eq!(keys, vec!["key-two"]);
    }

    #[test]
    fn test_key_list_wins_over_numbered_keys() {
        let keys = collect_api_keys(lookup_from(&[
            ("GEMINI_API_KEYS", "a,b"),
            ("GOOGLE_GEMINI_API_KEY", "key-one"),
            ("GOOGLE_GEMINI_API_KEY_2", "key-two"),
        ]));
        assert_eq!(keys, vec!["a", "b"]);

        let keys = collect_api_keys(lookup_from(&[
            ("GEMINI_API_KEYS", "  "),
            ("GOOGLE_GEMINI_API_KEY", "key-one"),
        ]));
        assert_eq!(keys, vec!["key-one"]);
    }

    #[test]
    fn test_validate_requires_keys() {
        assert!(Settings::default().validate().is_err());
        assert!(with_keys().validate().is_ok());
    }

    #[test]
    fn test_validate_bounds() {
        let settings = Settings {
            backoff_ms: 120_000,
            ..with_keys()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            state_ttl_seconds: 0,
            ..with_keys()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            fallback_model: " ".to_string(),
            ..with_keys()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_disables_deadline_and_store_timeout() {
        let settings = Settings {
            deadline_seconds: 0,
            store_timeout_ms: 0,
            ..with_keys()
        };
        assert_eq!(settings.deadline(), None);
        assert_eq!(settings.store_timeout(), None);
        assert_eq!(settings.executor_config().deadline, None);
    }

    #[test]
    fn test_derived_configs() {
        let settings = Settings {
            backoff_ms: 500,
            ..with_keys()
        };
        let gemini = settings.gemini_config();
        assert_eq!(gemini.api_keys.len(), 2);
        assert_eq!(gemini.timeout_seconds, 120);

        let executor = settings.executor_config();
        assert_eq!(executor.overload_backoff, Duration::from_millis(500));
        assert_eq!(executor.state_ttl, Duration::from_secs(3600));
    }
}
