//! Configuration for the relay service.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use codegen::{ProviderCredentials, ProviderSettings};
use common::RetryPolicy;
use repo_sync::{SnapshotOptions, GITHUB_API_URL};
use thiserror::Error;

/// Public Trello REST API
pub const TRELLO_API_URL: &str = "https://api.trello.com/1";

/// Problems detected before the service starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GITHUB_OWNER must name the organization that owns generated repositories")]
    MissingOwner,

    #[error("TRELLO_CALLBACK_URL is required when TRELLO_WEBHOOK_SECRET is set")]
    MissingCallbackUrl,

    #[error("RETRY_MAX_ATTEMPTS must be at least 1")]
    InvalidRetryAttempts,
}

/// Trello credentials and webhook settings.
#[derive(Debug, Clone)]
pub struct TrelloConfig {
    /// REST API key.
    pub api_key: Option<String>,
    /// REST API token.
    pub token: Option<String>,
    /// Webhook signing secret (the app secret).
    pub webhook_secret: Option<String>,
    /// Callback URL registered with Trello; part of the signed payload.
    pub callback_url: Option<String>,
    /// API base URL.
    pub api_url: String,
}

impl Default for TrelloConfig {
    fn default() -> Self {
        Self {
            api_key: non_empty("TRELLO_API_KEY"),
            token: non_empty("TRELLO_TOKEN"),
            webhook_secret: non_empty("TRELLO_WEBHOOK_SECRET"),
            callback_url: non_empty("TRELLO_CALLBACK_URL"),
            api_url: non_empty("TRELLO_API_URL").unwrap_or_else(|| TRELLO_API_URL.to_string()),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Trello settings.
    pub trello: TrelloConfig,
    /// GitHub token.
    pub github_token: Option<String>,
    /// Organization that owns generated repositories.
    pub github_owner: Option<String>,
    /// GitHub API base URL.
    pub github_api_url: String,
    /// Provider registry key.
    pub provider: String,
    /// Model override for the provider.
    pub model: Option<String>,
    /// Project type forced for every card.
    pub project_type: Option<String>,
    /// Directory of prompt templates replacing the embedded set.
    pub prompts_dir: Option<PathBuf>,
    /// Debounce window for content identities.
    pub dedup_debounce: Duration,
    /// Retention horizon of the admission store.
    pub dedup_retention: Duration,
    /// Timeout for GitHub and Trello calls.
    pub http_timeout: Duration,
    /// Timeout for provider calls.
    pub ai_timeout: Duration,
    /// Attempts per remote call.
    pub retry_max_attempts: u32,
    /// Bound on the snapshot file list.
    pub snapshot_max_files: usize,
    /// Provider API keys.
    pub credentials: ProviderCredentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: parsed("RELAY_PORT").unwrap_or(8080),
            trello: TrelloConfig::default(),
            github_token: non_empty("GITHUB_TOKEN"),
            github_owner: non_empty("GITHUB_OWNER"),
            github_api_url: non_empty("GITHUB_API_URL")
                .unwrap_or_else(|| GITHUB_API_URL.to_string()),
            provider: non_empty("AI_PROVIDER").unwrap_or_else(|| "neuro".to_string()),
            model: non_empty("AI_MODEL"),
            project_type: non_empty("PROJECT_TYPE").map(|t| t.trim().to_lowercase()),
            prompts_dir: non_empty("PROMPTS_DIR").map(PathBuf::from),
            dedup_debounce: Duration::from_secs(parsed("DEDUP_DEBOUNCE_SECS").unwrap_or(30)),
            dedup_retention: Duration::from_secs(parsed("DEDUP_RETENTION_SECS").unwrap_or(600)),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS").unwrap_or(30)),
            ai_timeout: Duration::from_secs(parsed("AI_TIMEOUT_SECS").unwrap_or(300)),
            retry_max_attempts: parsed("RETRY_MAX_ATTEMPTS").unwrap_or(3),
            snapshot_max_files: parsed("SNAPSHOT_MAX_FILES").unwrap_or(100),
            credentials: ProviderCredentials::from_env(),
        }
    }
}

impl Config {
    /// Check settings that would otherwise fail on the first webhook.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github_owner.is_none() {
            return Err(ConfigError::MissingOwner);
        }
        if self.trello.webhook_secret.is_some() && self.trello.callback_url.is_none() {
            return Err(ConfigError::MissingCallbackUrl);
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        Ok(())
    }

    /// Retry policy for GitHub, Trello and provider calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.retry_max_attempts)
    }

    /// Settings for the provider registry.
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            credentials: self.credentials.clone(),
            model: self.model.clone(),
            timeout: self.ai_timeout,
            ..ProviderSettings::default()
        }
    }

    /// Bounds for repository snapshots.
    #[must_use]
    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            max_files: self.snapshot_max_files,
            ..SnapshotOptions::default()
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "RELAY_PORT",
        "GITHUB_OWNER",
        "AI_PROVIDER",
        "PROJECT_TYPE",
        "DEDUP_DEBOUNCE_SECS",
        "TRELLO_WEBHOOK_SECRET",
        "TRELLO_CALLBACK_URL",
        "RETRY_MAX_ATTEMPTS",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider, "neuro");
        assert_eq!(config.dedup_debounce, Duration::from_secs(30));
        assert_eq!(config.dedup_retention, Duration::from_secs(600));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.validate(), Err(ConfigError::MissingOwner));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear();
        env::set_var("RELAY_PORT", "9090");
        env::set_var("GITHUB_OWNER", "acme");
        env::set_var("AI_PROVIDER", "claude");
        env::set_var("PROJECT_TYPE", " Backend-Node ");
        env::set_var("DEDUP_DEBOUNCE_SECS", "5");

        let config = Config::default();
        assert_eq!(config.port, 9090);
        assert_eq!(config.github_owner.as_deref(), Some("acme"));
        assert_eq!(config.provider, "claude");
        assert_eq!(config.project_type.as_deref(), Some("backend-node"));
        assert_eq!(config.dedup_debounce, Duration::from_secs(5));
        assert!(config.validate().is_ok());
        clear();
    }

    #[test]
    #[serial]
    fn test_secret_requires_callback_url() {
        clear();
        env::set_var("GITHUB_OWNER", "acme");
        env::set_var("TRELLO_WEBHOOK_SECRET", "s3cret");

        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingCallbackUrl)
        );

        env::set_var("TRELLO_CALLBACK_URL", "https://relay.example.com/webhooks/trello");
        assert!(Config::default().validate().is_ok());
        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back_to_defaults() {
        clear();
        env::set_var("RELAY_PORT", "not-a-port");
        env::set_var("RETRY_MAX_ATTEMPTS", "0");
        env::set_var("GITHUB_OWNER", "acme");

        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.validate(), Err(ConfigError::InvalidRetryAttempts));
        clear();
    }
}
