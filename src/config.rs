//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name for stored credentials.
const KEYRING_SERVICE: &str = "care-relay";

/// Inference gateway connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InferenceConfig {
    /// Base URL of the Ollama-compatible chat endpoint.
    pub endpoint: String,
    /// Model identifier used for both conversation and report synthesis.
    pub model: String,
    /// Per-request timeout for gateway calls.
    #[serde(default = "default_inference_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// Specialist-review platform connectivity settings.
///
/// The API token is loaded at runtime via the OS keychain or an environment
/// variable, never from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PlatformConfig {
    /// Base URL of the specialist-review platform API.
    pub base_url: String,
    /// Per-request timeout for platform calls.
    #[serde(default = "default_platform_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Bearer token for the platform API (populated at runtime).
    #[serde(skip)]
    pub api_token: String,
}

/// Report synthesis behavior.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SynthesisConfig {
    /// Maximum structured-output attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Severity score at or above which a report is escalated immediately.
    #[serde(default = "default_crisis_threshold")]
    pub crisis_threshold: u8,
}

/// Backoff bounds for handoff submission retries and status polling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReconciliationConfig {
    /// Interval before the first poll and after every successful one.
    #[serde(default = "default_initial_interval_seconds")]
    pub initial_interval_seconds: u64,
    /// Upper bound the doubling backoff saturates at.
    #[serde(default = "default_max_interval_seconds")]
    pub max_interval_seconds: u64,
}

impl ReconciliationConfig {
    /// Initial poll interval as a [`Duration`].
    #[must_use]
    pub fn initial_interval(&self) -> Duration {
        Duration::from_secs(self.initial_interval_seconds)
    }

    /// Backoff cap as a [`Duration`].
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_seconds)
    }
}

fn default_inference_timeout_seconds() -> u64 {
    120
}

fn default_platform_timeout_seconds() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_crisis_threshold() -> u8 {
    7
}

fn default_initial_interval_seconds() -> u64 {
    60
}

fn default_max_interval_seconds() -> u64 {
    1800
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Inference gateway settings.
    pub inference: InferenceConfig,
    /// Specialist platform settings.
    pub platform: PlatformConfig,
    /// Synthesis retry budget and crisis threshold.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Poll backoff bounds.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            crisis_threshold: default_crisis_threshold(),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            initial_interval_seconds: default_initial_interval_seconds(),
            max_interval_seconds: default_max_interval_seconds(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the platform API token from OS keychain with env-var fallback.
    ///
    /// Tries the `care-relay` keyring service first, then falls back to the
    /// `PLATFORM_API_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provide
    /// the token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.platform.api_token =
            load_credential("platform_api_token", "PLATFORM_API_TOKEN").await?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.inference.endpoint.trim().is_empty() {
            return Err(AppError::Config("inference.endpoint must be set".into()));
        }

        if self.inference.model.trim().is_empty() {
            return Err(AppError::Config("inference.model must be set".into()));
        }

        if self.platform.base_url.trim().is_empty() {
            return Err(AppError::Config("platform.base_url must be set".into()));
        }

        if self.synthesis.max_attempts == 0 {
            return Err(AppError::Config(
                "synthesis.max_attempts must be greater than zero".into(),
            ));
        }

        if !(1..=10).contains(&self.synthesis.crisis_threshold) {
            return Err(AppError::Config(
                "synthesis.crisis_threshold must be within 1..=10".into(),
            ));
        }

        if self.reconciliation.initial_interval_seconds == 0 {
            return Err(AppError::Config(
                "reconciliation.initial_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.reconciliation.max_interval_seconds < self.reconciliation.initial_interval_seconds
        {
            return Err(AppError::Config(
                "reconciliation.max_interval_seconds must not be below the initial interval"
                    .into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
