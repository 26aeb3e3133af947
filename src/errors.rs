//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Bad input to session creation; surfaced to the caller, never retried.
    Validation(String),
    /// Operation invalid for the session's current lifecycle state.
    State(String),
    /// Model output unusable after the bounded retry budget was spent.
    Synthesis(String),
    /// Transport failure while talking to the inference gateway.
    Inference(String),
    /// Transient network failure against the specialist platform.
    Network(String),
    /// Authentication rejected by the specialist platform; never auto-retried.
    Auth(String),
    /// Out-of-range model output that was clamped; logged, not surfaced.
    DataQuality(String),
    /// Requested entity does not exist.
    NotFound(String),
}

impl AppError {
    /// Whether a retry of the failed operation may succeed.
    ///
    /// Only transient network failures qualify; everything else either needs
    /// operator intervention or is a permanent rejection.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::State(msg) => write!(f, "invalid state: {msg}"),
            Self::Synthesis(msg) => write!(f, "synthesis failed, retry later: {msg}"),
            Self::Inference(msg) => write!(f, "inference gateway: {msg}"),
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::DataQuality(msg) => write!(f, "data quality: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
