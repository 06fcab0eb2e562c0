//! Error types for forward-sync.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Membership API error: {0}")]
    Membership(#[from] MembershipError),

    #[error("Webmail error: {0}")]
    Webmail(#[from] WebmailError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load env file {path}: {reason}")]
    EnvFile { path: PathBuf, reason: String },
}

/// Errors from the membership API client.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Authentication rejected by membership API (HTTP {status})")]
    Auth { status: u16 },

    #[error("Network error talking to membership API: {0}")]
    Network(String),

    #[error("Invalid response from membership API: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for MembershipError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Errors from the webmail rule controller.
#[derive(Debug, thiserror::Error)]
pub enum WebmailError {
    #[error("Webmail login rejected: {reason}")]
    Auth { reason: String },

    #[error("Browser unavailable at {endpoint}: {reason}")]
    BrowserUnavailable { endpoint: String, reason: String },

    #[error("Timed out after {timeout:?} waiting for {step}")]
    UiTimeout { step: String, timeout: Duration },

    #[error("Forwarding rule limit of {limit} reached")]
    QuotaExceeded { limit: usize },

    #[error("UI element not found: {what}")]
    ElementMissing { what: String },

    #[error("Forwarding rule not found: {name}")]
    RuleNotFound { name: String },

    #[error("WebDriver command failed: {0}")]
    Driver(String),
}

impl From<fantoccini::error::CmdError> for WebmailError {
    fn from(e: fantoccini::error::CmdError) -> Self {
        Self::Driver(e.to_string())
    }
}

/// Export and compare errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Sync orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sync run cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for forward-sync.
pub type Result<T> = std::result::Result<T, Error>;
