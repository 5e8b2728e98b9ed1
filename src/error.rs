//! Error types for the IndieAuth client
//!
//! Internal operations return [`Result`], an `anyhow` alias carrying
//! [`IndieAuthError`] variants. The callback path never surfaces these to
//! callers: it folds them into an
//! [`AuthResult`](crate::auth::result::AuthResult) instead.

use thiserror::Error;

/// Main error type for IndieAuth client operations
#[derive(Error, Debug)]
pub enum IndieAuthError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint discovery errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Session storage errors (missing or corrupt entries)
    #[error("Session error: {0}")]
    Session(String),

    /// The user identifier could not be turned into a URL
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for IndieAuth client operations
///
/// Uses `anyhow::Error` so call sites can attach context while still
/// downcasting to [`IndieAuthError`] when they need to branch on the kind.
pub type Result<T> = anyhow::Result<T>;
