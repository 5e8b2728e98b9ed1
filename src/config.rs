//! Configuration management for the IndieAuth client
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{IndieAuthError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Main configuration structure
///
/// Holds the process-wide client identity, HTTP client settings, and the
/// settings of the bundled demo host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Client identity and handshake defaults
    #[serde(default)]
    pub client: ClientConfig,
    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Demo host settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Client identity and handshake defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identifier sent as `client_id` to every endpoint
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Authorization endpoint used when the identifier advertises none
    #[serde(default = "default_authorization_endpoint")]
    pub default_authorization_endpoint: String,

    /// Scope requested by the authorization flow when the caller gives none
    #[serde(default = "default_scope")]
    pub default_scope: String,

    /// Ignore discovered endpoints that are not `https`
    #[serde(default)]
    pub require_https_endpoints: bool,
}

fn default_client_id() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_authorization_endpoint() -> String {
    "https://indieauth.com/auth".to_string()
}

fn default_scope() -> String {
    "read".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            default_authorization_endpoint: default_authorization_endpoint(),
            default_scope: default_scope(),
            require_https_endpoints: false,
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// `User-Agent` header for discovery and endpoint requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

/// Demo host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Externally reachable base URL, used to build callback URLs
    #[serde(default = "default_external_url")]
    pub external_url: String,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_external_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            external_url: default_external_url(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| IndieAuthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| IndieAuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("INDIEAUTH_CLIENT_ID") {
            self.client.client_id = client_id;
        }

        if let Ok(endpoint) = std::env::var("INDIEAUTH_DEFAULT_AUTH_ENDPOINT") {
            self.client.default_authorization_endpoint = endpoint;
        }

        if let Ok(scope) = std::env::var("INDIEAUTH_DEFAULT_SCOPE") {
            self.client.default_scope = scope;
        }

        if let Ok(require_https) = std::env::var("INDIEAUTH_REQUIRE_HTTPS") {
            match require_https.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.client.require_https_endpoints = true,
                "0" | "false" | "no" => self.client.require_https_endpoints = false,
                other => tracing::warn!("Ignoring invalid INDIEAUTH_REQUIRE_HTTPS value: {}", other),
            }
        }

        if let Ok(timeout) = std::env::var("INDIEAUTH_HTTP_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.http.timeout_seconds = secs;
            } else {
                tracing::warn!("Ignoring invalid INDIEAUTH_HTTP_TIMEOUT value: {}", timeout);
            }
        }

        if let Ok(bind) = std::env::var("INDIEAUTH_BIND") {
            self.server.bind = bind;
        }

        if let Ok(external_url) = std::env::var("INDIEAUTH_EXTERNAL_URL") {
            self.server.external_url = external_url;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(client_id) = &cli.client_id {
            self.client.client_id = client_id.clone();
        }

        if let crate::cli::Commands::Serve { bind, external_url } = &cli.command {
            if let Some(bind) = bind {
                self.server.bind = bind.clone();
            }
            if let Some(external_url) = external_url {
                self.server.external_url = external_url.clone();
            }
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.client.client_id.trim().is_empty() {
            return Err(
                IndieAuthError::Config("client.client_id cannot be empty".to_string()).into(),
            );
        }

        match Url::parse(&self.client.default_authorization_endpoint) {
            Ok(url) if url.scheme() == "https" || url.scheme() == "http" => {}
            Ok(url) => {
                return Err(IndieAuthError::Config(format!(
                    "client.default_authorization_endpoint must be http or https, got {}",
                    url.scheme()
                ))
                .into());
            }
            Err(e) => {
                return Err(IndieAuthError::Config(format!(
                    "client.default_authorization_endpoint is not a valid URL: {}",
                    e
                ))
                .into());
            }
        }

        if self.http.timeout_seconds == 0 {
            return Err(IndieAuthError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if Url::parse(&self.server.external_url).is_err() {
            return Err(IndieAuthError::Config(format!(
                "server.external_url is not a valid URL: {}",
                self.server.external_url
            ))
            .into());
        }

        Ok(())
    }
}
