//! IndieAuth client library
//!
//! Lets a web application sign users in with a URL they control and, when
//! asked, obtain a Micropub access token for that URL.
//!
//! # Architecture
//!
//! - `auth`: endpoint discovery, `state` handling, and the two-phase handshake
//! - `server`: axum host wiring the handshake to routes and cookie sessions
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use indieauth_client::auth::http::ReqwestHttpClient;
//! use indieauth_client::{Config, IndieAuthClient, MemorySession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let http = Arc::new(ReqwestHttpClient::from_config(&config.http)?);
//!     let client = IndieAuthClient::new(http, config.client.clone());
//!
//!     let mut session = MemorySession::default();
//!     let redirect = client
//!         .start_authentication(&mut session, "alice.example", "http://127.0.0.1:5000/callback/authenticate", None)
//!         .await?;
//!     println!("{}", redirect.location);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use auth::{AuthResult, CallbackParams, EndpointSet, IndieAuthClient, MemorySession, SessionStore};
pub use config::Config;
pub use error::{IndieAuthError, Result};
