//! Command-line interface definition
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the demo host and inspecting discovery.

use clap::{Parser, Subcommand};

/// IndieAuth client - sign in with your domain, obtain Micropub tokens
#[derive(Parser, Debug, Clone)]
#[command(name = "indieauth-client")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the configured client identifier
    #[arg(long)]
    pub client_id: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the demo web host with sign-in and authorization routes
    Serve {
        /// Socket address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Externally reachable base URL used for callback URLs
        #[arg(long)]
        external_url: Option<String>,
    },

    /// Discover the endpoints advertised by an identifier and print them
    Discover {
        /// The identifier to inspect (e.g. `alice.example`)
        me: String,
    },

    /// Print the authorization redirect URL for an identifier
    LoginUrl {
        /// The identifier to sign in as
        me: String,

        /// Scope to request (defaults to the configured scope)
        #[arg(short, long)]
        scope: Option<String>,

        /// Continuation target to carry through the handshake
        #[arg(short, long)]
        next: Option<String>,

        /// Callback URL (defaults to the demo host's callback)
        #[arg(long)]
        redirect_uri: Option<String>,

        /// Request identity only, without a scope
        #[arg(long)]
        authenticate_only: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
