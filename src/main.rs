//! IndieAuth client CLI
//!
//! Runs the demo host or inspects how an identifier would be handled.

use std::sync::Arc;

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use indieauth_client::auth::flow::normalize_me;
use indieauth_client::auth::http::ReqwestHttpClient;
use indieauth_client::cli::{Cli, Commands};
use indieauth_client::config::Config;
use indieauth_client::server::{self, AUTHENTICATE_CALLBACK_PATH, AUTHORIZE_CALLBACK_PATH};
use indieauth_client::{IndieAuthClient, MemorySession};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting demo host");
            server::serve(&config).await?;
            Ok(())
        }
        Commands::Discover { me } => {
            let me = normalize_me(&me)?;
            tracing::debug!("Discovering endpoints for {}", me);

            let client = build_client(&config)?;
            let endpoints = client.discover(&me).await;
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
            Ok(())
        }
        Commands::LoginUrl {
            me,
            scope,
            next,
            redirect_uri,
            authenticate_only,
        } => {
            let client = build_client(&config)?;
            let base = config.server.external_url.trim_end_matches('/');
            let mut session = MemorySession::default();

            let redirect = if authenticate_only {
                let redirect_uri = redirect_uri
                    .unwrap_or_else(|| format!("{}{}", base, AUTHENTICATE_CALLBACK_PATH));
                client
                    .start_authentication(&mut session, &me, &redirect_uri, next.as_deref())
                    .await?
            } else {
                let redirect_uri =
                    redirect_uri.unwrap_or_else(|| format!("{}{}", base, AUTHORIZE_CALLBACK_PATH));
                client
                    .start_authorization(
                        &mut session,
                        &me,
                        &redirect_uri,
                        next.as_deref(),
                        scope.as_deref(),
                    )
                    .await?
            };

            println!("{}", redirect.location);
            Ok(())
        }
    }
}

fn build_client(config: &Config) -> Result<IndieAuthClient> {
    let http = Arc::new(ReqwestHttpClient::from_config(&config.http)?);
    Ok(IndieAuthClient::new(http, config.client.clone()))
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "indieauth_client=debug"
    } else {
        "indieauth_client=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
