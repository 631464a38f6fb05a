// Nebula Relay - local bridge to a nebulaONE assistant
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use nebula_relay::auth::{CommandTokenProvider, TokenProvider};
use nebula_relay::config::constants::AUTH_TOKEN_KEY;
use nebula_relay::config::{load_config, update_env_key, RelayConfig};
use nebula_relay::server::RelayServer;

#[derive(Parser)]
#[command(name = "nebula-relay", version, about = "Local HTTP bridge to a nebulaONE assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server (default)
    Serve {
        /// Bind address, overriding RELAY_BIND_ADDRESS
        #[arg(long)]
        bind: Option<String>,
        /// Fetch a fresh token before serving
        #[arg(long)]
        refresh_on_start: bool,
    },
    /// Fetch a fresh token and write it to the env file
    RefreshToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config()?;

    match cli.command.unwrap_or(Command::Serve {
        bind: None,
        refresh_on_start: false,
    }) {
        Command::Serve {
            bind,
            refresh_on_start,
        } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            serve(config, refresh_on_start).await
        }
        Command::RefreshToken => refresh_token(&config).await,
    }
}

async fn serve(config: RelayConfig, refresh_on_start: bool) -> Result<()> {
    let provider = token_provider(&config)?;
    log_banner(&config, provider.is_some());

    let server = RelayServer::new(config, provider.clone())?;

    if refresh_on_start {
        match &provider {
            Some(provider) => match provider.obtain_fresh_token().await {
                Ok(token) => {
                    server.relay().tokens().set(token).await;
                    tracing::info!("Token refreshed successfully");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Token refresh failed, using existing token");
                }
            },
            None => tracing::warn!("--refresh-on-start given but NEBULA_REFRESH_COMMAND is not set"),
        }
    }

    server.serve().await
}

async fn refresh_token(config: &RelayConfig) -> Result<()> {
    let provider = token_provider(config)?.context("NEBULA_REFRESH_COMMAND is not set")?;
    let token = provider.obtain_fresh_token().await?;

    if update_env_key(&config.auth.env_file, AUTH_TOKEN_KEY, &token)? {
        tracing::info!("Token refresh complete");
        Ok(())
    } else {
        anyhow::bail!(
            "Token retrieved but {} does not exist; set {} manually",
            config.auth.env_file.display(),
            AUTH_TOKEN_KEY
        )
    }
}

fn token_provider(config: &RelayConfig) -> Result<Option<Arc<dyn TokenProvider>>> {
    let Some(command) = &config.auth.refresh_command else {
        return Ok(None);
    };
    let provider = CommandTokenProvider::new(
        command,
        Duration::from_secs(config.auth.refresh_timeout_secs),
    )?;
    Ok(Some(Arc::new(provider)))
}

fn log_banner(config: &RelayConfig, refresh_enabled: bool) {
    tracing::info!("nebulaONE relay starting");
    tracing::info!(config_state_id = %config.upstream.config_state_id, "Config state");
    tracing::info!(gpt_system_id = %config.upstream.gpt_system_id, "GPT system");
    tracing::info!(base_url = %config.upstream.base_url, "Upstream");
    tracing::info!(
        api_key_protection = config.server.api_key.is_some(),
        token_refresh = refresh_enabled,
        usage_log = %config.usage_log_path.display(),
        "Relay options"
    );
    tracing::info!(
        "Endpoints: GET /health, POST /chat, POST /chat/stream, POST /chat/full, POST /session/new"
    );
}
