// Configuration loader
// Merges ./.env into the process environment, then reads RelayConfig from it

use anyhow::{Context, Result};

use super::settings::RelayConfig;

/// Load configuration from `.env` (if present) and the environment
pub fn load_config() -> Result<RelayConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded env file"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found, using process environment"),
        Err(e) => return Err(e).context("Failed to parse .env file"),
    }

    let config = RelayConfig::from_env().context("Invalid relay configuration")?;

    if config.auth.token.is_none() {
        tracing::warn!(
            "NEBULA_AUTH_TOKEN not set. Requests must supply X-Nebula-Token or rely on a token refresh."
        );
    }

    Ok(config)
}
