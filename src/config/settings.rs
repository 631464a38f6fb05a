// Configuration structs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use super::constants::*;
use crate::errors::{RelayError, RelayResult};

/// Full relay configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub server: ServerConfig,
    /// CSV file that receives one row per completed exchange
    pub usage_log_path: PathBuf,
}

/// Where and as whom the relay talks to nebulaONE
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL without trailing slash (e.g., "https://nebulaone-pilot.uw.edu")
    pub base_url: String,
    /// Agent configuration state id; part of every upstream URL
    pub config_state_id: String,
    /// GPT system id; reported to callers as model metadata
    pub gpt_system_id: String,
}

/// Bearer token and the optional automated login that renews it
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Initial bearer token (may be absent; a refresh or a per-request header can supply one)
    pub token: Option<String>,
    /// Login helper command line (program followed by its arguments)
    pub refresh_command: Option<Vec<String>>,
    pub refresh_timeout_secs: u64,
    /// Env file refreshed tokens are written back to
    pub env_file: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8000")
    pub bind_address: String,
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Session idle timeout in minutes (0 = never expire)
    pub session_timeout_minutes: u64,
    /// When set, every endpoint except /health requires this value in X-API-Key
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_HTTP_ADDR.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_timeout_minutes: DEFAULT_SESSION_TIMEOUT_MINUTES,
            api_key: None,
        }
    }
}

impl RelayConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> RelayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. Malformed values are a
    /// `RelayError::Config`.
    pub fn from_lookup<F>(lookup: F) -> RelayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = get("NEBULA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = validate_base_url(&base_url)?;

        let config_state_id =
            get("NEBULA_CONFIG_STATE_ID").unwrap_or_else(|| DEFAULT_CONFIG_STATE_ID.to_string());
        let gpt_system_id =
            get("NEBULA_GPT_SYSTEM_ID").unwrap_or_else(|| DEFAULT_GPT_SYSTEM_ID.to_string());

        let bind_address = get("RELAY_BIND_ADDRESS").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        validate_bind_address(&bind_address)?;

        let refresh_command = get("NEBULA_REFRESH_COMMAND").map(|line| {
            line.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        Ok(Self {
            upstream: UpstreamConfig {
                base_url,
                config_state_id,
                gpt_system_id,
            },
            auth: AuthConfig {
                token: get(AUTH_TOKEN_KEY),
                refresh_command,
                refresh_timeout_secs: parse_or(
                    "NEBULA_REFRESH_TIMEOUT_SECS",
                    get("NEBULA_REFRESH_TIMEOUT_SECS"),
                    DEFAULT_REFRESH_TIMEOUT_SECS,
                )?,
                env_file: get("RELAY_ENV_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE)),
            },
            server: ServerConfig {
                bind_address,
                max_sessions: parse_or(
                    "RELAY_MAX_SESSIONS",
                    get("RELAY_MAX_SESSIONS"),
                    DEFAULT_MAX_SESSIONS,
                )?,
                session_timeout_minutes: parse_or(
                    "RELAY_SESSION_TIMEOUT_MINUTES",
                    get("RELAY_SESSION_TIMEOUT_MINUTES"),
                    DEFAULT_SESSION_TIMEOUT_MINUTES,
                )?,
                api_key: get("API_KEY"),
            },
            usage_log_path: get("RELAY_USAGE_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_USAGE_LOG)),
        })
    }

    /// Config pointed at a specific upstream with everything else defaulted.
    ///
    /// Handy for embedding the relay and for tests.
    pub fn for_upstream(base_url: &str, token: Option<&str>) -> RelayResult<Self> {
        let base_url = base_url.to_string();
        let token = token.map(str::to_string);
        Self::from_lookup(move |key| match key {
            "NEBULA_BASE_URL" => Some(base_url.clone()),
            AUTH_TOKEN_KEY => token.clone(),
            _ => None,
        })
    }
}

fn validate_base_url(raw: &str) -> RelayResult<String> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| RelayError::Config(format!("NEBULA_BASE_URL '{raw}' is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RelayError::Config(format!(
            "NEBULA_BASE_URL must use http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn validate_bind_address(raw: &str) -> RelayResult<()> {
    raw.parse::<SocketAddr>().map(|_| ()).map_err(|e| {
        RelayError::Config(format!("RELAY_BIND_ADDRESS '{raw}' is not a socket address: {e}"))
    })
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> RelayResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| RelayError::Config(format!("{key} '{raw}' is invalid: {e}"))),
    }
}
