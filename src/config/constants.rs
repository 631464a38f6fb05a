// Project-wide constants
//
// Centralised here so defaults have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Default nebulaONE deployment.
pub const DEFAULT_BASE_URL: &str = "https://nebulaone-pilot.uw.edu";

/// Default agent configuration state the relay talks to.
pub const DEFAULT_CONFIG_STATE_ID: &str = "6752e690-6a81-417b-80f5-61b9e99c6c50";

/// Default GPT system backing the agent (reported as model metadata).
pub const DEFAULT_GPT_SYSTEM_ID: &str = "bd74d1b1-7ea5-4974-bdde-1ddf63cb8300";

/// Default bind address for the relay (localhost only).
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8000";

/// Default CSV usage log, relative to the working directory.
pub const DEFAULT_USAGE_LOG: &str = "data_usage.csv";

/// Default env file that refreshed tokens are written back to.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Env key holding the bearer token (also the key rewritten in the env file).
pub const AUTH_TOKEN_KEY: &str = "NEBULA_AUTH_TOKEN";

/// Browser logins wait up to two minutes for the user, plus page load slack.
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 180;

pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// 0 disables idle expiry: sessions live as long as the process.
pub const DEFAULT_SESSION_TIMEOUT_MINUTES: u64 = 0;

/// Request bodies larger than this are rejected before reaching a handler.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Header carrying the relay's own API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header overriding the shared bearer token for a single request.
pub const TOKEN_OVERRIDE_HEADER: &str = "x-nebula-token";

pub const SERVICE_NAME: &str = "nebula-relay";
