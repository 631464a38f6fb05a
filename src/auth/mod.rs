// Token lifecycle
//
// The relay holds one shared bearer token. When the upstream rejects it, a
// TokenProvider is asked for a fresh one (typically by driving a headless
// browser login) and the request is retried once.

use anyhow::Result;
use async_trait::async_trait;

pub mod command;
pub mod jwt;
pub mod token;

pub use command::CommandTokenProvider;
pub use token::{AuthAttempt, TokenManager};

/// Source of fresh bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a fresh token, e.g. by completing an automated login
    async fn obtain_fresh_token(&self) -> Result<String>;
}
