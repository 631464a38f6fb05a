// Relay Server Module
// HTTP front end that forwards chat traffic to nebulaONE

mod handlers;
mod middleware;
mod relay;
mod session;
mod stream;
pub mod types;

pub use crate::config::ServerConfig;
pub use handlers::{
    create_router, handle_chat, handle_chat_full, handle_chat_stream, handle_new_session,
    health_check,
};
pub use middleware::auth_middleware;
pub use relay::{Exchange, OpenStream, Relay};
pub use session::{Session, SessionManager};
pub use types::*;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::auth::{TokenManager, TokenProvider};
use crate::config::constants::MAX_BODY_BYTES;
use crate::config::RelayConfig;
use crate::nebula::NebulaClient;
use crate::usage::UsageLogger;

/// Main relay server structure
pub struct RelayServer {
    /// Server configuration
    config: ServerConfig,
    /// Request orchestration (shared with streaming tasks)
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Create a relay server.
    ///
    /// `provider` renews the shared token when the upstream rejects it; with
    /// `None`, rejections surface to callers as authentication errors.
    pub fn new(config: RelayConfig, provider: Option<Arc<dyn TokenProvider>>) -> Result<Self> {
        let client = NebulaClient::new(&config.upstream)?;
        let tokens = TokenManager::new(config.auth.token.clone(), provider)
            .with_env_file(config.auth.env_file.clone());
        let sessions = SessionManager::new(
            config.server.max_sessions,
            config.server.session_timeout_minutes,
        );
        let usage = UsageLogger::new(config.usage_log_path.clone());

        let relay = Relay::new(
            client,
            config.upstream.clone(),
            Arc::new(tokens),
            Arc::new(sessions),
            Arc::new(usage),
        );

        Ok(Self {
            config: config.server,
            relay: Arc::new(relay),
        })
    }

    /// Router with body limit and request tracing applied
    pub fn into_router(self) -> axum::Router {
        create_router(Arc::new(self))
            .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server and run until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.config.bind_address))?;

        self.spawn_session_purger();

        let app = self.into_router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!("Starting nebula relay on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        tracing::info!("Relay stopped");
        Ok(())
    }

    /// Periodically drop idle sessions when an idle timeout is configured
    fn spawn_session_purger(&self) {
        let sessions = Arc::clone(self.relay.sessions());
        let timeout_minutes = sessions.timeout_minutes();
        if timeout_minutes == 0 {
            return;
        }

        let period = Duration::from_secs((timeout_minutes * 60).clamp(60, 600));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                sessions.purge_expired();
            }
        });
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get reference to the relay
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Shared handle to the relay, for tasks that outlive a request
    pub fn relay_handle(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
