// Shared bearer token with refresh-once semantics

use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::{jwt, TokenProvider};
use crate::config::constants::AUTH_TOKEN_KEY;
use crate::config::update_env_key;
use crate::errors::{RelayError, RelayResult};

/// The token a single request is using, and whether it may still refresh
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    pub token: String,
    generation: u64,
    refreshed: bool,
    overridden: bool,
}

impl AuthAttempt {
    /// Whether this attempt already spent its one refresh
    pub fn refreshed(&self) -> bool {
        self.refreshed
    }
}

#[derive(Debug)]
struct TokenState {
    token: Option<String>,
    generation: u64,
}

pub struct TokenManager {
    state: RwLock<TokenState>,
    /// Serializes refreshes so concurrent 401s trigger a single login
    refresh_lock: Mutex<()>,
    provider: Option<Arc<dyn TokenProvider>>,
    /// Env file refreshed tokens are written back to
    env_file: Option<PathBuf>,
    refresh_count: AtomicU64,
}

impl TokenManager {
    pub fn new(token: Option<String>, provider: Option<Arc<dyn TokenProvider>>) -> Self {
        Self {
            state: RwLock::new(TokenState {
                token,
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
            provider,
            env_file: None,
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Persist refreshed tokens to `path` (only when the file already exists)
    pub fn with_env_file(mut self, path: PathBuf) -> Self {
        self.env_file = Some(path);
        self
    }

    pub fn can_refresh(&self) -> bool {
        self.provider.is_some()
    }

    /// Number of refreshes that actually called the provider
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    pub async fn current(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    /// Pick the token for a new request.
    ///
    /// A per-request override is used as-is and never refreshed. Otherwise a
    /// missing or expired shared token is refreshed up front when possible,
    /// which spends the request's single refresh.
    pub async fn begin(&self, override_token: Option<&str>) -> RelayResult<AuthAttempt> {
        if let Some(token) = override_token {
            return Ok(AuthAttempt {
                token: token.to_string(),
                generation: 0,
                refreshed: false,
                overridden: true,
            });
        }

        let (token, generation) = {
            let state = self.state.read().await;
            (state.token.clone(), state.generation)
        };

        match token {
            Some(token) if !jwt::is_expired(&token, Utc::now()) => Ok(AuthAttempt {
                token,
                generation,
                refreshed: false,
                overridden: false,
            }),
            Some(token) if !self.can_refresh() => {
                tracing::warn!("Bearer token looks expired and no refresh is configured");
                Ok(AuthAttempt {
                    token,
                    generation,
                    refreshed: false,
                    overridden: false,
                })
            }
            Some(_) => {
                tracing::info!("Bearer token expired, refreshing before use");
                self.refresh(generation).await
            }
            None if self.can_refresh() => {
                tracing::info!("No bearer token configured, refreshing before use");
                self.refresh(generation).await
            }
            None => Err(RelayError::Auth(
                "No authentication token provided".to_string(),
            )),
        }
    }

    /// Called after the upstream rejected `attempt`. Returns a refreshed
    /// attempt, or the rejection as `Auth` once the refresh is spent.
    pub async fn after_rejection(
        &self,
        attempt: &AuthAttempt,
        reason: String,
    ) -> RelayResult<AuthAttempt> {
        if attempt.refreshed || attempt.overridden || !self.can_refresh() {
            return Err(RelayError::Auth(reason));
        }
        tracing::warn!(reason = %reason, "Upstream rejected bearer token, refreshing once");
        self.refresh(attempt.generation).await
    }

    /// Replace the shared token outright (e.g. a refresh at startup)
    pub async fn set(&self, token: String) {
        self.store(token).await;
    }

    /// Install a new token and persist it; returns its generation
    async fn store(&self, token: String) -> u64 {
        let generation = {
            let mut state = self.state.write().await;
            state.token = Some(token.clone());
            state.generation += 1;
            state.generation
        };

        if let Some(path) = self.env_file.clone() {
            let persisted =
                tokio::task::spawn_blocking(move || update_env_key(&path, AUTH_TOKEN_KEY, &token))
                    .await;
            match persisted {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to persist refreshed token"),
                Err(e) => tracing::warn!(error = %e, "Token persistence task failed"),
            }
        }
        generation
    }

    /// Refresh the token unless someone already replaced `stale_generation`
    async fn refresh(&self, stale_generation: u64) -> RelayResult<AuthAttempt> {
        let Some(provider) = &self.provider else {
            return Err(RelayError::Auth("Token refresh is not configured".to_string()));
        };

        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            if state.generation != stale_generation {
                if let Some(token) = &state.token {
                    tracing::debug!("Token already refreshed by a concurrent request");
                    return Ok(AuthAttempt {
                        token: token.clone(),
                        generation: state.generation,
                        refreshed: true,
                        overridden: false,
                    });
                }
            }
        }

        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        let token = provider
            .obtain_fresh_token()
            .await
            .map_err(|e| RelayError::Auth(format!("Token refresh failed: {e:#}")))?;

        let generation = self.store(token.clone()).await;
        tracing::info!(generation = generation, "Bearer token refreshed");

        Ok(AuthAttempt {
            token,
            generation,
            refreshed: true,
            overridden: false,
        })
    }
}
