// Relay orchestration
// Ties sessions, the token lifecycle, the upstream client and the usage log together

use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use super::session::{Session, SessionManager};
use crate::auth::TokenManager;
use crate::config::UpstreamConfig;
use crate::errors::{RelayError, RelayResult};
use crate::nebula::{Conversation, EventReceiver, ExchangeResult, NebulaClient};
use crate::usage::{UsageLogger, UsageRecord};

/// Outcome of a buffered exchange
#[derive(Debug, Clone)]
pub struct Exchange {
    pub session_id: String,
    pub result: ExchangeResult,
    pub usage: UsageRecord,
}

/// An upstream stream that has passed authentication, ready to be relayed.
///
/// Holds the session's conversation lock until dropped.
pub struct OpenStream {
    pub session: Arc<Session>,
    pub conversation: OwnedMutexGuard<Conversation>,
    pub events: EventReceiver,
}

pub struct Relay {
    client: NebulaClient,
    upstream: UpstreamConfig,
    tokens: Arc<TokenManager>,
    sessions: Arc<SessionManager>,
    usage: Arc<UsageLogger>,
}

impl Relay {
    pub fn new(
        client: NebulaClient,
        upstream: UpstreamConfig,
        tokens: Arc<TokenManager>,
        sessions: Arc<SessionManager>,
        usage: Arc<UsageLogger>,
    ) -> Self {
        Self {
            client,
            upstream,
            tokens,
            sessions,
            usage,
        }
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn usage(&self) -> &Arc<UsageLogger> {
        &self.usage
    }

    /// Send `message` on a session and wait for the complete reply.
    ///
    /// A token rejection triggers at most one refresh and one retry. Usage is
    /// logged once the reply is complete.
    pub async fn exchange(
        &self,
        session_id: Option<&str>,
        message: &str,
        token_override: Option<&str>,
    ) -> RelayResult<Exchange> {
        let message = validate_message(message)?;
        let session = self.sessions.get_or_create(session_id)?;
        let conversation = session.conversation();
        let mut conversation = conversation.lock().await;

        let mut attempt = self.tokens.begin(token_override).await?;
        let result = loop {
            let outcome = self
                .client
                .send_message(&attempt.token, &mut conversation, message)
                .await;
            match outcome {
                Err(RelayError::Auth(reason)) => {
                    attempt = self.tokens.after_rejection(&attempt, reason).await?;
                }
                other => break other?,
            }
        };
        drop(conversation);
        session.touch();

        let usage = UsageRecord::new(&session.id, message, &result.response);
        self.usage.record(&usage);

        tracing::info!(
            session_id = %session.id,
            conversation_id = ?result.conversation_id,
            response_chars = usage.output_chars,
            "Exchange complete"
        );

        Ok(Exchange {
            session_id: session.id.clone(),
            result,
            usage,
        })
    }

    /// Open an authenticated upstream stream for `message`.
    ///
    /// Auth and upstream failures are reported here, before any byte reaches
    /// the client; the returned stream is relayed by the caller.
    pub async fn open_stream(
        &self,
        session_id: Option<&str>,
        message: &str,
        token_override: Option<&str>,
    ) -> RelayResult<OpenStream> {
        let message = validate_message(message)?;
        let session: Arc<Session> = self.sessions.get_or_create(session_id)?;
        let conversation = session.conversation().lock_owned().await;

        let mut attempt = self.tokens.begin(token_override).await?;
        let events = loop {
            let outcome = self
                .client
                .open_stream(&attempt.token, &conversation, message)
                .await;
            match outcome {
                Err(RelayError::Auth(reason)) => {
                    attempt = self.tokens.after_rejection(&attempt, reason).await?;
                }
                other => break other?,
            }
        };

        Ok(OpenStream {
            session,
            conversation,
            events,
        })
    }

    /// Log a completed streamed exchange
    pub fn record_usage(&self, session: &Session, message: &str, response: &str) -> UsageRecord {
        session.touch();
        let usage = UsageRecord::new(&session.id, message, response);
        self.usage.record(&usage);
        usage
    }

    /// Start a fresh session, discarding `previous` if given
    pub fn new_session(&self, previous: Option<&str>) -> RelayResult<String> {
        if let Some(previous) = previous {
            if self.sessions.delete(previous) {
                tracing::info!(session_id = %previous, "Session discarded");
            }
        }
        Ok(self.sessions.create()?.id.clone())
    }
}

fn validate_message(message: &str) -> RelayResult<&str> {
    if message.trim().is_empty() {
        return Err(RelayError::missing_message());
    }
    Ok(message)
}
