// HTTP client for the nebulaONE assistant API

use futures::stream::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;

use super::sse::SseParser;
use super::types::{
    Conversation, ExchangeResult, FollowUpRequest, NewConversationRequest, QuestionRequest,
    SessionRef, StreamEvent,
};
use crate::config::UpstreamConfig;
use crate::errors::{RelayError, RelayResult};

const CONNECT_TIMEOUT_SECS: u64 = 15;
const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Receiving half of an upstream stream. Dropping it aborts the upstream read,
/// even while the upstream is silent.
pub type EventReceiver = mpsc::Receiver<RelayResult<StreamEvent>>;

/// Stateless client; conversation state is passed in per call.
///
/// No overall request timeout is set because generation can run for minutes;
/// only connecting is bounded.
#[derive(Clone)]
pub struct NebulaClient {
    client: Client,
    base_url: String,
    config_state_id: String,
}

impl NebulaClient {
    pub fn new(config: &UpstreamConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            config_state_id: config.config_state_id.clone(),
        })
    }

    /// URL and body for the next question in `conversation`
    pub fn prepare_request(&self, conversation: &Conversation, message: &str) -> (String, QuestionRequest) {
        let conversations_url = format!(
            "{}/api/internal/configStates/{}/conversations",
            self.base_url, self.config_state_id
        );

        match (&conversation.conversation_id, &conversation.last_segment_id) {
            (Some(conversation_id), Some(segment_id)) => (
                format!("{conversations_url}/{conversation_id}/segments"),
                QuestionRequest::FollowUp(FollowUpRequest {
                    question: message.to_string(),
                    parent_id: segment_id.clone(),
                }),
            ),
            _ => (
                conversations_url,
                QuestionRequest::New(NewConversationRequest {
                    question: message.to_string(),
                    vision_image_ids: Vec::new(),
                    attachment_ids: Vec::new(),
                    session: SessionRef {
                        session_identifier: conversation.session_identifier.clone(),
                    },
                }),
            ),
        }
    }

    /// Send a question and return a channel of decoded events.
    ///
    /// Authentication failures (401/403) surface as `RelayError::Auth` before
    /// any event is produced, so callers can refresh and retry.
    pub async fn open_stream(
        &self,
        token: &str,
        conversation: &Conversation,
        message: &str,
    ) -> RelayResult<EventReceiver> {
        let (url, payload) = self.prepare_request(conversation, message);

        tracing::debug!(url = %url, follow_up = conversation.is_started(), "Sending question to nebulaONE");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::upstream(format!("Error communicating with nebulaONE API: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Auth(format!(
                "nebulaONE rejected the bearer token (status {}){}",
                status.as_u16(),
                if body.is_empty() { String::new() } else { format!(": {body}") }
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream {
                status: Some(status.as_u16()),
                message: format!("nebulaONE API request failed: {body}"),
            });
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        // Spawn task to parse SSE stream
        tokio::spawn(async move {
            tracing::debug!("[STREAM] nebulaONE streaming task started");
            let mut stream = response.bytes_stream();
            let mut parser = SseParser::new();

            loop {
                let chunk = tokio::select! {
                    chunk = stream.next() => chunk,
                    _ = tx.closed() => {
                        tracing::debug!("[STREAM] Receiver dropped, closing upstream");
                        return;
                    }
                };
                let Some(chunk) = chunk else { break };

                match chunk {
                    Ok(bytes) => {
                        for event in parser.feed(&bytes) {
                            if tx.send(Ok(event)).await.is_err() {
                                tracing::debug!("[STREAM] Receiver dropped, closing upstream");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(RelayError::upstream(format!(
                                "Stream from nebulaONE API interrupted: {e}"
                            ))))
                            .await;
                        return;
                    }
                }
            }

            for event in parser.finish() {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            tracing::debug!("[STREAM] nebulaONE stream complete");
        });

        Ok(rx)
    }

    /// Send a question and wait for the complete response, updating
    /// `conversation` with the ids the upstream assigns.
    pub async fn send_message(
        &self,
        token: &str,
        conversation: &mut Conversation,
        message: &str,
    ) -> RelayResult<ExchangeResult> {
        let mut events = self.open_stream(token, conversation, message).await?;
        let mut result = ExchangeResult::default();

        while let Some(event) = events.recv().await {
            match event? {
                StreamEvent::ConversationIds(ids) => {
                    conversation.apply(&ids);
                    if ids.conversation_id.is_some() {
                        result.conversation_id = ids.conversation_id;
                    }
                    if ids.segment_id.is_some() {
                        result.segment_id = ids.segment_id;
                    }
                }
                StreamEvent::Status(status) => result.status_updates.push(status),
                StreamEvent::Chunk(text) => result.response.push_str(&text),
            }
        }

        Ok(result)
    }
}
