// SSE relay
//
// Forwards upstream chunks to the client as `data: {"chunk": ...}` events and
// closes with a `done` event. A client disconnect drops the outgoing channel,
// which stops the relay task, which drops the upstream receiver and with it
// the upstream connection.

use axum::response::sse::Event;
use futures::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::relay::{OpenStream, Relay};
use crate::nebula::StreamEvent;

const CLIENT_CHANNEL_CAPACITY: usize = 100;

/// Spawn the relay task for `open` and return the client-facing event stream
pub fn relay_events(
    relay: Arc<Relay>,
    open: OpenStream,
    message: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);

    tokio::spawn(forward(relay, open, message, tx));

    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    })
}

async fn forward(relay: Arc<Relay>, open: OpenStream, message: String, tx: mpsc::Sender<Event>) {
    let OpenStream {
        session,
        mut conversation,
        mut events,
    } = open;
    let session_id = session.id.clone();
    let mut full_response = String::new();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tx.closed() => {
                tracing::info!(session_id = %session_id, "Client disconnected, closing upstream stream");
                return;
            }
        };
        let Some(event) = event else { break };

        match event {
            Ok(StreamEvent::ConversationIds(ids)) => conversation.apply(&ids),
            Ok(StreamEvent::Status(status)) => {
                tracing::debug!(session_id = %session_id, status = %status, "Upstream status");
            }
            Ok(StreamEvent::Chunk(text)) => {
                let event = Event::default().data(json!({ "chunk": text }).to_string());
                full_response.push_str(&text);
                if tx.send(event).await.is_err() {
                    tracing::info!(session_id = %session_id, "Client disconnected, closing upstream stream");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Upstream stream failed");
                let event = Event::default().data(json!({ "error": e.to_string() }).to_string());
                let _ = tx.send(event).await;
                return;
            }
        }
    }

    let conversation_id = conversation.conversation_id.clone();
    drop(conversation);

    relay.record_usage(&session, &message, &full_response);
    tracing::info!(
        session_id = %session_id,
        conversation_id = ?conversation_id,
        response_chars = full_response.chars().count(),
        "Streamed exchange complete"
    );

    let done = json!({
        "done": true,
        "full_response": full_response,
        "session_id": session_id,
        "conversation_id": conversation_id,
    });
    let _ = tx.send(Event::default().data(done.to_string())).await;
}
