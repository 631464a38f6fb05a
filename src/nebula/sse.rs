// SSE decoding for nebulaONE responses
//
// The upstream sends `event:` lines followed by base64-encoded `data:` lines.
// The current event name sticks until the next `event:` line, blank lines
// included.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::types::{ConversationIds, StreamEvent};

const EVENT_CONVERSATION_IDS: &str = "conversation-and-segment-id";
const EVENT_STEP_UPDATE: &str = "step-update";
const EVENT_RESPONSE_UPDATED: &str = "response-updated";

/// Incremental line parser fed with raw body bytes
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current_event: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every event completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.parse_line(&line).into_iter().collect()
    }

    fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(name) = line.strip_prefix("event:") {
            self.current_event = Some(name.trim().to_string());
            return None;
        }

        let data = line.strip_prefix("data:")?.trim();
        let event = self.current_event.as_deref()?;
        let decoded = decode_data(data);

        match event {
            EVENT_CONVERSATION_IDS => match serde_json::from_str::<ConversationIds>(&decoded) {
                Ok(ids) => Some(StreamEvent::ConversationIds(ids)),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring malformed conversation ids");
                    None
                }
            },
            EVENT_STEP_UPDATE => Some(StreamEvent::Status(decoded)),
            EVENT_RESPONSE_UPDATED => Some(StreamEvent::Chunk(decoded)),
            _ => None,
        }
    }
}

/// Decode a base64 `data:` payload, falling back to the raw text when it is
/// not base64 or does not decode to UTF-8.
pub fn decode_data(data: &str) -> String {
    STANDARD
        .decode(data)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| data.to_string())
}
