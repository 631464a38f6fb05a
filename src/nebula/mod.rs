// nebulaONE upstream API
// Request building, SSE decoding and per-session conversation state

pub mod client;
pub mod sse;
pub mod types;

pub use client::{EventReceiver, NebulaClient};
pub use sse::SseParser;
pub use types::{Conversation, ConversationIds, ExchangeResult, StreamEvent};
