// HTTP request/response bodies

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub conversation_id: Option<String>,
}

/// `/chat/full` body: the response plus everything known about the exchange
#[derive(Debug, Clone, Serialize)]
pub struct FullChatResponse {
    pub response: String,
    pub session_id: String,
    pub conversation_id: Option<String>,
    pub segment_id: Option<String>,
    pub status_updates: Vec<String>,
    pub model: ModelInfo,
    pub usage: UsageInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub config_state_id: String,
    pub gpt_system_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageInfo {
    pub input_chars: usize,
    pub output_chars: usize,
    pub total_chars: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub active_sessions: usize,
}
