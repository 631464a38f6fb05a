// Usage record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rough characters-per-token ratio for English text; the upstream reports no counts.
const CHARS_PER_TOKEN: usize = 4;

/// One row of the usage log, written after each completed exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub input_chars: usize,
    pub output_chars: usize,
    pub total_chars: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl UsageRecord {
    pub fn new(session_id: &str, prompt: &str, response: &str) -> Self {
        let input_chars = prompt.chars().count();
        let output_chars = response.chars().count();
        let input_tokens = estimate_tokens(input_chars);
        let output_tokens = estimate_tokens(output_chars);

        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            input_chars,
            output_chars,
            total_chars: input_chars + output_chars,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

pub fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}
