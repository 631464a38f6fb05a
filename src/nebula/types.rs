// nebulaONE API request/response types

use serde::{Deserialize, Serialize};

/// Request body for the first question of a conversation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationRequest {
    pub question: String,
    pub vision_image_ids: Vec<String>,
    pub attachment_ids: Vec<String>,
    pub session: SessionRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_identifier: String,
}

/// Request body for a follow-up question, chained to the previous segment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub question: String,
    pub parent_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QuestionRequest {
    New(NewConversationRequest),
    FollowUp(FollowUpRequest),
}

/// Payload of the `conversation-and-segment-id` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConversationIds {
    #[serde(rename = "ConversationId", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "ConversationSegmentId", default)]
    pub segment_id: Option<String>,
}

/// High-level event decoded from the upstream SSE stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ConversationIds(ConversationIds),
    /// Progress note such as "Thinking"
    Status(String),
    /// Incremental response text
    Chunk(String),
}

/// Conversation state carried between turns of one session
#[derive(Debug, Clone)]
pub struct Conversation {
    pub conversation_id: Option<String>,
    pub last_segment_id: Option<String>,
    pub session_identifier: String,
}

impl Conversation {
    pub fn new(session_identifier: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            last_segment_id: None,
            session_identifier: session_identifier.into(),
        }
    }

    /// True once the upstream has assigned ids, so the next question is a follow-up
    pub fn is_started(&self) -> bool {
        self.conversation_id.is_some() && self.last_segment_id.is_some()
    }

    /// Record ids announced by the upstream. Missing ids keep their previous value.
    pub fn apply(&mut self, ids: &ConversationIds) {
        if let Some(id) = &ids.conversation_id {
            self.conversation_id = Some(id.clone());
        }
        if let Some(id) = &ids.segment_id {
            self.last_segment_id = Some(id.clone());
        }
    }
}

/// Result of a fully drained exchange
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExchangeResult {
    pub conversation_id: Option<String>,
    pub segment_id: Option<String>,
    pub response: String,
    pub status_updates: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_conversation_serialization() {
        let request = QuestionRequest::New(NewConversationRequest {
            question: "Hi".into(),
            vision_image_ids: vec![],
            attachment_ids: vec![],
            session: SessionRef {
                session_identifier: "s-1".into(),
            },
        });
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "question": "Hi",
                "visionImageIds": [],
                "attachmentIds": [],
                "session": {"sessionIdentifier": "s-1"}
            })
        );
    }

    #[test]
    fn test_follow_up_serialization() {
        let request = QuestionRequest::FollowUp(FollowUpRequest {
            question: "And then?".into(),
            parent_id: "seg-9".into(),
        });
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"question": "And then?", "parentId": "seg-9"})
        );
    }

    #[test]
    fn test_conversation_apply_keeps_missing_ids() {
        let mut conversation = Conversation::new("s");
        conversation.apply(&ConversationIds {
            conversation_id: Some("c1".into()),
            segment_id: Some("g1".into()),
        });
        conversation.apply(&ConversationIds {
            conversation_id: None,
            segment_id: Some("g2".into()),
        });
        assert_eq!(conversation.conversation_id.as_deref(), Some("c1"));
        assert_eq!(conversation.last_segment_id.as_deref(), Some("g2"));
        assert!(conversation.is_started());
        assert_eq!(conversation.session_identifier, "s");
    }
}
