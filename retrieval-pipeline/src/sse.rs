use common::storage::types::message::KnowledgeReference;
use serde::Serialize;

/// The SSE envelope every event on `/api/v1/knowledge-chat/:session_id` and
/// its reattach counterpart carries (SPEC_FULL §6). Ordering within one
/// producer is strict: an optional `references` event, then N `answer`
/// deltas, then exactly one terminal `done: true` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    References,
    Answer,
}

#[derive(Debug, Clone, Serialize)]
pub struct SseEvent {
    pub id: String,
    pub response_type: ResponseType,
    pub content: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_references: Option<Vec<KnowledgeReference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SseEvent {
    #[must_use]
    pub fn references(request_id: &str, references: Vec<KnowledgeReference>) -> Self {
        Self {
            id: request_id.to_string(),
            response_type: ResponseType::References,
            content: String::new(),
            done: false,
            knowledge_references: Some(references),
            error: None,
        }
    }

    #[must_use]
    pub fn answer_delta(request_id: &str, delta: &str) -> Self {
        Self {
            id: request_id.to_string(),
            response_type: ResponseType::Answer,
            content: delta.to_string(),
            done: false,
            knowledge_references: None,
            error: None,
        }
    }

    #[must_use]
    pub fn done(request_id: &str) -> Self {
        Self {
            id: request_id.to_string(),
            response_type: ResponseType::Answer,
            content: String::new(),
            done: true,
            knowledge_references: None,
            error: None,
        }
    }

    #[must_use]
    pub fn terminal_error(request_id: &str, message: String) -> Self {
        Self {
            id: request_id.to_string(),
            response_type: ResponseType::Answer,
            content: String::new(),
            done: true,
            knowledge_references: None,
            error: Some(message),
        }
    }
}
