use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A snapshot of one source used to answer a message, kept for audit/display
/// independent of whether the underlying chunk is later edited or deleted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KnowledgeReference {
    pub knowledge_id: String,
    pub chunk_id: String,
    pub title: String,
    pub content: String,
    pub start_offset: u32,
    pub end_offset: u32,
}

stored_object!(Message, "message", {
    tenant_id: String,
    session_id: String,
    role: MessageRole,
    content: String,
    request_id: String,
    is_completed: bool,
    knowledge_references: Vec<KnowledgeReference>
});

impl Message {
    pub fn new_user(
        tenant_id: String,
        session_id: String,
        content: String,
        request_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            session_id,
            role: MessageRole::User,
            content,
            request_id,
            is_completed: true,
            knowledge_references: Vec::new(),
        }
    }

    pub fn new_pending_assistant(
        tenant_id: String,
        session_id: String,
        request_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            session_id,
            role: MessageRole::Assistant,
            content: String::new(),
            request_id,
            is_completed: false,
            knowledge_references: Vec::new(),
        }
    }

    pub async fn complete(
        &mut self,
        db: &SurrealDbClient,
        content: String,
        references: Vec<KnowledgeReference>,
    ) -> Result<(), AppError> {
        self.content = content;
        self.knowledge_references = references;
        self.is_completed = true;
        self.updated_at = Utc::now();
        db.store_item(self.clone()).await?;
        Ok(())
    }

    pub async fn history_for_session(
        db: &SurrealDbClient,
        session_id: &str,
        max_rounds: u32,
    ) -> Result<Vec<Message>, AppError> {
        let limit = max_rounds.saturating_mul(2);
        db.client
            .query(
                "SELECT * FROM message WHERE session_id = $session_id AND is_completed = true \
                 ORDER BY created_at DESC LIMIT $limit;",
            )
            .bind(("session_id", session_id.to_owned()))
            .bind(("limit", limit))
            .await
            .map_err(AppError::Database)?
            .take::<Vec<Message>>(0)
            .map(|mut rows| {
                rows.reverse();
                rows
            })
            .map_err(AppError::Database)
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Renders history as a flat transcript, used when a chat model call needs
/// plain text rather than structured messages (e.g. query rewriting).
#[must_use]
pub fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_history_renders_role_prefixes() {
        let history = vec![Message::new_user(
            "t".into(),
            "s".into(),
            "hi".into(),
            "r1".into(),
        )];
        assert_eq!(format_history(&history), "user: hi");
    }
}
