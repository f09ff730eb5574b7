use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::RwLock;

use crate::{error::AppError, storage::types::message::KnowledgeReference};

#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub query: String,
    pub accumulated_content: String,
    pub references: Vec<KnowledgeReference>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub is_completed: bool,
}

impl StreamRecord {
    fn new(query: String) -> Self {
        Self {
            query,
            accumulated_content: String::new(),
            references: Vec::new(),
            last_updated: chrono::Utc::now(),
            is_completed: false,
        }
    }
}

type SessionStreams = HashMap<String, StreamRecord>;

/// Process-local pub/sub letting a late client re-attach to an in-flight
/// generation: `session_id -> request_id -> StreamRecord` under a
/// reader-writer lock so readers never block each other. Completed records
/// are retained for `retention` then evicted by a delayed background task,
/// the same `tokio::spawn` + `tokio::time::sleep` idiom the reranker pool
/// and ingestion worker loop use for lifecycle-scoped background work.
#[derive(Clone)]
pub struct StreamManager {
    streams: Arc<RwLock<HashMap<String, SessionStreams>>>,
    retention: Duration,
}

impl StreamManager {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub async fn register_stream(&self, session_id: &str, request_id: &str, query: String) {
        let mut streams = self.streams.write().await;
        streams
            .entry(session_id.to_string())
            .or_default()
            .insert(request_id.to_string(), StreamRecord::new(query));
    }

    pub async fn update_stream(
        &self,
        session_id: &str,
        request_id: &str,
        content_delta: &str,
        references: Option<Vec<KnowledgeReference>>,
    ) -> Result<(), AppError> {
        let mut streams = self.streams.write().await;
        let record = streams
            .get_mut(session_id)
            .and_then(|session| session.get_mut(request_id))
            .ok_or_else(|| AppError::NotFound(format!("stream {session_id}/{request_id}")))?;
        record.accumulated_content.push_str(content_delta);
        if let Some(references) = references {
            record.references = references;
        }
        record.last_updated = chrono::Utc::now();
        Ok(())
    }

    /// Marks the stream complete and schedules its eviction after
    /// `retention`. Must always be called, even on an aborted generation —
    /// callers should do so from a drop guard so a cancelled request still
    /// leaves a terminal, re-attachable record.
    pub async fn complete_stream(&self, session_id: &str, request_id: &str) -> Result<(), AppError> {
        {
            let mut streams = self.streams.write().await;
            let record = streams
                .get_mut(session_id)
                .and_then(|session| session.get_mut(request_id))
                .ok_or_else(|| AppError::NotFound(format!("stream {session_id}/{request_id}")))?;
            record.is_completed = true;
            record.last_updated = chrono::Utc::now();
        }

        let streams = self.streams.clone();
        let session_id = session_id.to_string();
        let request_id = request_id.to_string();
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let mut streams = streams.write().await;
            if let Some(session) = streams.get_mut(&session_id) {
                session.remove(&request_id);
                if session.is_empty() {
                    streams.remove(&session_id);
                }
            }
        });

        Ok(())
    }

    pub async fn get_stream(&self, session_id: &str, request_id: &str) -> Option<StreamRecord> {
        let streams = self.streams.read().await;
        streams
            .get(session_id)
            .and_then(|session| session.get(request_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reattach_sees_monotonically_growing_content() {
        let manager = StreamManager::new(Duration::from_secs(30));
        manager
            .register_stream("session-1", "req-1", "hello?".to_string())
            .await;

        manager
            .update_stream("session-1", "req-1", "Hi", None)
            .await
            .expect("update");
        let first = manager.get_stream("session-1", "req-1").await.unwrap();
        assert_eq!(first.accumulated_content, "Hi");

        manager
            .update_stream("session-1", "req-1", " there", None)
            .await
            .expect("update");
        let second = manager.get_stream("session-1", "req-1").await.unwrap();
        assert_eq!(second.accumulated_content, "Hi there");
        assert!(!second.is_completed);
    }

    #[tokio::test]
    async fn complete_stream_marks_terminal_state() {
        let manager = StreamManager::new(Duration::from_secs(30));
        manager
            .register_stream("session-1", "req-1", "q".to_string())
            .await;
        manager.complete_stream("session-1", "req-1").await.expect("complete");

        let record = manager.get_stream("session-1", "req-1").await.unwrap();
        assert!(record.is_completed);
    }

    #[tokio::test]
    async fn get_stream_returns_none_for_unknown_request() {
        let manager = StreamManager::new(Duration::from_secs(30));
        assert!(manager.get_stream("nope", "nope").await.is_none());
    }
}
