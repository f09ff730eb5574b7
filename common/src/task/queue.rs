use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::knowledge::Knowledge},
    stored_object,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskPriority {
    Critical,
    Default,
    Low,
}

impl TaskPriority {
    /// Relative worker weight: `critical`:`default`:`low` = 6:3:1.
    #[must_use]
    pub fn weight(self) -> u32 {
        match self {
            TaskPriority::Critical => 6,
            TaskPriority::Default => 3,
            TaskPriority::Low => 1,
        }
    }

    const ALL: [TaskPriority; 3] = [TaskPriority::Critical, TaskPriority::Default, TaskPriority::Low];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TaskKind {
    ChunkExtract,
    IndexCopy,
    LargeIngest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TaskStatus {
    Created,
    InProgress {
        attempts: u32,
        last_attempt: DateTime<Utc>,
    },
    Completed,
    Error(String),
    Cancelled,
}

pub const MAX_ATTEMPTS: u32 = 5;

stored_object!(Task, "task", {
    tenant_id: String,
    kind: TaskKind,
    priority: TaskPriority,
    /// Tenant/request context propagated to the worker: knowledge_id,
    /// kb_id, request_id, and kind-specific fields.
    payload: Value,
    status: TaskStatus
});

impl Task {
    #[must_use]
    pub fn new(tenant_id: String, kind: TaskKind, priority: TaskPriority, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            kind,
            priority,
            payload,
            status: TaskStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Exponential backoff delay before a retried task becomes claimable again:
/// `2^attempts` seconds, capped at five minutes.
#[must_use]
pub fn backoff_delay(attempts: u32) -> chrono::Duration {
    let seconds = 2u64.saturating_pow(attempts).min(300);
    chrono::Duration::seconds(seconds as i64)
}

/// Weighted three-lane broker over a single `task` table, grounded on the
/// source crate's `IngestionTask` claim-lease loop (`get_unfinished_tasks`,
/// attempt counting, dead-letter past `MAX_ATTEMPTS`) generalized from one
/// implicit queue to `critical`/`default`/`low` lanes sharing a claim query
/// parameterized by priority.
pub struct TaskQueue {
    db: std::sync::Arc<SurrealDbClient>,
}

impl TaskQueue {
    #[must_use]
    pub fn new(db: std::sync::Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub async fn enqueue(
        &self,
        tenant_id: String,
        kind: TaskKind,
        priority: TaskPriority,
        payload: Value,
    ) -> Result<Task, AppError> {
        let task = Task::new(tenant_id, kind, priority, payload);
        self.db.store_item(task.clone()).await?;
        Ok(task)
    }

    async fn ready_in_lane(&self, priority: TaskPriority) -> Result<Vec<Task>, AppError> {
        self.db
            .query(
                "SELECT * FROM task WHERE priority = $priority AND \
                 (status = 'Created' OR (status.InProgress != NONE \
                  AND status.InProgress.attempts < $max_attempts \
                  AND status.InProgress.last_attempt < $cutoff)) \
                 ORDER BY created_at ASC LIMIT 50;",
            )
            .bind(("priority", priority))
            .bind(("max_attempts", MAX_ATTEMPTS))
            .bind(("cutoff", Utc::now() - backoff_delay(1)))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)
    }

    /// Picks a non-empty lane by weighted random draw, then claims its
    /// oldest ready task by flipping it to `InProgress`. Returns `None`
    /// when every lane is empty.
    pub async fn claim_next_ready(&self) -> Result<Option<Task>, AppError> {
        let mut lanes = Vec::with_capacity(3);
        for priority in TaskPriority::ALL {
            let ready = self.ready_in_lane(priority).await?;
            if !ready.is_empty() {
                lanes.push((priority, ready));
            }
        }
        if lanes.is_empty() {
            return Ok(None);
        }

        let total_weight: u32 = lanes.iter().map(|(priority, _)| priority.weight()).sum();
        let mut draw = rand::thread_rng().gen_range(0..total_weight);
        let chosen = lanes
            .iter()
            .find(|(priority, _)| {
                let weight = priority.weight();
                if draw < weight {
                    true
                } else {
                    draw -= weight;
                    false
                }
            })
            .unwrap_or(&lanes[0]);

        let task = chosen.1[0].clone();
        let attempts = match &task.status {
            TaskStatus::InProgress { attempts, .. } => attempts + 1,
            _ => 1,
        };
        self.mark_in_progress(&task.id, attempts).await?;

        Ok(Some(task))
    }

    async fn mark_in_progress(&self, id: &str, attempts: u32) -> Result<(), AppError> {
        self.set_status(
            id,
            TaskStatus::InProgress {
                attempts,
                last_attempt: Utc::now(),
            },
        )
        .await
    }

    pub async fn complete(&self, id: &str) -> Result<(), AppError> {
        self.set_status(id, TaskStatus::Completed).await
    }

    /// Records a failed attempt. Past `MAX_ATTEMPTS` the task is
    /// dead-lettered and, when the payload carries a `knowledge_id`, the
    /// owning `Knowledge` row is marked `failed` so ingestion status
    /// surfaces the permanent failure to callers.
    pub async fn fail(&self, task: &Task, error: String) -> Result<(), AppError> {
        let attempts = match &task.status {
            TaskStatus::InProgress { attempts, .. } => *attempts,
            _ => 1,
        };

        if attempts >= MAX_ATTEMPTS {
            self.set_status(&task.id, TaskStatus::Error(error.clone())).await?;
            if let Some(knowledge_id) = task.payload.get("knowledge_id").and_then(Value::as_str) {
                if let Some(mut knowledge) = self.db.get_item::<Knowledge>(knowledge_id).await? {
                    knowledge.mark_failed(&self.db, error).await?;
                }
            }
        }

        Ok(())
    }

    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<(), AppError> {
        let _task: Option<Task> = self
            .db
            .update((Task::table_name(), id))
            .patch(surrealdb::opt::PatchOp::replace("/status", status))
            .patch(surrealdb::opt::PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db")
    }

    #[tokio::test]
    async fn enqueue_and_claim_roundtrip() {
        let db = std::sync::Arc::new(test_db().await);
        let queue = TaskQueue::new(db);

        let task = queue
            .enqueue(
                "tenant-1".into(),
                TaskKind::ChunkExtract,
                TaskPriority::Default,
                serde_json::json!({ "knowledge_id": "knowledge-1" }),
            )
            .await
            .expect("enqueue");

        let claimed = queue.claim_next_ready().await.expect("claim").expect("a task");
        assert_eq!(claimed.id, task.id);
        assert!(matches!(claimed.status, TaskStatus::InProgress { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn empty_queue_claims_nothing() {
        let db = std::sync::Arc::new(test_db().await);
        let queue = TaskQueue::new(db);
        assert!(queue.claim_next_ready().await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn completed_task_is_no_longer_claimable() {
        let db = std::sync::Arc::new(test_db().await);
        let queue = TaskQueue::new(db);

        let task = queue
            .enqueue(
                "tenant-1".into(),
                TaskKind::IndexCopy,
                TaskPriority::Low,
                serde_json::json!({}),
            )
            .await
            .expect("enqueue");

        queue.claim_next_ready().await.expect("claim");
        queue.complete(&task.id).await.expect("complete");

        assert!(queue.claim_next_ready().await.expect("claim").is_none());
    }
}
