use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Repository contract for a local-model download's progress. The producer
/// of these rows (an Ollama-lifecycle manager) is out of scope; this is the
/// data shape and the read/write operations a status endpoint would use.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

stored_object!(DownloadTask, "download_task", {
    model_name: String,
    status: DownloadStatus,
    progress_percent: f32,
    message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>
});

impl DownloadTask {
    pub fn new(model_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            model_name,
            status: DownloadStatus::Pending,
            progress_percent: 0.0,
            message: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub async fn update_progress(
        &mut self,
        db: &SurrealDbClient,
        status: DownloadStatus,
        progress_percent: f32,
        message: Option<String>,
    ) -> Result<(), AppError> {
        self.status = status;
        self.progress_percent = progress_percent;
        self.message = message;
        self.updated_at = Utc::now();
        match status {
            DownloadStatus::Downloading if self.started_at.is_none() => {
                self.started_at = Some(self.updated_at);
            }
            DownloadStatus::Completed | DownloadStatus::Failed => {
                self.completed_at = Some(self.updated_at);
            }
            _ => {}
        }
        db.store_item(self.clone()).await?;
        Ok(())
    }

    pub async fn find_by_model_name(
        db: &SurrealDbClient,
        model_name: &str,
    ) -> Result<Option<DownloadTask>, AppError> {
        let mut matches: Vec<DownloadTask> = db
            .client
            .query("SELECT * FROM download_task WHERE model_name = $model_name ORDER BY created_at DESC LIMIT 1;")
            .bind(("model_name", model_name.to_owned()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(matches.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_progress_sets_timestamps() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let mut task = DownloadTask::new("llama3".into());
        db.store_item(task.clone()).await.expect("store");

        task.update_progress(&db, DownloadStatus::Downloading, 10.0, None)
            .await
            .expect("update");
        assert!(task.started_at.is_some());

        task.update_progress(&db, DownloadStatus::Completed, 100.0, None)
            .await
            .expect("update");
        assert!(task.completed_at.is_some());
    }
}
