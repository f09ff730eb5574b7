use sha2::{Digest, Sha256};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("file not found")]
    FileNotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("duplicate file")]
    DuplicateFile,
    #[error("missing file name")]
    MissingFileName,
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Which kind of source a `Knowledge` row was ingested from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgeSource {
    File {
        file_name: String,
        file_hash: String,
        file_size: u64,
        mime_type: String,
        storage_path: String,
    },
    Url {
        url: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

stored_object!(Knowledge, "knowledge", {
    tenant_id: String,
    kb_id: String,
    source: KnowledgeSource,
    parse_status: ParseStatus,
    enable_status: bool,
    error_message: Option<String>,
    storage_size_bytes: u64,
    processed_at: Option<DateTime<Utc>>
});

impl Knowledge {
    pub fn new_file(
        tenant_id: String,
        kb_id: String,
        file_name: String,
        file_hash: String,
        file_size: u64,
        mime_type: String,
        storage_path: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            kb_id,
            source: KnowledgeSource::File {
                file_name,
                file_hash,
                file_size,
                mime_type,
                storage_path,
            },
            parse_status: ParseStatus::Pending,
            enable_status: true,
            error_message: None,
            storage_size_bytes: 0,
            processed_at: None,
        }
    }

    pub fn new_url(tenant_id: String, kb_id: String, url: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id,
            kb_id,
            source: KnowledgeSource::Url { url },
            parse_status: ParseStatus::Pending,
            enable_status: true,
            error_message: None,
            storage_size_bytes: 0,
            processed_at: None,
        }
    }

    #[must_use]
    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    pub async fn mark_processing(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        self.parse_status = ParseStatus::Processing;
        self.updated_at = Utc::now();
        db.store_item(self.clone()).await?;
        Ok(())
    }

    pub async fn mark_completed(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        self.parse_status = ParseStatus::Completed;
        self.processed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        db.store_item(self.clone()).await?;
        Ok(())
    }

    pub async fn mark_failed(&mut self, db: &SurrealDbClient, message: String) -> Result<(), AppError> {
        self.parse_status = ParseStatus::Failed;
        self.error_message = Some(message);
        self.updated_at = Utc::now();
        db.store_item(self.clone()).await?;
        Ok(())
    }

    /// Duplicate detection for files: same KB, same hash, not in a failed
    /// state. URLs match by `source.url` instead of hash.
    pub async fn find_duplicate_by_hash(
        db: &SurrealDbClient,
        kb_id: &str,
        file_hash: &str,
    ) -> Result<Option<Knowledge>, AppError> {
        let mut matches: Vec<Knowledge> = db
            .client
            .query(
                "SELECT * FROM knowledge \
                 WHERE kb_id = $kb_id AND source.file_hash = $file_hash AND parse_status != 'failed';",
            )
            .bind(("kb_id", kb_id.to_owned()))
            .bind(("file_hash", file_hash.to_owned()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(matches.pop())
    }

    pub async fn find_duplicate_by_url(
        db: &SurrealDbClient,
        kb_id: &str,
        url: &str,
    ) -> Result<Option<Knowledge>, AppError> {
        let mut matches: Vec<Knowledge> = db
            .client
            .query(
                "SELECT * FROM knowledge \
                 WHERE kb_id = $kb_id AND source.url = $url AND parse_status != 'failed';",
            )
            .bind(("kb_id", kb_id.to_owned()))
            .bind(("url", url.to_owned()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)?;
        Ok(matches.pop())
    }

    pub async fn list_for_kb(db: &SurrealDbClient, kb_id: &str) -> Result<Vec<Knowledge>, AppError> {
        db.client
            .query("SELECT * FROM knowledge WHERE kb_id = $kb_id;")
            .bind(("kb_id", kb_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .take(0)
            .map_err(AppError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(Knowledge::sha256_hex(b"hello"), Knowledge::sha256_hex(b"hello"));
        assert_ne!(Knowledge::sha256_hex(b"hello"), Knowledge::sha256_hex(b"world"));
    }

    #[tokio::test]
    async fn duplicate_lookup_ignores_failed_rows() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let mut knowledge = Knowledge::new_file(
            "tenant-1".into(),
            "kb-1".into(),
            "doc.pdf".into(),
            "abc123".into(),
            10,
            "application/pdf".into(),
            "tenant-1/kb-1/doc.pdf".into(),
        );
        db.store_item(knowledge.clone()).await.expect("store");

        let found = Knowledge::find_duplicate_by_hash(&db, "kb-1", "abc123")
            .await
            .expect("query");
        assert!(found.is_some());

        knowledge.mark_failed(&db, "boom".into()).await.expect("mark failed");
        let found = Knowledge::find_duplicate_by_hash(&db, "kb-1", "abc123")
            .await
            .expect("query");
        assert!(found.is_none());
    }
}
