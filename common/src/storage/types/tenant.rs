use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Tenant, "tenant", {
    name: String,
    storage_quota_bytes: u64,
    storage_used_bytes: u64
});

impl Tenant {
    pub fn new(name: String, storage_quota_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            storage_quota_bytes,
            storage_used_bytes: 0,
        }
    }

    /// Whether `additional_bytes` would push usage past the tenant's quota.
    #[must_use]
    pub fn would_exceed_quota(&self, additional_bytes: u64) -> bool {
        self.storage_used_bytes.saturating_add(additional_bytes) > self.storage_quota_bytes
    }

    /// Pessimistic-lock quota check + commit in a single query, per SPEC_FULL §4.4's
    /// "quota commit" step: the row is only updated if the new total still fits,
    /// so concurrent ingestions racing for the same tenant cannot both succeed.
    pub async fn try_commit_usage(
        db: &SurrealDbClient,
        tenant_id: &str,
        additional_bytes: u64,
    ) -> Result<bool, AppError> {
        #[derive(serde::Deserialize)]
        struct Row {
            storage_used_bytes: u64,
        }

        let mut response = db
            .client
            .query(
                "UPDATE type::thing('tenant', $id) \
                 SET storage_used_bytes = storage_used_bytes + $delta, \
                     updated_at = time::now() \
                 WHERE storage_used_bytes + $delta <= storage_quota_bytes \
                 RETURN storage_used_bytes;",
            )
            .bind(("id", tenant_id.to_owned()))
            .bind(("delta", additional_bytes))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(!rows.is_empty())
    }

    /// Release previously committed usage, e.g. after a Knowledge delete.
    pub async fn release_usage(
        db: &SurrealDbClient,
        tenant_id: &str,
        released_bytes: u64,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('tenant', $id) \
                 SET storage_used_bytes = math::max([0, storage_used_bytes - $delta]), \
                     updated_at = time::now();",
            )
            .bind(("id", tenant_id.to_owned()))
            .bind(("delta", released_bytes))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> SurrealDbClient {
        let ns = "test_ns";
        let database = &uuid::Uuid::new_v4().to_string();
        SurrealDbClient::memory(ns, database)
            .await
            .expect("in-memory db")
    }

    #[tokio::test]
    async fn commit_usage_rejects_when_over_quota() {
        let db = setup_db().await;
        let tenant = Tenant::new("acme".to_string(), 1024);
        db.store_item(tenant.clone()).await.expect("store tenant");

        let ok = Tenant::try_commit_usage(&db, &tenant.id, 2048)
            .await
            .expect("commit query");
        assert!(!ok);

        let stored: Option<Tenant> = db.get_item(&tenant.id).await.expect("get tenant");
        assert_eq!(stored.unwrap().storage_used_bytes, 0);
    }

    #[tokio::test]
    async fn commit_usage_accepts_within_quota() {
        let db = setup_db().await;
        let tenant = Tenant::new("acme".to_string(), 1024);
        db.store_item(tenant.clone()).await.expect("store tenant");

        let ok = Tenant::try_commit_usage(&db, &tenant.id, 512)
            .await
            .expect("commit query");
        assert!(ok);

        let stored: Option<Tenant> = db.get_item(&tenant.id).await.expect("get tenant");
        assert_eq!(stored.unwrap().storage_used_bytes, 512);
    }

    #[tokio::test]
    async fn release_usage_never_goes_negative() {
        let db = setup_db().await;
        let tenant = Tenant::new("acme".to_string(), 1024);
        db.store_item(tenant.clone()).await.expect("store tenant");

        Tenant::release_usage(&db, &tenant.id, 999)
            .await
            .expect("release");

        let stored: Option<Tenant> = db.get_item(&tenant.id).await.expect("get tenant");
        assert_eq!(stored.unwrap().storage_used_bytes, 0);
    }
}
