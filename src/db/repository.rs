use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::{
    models::{EntitlementRecord, RecordStatus, Tier},
    store::{EntitlementStore, StoreError},
};

pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn list_for_principal(
        &self,
        principal_id: &str,
    ) -> Result<Vec<EntitlementRecord>, StoreError> {
        let records = sqlx::query_as::<_, EntitlementRecord>(
            r#"
            SELECT
                id, principal_id, tier, status, expires_at, trial_end,
                created_at, promo_code, pending_validation
            FROM entitlements
            WHERE principal_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(principal_id)
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl EntitlementStore for Repository {
    async fn find_latest(
        &self,
        principal_id: &str,
        tier: Tier,
        status: RecordStatus,
    ) -> Result<Option<EntitlementRecord>, StoreError> {
        let record = sqlx::query_as::<_, EntitlementRecord>(
            r#"
            SELECT
                id, principal_id, tier, status, expires_at, trial_end,
                created_at, promo_code, pending_validation
            FROM entitlements
            WHERE principal_id = $1 AND tier = $2 AND status = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(principal_id)
        .bind(tier)
        .bind(status)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}
