use async_trait::async_trait;

use crate::db::models::{EntitlementRecord, RecordStatus, Tier};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the entitlement records.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Most recently created record of `tier` in `status` for the principal.
    async fn find_latest(
        &self,
        principal_id: &str,
        tier: Tier,
        status: RecordStatus,
    ) -> Result<Option<EntitlementRecord>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
