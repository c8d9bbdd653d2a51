use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{
    models::{EntitlementRecord, RecordStatus, Tier},
    store::{EntitlementStore, StoreError},
};

/// In-process store for local runs and tests. Counts lookups and can be
/// told to fail specific tiers.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<EntitlementRecord>>,
    failing: RwLock<HashSet<Tier>>,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = EntitlementRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
            ..Self::default()
        }
    }

    pub async fn insert(&self, record: EntitlementRecord) {
        self.records.write().await.push(record);
    }

    pub async fn fail_tier(&self, tier: Tier) {
        self.failing.write().await.insert(tier);
    }

    pub async fn fail_all(&self) {
        let mut failing = self.failing.write().await;
        for tier in [Tier::Dev, Tier::Paid, Tier::Trial, Tier::Ambassador, Tier::Beta] {
            failing.insert(tier);
        }
    }

    /// Number of `find_latest` calls served so far, failed ones included.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn find_latest(
        &self,
        principal_id: &str,
        tier: Tier,
        status: RecordStatus,
    ) -> Result<Option<EntitlementRecord>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.failing.read().await.contains(&tier) {
            return Err(StoreError::Unavailable(format!(
                "{} lookups are failing",
                tier
            )));
        }

        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.principal_id == principal_id && r.tier == tier && r.status == status)
            .max_by_key(|r| r.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn returns_newest_matching_record() {
        let now = Utc::now();
        let older = EntitlementRecord::new("p1", Tier::Paid, RecordStatus::Active)
            .created(now - Duration::days(10));
        let newer = EntitlementRecord::new("p1", Tier::Paid, RecordStatus::Active)
            .created(now - Duration::days(1));
        let newer_id = newer.id;
        let canceled =
            EntitlementRecord::new("p1", Tier::Paid, RecordStatus::Canceled).created(now);

        let store = MemoryStore::with_records([newer, canceled, older]);
        let found = store
            .find_latest("p1", Tier::Paid, RecordStatus::Active)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer_id);
        assert_eq!(store.queries(), 1);
    }

    #[tokio::test]
    async fn failing_tier_errors() {
        let store = MemoryStore::new();
        store.fail_tier(Tier::Trial).await;
        assert!(store.find_latest("p1", Tier::Trial, RecordStatus::Active).await.is_err());
        assert!(
            store
                .find_latest("p1", Tier::Paid, RecordStatus::Active)
                .await
                .unwrap()
                .is_none()
        );
    }
}
