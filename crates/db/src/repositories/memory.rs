use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use neubot_core::domain::quota::{QuotaCategory, QuotaRecord};
use neubot_core::errors::ApplicationError;
use neubot_core::quota::QuotaStore;

/// Process-local quota store, used by tests.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    records: RwLock<Vec<QuotaRecord>>,
    anchors: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryQuotaStore {
    pub async fn records(&self) -> Vec<QuotaRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn count_since(
        &self,
        identity: &str,
        category: QuotaCategory,
        since: DateTime<Utc>,
    ) -> Result<u32, ApplicationError> {
        let records = self.records.read().await;
        let count = records
            .iter()
            .filter(|r| r.identity == identity && r.category == category && r.recorded_at > since)
            .count();
        u32::try_from(count).map_err(|e| ApplicationError::Persistence(e.to_string()))
    }

    async fn delete_all(
        &self,
        identity: &str,
        category: QuotaCategory,
    ) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        records.retain(|r| !(r.identity == identity && r.category == category));
        Ok(())
    }

    async fn delete_before(
        &self,
        identity: &str,
        category: QuotaCategory,
        cutoff: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        records.retain(|r| {
            !(r.identity == identity && r.category == category && r.recorded_at < cutoff)
        });
        Ok(())
    }

    async fn insert(
        &self,
        identity: &str,
        category: QuotaCategory,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        records.push(QuotaRecord { identity: identity.to_string(), category, recorded_at });
        Ok(())
    }

    async fn find_anchor(&self, identity: &str) -> Result<Option<DateTime<Utc>>, ApplicationError> {
        let anchors = self.anchors.read().await;
        Ok(anchors.get(identity).copied())
    }

    async fn save_anchor(
        &self,
        identity: &str,
        anchored_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut anchors = self.anchors.write().await;
        anchors.insert(identity.to_string(), anchored_at);
        Ok(())
    }
}
