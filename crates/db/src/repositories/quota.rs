use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use neubot_core::domain::quota::QuotaCategory;
use neubot_core::errors::ApplicationError;
use neubot_core::quota::QuotaStore;

use super::{decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlQuotaStore {
    pool: DbPool,
}

impl SqlQuotaStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn count_rows(
        &self,
        identity: &str,
        category: QuotaCategory,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM quota_request
             WHERE identity = ? AND category = ? AND recorded_at > ?",
        )
        .bind(identity)
        .bind(category.as_str())
        .bind(encode_timestamp(since))
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        u32::try_from(count).map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn load_anchor(&self, identity: &str) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row = sqlx::query("SELECT anchored_at FROM quota_reset_anchor WHERE identity = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => {
                let raw: String =
                    r.try_get("anchored_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(decode_timestamp(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QuotaStore for SqlQuotaStore {
    async fn count_since(
        &self,
        identity: &str,
        category: QuotaCategory,
        since: DateTime<Utc>,
    ) -> Result<u32, ApplicationError> {
        Ok(self.count_rows(identity, category, since).await?)
    }

    async fn delete_all(
        &self,
        identity: &str,
        category: QuotaCategory,
    ) -> Result<(), ApplicationError> {
        sqlx::query("DELETE FROM quota_request WHERE identity = ? AND category = ?")
            .bind(identity)
            .bind(category.as_str())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn delete_before(
        &self,
        identity: &str,
        category: QuotaCategory,
        cutoff: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        sqlx::query(
            "DELETE FROM quota_request WHERE identity = ? AND category = ? AND recorded_at < ?",
        )
        .bind(identity)
        .bind(category.as_str())
        .bind(encode_timestamp(cutoff))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn insert(
        &self,
        identity: &str,
        category: QuotaCategory,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        sqlx::query("INSERT INTO quota_request (identity, category, recorded_at) VALUES (?, ?, ?)")
            .bind(identity)
            .bind(category.as_str())
            .bind(encode_timestamp(recorded_at))
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn find_anchor(&self, identity: &str) -> Result<Option<DateTime<Utc>>, ApplicationError> {
        Ok(self.load_anchor(identity).await?)
    }

    async fn save_anchor(
        &self,
        identity: &str,
        anchored_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO quota_reset_anchor (identity, anchored_at) VALUES (?, ?)
             ON CONFLICT(identity) DO UPDATE SET anchored_at = excluded.anchored_at",
        )
        .bind(identity)
        .bind(encode_timestamp(anchored_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use neubot_core::domain::quota::QuotaCategory;
    use neubot_core::quota::QuotaStore;

    use super::SqlQuotaStore;
    use crate::{connect_with_settings, migrations::run_pending};

    async fn store() -> SqlQuotaStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlQuotaStore::new(pool)
    }

    #[tokio::test]
    async fn count_is_strictly_after_and_delete_is_strictly_before() {
        let store = store().await;
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).single().expect("date");

        store.insert("ip:10.0.0.1", QuotaCategory::Weather, at).await.expect("insert");
        store
            .insert("ip:10.0.0.1", QuotaCategory::Weather, at + Duration::hours(1))
            .await
            .expect("insert");

        assert_eq!(store.count_since("ip:10.0.0.1", QuotaCategory::Weather, at).await.unwrap(), 1);

        store.delete_before("ip:10.0.0.1", QuotaCategory::Weather, at).await.expect("delete");
        let since = at - Duration::seconds(1);
        assert_eq!(
            store.count_since("ip:10.0.0.1", QuotaCategory::Weather, since).await.unwrap(),
            2,
            "rows exactly at the cutoff survive"
        );

        store.delete_all("ip:10.0.0.1", QuotaCategory::Weather).await.expect("delete all");
        assert_eq!(
            store.count_since("ip:10.0.0.1", QuotaCategory::Weather, since).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn anchors_upsert_per_identity() {
        let store = store().await;
        let first = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).single().expect("date");

        assert_eq!(store.find_anchor("user:ada").await.unwrap(), None);
        store.save_anchor("user:ada", first).await.expect("save");
        store.save_anchor("user:ada", first + Duration::days(3)).await.expect("save again");

        assert_eq!(store.find_anchor("user:ada").await.unwrap(), Some(first + Duration::days(3)));
        assert_eq!(store.find_anchor("user:bob").await.unwrap(), None);
    }
}
