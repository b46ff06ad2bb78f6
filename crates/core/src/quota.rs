//! Rolling-window request quotas.
//!
//! Usage is counted per identity and per category over a 30 day lookback.
//! Each identity carries a reset anchor: the last moment a cleanup pass saw
//! its counters at zero. The anchor plus the window length is what the
//! status endpoint reports as the next reset.
//!
//! `check` followed by `record` is not atomic. Two requests from the same
//! identity racing through `check` can both be admitted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::domain::quota::{
    CategoryUsage, Identity, QuotaCategory, QuotaDecision, QuotaStatus, QuotaTiers, ResetInfo,
};
use crate::errors::ApplicationError;

pub const WINDOW_DAYS: i64 = 30;

/// Storage contract for quota rows and reset anchors.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Rows strictly newer than `since`.
    async fn count_since(
        &self,
        identity: &str,
        category: QuotaCategory,
        since: DateTime<Utc>,
    ) -> Result<u32, ApplicationError>;

    async fn delete_all(&self, identity: &str, category: QuotaCategory)
        -> Result<(), ApplicationError>;

    /// Rows strictly older than `cutoff`.
    async fn delete_before(
        &self,
        identity: &str,
        category: QuotaCategory,
        cutoff: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    async fn insert(
        &self,
        identity: &str,
        category: QuotaCategory,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;

    async fn find_anchor(&self, identity: &str) -> Result<Option<DateTime<Utc>>, ApplicationError>;

    async fn save_anchor(&self, identity: &str, anchored_at: DateTime<Utc>)
        -> Result<(), ApplicationError>;
}

#[derive(Clone)]
pub struct QuotaEngine {
    store: Arc<dyn QuotaStore>,
    tiers: QuotaTiers,
    clock: Arc<dyn Clock>,
}

impl QuotaEngine {
    pub fn new(store: Arc<dyn QuotaStore>, tiers: QuotaTiers, clock: Arc<dyn Clock>) -> Self {
        Self { store, tiers, clock }
    }

    pub fn tiers(&self) -> &QuotaTiers {
        &self.tiers
    }

    pub async fn check(
        &self,
        identity: &Identity,
        category: QuotaCategory,
    ) -> Result<QuotaDecision, ApplicationError> {
        let key = identity.key();
        self.cleanup(&key, category).await?;

        let limits = self.tiers.for_identity(identity);
        let since = self.window_start();
        let total_limit = i64::from(limits.total);
        let total_used = i64::from(self.store.count_since(&key, QuotaCategory::Total, since).await?);

        let decision = match category {
            QuotaCategory::Search | QuotaCategory::Weather => {
                let limit = i64::from(limits.limit_for(category));
                let used = i64::from(self.store.count_since(&key, category, since).await?);
                QuotaDecision {
                    allowed: used < limit && total_used < total_limit,
                    remaining: (limit - used).min(total_limit - total_used),
                }
            }
            QuotaCategory::Total => QuotaDecision {
                allowed: total_used < total_limit,
                remaining: total_limit - total_used,
            },
        };

        debug!(
            event_name = "quota.check",
            identity = %key,
            category = category.as_str(),
            allowed = decision.allowed,
            remaining = decision.remaining,
            "quota checked"
        );
        Ok(decision)
    }

    /// Writes one row for `category`, plus a paired `total` row sharing the
    /// timestamp when `category` is not `total` itself.
    pub async fn record(
        &self,
        identity: &Identity,
        category: QuotaCategory,
    ) -> Result<(), ApplicationError> {
        let key = identity.key();
        let now = self.clock.now();
        self.store.insert(&key, category, now).await?;
        if category != QuotaCategory::Total {
            self.store.insert(&key, QuotaCategory::Total, now).await?;
        }
        Ok(())
    }

    pub async fn status(&self, identity: &Identity) -> Result<QuotaStatus, ApplicationError> {
        let key = identity.key();
        for category in QuotaCategory::ALL {
            self.cleanup(&key, category).await?;
        }

        let limits = self.tiers.for_identity(identity);
        let since = self.window_start();
        let mut usage = Vec::with_capacity(QuotaCategory::ALL.len());
        for category in QuotaCategory::ALL {
            let limit = limits.limit_for(category);
            let used = self.store.count_since(&key, category, since).await?;
            usage.push(CategoryUsage { limit, used, remaining: i64::from(limit) - i64::from(used) });
        }

        let now = self.clock.now();
        let anchor = match self.store.find_anchor(&key).await? {
            Some(anchor) => anchor,
            None => {
                self.store.save_anchor(&key, now).await?;
                now
            }
        };
        let next_reset = anchor + Duration::days(WINDOW_DAYS);
        let reset = ResetInfo {
            timestamp: next_reset.timestamp(),
            days_remaining: (next_reset - now).num_days(),
            date: next_reset.format("%Y-%m-%d").to_string(),
        };

        let mut usage = usage.into_iter();
        let (Some(search), Some(weather), Some(total)) = (usage.next(), usage.next(), usage.next())
        else {
            return Err(ApplicationError::Persistence("quota usage was incomplete".to_string()));
        };

        Ok(QuotaStatus { search, weather, total, reset })
    }

    async fn cleanup(&self, key: &str, category: QuotaCategory) -> Result<(), ApplicationError> {
        let now = self.clock.now();
        let since = now - Duration::days(WINDOW_DAYS);

        if self.store.count_since(key, category, since).await? == 0 {
            self.store.delete_all(key, category).await?;
            self.store.save_anchor(key, now).await?;
            debug!(
                event_name = "quota.anchor_reset",
                identity = %key,
                category = category.as_str(),
                "quota window re-anchored"
            );
        } else {
            self.store.delete_before(key, category, since).await?;
        }
        Ok(())
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.clock.now() - Duration::days(WINDOW_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{QuotaEngine, QuotaStore};
    use crate::clock::ManualClock;
    use crate::domain::quota::{Identity, QuotaCategory, QuotaLimits, QuotaTiers};
    use crate::errors::ApplicationError;

    #[derive(Default)]
    struct VecStore {
        rows: Mutex<Vec<(String, QuotaCategory, DateTime<Utc>)>>,
        anchors: Mutex<Vec<(String, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl QuotaStore for VecStore {
        async fn count_since(
            &self,
            identity: &str,
            category: QuotaCategory,
            since: DateTime<Utc>,
        ) -> Result<u32, ApplicationError> {
            let rows = self.rows.lock().expect("rows lock");
            Ok(rows.iter().filter(|(i, c, t)| i == identity && *c == category && *t > since).count()
                as u32)
        }

        async fn delete_all(
            &self,
            identity: &str,
            category: QuotaCategory,
        ) -> Result<(), ApplicationError> {
            self.rows.lock().expect("rows lock").retain(|(i, c, _)| !(i == identity && *c == category));
            Ok(())
        }

        async fn delete_before(
            &self,
            identity: &str,
            category: QuotaCategory,
            cutoff: DateTime<Utc>,
        ) -> Result<(), ApplicationError> {
            self.rows
                .lock()
                .expect("rows lock")
                .retain(|(i, c, t)| !(i == identity && *c == category && *t < cutoff));
            Ok(())
        }

        async fn insert(
            &self,
            identity: &str,
            category: QuotaCategory,
            recorded_at: DateTime<Utc>,
        ) -> Result<(), ApplicationError> {
            self.rows.lock().expect("rows lock").push((identity.to_string(), category, recorded_at));
            Ok(())
        }

        async fn find_anchor(
            &self,
            identity: &str,
        ) -> Result<Option<DateTime<Utc>>, ApplicationError> {
            let anchors = self.anchors.lock().expect("anchor lock");
            Ok(anchors.iter().find(|(i, _)| i == identity).map(|(_, at)| *at))
        }

        async fn save_anchor(
            &self,
            identity: &str,
            anchored_at: DateTime<Utc>,
        ) -> Result<(), ApplicationError> {
            let mut anchors = self.anchors.lock().expect("anchor lock");
            anchors.retain(|(i, _)| i != identity);
            anchors.push((identity.to_string(), anchored_at));
            Ok(())
        }
    }

    fn engine(limits: QuotaLimits) -> (QuotaEngine, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid date");
        let clock = Arc::new(ManualClock::new(start));
        let tiers = QuotaTiers {
            guest: limits,
            authenticated: QuotaLimits {
                search: limits.search * 2,
                weather: limits.weather * 2,
                total: limits.total * 2,
            },
        };
        (QuotaEngine::new(Arc::new(VecStore::default()), tiers, clock.clone()), clock)
    }

    #[tokio::test]
    async fn remaining_is_the_tighter_of_category_and_total() {
        let (engine, _clock) = engine(QuotaLimits { search: 5, weather: 3, total: 4 });
        let guest = Identity::Address("10.0.0.9".to_string());

        engine.record(&guest, QuotaCategory::Search).await.expect("record");
        engine.record(&guest, QuotaCategory::Search).await.expect("record");

        let search = engine.check(&guest, QuotaCategory::Search).await.expect("check");
        assert!(search.allowed);
        assert_eq!(search.remaining, 2, "total has 2 of 4 left, search has 3 of 5 left");

        let weather = engine.check(&guest, QuotaCategory::Weather).await.expect("check");
        assert_eq!(weather.remaining, 2);
    }

    #[tokio::test]
    async fn records_expire_after_the_window() {
        let (engine, clock) = engine(QuotaLimits { search: 5, weather: 1, total: 10 });
        let guest = Identity::Address("10.0.0.9".to_string());

        engine.record(&guest, QuotaCategory::Weather).await.expect("record");
        let refused = engine.check(&guest, QuotaCategory::Weather).await.expect("check");
        assert!(!refused.allowed);

        clock.advance(Duration::days(30) + Duration::seconds(1));
        let allowed = engine.check(&guest, QuotaCategory::Weather).await.expect("check");
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 1);
    }
}
