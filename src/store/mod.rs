pub mod chat;
pub mod memory;

pub use chat::{ChatStore, MemoryChatStore};
pub use memory::MemoryStore;

use crate::error::StoreResult;
use crate::models::{HealthMetric, PatientId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence layer for health-metric records
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Persist one record, returning its assigned id
    async fn insert(&self, metric: &HealthMetric) -> StoreResult<u64>;

    /// Persist all records in chunks of `batch_size`.
    ///
    /// All-or-nothing: if any chunk fails, none of `metrics` remain stored.
    async fn insert_batch(&self, metrics: &[HealthMetric], batch_size: usize) -> StoreResult<()>;

    async fn find(&self, query: &MetricQuery) -> StoreResult<Vec<HealthMetric>>;

    async fn count(&self, query: &MetricQuery) -> StoreResult<u64>;

    /// Replace the stored record carrying `metric.id`
    async fn update(&self, metric: &HealthMetric) -> StoreResult<()>;

    /// Delete every record matching `query`, returning how many were removed
    async fn delete(&self, query: &MetricQuery) -> StoreResult<u64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Filter predicate over stored records
#[derive(Debug, Clone, Default)]
pub struct MetricQuery {
    pub patient_id: Option<PatientId>,
    /// Inclusive
    pub from: Option<DateTime<Utc>>,
    /// Exclusive
    pub until: Option<DateTime<Utc>>,
    pub heart_rate: Option<i32>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl MetricQuery {
    pub fn for_patient(patient_id: PatientId) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Self::default()
        }
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn before(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_heart_rate(mut self, heart_rate: i32) -> Self {
        self.heart_rate = Some(heart_rate);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::NewestFirst;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, metric: &HealthMetric) -> bool {
        if self.patient_id.is_some_and(|id| id != metric.patient_id) {
            return false;
        }
        if self.from.is_some_and(|from| metric.date < from) {
            return false;
        }
        if self.until.is_some_and(|until| metric.date >= until) {
            return false;
        }
        if self.heart_rate.is_some_and(|hr| hr != metric.heart_rate) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ManualVitals;
    use chrono::TimeZone;

    fn metric_at(patient_id: PatientId, day: u32, heart_rate: i32) -> HealthMetric {
        let vitals = ManualVitals {
            heart_rate,
            ..ManualVitals::default()
        };
        let date = Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
        HealthMetric::from_vitals(patient_id, &vitals, date)
    }

    #[test]
    fn test_window_bounds() {
        let query = MetricQuery::for_patient(1)
            .since(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
            .before(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap());

        assert!(!query.matches(&metric_at(1, 1, 70)));
        assert!(query.matches(&metric_at(1, 2, 70)));
        assert!(!query.matches(&metric_at(1, 3, 70)));
        assert!(!query.matches(&metric_at(2, 2, 70)));
    }

    #[test]
    fn test_heart_rate_filter() {
        let query = MetricQuery::for_patient(1).with_heart_rate(0);
        assert!(query.matches(&metric_at(1, 1, 0)));
        assert!(!query.matches(&metric_at(1, 1, 72)));
    }

    #[test]
    fn test_default_query_matches_everything() {
        assert!(MetricQuery::default().matches(&metric_at(9, 9, 9)));
    }
}
