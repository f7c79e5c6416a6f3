use crate::error::{StoreError, StoreResult};
use crate::models::HealthMetric;
use crate::store::{MetricQuery, MetricStore, SortOrder};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Records {
    rows: Vec<HealthMetric>,
    next_id: u64,
}

impl Records {
    fn push(&mut self, metric: &HealthMetric) -> u64 {
        self.next_id += 1;
        let mut row = metric.clone();
        row.id = Some(self.next_id);
        self.rows.push(row);
        self.next_id
    }
}

/// Process-local store, optionally bounded to a maximum number of records
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
    max_records: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(max_records: usize) -> Self {
        Self {
            records: RwLock::default(),
            max_records: Some(max_records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_capacity(&self, records: &Records, requested: usize) -> StoreResult<()> {
        if let Some(max) = self.max_records {
            let available = max.saturating_sub(records.rows.len());
            if requested > available {
                return Err(StoreError::CapacityExceeded {
                    requested,
                    available,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn insert(&self, metric: &HealthMetric) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        self.check_capacity(&records, 1)?;
        Ok(records.push(metric))
    }

    async fn insert_batch(&self, metrics: &[HealthMetric], batch_size: usize) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let committed = records.rows.len();
        let next_id = records.next_id;

        for chunk in metrics.chunks(batch_size.max(1)) {
            if let Err(e) = self.check_capacity(&records, chunk.len()) {
                // Roll back the chunks already applied by this batch
                records.rows.truncate(committed);
                records.next_id = next_id;
                return Err(e);
            }
            for metric in chunk {
                records.push(metric);
            }
        }

        tracing::trace!(
            inserted = metrics.len(),
            batch_size,
            "Batch insert committed"
        );
        Ok(())
    }

    async fn find(&self, query: &MetricQuery) -> StoreResult<Vec<HealthMetric>> {
        let records = self.records.read().await;
        let mut found: Vec<HealthMetric> = records
            .rows
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();

        match query.order {
            SortOrder::OldestFirst => found.sort_by_key(|m| m.date),
            SortOrder::NewestFirst => found.sort_by(|a, b| b.date.cmp(&a.date)),
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count(&self, query: &MetricQuery) -> StoreResult<u64> {
        let records = self.records.read().await;
        let count = records.rows.iter().filter(|m| query.matches(m)).count();
        Ok(count as u64)
    }

    async fn update(&self, metric: &HealthMetric) -> StoreResult<()> {
        let id = metric.id.ok_or(StoreError::MissingId)?;
        let mut records = self.records.write().await;
        let row = records
            .rows
            .iter_mut()
            .find(|m| m.id == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        *row = metric.clone();
        Ok(())
    }

    async fn delete(&self, query: &MetricQuery) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let before = records.rows.len();
        records.rows.retain(|m| !query.matches(m));
        Ok((before - records.rows.len()) as u64)
    }
}
