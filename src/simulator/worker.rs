use crate::error::{AppError, Result};
use crate::models::PatientId;
use crate::simulator::service::MetricService;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// A running periodic task and the means to stop it
#[derive(Debug)]
pub struct WorkerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

impl WorkerHandle {
    /// Run `tick` every `period`, first one `period` after spawning, until stopped
    pub fn spawn<F, Fut>(label: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    _ = stop_rx.changed() => {
                        debug!(task = label, "Periodic task stopping");
                        break;
                    }
                }
            }
        });

        Self {
            stop,
            task,
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Signal the task and wait for it to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Periodic task panicked: {}", e);
            }
        }
    }
}

/// Patient id → running freshness worker.
///
/// At most one worker per patient. Once [`shutdown`](Self::shutdown) has run,
/// no new workers are accepted.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<PatientId, WorkerHandle>>,
    closed: AtomicBool,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a worker that ensures today's record every `period`.
    ///
    /// Returns `false` when the patient already has one.
    pub fn start(
        &self,
        patient_id: PatientId,
        service: &MetricService,
        period: Duration,
    ) -> Result<bool> {
        if self.is_closed() {
            return Err(AppError::ShuttingDown);
        }
        if self.workers.read().contains_key(&patient_id) {
            return Ok(false);
        }

        let mut workers = self.workers.write();
        // Another caller may have registered, or shutdown begun, between the two locks
        if self.is_closed() {
            return Err(AppError::ShuttingDown);
        }
        if workers.contains_key(&patient_id) {
            return Ok(false);
        }

        let service = service.clone();
        let handle = WorkerHandle::spawn("patient-worker", period, move || {
            let service = service.clone();
            async move {
                if let Err(e) = service.ensure_today(patient_id).await {
                    error!(patient_id, "Error updating data for patient: {}", e);
                }
            }
        });
        workers.insert(patient_id, handle);

        info!(patient_id, period_secs = period.as_secs(), "Started patient data worker");
        Ok(true)
    }

    /// Stop and forget one patient's worker. Returns `false` if none was running.
    pub async fn stop(&self, patient_id: PatientId) -> bool {
        let handle = self.workers.write().remove(&patient_id);
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!(patient_id, "Stopped patient data worker");
                true
            }
            None => false,
        }
    }

    /// Refuse new workers from now on; running ones keep going
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Stop every worker and refuse new ones
    pub async fn shutdown(&self) {
        self.close();
        let handles: Vec<(PatientId, WorkerHandle)> = self.workers.write().drain().collect();

        let count = handles.len();
        for (patient_id, handle) in handles {
            handle.stop().await;
            debug!(patient_id, "Worker stopped");
        }
        info!(workers = count, "All patient workers stopped");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_running(&self, patient_id: PatientId) -> bool {
        self.workers.read().contains_key(&patient_id)
    }

    /// Patients with a running worker, in ascending id order
    pub fn patients(&self) -> Vec<PatientId> {
        let mut ids: Vec<PatientId> = self.workers.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SimulatorConfig;
    use crate::store::{MemoryStore, MetricQuery, MetricStore};
    use chrono::TimeZone;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    fn setup() -> (MetricService, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap(),
        ));
        let service = MetricService::new(store.clone(), clock.clone(), &SimulatorConfig::default());
        (service, store, clock)
    }

    async fn settle(by: Duration) {
        tokio::time::sleep(by).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_ticks_after_one_interval() {
        let (service, store, _clock) = setup();
        let registry = WorkerRegistry::new();

        assert!(registry.start(1, &service, HOUR).unwrap());
        settle(Duration::from_secs(60)).await;
        assert!(store.is_empty().await);

        settle(HOUR).await;
        assert_eq!(store.count(&MetricQuery::for_patient(1)).await.unwrap(), 1);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_keeps_one_record_per_day() {
        let (service, store, clock) = setup();
        let registry = WorkerRegistry::new();
        registry.start(1, &service, HOUR).unwrap();

        // Three ticks on the same day
        settle(HOUR * 3 + Duration::from_secs(1)).await;
        assert_eq!(store.len().await, 1);

        clock.advance(chrono::Duration::days(1));
        settle(HOUR).await;
        assert_eq!(store.len().await, 2);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_deduplicated() {
        let (service, _store, _clock) = setup();
        let registry = WorkerRegistry::new();

        assert!(registry.start(4, &service, HOUR).unwrap());
        assert!(!registry.start(4, &service, HOUR).unwrap());
        assert!(registry.start(5, &service, HOUR).unwrap());
        assert_eq!(registry.patients(), vec![4, 5]);

        registry.shutdown().await;
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_worker_no_longer_ticks() {
        let (service, store, _clock) = setup();
        let registry = WorkerRegistry::new();
        registry.start(1, &service, HOUR).unwrap();

        assert!(registry.stop(1).await);
        assert!(!registry.is_running(1));
        assert!(!registry.stop(1).await);

        settle(HOUR * 2).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_workers() {
        let (service, _store, _clock) = setup();
        let registry = WorkerRegistry::new();
        registry.start(1, &service, HOUR).unwrap();

        registry.shutdown().await;
        assert!(registry.is_closed());
        assert!(matches!(
            registry.start(2, &service, HOUR),
            Err(AppError::ShuttingDown)
        ));
    }
}
