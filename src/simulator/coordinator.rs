use crate::clock::Clock;
use crate::config::SimulatorConfig;
use crate::error::{AppError, Result};
use crate::models::PatientId;
use crate::simulator::service::{EnsureOutcome, HistoryOutcome, MetricService};
use crate::simulator::worker::{WorkerHandle, WorkerRegistry};
use crate::store::MetricStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};

/// Summary of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub patients: usize,
    pub rows_removed: u64,
    pub refreshed: usize,
    pub failures: usize,
}

/// Owns every process-scoped registry of the simulator: the base-weight
/// cache and in-flight guard (through [`MetricService`]), the patient worker
/// registry, and the maintenance task.
pub struct Coordinator {
    service: MetricService,
    workers: Arc<WorkerRegistry>,
    maintenance: Mutex<Option<WorkerHandle>>,
    settings: SimulatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn MetricStore>,
        clock: Arc<dyn Clock>,
        settings: SimulatorConfig,
    ) -> Self {
        Self {
            service: MetricService::new(store, clock, &settings),
            workers: Arc::new(WorkerRegistry::new()),
            maintenance: Mutex::new(None),
            settings,
        }
    }

    pub fn service(&self) -> &MetricService {
        &self.service
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// Backfill a newly registered patient, then start their worker
    pub async fn register_patient(&self, patient_id: PatientId) -> Result<usize> {
        let written = self.service.backfill_history(patient_id).await?;
        self.start_worker(patient_id)?;
        Ok(written)
    }

    /// Complete the patient's trailing window (backfill or gap fill), then
    /// start their worker
    pub async fn onboard_patient(&self, patient_id: PatientId) -> Result<HistoryOutcome> {
        let outcome = self.service.ensure_history(patient_id).await?;
        self.start_worker(patient_id)?;
        info!(patient_id, ?outcome, "Patient onboarded");
        Ok(outcome)
    }

    /// Ensure today's record now, and keep ensuring it on the worker schedule
    pub async fn ensure_today(&self, patient_id: PatientId) -> Result<EnsureOutcome> {
        let outcome = self.service.ensure_today(patient_id).await?;
        self.start_worker(patient_id)?;
        Ok(outcome)
    }

    /// Returns `false` if the patient already had a worker
    pub fn start_worker(&self, patient_id: PatientId) -> Result<bool> {
        self.workers
            .start(patient_id, &self.service, self.settings.update_interval())
    }

    pub async fn stop_worker(&self, patient_id: PatientId) -> bool {
        self.workers.stop(patient_id).await
    }

    /// Repair corrupted rows for every patient with a worker, refilling today
    /// where rows were removed
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        maintenance_pass(&self.service, &self.workers).await
    }

    /// Schedule [`run_maintenance`](Self::run_maintenance) on the configured
    /// interval. Returns `false` if it is already scheduled.
    pub fn start_maintenance(&self) -> Result<bool> {
        if self.workers.is_closed() {
            return Err(AppError::ShuttingDown);
        }

        let mut maintenance = self.maintenance.lock();
        // Shutdown may have started since the check above
        if self.workers.is_closed() {
            return Err(AppError::ShuttingDown);
        }
        if maintenance.is_some() {
            return Ok(false);
        }

        let service = self.service.clone();
        let workers = self.workers.clone();
        let period = self.settings.maintenance_interval();
        *maintenance = Some(WorkerHandle::spawn("maintenance", period, move || {
            let service = service.clone();
            let workers = workers.clone();
            async move {
                maintenance_pass(&service, &workers).await;
            }
        }));

        info!(period_secs = period.as_secs(), "Scheduled maintenance pass");
        Ok(true)
    }

    /// Stop the maintenance task and every patient worker
    pub async fn shutdown(&self) {
        self.workers.close();
        let maintenance = self.maintenance.lock().take();
        if let Some(handle) = maintenance {
            handle.stop().await;
        }
        self.workers.shutdown().await;
        info!("Coordinator shut down");
    }
}

async fn maintenance_pass(service: &MetricService, workers: &WorkerRegistry) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    for patient_id in workers.patients() {
        report.patients += 1;

        let removed = match service.repair_corrupted(patient_id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(patient_id, "Maintenance repair failed: {}", e);
                report.failures += 1;
                continue;
            }
        };
        report.rows_removed += removed;

        if removed > 0 {
            match service.ensure_today(patient_id).await {
                Ok(EnsureOutcome::Created) => report.refreshed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(patient_id, "Maintenance refresh failed: {}", e);
                    report.failures += 1;
                }
            }
        }
    }

    info!(
        patients = report.patients,
        rows_removed = report.rows_removed,
        refreshed = report.refreshed,
        failures = report.failures,
        "Maintenance pass complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, MetricQuery};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn setup(settings: SimulatorConfig) -> (Coordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 11, 3, 15, 45, 0).unwrap(),
        ));
        (Coordinator::new(store.clone(), clock, settings), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_backfills_and_starts_worker() {
        let (coordinator, store) = setup(SimulatorConfig::default());

        assert_eq!(coordinator.register_patient(1).await.unwrap(), 31);
        assert!(coordinator.workers().is_running(1));
        assert_eq!(store.len().await, 31);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_onboard_twice_is_stable() {
        let (coordinator, store) = setup(SimulatorConfig::default());

        assert_eq!(
            coordinator.onboard_patient(2).await.unwrap(),
            HistoryOutcome::Backfilled(31)
        );
        assert_eq!(
            coordinator.onboard_patient(2).await.unwrap(),
            HistoryOutcome::Complete
        );
        assert_eq!(coordinator.workers().len(), 1);
        assert_eq!(store.len().await, 31);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_today_starts_worker() {
        let (coordinator, _store) = setup(SimulatorConfig::default());

        assert_eq!(
            coordinator.ensure_today(3).await.unwrap(),
            EnsureOutcome::Created
        );
        assert!(coordinator.workers().is_running(3));
        assert!(coordinator.stop_worker(3).await);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_repairs_and_refreshes() {
        let (coordinator, store) = setup(SimulatorConfig::default());
        coordinator.register_patient(1).await.unwrap();
        coordinator.register_patient(2).await.unwrap();

        // Corrupt today's record and one older day for patient 1
        let rows = store.find(&MetricQuery::for_patient(1)).await.unwrap();
        for mut row in [rows[5].clone(), rows[30].clone()] {
            row.heart_rate = 0;
            store.update(&row).await.unwrap();
        }

        let report = coordinator.run_maintenance().await;
        assert_eq!(
            report,
            MaintenanceReport {
                patients: 2,
                rows_removed: 2,
                refreshed: 1,
                failures: 0,
            }
        );
        assert!(coordinator.service().is_fresh(1).await.unwrap());
        assert_eq!(store.len().await, 61);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_maintenance_runs() {
        let settings = SimulatorConfig {
            maintenance_interval_seconds: 600,
            ..SimulatorConfig::default()
        };
        let (coordinator, store) = setup(settings);
        coordinator.register_patient(1).await.unwrap();

        let mut latest = coordinator.service().latest_metric(1).await.unwrap().unwrap();
        latest.heart_rate = 0;
        store.update(&latest).await.unwrap();

        assert!(coordinator.start_maintenance().unwrap());
        assert!(!coordinator.start_maintenance().unwrap());

        tokio::time::sleep(Duration::from_secs(601)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let zero_rows = store
            .count(&MetricQuery::for_patient(1).with_heart_rate(0))
            .await
            .unwrap();
        assert_eq!(zero_rows, 0);
        assert!(coordinator.service().is_fresh(1).await.unwrap());

        coordinator.shutdown().await;
        assert!(matches!(
            coordinator.start_maintenance(),
            Err(AppError::ShuttingDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_started_during_shutdown_is_refused() {
        let (coordinator, _store) = setup(SimulatorConfig::default());
        coordinator.register_patient(1).await.unwrap();
        assert!(coordinator.start_maintenance().unwrap());

        // shutdown is polled first and parks while the old maintenance task stops
        let (_, started) = tokio::join!(coordinator.shutdown(), async {
            coordinator.start_maintenance()
        });

        assert!(matches!(started, Err(AppError::ShuttingDown)));
        assert!(coordinator.maintenance.lock().is_none());
        assert!(coordinator.workers().is_empty());
    }

    #[tokio::test]
    async fn test_closed_registry_refuses_new_work() {
        let (coordinator, _store) = setup(SimulatorConfig::default());
        coordinator.workers().close();

        assert!(matches!(
            coordinator.start_maintenance(),
            Err(AppError::ShuttingDown)
        ));
        assert!(matches!(
            coordinator.start_worker(4),
            Err(AppError::ShuttingDown)
        ));
        assert!(coordinator.maintenance.lock().is_none());
    }
}
