use crate::clock::{Clock, day_window};
use crate::config::SimulatorConfig;
use crate::error::{AppError, Result};
use crate::models::{HealthMetric, ManualVitals, PatientId};
use crate::simulator::generator::MetricGenerator;
use crate::simulator::guard::FreshnessGuard;
use crate::store::{MetricQuery, MetricStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTOLIC_RANGE: std::ops::RangeInclusive<i32> = 70..=190;
const DIASTOLIC_RANGE: std::ops::RangeInclusive<i32> = 40..=130;

/// Result of a freshness check for one patient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Today had no record; one was generated and stored
    Created,
    /// Today already had a record
    AlreadyFresh,
    /// Another caller is generating for this patient; nothing was done
    InFlight,
}

/// What onboarding had to do to complete a patient's trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Backfilled(usize),
    FilledGaps(usize),
    Complete,
}

/// Generation and persistence operations over a shared store.
///
/// Cheap to clone; clones share the generator, the in-flight guard, the store
/// and the clock.
#[derive(Clone)]
pub struct MetricService {
    store: Arc<dyn MetricStore>,
    clock: Arc<dyn Clock>,
    generator: Arc<MetricGenerator>,
    guard: Arc<FreshnessGuard>,
    history_days: u32,
    batch_size: usize,
}

impl MetricService {
    pub fn new(
        store: Arc<dyn MetricStore>,
        clock: Arc<dyn Clock>,
        settings: &SimulatorConfig,
    ) -> Self {
        Self {
            store,
            clock,
            generator: Arc::new(MetricGenerator::new()),
            guard: Arc::new(FreshnessGuard::new()),
            history_days: settings.history_days,
            batch_size: settings.batch_size,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn generator(&self) -> &MetricGenerator {
        &self.generator
    }

    pub fn guard(&self) -> &FreshnessGuard {
        &self.guard
    }

    /// Midnight of the oldest day in the trailing window
    pub fn window_start(&self) -> DateTime<Utc> {
        let span = i64::from(self.history_days.saturating_sub(1));
        self.clock.today() - Duration::days(span)
    }

    /// Generate today and the preceding days of the window, then store them
    /// with a single batched write.
    ///
    /// Returns how many records were written.
    pub async fn backfill_history(&self, patient_id: PatientId) -> Result<usize> {
        let now = self.clock.now();
        let metrics: Vec<HealthMetric> = (0..i64::from(self.history_days))
            .rev()
            .map(|days_back| self.generator.generate(patient_id, now - Duration::days(days_back)))
            .collect();

        self.store.insert_batch(&metrics, self.batch_size).await?;

        info!(
            patient_id,
            records = metrics.len(),
            batch_size = self.batch_size,
            "Historical backfill stored"
        );
        Ok(metrics.len())
    }

    /// Make sure today has a record for `patient_id`.
    ///
    /// Overlapping calls for the same patient return [`EnsureOutcome::InFlight`]
    /// immediately instead of waiting.
    pub async fn ensure_today(&self, patient_id: PatientId) -> Result<EnsureOutcome> {
        let Some(_permit) = self.guard.try_acquire(patient_id) else {
            debug!(patient_id, "Generation already in flight, skipping");
            return Ok(EnsureOutcome::InFlight);
        };

        let now = self.clock.now();
        let (today, tomorrow) = day_window(now);
        let existing = self
            .store
            .count(&MetricQuery::for_patient(patient_id).since(today).before(tomorrow))
            .await?;

        if existing > 0 {
            return Ok(EnsureOutcome::AlreadyFresh);
        }

        let metric = self.generator.generate(patient_id, now);
        self.store.insert(&metric).await?;
        info!(patient_id, date = %now.date_naive(), "Generated today's metrics");
        Ok(EnsureOutcome::Created)
    }

    /// Backfill an empty window, or generate the days missing from a partial one
    pub async fn ensure_history(&self, patient_id: PatientId) -> Result<HistoryOutcome> {
        let existing = self.recent_metrics(patient_id).await?;
        if existing.is_empty() {
            let written = self.backfill_history(patient_id).await?;
            return Ok(HistoryOutcome::Backfilled(written));
        }

        let covered: HashSet<NaiveDate> = existing.iter().map(|m| m.date.date_naive()).collect();
        let now = self.clock.now();
        let missing: Vec<HealthMetric> = (0..i64::from(self.history_days))
            .rev()
            .map(|days_back| now - Duration::days(days_back))
            .filter(|at| !covered.contains(&at.date_naive()))
            .map(|at| self.generator.generate(patient_id, at))
            .collect();

        if missing.is_empty() {
            return Ok(HistoryOutcome::Complete);
        }

        self.store.insert_batch(&missing, self.batch_size).await?;
        info!(patient_id, records = missing.len(), "Filled missing days");
        Ok(HistoryOutcome::FilledGaps(missing.len()))
    }

    /// Delete rows left with a zero heart rate. Returns how many were removed.
    pub async fn repair_corrupted(&self, patient_id: PatientId) -> Result<u64> {
        let removed = self
            .store
            .delete(&MetricQuery::for_patient(patient_id).with_heart_rate(0))
            .await?;
        if removed > 0 {
            warn!(patient_id, removed, "Removed corrupted metric rows");
        }
        Ok(removed)
    }

    /// Records of the trailing window, oldest first
    pub async fn recent_metrics(&self, patient_id: PatientId) -> Result<Vec<HealthMetric>> {
        let query = MetricQuery::for_patient(patient_id).since(self.window_start());
        Ok(self.store.find(&query).await?)
    }

    pub async fn latest_metric(&self, patient_id: PatientId) -> Result<Option<HealthMetric>> {
        let query = MetricQuery::for_patient(patient_id).newest_first().limit(1);
        Ok(self.store.find(&query).await?.into_iter().next())
    }

    /// Store hand-entered vitals on the newest record, or as a new record when
    /// the patient has none.
    ///
    /// Vitals with neither weight nor blood pressure leave the store untouched
    /// and return the newest record as it is.
    pub async fn record_manual_vitals(
        &self,
        patient_id: PatientId,
        vitals: &ManualVitals,
    ) -> Result<Option<HealthMetric>> {
        validate_blood_pressure(patient_id, vitals)?;

        let latest = self.latest_metric(patient_id).await?;
        if vitals.is_empty() {
            debug!(patient_id, "No manual vitals supplied, nothing to record");
            return Ok(latest);
        }

        let date = vitals
            .checkup_date
            .unwrap_or_else(|| self.clock.now());

        match latest {
            Some(mut latest) => {
                latest.apply_vitals(vitals, date);
                self.store.update(&latest).await?;
                debug!(patient_id, "Updated latest metrics with manual vitals");
                Ok(Some(latest))
            }
            None => {
                let mut metric = HealthMetric::from_vitals(patient_id, vitals, date);
                metric.id = Some(self.store.insert(&metric).await?);
                debug!(patient_id, "Created metrics from manual vitals");
                Ok(Some(metric))
            }
        }
    }

    /// Whether today's window already holds a record
    pub async fn is_fresh(&self, patient_id: PatientId) -> Result<bool> {
        let (today, tomorrow) = day_window(self.clock.now());
        let query = MetricQuery::for_patient(patient_id)
            .since(today)
            .before(tomorrow);
        Ok(self.store.count(&query).await? > 0)
    }
}

fn validate_blood_pressure(patient_id: PatientId, vitals: &ManualVitals) -> Result<()> {
    if vitals.systolic_bp == 0 && vitals.diastolic_bp == 0 {
        return Ok(());
    }
    if !SYSTOLIC_RANGE.contains(&vitals.systolic_bp) || !DIASTOLIC_RANGE.contains(&vitals.diastolic_bp)
    {
        return Err(AppError::InvalidVitals {
            patient_id,
            reason: format!(
                "blood pressure {}/{} outside {}-{}/{}-{}",
                vitals.systolic_bp,
                vitals.diastolic_bp,
                SYSTOLIC_RANGE.start(),
                SYSTOLIC_RANGE.end(),
                DIASTOLIC_RANGE.start(),
                DIASTOLIC_RANGE.end()
            ),
        });
    }
    Ok(())
}
