//! Synthetic daily health metrics drawn from fixed distributions.

use crate::models::{HealthMetric, PatientId, SleepStages};
use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashMap;

/// Total width of the daily weight perturbation around the patient baseline.
/// Any two daily weights therefore differ by less than this.
pub const WEIGHT_SPREAD: f64 = 0.15;

const BASE_WEIGHT_KG: std::ops::Range<f64> = 50.0..100.0;

/// Produces one synthetic [`HealthMetric`] per call.
///
/// Holds the per-patient base weight cache; every weight it generates for a
/// patient is a small perturbation of that first baseline.
#[derive(Debug, Default)]
pub struct MetricGenerator {
    base_weights: RwLock<HashMap<PatientId, f64>>,
}

impl MetricGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a record for `patient_id` stamped `at`.
    ///
    /// The random source is seeded from the timestamp and the patient id, so
    /// repeated calls for the same instant agree once the baseline is cached.
    pub fn generate(&self, patient_id: PatientId, at: DateTime<Utc>) -> HealthMetric {
        let mut rng = StdRng::seed_from_u64(seed_for(patient_id, at));

        let candidate = rng.gen_range(BASE_WEIGHT_KG);
        let base_weight = self.base_weight_or_insert(patient_id, candidate);
        let weight = base_weight + (rng.gen_range(0.0..1.0) - 0.5) * WEIGHT_SPREAD;

        let (sleep, sleep_duration) = sample_sleep(&mut rng);
        let irregular_rhythm = rng.gen_bool(0.05);
        let fall_detected = rng.gen_bool(0.01);

        let mut heart_rate = rng.gen_range(70..=90);
        if rng.gen_bool(0.1) {
            heart_rate += rng.gen_range(-10..=10);
        }

        let mut systolic_bp = rng.gen_range(110..=130);
        let mut diastolic_bp = rng.gen_range(70..=80);
        if rng.gen_bool(0.1) {
            systolic_bp += rng.gen_range(-15..=15);
            diastolic_bp += rng.gen_range(-10..=10);
        }

        let oxygen_saturation = sample_oxygen(&mut rng);
        let steps_count = sample_steps(&mut rng, at.hour());

        HealthMetric {
            id: None,
            patient_id,
            date: at,
            weight,
            heart_rate,
            systolic_bp,
            diastolic_bp,
            blood_pressure: HealthMetric::format_blood_pressure(systolic_bp, diastolic_bp),
            oxygen_saturation,
            steps_count,
            sleep,
            sleep_duration,
            irregular_rhythm,
            fall_detected,
        }
    }

    /// Cached baseline for a patient, if one was generated
    pub fn base_weight(&self, patient_id: PatientId) -> Option<f64> {
        self.base_weights.read().get(&patient_id).copied()
    }

    fn base_weight_or_insert(&self, patient_id: PatientId, candidate: f64) -> f64 {
        if let Some(weight) = self.base_weight(patient_id) {
            return weight;
        }
        *self.base_weights.write().entry(patient_id).or_insert(candidate)
    }
}

fn seed_for(patient_id: PatientId, at: DateTime<Utc>) -> u64 {
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp().saturating_mul(1_000_000_000));
    (nanos as u64).wrapping_add(patient_id)
}

/// Step count skewed by time of day
fn sample_steps(rng: &mut impl Rng, hour: u32) -> u32 {
    let base = rng.gen_range(0..2000);
    match hour {
        0..6 => base / 4,
        6..12 => base + rng.gen_range(0..5000),
        12..18 => base + rng.gen_range(0..8000),
        _ => base + rng.gen_range(0..4000),
    }
}

/// SpO2: 2% severe hypoxia, 8% mild hypoxia, otherwise normal
fn sample_oxygen(rng: &mut impl Rng) -> f64 {
    let roll = rng.gen_range(0.0..100.0);
    if roll < 2.0 {
        85.0 + rng.gen_range(0.0..5.0)
    } else if roll < 10.0 {
        90.0 + rng.gen_range(0.0..4.0)
    } else {
        95.0 + rng.gen_range(0.0..5.0)
    }
}

fn sample_sleep(rng: &mut impl Rng) -> (SleepStages, f64) {
    let duration = 4.0 + rng.gen_range(0.0..6.0);
    let stages = SleepStages {
        light: 45.0 + rng.gen_range(0.0..10.0),
        deep: 20.0 + rng.gen_range(0.0..10.0),
        rem: 25.0 + rng.gen_range(0.0..10.0),
        awake_minutes: rng.gen_range(0..=30),
    };
    (stages, duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_vitals_stay_in_range(patient_id in 0u64..50_000, secs in 0i64..4_000_000_000) {
            let generator = MetricGenerator::new();
            let at = Utc.timestamp_opt(secs, 0).unwrap();
            let m = generator.generate(patient_id, at);

            prop_assert!((60..=111).contains(&m.heart_rate));
            prop_assert!((85.0..=100.0).contains(&m.oxygen_saturation));
            prop_assert!((95..=145).contains(&m.systolic_bp));
            prop_assert!((60..=90).contains(&m.diastolic_bp));
            prop_assert!((4.0..=10.0).contains(&m.sleep_duration));
            prop_assert!((45.0..=55.0).contains(&m.sleep.light));
            prop_assert!((20.0..=30.0).contains(&m.sleep.deep));
            prop_assert!((25.0..=35.0).contains(&m.sleep.rem));
            prop_assert!(m.sleep.awake_minutes <= 30);
            prop_assert!((50.0 - WEIGHT_SPREAD..100.0 + WEIGHT_SPREAD).contains(&m.weight));
            prop_assert_eq!(
                m.blood_pressure,
                format!("{}/{}", m.systolic_bp, m.diastolic_bp)
            );
        }
    }

    #[test]
    fn test_steps_skew_by_time_of_day() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = 5_000u64;

        let night: u64 = (0..samples)
            .map(|_| sample_steps(&mut rng, 3) as u64)
            .sum();
        let afternoon: u64 = (0..samples)
            .map(|_| sample_steps(&mut rng, 14) as u64)
            .sum();

        assert!(night / samples < afternoon / samples);
        assert!(night / samples < 500);
    }

    #[test]
    fn test_generated_steps_follow_timestamp_hour() {
        let generator = MetricGenerator::new();
        let day = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();

        let (mut night, mut afternoon) = (0u64, 0u64);
        for patient_id in 0..2_000 {
            night += generator
                .generate(patient_id, day + Duration::hours(3))
                .steps_count as u64;
            afternoon += generator
                .generate(patient_id, day + Duration::hours(14))
                .steps_count as u64;
        }
        assert!(night < afternoon);
    }

    #[test]
    fn test_weight_continuity_across_days() {
        let generator = MetricGenerator::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let weights: Vec<f64> = (0..60)
            .map(|d| generator.generate(11, start + Duration::days(d)).weight)
            .collect();

        for pair in weights.windows(2) {
            assert!((pair[0] - pair[1]).abs() <= WEIGHT_SPREAD);
        }
    }

    #[test]
    fn test_base_weight_cached_once() {
        let generator = MetricGenerator::new();
        assert!(generator.base_weight(3).is_none());

        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        generator.generate(3, first);
        let base = generator.base_weight(3).unwrap();
        assert!(BASE_WEIGHT_KG.contains(&base));

        generator.generate(3, first + Duration::days(10));
        assert_eq!(generator.base_weight(3), Some(base));
    }

    #[test]
    fn test_same_instant_same_record() {
        let generator = MetricGenerator::new();
        let at = Utc.with_ymd_and_hms(2024, 4, 4, 4, 4, 4).unwrap();
        assert_eq!(generator.generate(8, at), generator.generate(8, at));
    }

    #[test]
    fn test_oxygen_distribution_mostly_normal() {
        let mut rng = StdRng::seed_from_u64(99);
        let draws = 10_000;
        let normal = (0..draws)
            .filter(|_| sample_oxygen(&mut rng) >= 95.0)
            .count();
        // Expected 90%
        assert!(normal > draws * 85 / 100 && normal < draws * 95 / 100);
    }
}
