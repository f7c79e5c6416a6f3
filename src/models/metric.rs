use crate::models::PatientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One daily health-metrics record for a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetric {
    /// Assigned by the store on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub patient_id: PatientId,
    pub date: DateTime<Utc>,
    pub weight: f64,
    pub heart_rate: i32,
    pub systolic_bp: i32,
    pub diastolic_bp: i32,
    /// Display form, "systolic/diastolic"
    pub blood_pressure: String,
    pub oxygen_saturation: f64,
    pub steps_count: u32,
    pub sleep: SleepStages,
    /// Hours
    pub sleep_duration: f64,
    pub irregular_rhythm: bool,
    pub fall_detected: bool,
}

/// Sleep stage breakdown; percentages are not normalized to 100
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepStages {
    pub light: f64,
    pub deep: f64,
    pub rem: f64,
    pub awake_minutes: u32,
}

/// Vitals entered by hand by a caregiver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualVitals {
    pub weight: f64,
    pub heart_rate: i32,
    pub systolic_bp: i32,
    pub diastolic_bp: i32,
    pub oxygen_saturation: f64,
    /// Defaults to the current time when absent
    #[serde(default)]
    pub checkup_date: Option<DateTime<Utc>>,
}

impl ManualVitals {
    /// No weight and no blood pressure were entered
    pub fn is_empty(&self) -> bool {
        self.weight == 0.0 && self.systolic_bp == 0 && self.diastolic_bp == 0
    }
}

impl HealthMetric {
    pub fn format_blood_pressure(systolic: i32, diastolic: i32) -> String {
        format!("{}/{}", systolic, diastolic)
    }

    /// Overwrite the vital-sign fields with hand-entered values
    pub fn apply_vitals(&mut self, vitals: &ManualVitals, date: DateTime<Utc>) {
        self.date = date;
        self.weight = vitals.weight;
        self.heart_rate = vitals.heart_rate;
        self.systolic_bp = vitals.systolic_bp;
        self.diastolic_bp = vitals.diastolic_bp;
        self.blood_pressure = Self::format_blood_pressure(vitals.systolic_bp, vitals.diastolic_bp);
        self.oxygen_saturation = vitals.oxygen_saturation;
    }

    /// A record carrying only hand-entered vitals
    pub fn from_vitals(patient_id: PatientId, vitals: &ManualVitals, date: DateTime<Utc>) -> Self {
        let mut metric = Self {
            id: None,
            patient_id,
            date,
            weight: 0.0,
            heart_rate: 0,
            systolic_bp: 0,
            diastolic_bp: 0,
            blood_pressure: String::new(),
            oxygen_saturation: 0.0,
            steps_count: 0,
            sleep: SleepStages::default(),
            sleep_duration: 0.0,
            irregular_rhythm: false,
            fall_detected: false,
        };
        metric.apply_vitals(vitals, date);
        metric
    }
}
