use crate::models::PatientId;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub relationship: String,
    pub phone_number: String,
}

/// Demographic and medical profile of a patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: PatientId,
    pub name: String,
    pub surname: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub blood_type: String,
    /// Centimetres
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub medications: String,
    #[serde(default)]
    pub allergies: String,
    #[serde(default)]
    pub medical_history: String,
    #[serde(default)]
    pub emergency_contact: EmergencyContact,
}

/// A caregiver and the patients they administer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub id: u64,
    /// Username of the administering caregiver
    pub admin: String,
    #[serde(default)]
    pub patient_ids: Vec<PatientId>,
}

impl PatientProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }

    /// Completed years of age at `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> u32 {
        let today = now.date_naive();
        let mut years = today.year() - self.date_of_birth.year();
        if (today.month(), today.day()) < (self.date_of_birth.month(), self.date_of_birth.day()) {
            years -= 1;
        }
        years.max(0) as u32
    }
}
