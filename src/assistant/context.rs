use crate::error::Result;
use crate::models::{EmergencyContact, HealthMetric, Household, PatientProfile};
use crate::simulator::MetricService;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// What the assistant knows about the person asking
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum UserContext {
    Patient(PatientContext),
    Caregiver(CaregiverContext),
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientContext {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_type: String,
    pub height: f64,
    pub medications: String,
    pub allergies: String,
    pub medical_history: String,
    pub emergency_contact: EmergencyContact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_metrics: Option<HealthMetric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaregiverContext {
    pub user_name: String,
    pub patient_count: usize,
    pub patients: Vec<PatientSummary>,
    pub household_info: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_type: String,
    pub height: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub medications: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub allergies: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_metrics: Option<HealthMetric>,
}

/// Assembles [`UserContext`] values from profiles and stored metrics
pub struct ContextBuilder<'a> {
    service: &'a MetricService,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(service: &'a MetricService) -> Self {
        Self { service }
    }

    pub async fn for_patient(&self, profile: &PatientProfile) -> Result<UserContext> {
        let now = self.service.clock().now();
        let latest_metrics = self.service.latest_metric(profile.id).await?;

        Ok(UserContext::Patient(PatientContext {
            name: profile.full_name(),
            age: profile.age_at(now),
            gender: profile.gender.clone(),
            blood_type: profile.blood_type.clone(),
            height: profile.height,
            medications: profile.medications.clone(),
            allergies: profile.allergies.clone(),
            medical_history: profile.medical_history.clone(),
            emergency_contact: profile.emergency_contact.clone(),
            latest_metrics,
        }))
    }

    /// Context for `admin` over every household they administer
    pub async fn for_caregiver(
        &self,
        admin: &str,
        households: &[Household],
        profiles: &[PatientProfile],
    ) -> Result<UserContext> {
        let now = self.service.clock().now();
        let by_id: HashMap<_, _> = profiles.iter().map(|p| (p.id, p)).collect();
        let managed: Vec<&Household> = households.iter().filter(|h| h.admin == admin).collect();

        let mut patients = Vec::new();
        for household in &managed {
            for patient_id in &household.patient_ids {
                let Some(profile) = by_id.get(patient_id) else {
                    warn!(
                        household_id = household.id,
                        patient_id, "Household member has no profile"
                    );
                    continue;
                };

                patients.push(PatientSummary {
                    name: profile.full_name(),
                    age: profile.age_at(now),
                    gender: profile.gender.clone(),
                    blood_type: profile.blood_type.clone(),
                    height: profile.height,
                    medications: profile.medications.clone(),
                    allergies: profile.allergies.clone(),
                    latest_metrics: self.service.latest_metric(profile.id).await?,
                });
            }
        }

        let household_info = format!(
            "Managing {} household(s) with {} patient(s)",
            managed.len(),
            patients.len()
        );

        Ok(UserContext::Caregiver(CaregiverContext {
            user_name: admin.to_string(),
            patient_count: patients.len(),
            patients,
            household_info,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SimulatorConfig;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    fn profile(id: u64, name: &str) -> PatientProfile {
        PatientProfile {
            id,
            name: name.to_string(),
            surname: "Ioannou".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1942, 8, 20).unwrap(),
            gender: "male".to_string(),
            blood_type: "B-".to_string(),
            height: 171.0,
            medications: "Metformin".to_string(),
            allergies: String::new(),
            medical_history: "Type 2 diabetes".to_string(),
            emergency_contact: EmergencyContact::default(),
        }
    }

    fn service() -> MetricService {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        ));
        MetricService::new(
            Arc::new(MemoryStore::new()),
            clock,
            &SimulatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_patient_context_includes_latest_metrics() {
        let service = service();
        service.backfill_history(1).await.unwrap();

        let context = ContextBuilder::new(&service)
            .for_patient(&profile(1, "Giorgos"))
            .await
            .unwrap();

        let UserContext::Patient(patient) = context else {
            panic!("expected patient context");
        };
        assert_eq!(patient.name, "Giorgos Ioannou");
        assert_eq!(patient.age, 82);
        let latest = patient.latest_metrics.unwrap();
        assert_eq!(latest.date, service.clock().now());
    }

    #[tokio::test]
    async fn test_caregiver_context_spans_households() {
        let service = service();
        service.backfill_history(1).await.unwrap();

        let profiles = vec![profile(1, "Giorgos"), profile(2, "Anna"), profile(3, "Petros")];
        let households = vec![
            Household {
                id: 1,
                admin: "dimitra".to_string(),
                patient_ids: vec![1],
            },
            Household {
                id: 2,
                admin: "dimitra".to_string(),
                patient_ids: vec![2, 99],
            },
            Household {
                id: 3,
                admin: "someone-else".to_string(),
                patient_ids: vec![3],
            },
        ];

        let context = ContextBuilder::new(&service)
            .for_caregiver("dimitra", &households, &profiles)
            .await
            .unwrap();

        let UserContext::Caregiver(caregiver) = context else {
            panic!("expected caregiver context");
        };
        assert_eq!(caregiver.patient_count, 2);
        assert_eq!(
            caregiver.household_info,
            "Managing 2 household(s) with 2 patient(s)"
        );
        assert!(caregiver.patients[0].latest_metrics.is_some());
        assert!(caregiver.patients[1].latest_metrics.is_none());
    }
}
