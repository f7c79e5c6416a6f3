use crate::models::PatientId;
use parking_lot::Mutex;
use std::collections::HashSet;

/// In-process set of patients whose data is currently being generated.
///
/// Best effort only: nothing here survives a restart or spans processes.
#[derive(Debug, Default)]
pub struct FreshnessGuard {
    generating: Mutex<HashSet<PatientId>>,
}

impl FreshnessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `patient_id`, or `None` when another caller already holds it
    pub fn try_acquire(&self, patient_id: PatientId) -> Option<GenerationPermit<'_>> {
        if self.generating.lock().insert(patient_id) {
            Some(GenerationPermit {
                guard: self,
                patient_id,
            })
        } else {
            None
        }
    }

    pub fn is_generating(&self, patient_id: PatientId) -> bool {
        self.generating.lock().contains(&patient_id)
    }
}

/// Releases the patient on drop
#[derive(Debug)]
pub struct GenerationPermit<'a> {
    guard: &'a FreshnessGuard,
    patient_id: PatientId,
}

impl Drop for GenerationPermit<'_> {
    fn drop(&mut self) {
        self.guard.generating.lock().remove(&self.patient_id);
    }
}
