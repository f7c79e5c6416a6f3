use crate::models::{InvitationStatus, PatientId, SessionId};

/// Failures reported by a [`MetricStore`](crate::store::MetricStore) or
/// [`ChatStore`](crate::store::ChatStore)
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Metric record {0} not found")]
    NotFound(u64),

    #[error("Metric record has no id")]
    MissingId,

    #[error("Chat session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Store capacity exceeded: {requested} new records, {available} slots left")]
    CapacityExceeded { requested: usize, available: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid vitals for patient {patient_id}: {reason}")]
    InvalidVitals { patient_id: PatientId, reason: String },

    #[error("No household is administered by {0}")]
    HouseholdNotFound(String),

    #[error("Patient {0} does not exist")]
    UnknownPatient(PatientId),

    #[error("Invitation {0} not found")]
    InvitationNotFound(u64),

    #[error("Invitation {id} has already been {status}")]
    InvitationProcessed { id: u64, status: InvitationStatus },

    #[error("Patient {patient_id} is already in household {household_id}")]
    AlreadyMember { patient_id: PatientId, household_id: u64 },

    #[error("Coordinator is shutting down")]
    ShuttingDown,

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
