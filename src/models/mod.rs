pub mod chat;
pub mod invitation;
pub mod metric;
pub mod patient;

pub use chat::{ChatMessage, ChatRole, ChatSession, ChatUser, SessionId};
pub use invitation::{Invitation, InvitationResponse, InvitationStatus};
pub use metric::{HealthMetric, ManualVitals, SleepStages};
pub use patient::{EmergencyContact, Household, PatientProfile};

/// Identifier of a monitored patient
pub type PatientId = u64;
