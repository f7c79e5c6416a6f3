pub mod coordinator;
pub mod generator;
pub mod guard;
pub mod service;
pub mod worker;

pub use coordinator::{Coordinator, MaintenanceReport};
pub use generator::MetricGenerator;
pub use guard::FreshnessGuard;
pub use service::{EnsureOutcome, HistoryOutcome, MetricService};
pub use worker::{WorkerHandle, WorkerRegistry};
