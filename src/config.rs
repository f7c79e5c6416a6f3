use crate::models::{Household, PatientProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Synthetic data generation settings
    pub simulator: SimulatorConfig,
    /// Metric store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Patients to onboard at startup
    #[serde(default)]
    pub patients: Vec<PatientProfile>,
    /// Caregiver households over the configured patients
    #[serde(default)]
    pub households: Vec<Household>,
}

/// Synthetic data generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Seconds between freshness checks of each patient worker
    pub update_interval_seconds: u64,
    /// Seconds between maintenance passes over corrupted rows
    pub maintenance_interval_seconds: u64,
    /// Days in the trailing window, today included
    pub history_days: u32,
    /// Records per chunk of a batched write
    pub batch_size: usize,
}

/// Metric store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on stored records. Unbounded when not set.
    #[serde(default)]
    pub max_records: Option<usize>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            update_interval_seconds: 3600,
            maintenance_interval_seconds: 6 * 3600,
            history_days: 31,
            batch_size: 10,
        }
    }
}

impl SimulatorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_seconds)
    }
}

impl Config {
    /// Load configuration from config.yaml file
    ///
    /// Also supports environment variable overrides:
    /// - `UPDATE_INTERVAL_SECONDS` - Override the per-patient worker interval
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - config.yaml file is not found
    /// - Configuration is invalid (malformed YAML, missing fields)
    /// - Validation fails
    pub fn load() -> Result<Self, config::ConfigError> {
        let source = config::File::from(Path::new("config.yaml"))
            .required(true)
            .format(config::FileFormat::Yaml);
        Self::build(source, std::env::var("UPDATE_INTERVAL_SECONDS").ok())
    }

    fn build<S>(source: S, interval_override: Option<String>) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = SimulatorConfig::default();
        let config = config::Config::builder()
            // Start with default values
            .set_default(
                "simulator.update_interval_seconds",
                defaults.update_interval_seconds as i64,
            )?
            .set_default(
                "simulator.maintenance_interval_seconds",
                defaults.maintenance_interval_seconds as i64,
            )?
            .set_default("simulator.history_days", defaults.history_days as i64)?
            .set_default("simulator.batch_size", defaults.batch_size as i64)?
            .add_source(source)
            // Override with environment variables (optional)
            .set_override_option("simulator.update_interval_seconds", interval_override)?
            .build()?;

        let cfg: Config = config.try_deserialize()?;

        // Validate configuration
        cfg.validate()?;

        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if let Err(e) = Self::validate_simulator(&self.simulator) {
            return Err(config::ConfigError::Message(e));
        }

        let mut seen = HashSet::new();
        for patient in &self.patients {
            if !seen.insert(patient.id) {
                return Err(config::ConfigError::Message(format!(
                    "Patient id {} is configured more than once",
                    patient.id
                )));
            }
        }

        for household in &self.households {
            if let Some(unknown) = household.patient_ids.iter().find(|id| !seen.contains(*id)) {
                return Err(config::ConfigError::Message(format!(
                    "Household {} references unknown patient {}",
                    household.id, unknown
                )));
            }
        }

        Ok(())
    }

    fn validate_simulator(simulator: &SimulatorConfig) -> Result<(), String> {
        if simulator.update_interval_seconds == 0 {
            return Err("simulator.update_interval_seconds must be greater than zero".to_string());
        }
        if simulator.maintenance_interval_seconds == 0 {
            return Err(
                "simulator.maintenance_interval_seconds must be greater than zero".to_string(),
            );
        }
        if simulator.history_days == 0 {
            return Err("simulator.history_days must be at least 1".to_string());
        }
        if simulator.batch_size == 0 {
            return Err("simulator.batch_size must be at least 1".to_string());
        }
        Ok(())
    }
}
