use carepulse::assistant::{ChatSessions, ContextBuilder};
use carepulse::clock::{Clock, SystemClock};
use carepulse::config::Config;
use carepulse::household::HouseholdRegistry;
use carepulse::models::ChatUser;
use carepulse::simulator::Coordinator;
use carepulse::store::{MemoryChatStore, MemoryStore, MetricStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carepulse=debug".into()),
        )
        .init();

    info!("Starting carepulse...");

    // Load configuration
    let config = Config::load()?;
    info!(
        patients = config.patients.len(),
        households = config.households.len(),
        "Configuration loaded successfully"
    );

    let store: Arc<dyn MetricStore> = match config.store.max_records {
        Some(max) => {
            info!("Metric store limited to {} records", max);
            Arc::new(MemoryStore::with_capacity_limit(max))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let coordinator = Coordinator::new(store, clock.clone(), config.simulator.clone());

    for patient in &config.patients {
        if let Err(e) = coordinator.onboard_patient(patient.id).await {
            error!(patient_id = patient.id, "Failed to onboard patient: {}", e);
        }
    }

    coordinator.start_maintenance()?;

    let households = HouseholdRegistry::new(
        config.households.clone(),
        config.patients.iter().map(|p| p.id),
        clock.clone(),
    );
    let sessions = ChatSessions::new(Arc::new(MemoryChatStore::new()), clock);

    let builder = ContextBuilder::new(coordinator.service());
    for admin in households.admins() {
        let context = builder
            .for_caregiver(&admin, &households.households(), &config.patients)
            .await?;
        let session = sessions
            .session_for(&ChatUser::Caregiver(admin.clone()), &context)
            .await?;
        info!(
            admin = %admin,
            session_id = %session.session_id,
            bytes = session.context_data.len(),
            "Assistant session ready"
        );
    }

    info!(
        workers = coordinator.workers().len(),
        "Simulator running, press Ctrl+C to stop"
    );

    shutdown_signal().await;

    coordinator.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
