//! Meridian Router - cross-ledger transfer coordination
//!
//! Wires the core components together with in-memory ledger adapters and
//! storage, starts the supervision loops, and runs until a shutdown signal.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use meridian_router::authority::AuthorityRegistry;
use meridian_router::clock::SystemClock;
use meridian_router::config::Settings;
use meridian_router::confirmation::{ConfirmationRegistry, ConfirmationTaskProcessor, KeccakSigner};
use meridian_router::ledger::{InMemoryLedgerAdapter, LedgerAdapter, LedgerManager};
use meridian_router::metrics::MetricsServer;
use meridian_router::store::MemoryStore;
use meridian_router::swap::SwapCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Meridian Router v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        router_id = %settings.router.router_id,
        role = ?settings.router.role,
        "Loaded configuration for {} ledgers",
        settings.ledgers.len()
    );

    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new());
    let signer = Arc::new(KeccakSigner::from_hex(&settings.router.signing_key)?);

    // Initialize ledger adapters
    let ledger_manager = Arc::new(LedgerManager::new(
        clock.clone(),
        settings.reservations.clone(),
    ));
    for (name, ledger) in settings.ledgers.iter().filter(|(_, l)| l.enabled) {
        match ledger.kind.as_str() {
            "memory" => {
                let adapter = Arc::new(InMemoryLedgerAdapter::new(ledger.ledger_id.clone()));
                adapter.connect().await?;
                ledger_manager.register_adapter(adapter);
                info!(ledger_id = %ledger.ledger_id, "Ledger adapter connected");
            }
            other => {
                warn!(ledger = %name, kind = %other, "Unknown adapter kind, skipping");
            }
        }
    }

    // Initialize core components
    let coordinator = Arc::new(SwapCoordinator::new(clock.clone(), settings.swaps.clone()));
    let authority = Arc::new(AuthorityRegistry::new(
        settings.router.router_id.clone(),
        store.clone(),
        clock.clone(),
        settings.authority.clone(),
    ));
    let registry = Arc::new(ConfirmationRegistry::new(
        settings.router.router_id.clone(),
        settings.router.role,
        store.clone(),
        clock.clone(),
        signer,
    ));
    let processor = Arc::new(ConfirmationTaskProcessor::new(
        registry.clone(),
        clock.clone(),
        settings.confirmations.clone(),
    ));
    info!("Core components initialized");

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Unlock confirmation inbox feeding the coordinator. The transport or
    // adapters layer clones the sender; holding ours keeps the listener
    // alive until shutdown.
    let (unlock_tx, unlock_rx) = mpsc::unbounded_channel();
    let listener_handle = tokio::spawn(coordinator.clone().run_unlock_listener(unlock_rx));

    // Swap deadline supervision loop
    let expiry_handle = tokio::spawn({
        let coordinator = coordinator.clone();
        let interval = settings.swaps.liveness_check_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
                let expired = coordinator.check_expirations();
                if expired > 0 {
                    warn!("Expired {} swaps past their deadline", expired);
                }
            }
        }
    });

    // Reservation sweep loop
    let sweep_handle = tokio::spawn({
        let ledger_manager = ledger_manager.clone();
        let interval = settings.reservations.sweep_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
                let released = ledger_manager.sweep_expired_reservations().await;
                if released > 0 {
                    info!("Swept {} expired reservations", released);
                }
            }
        }
    });

    // Authority heartbeat loop
    let heartbeat_handle = tokio::spawn({
        let authority = authority.clone();
        let interval = settings.router.heartbeat_interval_secs;
        async move {
            loop {
                if let Err(e) = authority.record_heartbeat().await {
                    warn!("Heartbeat write failed: {}", e);
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
            }
        }
    });

    info!("Meridian Router is running");
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Drain in-flight confirmation tasks before exit
    processor.shutdown().await;

    drop(unlock_tx);
    expiry_handle.abort();
    sweep_handle.abort();
    heartbeat_handle.abort();
    listener_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Meridian Router stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meridian_router=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
