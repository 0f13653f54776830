//! Slotgate
//!
//! Books half-hour slots on a shared lab board and brokers access to the
//! board for whoever holds the current slot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use slotgate_gateway::{
    api,
    auth::{IdentityStore, MemoryIdentityStore, PgIdentityStore},
    clock::SystemClock,
    config::{self, DeviceBackend, StorageBackend},
    db::Database,
    device::{ArduinoCliPipeline, DevicePipeline, MockPipeline},
    ledger::{MemoryLedger, PgLedger, SlotLedger},
    state::{AppState, StateOptions},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type Stores = (Arc<dyn SlotLedger>, Arc<dyn IdentityStore>);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

async fn open_stores(config: &config::Config) -> Result<Stores> {
    match config.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; bookings and accounts are lost on restart");
            Ok((
                Arc::new(MemoryLedger::new()),
                Arc::new(MemoryIdentityStore::new()),
            ))
        }
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database)
                .await
                .inspect_err(|e| error!(error = %e, "Database is unreachable"))?;

            if config.dev_mode {
                db.run_migrations()
                    .await
                    .inspect_err(|e| error!(error = %e, "Migrations failed"))?;
            }

            Ok((
                Arc::new(PgLedger::new(db.pool().clone())),
                Arc::new(PgIdentityStore::new(db.pool().clone())),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to SLOTGATE_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = ?config.storage,
        device = ?config.device,
        dev_mode = config.dev_mode,
        "Starting slotgate"
    );

    let (ledger, identities) = open_stores(&config).await?;

    let pipeline: Arc<dyn DevicePipeline> = match config.device {
        DeviceBackend::ArduinoCli => Arc::new(ArduinoCliPipeline::new(config.arduino.clone())),
        DeviceBackend::Mock => {
            warn!("Using the mock device pipeline");
            Arc::new(MockPipeline::healthy())
        }
    };

    tokio::fs::create_dir_all(&config.staging_dir).await?;

    let state = AppState::new(
        ledger,
        identities,
        pipeline,
        Arc::new(SystemClock),
        StateOptions {
            token_lifetime: chrono::Duration::minutes(config.token_lifetime_minutes),
            staging_root: config.staging_dir.clone(),
            cors_origin: config.cors_origin.clone(),
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let router = api::create_router(state);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // A dropped sender also counts as a shutdown request.
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                info!("Draining HTTP connections");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "Open connections outlived the grace period"
                );
            }
        }
        joined = &mut server => match joined {
            Ok(Ok(())) => info!("Server exited"),
            Ok(Err(e)) => error!(error = %e, "Server error"),
            Err(e) => error!(error = %e, "Server task panicked"),
        },
    }

    info!("Stopped");
    Ok(())
}
