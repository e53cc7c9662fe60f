//! SDC Drain - Main entry point

use anyhow::Result;
use sdc_common::logging::{init_logging, LogConfig};
use std::{sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use sdc_drain::{
    api::{self, ApiState},
    config::Config,
    db,
    drain::{
        postgres::{PgDestinationStore, PgStagingStore},
        DestinationStore, DrainOrchestrator, DrainScheduler, StagingStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::default()
        .with_file_prefix("sdc-drain")
        .with_filter_directives("sdc_drain=debug,tower_http=info,sqlx=warn")
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting SDC drain");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database).await?;
    db::health_check(&pool).await?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    let staging: Arc<dyn StagingStore> = Arc::new(PgStagingStore::new(pool.clone()));
    let destination: Arc<dyn DestinationStore> = Arc::new(PgDestinationStore::new(pool));
    let orchestrator = Arc::new(DrainOrchestrator::new(staging, destination, config.to_drain_config()));

    let shutdown = CancellationToken::new();

    let scheduler = match config.drain.interval() {
        Some(interval) => {
            info!(interval_secs = interval.as_secs(), "Drain scheduler enabled");
            Some(
                DrainScheduler::new(Arc::clone(&orchestrator), interval)
                    .run_on_startup(config.drain.run_on_startup)
                    .spawn(shutdown.clone()),
            )
        },
        None => {
            info!("Drain scheduler disabled (DRAIN_INTERVAL_SECS=0), on-demand only");
            None
        },
    };

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let state = ApiState {
        orchestrator: Arc::clone(&orchestrator),
        shutdown: shutdown.clone(),
    };
    api::serve(&config.server, state).await?;

    // A cycle in progress observes the cancelled token and aborts
    let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    if let Some(handle) = scheduler {
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!("Drain scheduler did not stop within {}s", timeout.as_secs());
        }
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    shutdown.cancel();
}
