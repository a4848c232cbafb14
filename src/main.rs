use anyhow::Context;
use dorm_power::{
    api::{handlers::AppState, routes::create_router},
    collector::Collector,
    config::Config,
    portal::PortalClient,
    registry::DormitoryRegistry,
    scheduler::{DailySchedule, Scheduler},
    store::SnapshotStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dorm_power=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    info!("Starting dorm-power service");

    let config_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    info!(
        "Configuration loaded from: {} ({} dormitories)",
        config_path,
        config.dormitories.len()
    );

    let tz = config.collector.tz()?;
    let schedule = DailySchedule::from_config(&config.collector)?;

    let store = Arc::new(SnapshotStore::new(
        config.storage.data_dir.clone(),
        config.storage.retention,
    ));
    store.init().await?;
    info!("Snapshot store at {}", config.storage.data_dir.display());

    let registry = Arc::new(DormitoryRegistry::new(config.dormitories.clone()));
    let portal = Arc::new(PortalClient::new(config.portal.clone(), tz));
    let collector = Arc::new(Collector::new(
        portal,
        store.clone(),
        registry.clone(),
        config.collector.pacing(),
    ));

    let scheduler = Scheduler::new(schedule, collector.clone());
    let startup_collector = collector.clone();
    let collect_on_startup = config.collector.collect_on_startup;
    tokio::spawn(async move {
        if collect_on_startup {
            info!("Running startup collection");
            startup_collector.run_all().await;
        }
        scheduler.run().await;
    });

    let state = AppState {
        registry,
        store,
        collector,
        low_balance_threshold: config.collector.low_balance_threshold,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.api.host, config.api.port);
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
