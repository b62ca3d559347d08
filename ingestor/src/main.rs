use anyhow::Context;
use grid_ingestor::config::{Config, StoreConfig};
use grid_ingestor::db::PgStore;
use grid_ingestor::engine::AlertEngine;
use grid_ingestor::memory::MemoryStore;
use grid_ingestor::store::Store;
use grid_ingestor::{metrics, mqtt, rest};
use std::future::pending;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting grid ingestor");
    info!("HTTP server: {}", config.http_addr);
    info!("Alert thresholds: {:?}", config.thresholds);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
    }

    let store: Arc<dyn Store> = match &config.store {
        StoreConfig::Memory => {
            info!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreConfig::Postgres(url) => {
            info!("Database: {}", url.split('@').last().unwrap_or("***"));
            let store = PgStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            Arc::new(store)
        }
    };

    let state = rest::AppState::new(
        store,
        AlertEngine::new(config.thresholds.clone()),
        config.api.clone(),
    );

    let mqtt_handle = match config.mqtt.clone() {
        Some(mqtt_config) => {
            let client_id = format!("ingestor-{}", uuid::Uuid::new_v4());
            let gateway = state.gateway.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = mqtt::run_mqtt(mqtt_config, client_id, gateway).await {
                    error!("MQTT task failed: {}", e);
                }
            }))
        }
        None => {
            info!("MQTT_BROKER not set, MQTT ingestion disabled");
            None
        }
    };

    let watchdog_handle = config.watchdog_interval.map(|period| {
        let registry = state.registry.clone();
        tokio::spawn(registry.run_watchdog(period))
    });

    let app = rest::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = async {
            match mqtt_handle {
                Some(handle) => { let _ = handle.await; }
                None => pending::<()>().await,
            }
        } => {
            error!("MQTT task terminated");
        }
        _ = async {
            match watchdog_handle {
                Some(handle) => { let _ = handle.await; }
                None => pending::<()>().await,
            }
        } => {
            error!("Watchdog task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}
