//! # brewlinkd: brewlink daemon
//!
//! Composition root that wires all adapters together and starts the pipeline.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars) and initialise logging
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct the app services, injecting the persistence gateway
//! - Start the ingestion dispatcher under the connection supervisor
//! - Optionally run the synthetic load simulator on the same transport
//! - Build the axum router, bind to a TCP port and serve
//! - Handle graceful shutdown (SIGTERM/SIGINT), draining accepted readings
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use brewlink_adapter_http_axum::router;
use brewlink_adapter_http_axum::state::AppState;
use brewlink_adapter_mqtt::MqttTransport;
use brewlink_adapter_simulator::Simulator;
use brewlink_adapter_storage_sqlite_sqlx::SqliteGateway;
use brewlink_app::dispatcher::{IngestionDispatcher, ReadingHandler};
use brewlink_app::metrics::PipelineMetrics;
use brewlink_app::services::{AlertEmitter, BrewProcessor, DeviceStateStore};
use brewlink_app::supervisor::ConnectionSupervisor;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = brewlink_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database.url.clone(),
    }
    .build()
    .await?;
    let gateway = Arc::new(SqliteGateway::new(db.pool().clone()));

    // Services
    let metrics = Arc::new(PipelineMetrics::default());
    let store = Arc::new(DeviceStateStore::new(config.thresholds));
    let emitter = Arc::new(AlertEmitter::new(
        Arc::clone(&gateway),
        config.alert_settings(),
        Arc::clone(&metrics),
    ));
    let brew_processor = Arc::new(BrewProcessor::new(
        Arc::clone(&store),
        Arc::clone(&emitter),
        Arc::clone(&gateway),
        config.persistence_timeout(),
        Arc::clone(&metrics),
    ));

    // Ingestion
    let handler = ReadingHandler::new(
        Arc::clone(&store),
        Arc::clone(&emitter),
        gateway,
        Arc::clone(&metrics),
        config.persistence_timeout(),
    );
    let dispatcher = IngestionDispatcher::start(handler, config.dispatcher_settings());
    let transport = Arc::new(MqttTransport::new(config.mqtt.clone())?);
    let supervisor = ConnectionSupervisor::start(
        Arc::clone(&transport),
        dispatcher,
        config.supervisor_settings(),
    );

    // Simulator
    let cancel = CancellationToken::new();
    let simulator = config.simulator.enabled.then(|| {
        let simulator = Simulator::new(
            Arc::clone(&transport),
            config.mqtt.namespace.clone(),
            &config.simulator,
        );
        tokio::spawn(simulator.run(cancel.clone()))
    });

    // HTTP
    let state = AppState::new(brew_processor, emitter, store, metrics, supervisor.state());
    let app = router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "brewlinkd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(task) = simulator {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "simulator task panicked");
        }
    }
    let drained = supervisor.stop().await;
    tracing::info!(drained, "brewlinkd stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown requested");
}
