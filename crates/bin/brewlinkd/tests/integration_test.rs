//! End-to-end smoke tests for the full brewlinkd stack.
//!
//! Each test wires the complete pipeline (in-memory `SQLite`, real services,
//! connection supervisor, ingestion dispatcher, axum router) over an
//! in-process loopback transport and exercises it via
//! `tower::ServiceExt::oneshot`, so no TCP port or broker is needed.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

use brewlink_adapter_http_axum::router;
use brewlink_adapter_http_axum::state::AppState;
use brewlink_adapter_simulator::{Simulator, SimulatorConfig};
use brewlink_adapter_storage_sqlite_sqlx::{Config, SqliteGateway};
use brewlink_app::codec::DEFAULT_NAMESPACE;
use brewlink_app::dispatcher::{DispatcherSettings, IngestionDispatcher, ReadingHandler};
use brewlink_app::metrics::PipelineMetrics;
use brewlink_app::ports::{
    InboundMessage, TelemetryPublisher, Transport, TransportError, TransportEvent,
};
use brewlink_app::services::{AlertEmitter, AlertSettings, BrewProcessor, DeviceStateStore};
use brewlink_app::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorSettings};
use brewlink_domain::device::Thresholds;

/// Routes every publish straight back to the subscriber, like a broker would.
#[derive(Default)]
struct LoopbackTransport {
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl TelemetryPublisher for LoopbackTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let events = self.events.lock().unwrap().clone();
        let message = InboundMessage::new(topic, payload);
        async move {
            let events = events.ok_or(TransportError::NotConnected)?;
            events
                .send(TransportEvent::Message(message))
                .await
                .map_err(|_| TransportError::NotConnected)
        }
    }
}

impl Transport for LoopbackTransport {
    fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        *self.events.lock().unwrap() = Some(events);
        async { Ok(()) }
    }

    fn subscribe(&self, _filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }

    fn unsubscribe(&self, _filter: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.events.lock().unwrap().take();
        async { Ok(()) }
    }
}

struct Stack {
    app: axum::Router,
    transport: Arc<LoopbackTransport>,
    supervisor: ConnectionSupervisor<LoopbackTransport>,
    db: brewlink_adapter_storage_sqlite_sqlx::Database,
}

/// Build a fully-wired pipeline backed by an in-memory `SQLite` database.
async fn stack() -> Stack {
    let db = Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .expect("in-memory database should initialise");
    let gateway = Arc::new(SqliteGateway::new(db.pool().clone()));
    let timeout = Duration::from_secs(5);

    let metrics = Arc::new(PipelineMetrics::default());
    let store = Arc::new(DeviceStateStore::new(Thresholds::default()));
    let emitter = Arc::new(AlertEmitter::new(
        Arc::clone(&gateway),
        AlertSettings::default(),
        Arc::clone(&metrics),
    ));
    let processor = Arc::new(BrewProcessor::new(
        Arc::clone(&store),
        Arc::clone(&emitter),
        Arc::clone(&gateway),
        timeout,
        Arc::clone(&metrics),
    ));
    let handler = ReadingHandler::new(
        Arc::clone(&store),
        Arc::clone(&emitter),
        gateway,
        Arc::clone(&metrics),
        timeout,
    );
    let dispatcher = IngestionDispatcher::start(
        handler,
        DispatcherSettings {
            workers: 4,
            ..DispatcherSettings::default()
        },
    );

    let transport = Arc::new(LoopbackTransport::default());
    let supervisor = ConnectionSupervisor::start(
        Arc::clone(&transport),
        dispatcher,
        SupervisorSettings {
            backoff_base: Duration::from_millis(10),
            ..SupervisorSettings::default()
        },
    );
    let mut state_rx = supervisor.state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state_rx.wait_for(|state| *state == ConnectionState::Connected),
    )
    .await
    .expect("supervisor should connect")
    .expect("supervisor should be running");

    let state = AppState::new(processor, emitter, store, metrics, supervisor.state());
    Stack {
        app: router::build(state),
        transport,
        supervisor,
        db,
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Poll `uri` until `check` accepts the JSON body.
async fn wait_for_json(app: &axum::Router, uri: &str, check: impl Fn(&serde_json::Value) -> bool) -> serde_json::Value {
    for _ in 0..500 {
        let (status, json) = send(app, get(uri)).await;
        if status == StatusCode::OK && check(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{uri} never satisfied the condition");
}

// ---------------------------------------------------------------------------
// Health and connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_report_health_and_connected_state() {
    let stack = stack().await;

    let (status, _) = send(&stack.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&stack.app, get("/api/connection")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "connected");

    assert!(stack.supervisor.stop().await);
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_ingest_a_simulated_fleet() {
    let stack = stack().await;
    let mut simulator = Simulator::new(
        Arc::clone(&stack.transport),
        DEFAULT_NAMESPACE,
        &SimulatorConfig {
            enabled: true,
            seed: Some(42),
            ..SimulatorConfig::default()
        },
    );

    assert_eq!(simulator.cycle().await, 12);

    let devices = wait_for_json(&stack.app, "/api/devices", |json| {
        json.as_array().is_some_and(|devices| devices.len() == 12)
    })
    .await;
    assert_eq!(devices[0]["device_id"], 1);
    assert_eq!(devices[11]["facility_id"], 4);

    let metrics = wait_for_json(&stack.app, "/api/metrics", |json| {
        json["readings_applied"] == 12
    })
    .await;
    assert_eq!(metrics["decode_errors"], 0);

    assert!(stack.supervisor.stop().await);
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM readings")
        .fetch_one(stack.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 12);
}

#[tokio::test]
async fn should_count_malformed_telemetry_without_stopping() {
    let stack = stack().await;

    stack
        .transport
        .publish("coffeemachine/5/data", b"not json".to_vec())
        .await
        .unwrap();
    stack
        .transport
        .publish(
            "coffeemachine/5/data",
            br#"{"machineId": 5, "status": "ON", "waterLevel": 90}"#.to_vec(),
        )
        .await
        .unwrap();

    let metrics = wait_for_json(&stack.app, "/api/metrics", |json| {
        json["readings_applied"] == 1
    })
    .await;
    assert_eq!(metrics["decode_errors"], 1);
    assert_eq!(metrics["readings_received"], 2);

    assert!(stack.supervisor.stop().await);
}

// ---------------------------------------------------------------------------
// Alerts and brewing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_alert_on_low_water_and_keep_brewing() {
    let stack = stack().await;

    stack
        .transport
        .publish(
            "coffeemachine/1/data",
            br#"{"machineId": 1, "facilityId": 1, "status": "ON", "temperature": 95,
                 "waterLevel": 15, "milkLevel": 80, "beansLevel": 80, "sugarLevel": 80,
                 "brewType": "None"}"#
                .to_vec(),
        )
        .await
        .unwrap();
    wait_for_json(&stack.app, "/api/devices/1", |json| {
        json["levels"]["water"] == 15.0
    })
    .await;

    let (status, json) = send(
        &stack.app,
        post("/api/devices/1/brew", r#"{"brewType": "ESPRESSO"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, json) = send(
        &stack.app,
        post("/api/devices/1/brew", r#"{"brewType": "LATTE", "size": 3.0}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["failure"], "INSUFFICIENT_SUPPLY");

    let (_, device) = send(&stack.app, get("/api/devices/1")).await;
    assert!((device["levels"]["water"].as_f64().unwrap() - 12.0).abs() < 1e-9);
    assert_eq!(device["levels"]["milk"], 80.0);

    assert!(stack.supervisor.stop().await);

    let alerts: Vec<(String,)> = sqlx::query_as("SELECT kind FROM alerts WHERE device_id = 1")
        .fetch_all(stack.db.pool())
        .await
        .unwrap();
    assert_eq!(alerts, vec![("LOW_WATER".to_string(),)]);

    let (usage,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage WHERE brew_type = 'ESPRESSO'")
        .fetch_one(stack.db.pool())
        .await
        .unwrap();
    assert_eq!(usage, 1);
}

#[tokio::test]
async fn should_list_and_resolve_alerts_stamped_on_receipt() {
    let stack = stack().await;

    stack
        .transport
        .publish(
            "coffeemachine/2/data",
            br#"{"machineId": 2, "status": "ON", "waterLevel": 80, "milkLevel": 8,
                 "beansLevel": 80, "sugarLevel": 80, "timestamp": "2001-01-01T08:00:00"}"#
                .to_vec(),
        )
        .await
        .unwrap();
    let alerts = wait_for_json(&stack.app, "/api/devices/2/alerts", |json| {
        json.as_array().is_some_and(|alerts| alerts.len() == 1)
    })
    .await;
    assert_eq!(alerts[0]["kind"], "LOW_MILK");
    assert_eq!(alerts[0]["resolved"], false);
    assert!(!alerts[0]["timestamp"].as_str().unwrap().starts_with("2001"));

    let alert_id = alerts[0]["id"].as_str().unwrap().to_string();
    let (status, json) = send(&stack.app, post(&format!("/api/alerts/{alert_id}/resolve"), "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["resolved"], true);

    let (status, _) = send(&stack.app, post(&format!("/api/alerts/{alert_id}/resolve"), "")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(stack.supervisor.stop().await);

    let (recorded_at, resolved): (String, bool) = sqlx::query_as(
        "SELECT r.recorded_at, a.resolved FROM readings r JOIN alerts a ON a.device_id = r.device_id WHERE r.device_id = 2",
    )
    .fetch_one(stack.db.pool())
    .await
    .unwrap();
    assert!(recorded_at.starts_with("2001-01-01T08:00:00"));
    assert!(resolved);
}
