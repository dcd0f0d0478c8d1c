//! # brewlink-adapter-mqtt
//!
//! MQTT adapter: the publish/subscribe transport for device telemetry.
//!
//! ## Responsibilities
//! - Open persistent MQTT sessions (stable client id, clean-session off, QoS 1)
//! - Forward inbound publishes and connection loss as
//!   [`TransportEvent`](brewlink_app::ports::TransportEvent)s
//! - Publish telemetry on behalf of the simulator
//!
//! Retry and resubscription policy live in the app layer's connection
//! supervisor; this adapter makes exactly one attempt per `connect` call.
//!
//! ## Dependency rule
//! Same as other adapters: depends on `brewlink-app`, never the reverse.

pub mod config;
pub mod error;
pub mod transport;

pub use config::MqttConfig;
pub use error::MqttError;
pub use transport::MqttTransport;
