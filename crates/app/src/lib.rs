//! # brewlink-app
//!
//! Application layer: the telemetry pipeline and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `PersistenceGateway`: readings, usage and alert records
//!   - `Transport` / `TelemetryPublisher`: the publish/subscribe client
//! - Define the **pipeline** that drives the domain:
//!   - `ConnectionSupervisor`: connect, retry with backoff, resubscribe
//!   - `IngestionDispatcher`: bounded, per-device ordered worker pool
//!   - `DeviceStateStore`: per-device critical section over device state
//!   - `AlertEmitter`: deduplicated, persisted alerts
//!   - `BrewProcessor`: atomic, recipe-based resource deduction
//! - Own the wire codec shared by the dispatcher and the simulator
//!
//! ## Dependency rule
//! Depends on `brewlink-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod codec;
pub mod dedupe;
pub mod dispatcher;
pub mod metrics;
pub mod ports;
pub mod retry;
pub mod services;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;
