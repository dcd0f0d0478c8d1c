//! Application services: the stateful stages of the pipeline.

pub mod alert_emitter;
pub mod brew_processor;
pub mod state_store;

pub use alert_emitter::{AlertEmitter, AlertSettings, EmitOutcome};
pub use brew_processor::BrewProcessor;
pub use state_store::{DeviceStateStore, Reconciliation};
