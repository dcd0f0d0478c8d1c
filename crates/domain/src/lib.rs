//! # brewlink-domain
//!
//! Pure domain model for the brewlink appliance-telemetry pipeline.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **device state** and the reconciliation rules that turn a
//!   telemetry reading into a new state plus threshold-crossing events
//! - Define **alerts** (kinds, severity, category, messages)
//! - Define **brew commands**, the recipe table and resource consumption math
//! - Contain all invariant enforcement (level clamping, range validation)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod alert;
pub mod brew;
pub mod device;
pub mod reading;
