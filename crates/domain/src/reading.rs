//! Telemetry reading: one decoded sample reported by a device.

use serde::{Deserialize, Serialize};

use crate::brew::BrewType;
use crate::device::{DeviceStatus, Levels, StateUpdate};
use crate::id::{DeviceId, FacilityId};
use crate::time::Timestamp;

/// A transient, decoded telemetry sample.
///
/// Every field except the device id and timestamp is optional: an absent
/// field means "no change" for the reconciled state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub device_id: DeviceId,
    pub facility_id: Option<FacilityId>,
    pub status: Option<DeviceStatus>,
    pub temperature: Option<f64>,
    pub levels: Levels,
    pub brew_type: Option<BrewType>,
    pub timestamp: Timestamp,
}

impl TelemetryReading {
    /// Create a reading for `device_id` that reports nothing yet.
    #[must_use]
    pub fn new(device_id: DeviceId, timestamp: Timestamp) -> Self {
        Self {
            device_id,
            facility_id: None,
            status: None,
            temperature: None,
            levels: Levels::default(),
            brew_type: None,
            timestamp,
        }
    }

    /// The partial state update this reading carries.
    #[must_use]
    pub fn update(&self) -> StateUpdate {
        StateUpdate {
            facility_id: self.facility_id,
            status: self.status,
            temperature: self.temperature,
            levels: self.levels,
            at: Some(self.timestamp),
        }
    }
}
