//! Alerts raised for devices.
//!
//! An [`AlertEvent`] is immutable once created. Its dedupe key is the pair
//! `(device_id, kind)`; severity and category are derived from the kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{AlertId, DeviceId};
use crate::time::Timestamp;

/// Closed set of alert kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    LowWater,
    LowMilk,
    LowBeans,
    LowSugar,
    Malfunction,
    Offline,
    HighTemperature,
}

/// How urgently an alert needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Coarse grouping used by operators to route alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCategory {
    Supply,
    Operational,
}

impl AlertKind {
    pub const ALL: [AlertKind; 7] = [
        Self::LowWater,
        Self::LowMilk,
        Self::LowBeans,
        Self::LowSugar,
        Self::Malfunction,
        Self::Offline,
        Self::HighTemperature,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowWater => "LOW_WATER",
            Self::LowMilk => "LOW_MILK",
            Self::LowBeans => "LOW_BEANS",
            Self::LowSugar => "LOW_SUGAR",
            Self::Malfunction => "MALFUNCTION",
            Self::Offline => "OFFLINE",
            Self::HighTemperature => "HIGH_TEMPERATURE",
        }
    }

    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::LowWater | Self::LowMilk | Self::LowBeans | Self::LowSugar => Severity::Warning,
            Self::Malfunction | Self::Offline | Self::HighTemperature => Severity::Critical,
        }
    }

    #[must_use]
    pub fn category(self) -> AlertCategory {
        match self {
            Self::LowWater | Self::LowMilk | Self::LowBeans | Self::LowSugar => {
                AlertCategory::Supply
            }
            Self::Malfunction | Self::Offline | Self::HighTemperature => {
                AlertCategory::Operational
            }
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownAlertKind(s.to_string()))
    }
}

/// A threshold crossing detected while applying an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub kind: AlertKind,
    /// The value that crossed, when the kind has one.
    pub value: Option<f64>,
}

impl Crossing {
    #[must_use]
    pub fn new(kind: AlertKind, value: Option<f64>) -> Self {
        Self { kind, value }
    }

    /// Human readable alert message for this crossing.
    #[must_use]
    pub fn message(&self) -> String {
        let value = self.value.unwrap_or_default();
        match self.kind {
            AlertKind::LowWater => {
                format!("Water level is low: {value:.1}%. Please refill.")
            }
            AlertKind::LowMilk => format!("Milk level is low: {value:.1}%. Please refill."),
            AlertKind::LowBeans => {
                format!("Coffee beans level is low: {value:.1}%. Please refill.")
            }
            AlertKind::LowSugar => format!("Sugar level is low: {value:.1}%. Please refill."),
            AlertKind::HighTemperature => {
                format!("Temperature is too high: {value:.1}. Maintenance required.")
            }
            AlertKind::Offline => "Machine went offline: status changed from ON to OFF".to_string(),
            AlertKind::Malfunction => "Machine malfunction detected. Maintenance required.".to_string(),
        }
    }
}

/// A persisted-or-about-to-be-persisted alert record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub device_id: DeviceId,
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub timestamp: Timestamp,
}

impl AlertEvent {
    /// Create an alert; severity is derived from `kind`.
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        kind: AlertKind,
        message: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            device_id,
            kind,
            message: message.into(),
            severity: kind.severity(),
            timestamp,
        }
    }

    /// Build the alert for a detected crossing.
    #[must_use]
    pub fn from_crossing(device_id: DeviceId, crossing: &Crossing, timestamp: Timestamp) -> Self {
        Self::new(device_id, crossing.kind, crossing.message(), timestamp)
    }
}

/// An alert as held by the persistence gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: AlertId,
    #[serde(flatten)]
    pub alert: AlertEvent,
    /// Resolved alerts no longer suppress new ones of the same kind.
    pub resolved: bool,
}
