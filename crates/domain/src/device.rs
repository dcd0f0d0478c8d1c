//! Device state: the reconciled view of one brewing appliance.
//!
//! A [`DeviceState`] is created lazily from the first reading for a device
//! and then only ever mutated through [`DeviceState::apply`], which merges a
//! partial [`StateUpdate`], clamps out-of-range values and reports the
//! threshold [`Crossing`]s the update caused.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::alert::{AlertKind, Crossing};
use crate::error::ValidationError;
use crate::id::{DeviceId, FacilityId};
use crate::time::Timestamp;

/// Lower and upper bound of every supply level, in percent.
pub const LEVEL_RANGE: (f64, f64) = (0.0, 100.0);

/// Plausible sensor range for temperatures.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 200.0);

/// Power status reported by a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    On,
    Off,
    #[default]
    Unknown,
}

impl DeviceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ValidationError::UnknownStatus(s.to_string())),
        }
    }
}

/// A consumable tracked as a percentage level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Supply {
    Water,
    Milk,
    Beans,
    Sugar,
}

impl Supply {
    pub const ALL: [Supply; 4] = [Self::Water, Self::Milk, Self::Beans, Self::Sugar];

    /// The alert raised when this supply crosses below the low threshold.
    #[must_use]
    pub fn low_alert(self) -> AlertKind {
        match self {
            Self::Water => AlertKind::LowWater,
            Self::Milk => AlertKind::LowMilk,
            Self::Beans => AlertKind::LowBeans,
            Self::Sugar => AlertKind::LowSugar,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Milk => "milk",
            Self::Beans => "beans",
            Self::Sugar => "sugar",
        }
    }
}

impl fmt::Display for Supply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supply levels in percent. `None` means "not yet reported".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Levels {
    pub water: Option<f64>,
    pub milk: Option<f64>,
    pub beans: Option<f64>,
    pub sugar: Option<f64>,
}

impl Levels {
    /// All four supplies set to the same level.
    #[must_use]
    pub fn uniform(level: f64) -> Self {
        Self {
            water: Some(level),
            milk: Some(level),
            beans: Some(level),
            sugar: Some(level),
        }
    }

    #[must_use]
    pub fn get(&self, supply: Supply) -> Option<f64> {
        match supply {
            Supply::Water => self.water,
            Supply::Milk => self.milk,
            Supply::Beans => self.beans,
            Supply::Sugar => self.sugar,
        }
    }

    pub fn set(&mut self, supply: Supply, level: Option<f64>) {
        let slot = match supply {
            Supply::Water => &mut self.water,
            Supply::Milk => &mut self.milk,
            Supply::Beans => &mut self.beans,
            Supply::Sugar => &mut self.sugar,
        };
        *slot = level;
    }
}

/// Thresholds used for crossing detection and operability checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A supply strictly below this level is "low".
    pub low_supply: f64,
    /// A supply strictly below this level is "critically low".
    pub critical_supply: f64,
    /// A temperature strictly above this value is "high".
    pub high_temperature: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_supply: 20.0,
            critical_supply: 10.0,
            high_temperature: 140.0,
        }
    }
}

/// A partial update: `None` fields leave the prior value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub facility_id: Option<FacilityId>,
    pub status: Option<DeviceStatus>,
    pub temperature: Option<f64>,
    pub levels: Levels,
    pub at: Option<Timestamp>,
}

/// A value that was replaced by the nearest bound of its range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampedField {
    pub field: &'static str,
    pub received: f64,
    pub stored: f64,
}

/// Side effects of [`DeviceState::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub crossings: Vec<Crossing>,
    pub clamped: Vec<ClampedField>,
    /// Fields dropped because they were not finite numbers.
    pub rejected: Vec<&'static str>,
}

/// Reconciled state of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub facility_id: Option<FacilityId>,
    pub status: DeviceStatus,
    /// Cleared by soft deactivation; inactive devices refuse brews.
    pub active: bool,
    pub temperature: Option<f64>,
    pub levels: Levels,
    pub last_update: Option<Timestamp>,
}

impl DeviceState {
    /// A fresh state with nothing reported yet.
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            facility_id: None,
            status: DeviceStatus::Unknown,
            active: true,
            temperature: None,
            levels: Levels::default(),
            last_update: None,
        }
    }

    /// Merge `update` into this state and report crossings and clamps.
    ///
    /// Crossings are edge-triggered: a supply fires only when it moves from
    /// at-or-above the low threshold (or unknown) to below it, temperature
    /// only when it moves from at-or-below the high threshold (or unknown)
    /// to above it, and OFFLINE only on an `ON -> OFF` transition.
    pub fn apply(&mut self, update: &StateUpdate, thresholds: &Thresholds) -> Applied {
        let mut applied = Applied::default();

        if let Some(facility_id) = update.facility_id {
            self.facility_id = Some(facility_id);
        }

        if let Some(status) = update.status {
            if self.status == DeviceStatus::On && status == DeviceStatus::Off {
                applied.crossings.push(Crossing::new(AlertKind::Offline, None));
            }
            self.status = status;
        }

        if let Some(raw) = update.temperature {
            if let Some(value) = sanitize("temperature", raw, TEMPERATURE_RANGE, &mut applied) {
                let armed = self
                    .temperature
                    .is_none_or(|prev| prev <= thresholds.high_temperature);
                if armed && value > thresholds.high_temperature {
                    applied
                        .crossings
                        .push(Crossing::new(AlertKind::HighTemperature, Some(value)));
                }
                self.temperature = Some(value);
            }
        }

        for supply in Supply::ALL {
            let Some(raw) = update.levels.get(supply) else {
                continue;
            };
            let Some(value) = sanitize(level_field(supply), raw, LEVEL_RANGE, &mut applied) else {
                continue;
            };
            let armed = self
                .levels
                .get(supply)
                .is_none_or(|prev| prev >= thresholds.low_supply);
            if armed && value < thresholds.low_supply {
                applied
                    .crossings
                    .push(Crossing::new(supply.low_alert(), Some(value)));
            }
            self.levels.set(supply, Some(value));
        }

        if let Some(at) = update.at {
            self.last_update = Some(at);
        }

        applied
    }

    /// Whether `supply` is currently below the low threshold.
    #[must_use]
    pub fn is_low(&self, supply: Supply, thresholds: &Thresholds) -> bool {
        self.levels
            .get(supply)
            .is_some_and(|level| level < thresholds.low_supply)
    }

    #[must_use]
    pub fn has_low_supplies(&self, thresholds: &Thresholds) -> bool {
        Supply::ALL
            .into_iter()
            .any(|supply| self.is_low(supply, thresholds))
    }

    /// Whether any brew-relevant supply (water, milk, beans) is critically low.
    #[must_use]
    pub fn is_critically_low(&self, thresholds: &Thresholds) -> bool {
        [Supply::Water, Supply::Milk, Supply::Beans]
            .into_iter()
            .filter_map(|supply| self.levels.get(supply))
            .any(|level| level < thresholds.critical_supply)
    }

    /// Active, powered on and not critically low.
    #[must_use]
    pub fn is_operational(&self, thresholds: &Thresholds) -> bool {
        self.active && self.status == DeviceStatus::On && !self.is_critically_low(thresholds)
    }
}

fn level_field(supply: Supply) -> &'static str {
    match supply {
        Supply::Water => "waterLevel",
        Supply::Milk => "milkLevel",
        Supply::Beans => "beansLevel",
        Supply::Sugar => "sugarLevel",
    }
}

fn sanitize(
    field: &'static str,
    raw: f64,
    (min, max): (f64, f64),
    applied: &mut Applied,
) -> Option<f64> {
    if !raw.is_finite() {
        applied.rejected.push(field);
        return None;
    }
    let stored = raw.clamp(min, max);
    if (stored - raw).abs() > f64::EPSILON {
        applied.clamped.push(ClampedField {
            field,
            received: raw,
            stored,
        });
    }
    Some(stored)
}
