//! Brew commands, recipes and resource consumption.
//!
//! Consumption is a pure function of a [`BrewCommand`]: base amounts come
//! from the recipe table, water and milk scale with the size multiplier,
//! beans with the strength multiplier, and a positive milk ratio scales milk
//! once more. Absolute amounts are then expressed as a percentage of the
//! tank or hopper [`Capacities`].

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::{Levels, StateUpdate, Supply};
use crate::error::ValidationError;
use crate::id::DeviceId;

/// Closed set of drinks a device can brew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrewType {
    Espresso,
    Americano,
    Latte,
    Cappuccino,
    Macchiato,
    Mocha,
    BlackCoffee,
    Custom,
}

/// Base amounts for one unit of a drink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recipe {
    pub water_ml: f64,
    pub milk_ml: f64,
    pub beans_g: f64,
}

impl BrewType {
    pub const ALL: [BrewType; 8] = [
        Self::Espresso,
        Self::Americano,
        Self::Latte,
        Self::Cappuccino,
        Self::Macchiato,
        Self::Mocha,
        Self::BlackCoffee,
        Self::Custom,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Espresso => "ESPRESSO",
            Self::Americano => "AMERICANO",
            Self::Latte => "LATTE",
            Self::Cappuccino => "CAPPUCCINO",
            Self::Macchiato => "MACCHIATO",
            Self::Mocha => "MOCHA",
            Self::BlackCoffee => "BLACK_COFFEE",
            Self::Custom => "CUSTOM",
        }
    }

    #[must_use]
    pub fn recipe(self) -> Recipe {
        let (water_ml, milk_ml, beans_g) = match self {
            Self::Espresso => (30.0, 0.0, 8.0),
            Self::Americano => (120.0, 0.0, 8.0),
            Self::Latte => (60.0, 150.0, 8.0),
            Self::Cappuccino => (60.0, 100.0, 8.0),
            Self::Macchiato => (30.0, 50.0, 8.0),
            Self::Mocha => (60.0, 120.0, 10.0),
            Self::BlackCoffee | Self::Custom => (50.0, 0.0, 10.0),
        };
        Recipe {
            water_ml,
            milk_ml,
            beans_g,
        }
    }

    /// Lenient decoding used for telemetry.
    ///
    /// `"None"` and blank names mean "nothing brewing"; names outside the
    /// closed set are reported as [`BrewType::Custom`].
    #[must_use]
    pub fn from_telemetry(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return None;
        }
        Some(trimmed.parse().unwrap_or(Self::Custom))
    }
}

impl fmt::Display for BrewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrewType {
    type Err = ValidationError;

    /// Strict parsing used for commands. Accepts `"black coffee"` and
    /// `"Black_Coffee"` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace([' ', '-'], "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|brew| brew.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownBrewType(s.to_string()))
    }
}

/// Fixed tank and hopper sizes used to express amounts as percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacities {
    pub water_ml: f64,
    pub milk_ml: f64,
    pub beans_g: f64,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            water_ml: 1000.0,
            milk_ml: 1000.0,
            beans_g: 500.0,
        }
    }
}

const SIZE_RANGE: RangeInclusive<f64> = 0.5..=3.0;
const STRENGTH_RANGE: RangeInclusive<f64> = 0.0..=2.0;
const MILK_RATIO_RANGE: RangeInclusive<f64> = 0.0..=1.0;
const TEMPERATURE_RANGE: RangeInclusive<f64> = 60.0..=95.0;

/// A request to brew one unit of a drink on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrewCommand {
    pub device_id: DeviceId,
    pub brew_type: BrewType,
    pub size: f64,
    pub strength: f64,
    pub milk_ratio: f64,
    pub temperature: Option<f64>,
}

impl BrewCommand {
    /// A command with default multipliers.
    #[must_use]
    pub fn new(device_id: DeviceId, brew_type: BrewType) -> Self {
        Self {
            device_id,
            brew_type,
            size: 1.0,
            strength: 1.0,
            milk_ratio: 0.0,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    #[must_use]
    pub fn with_milk_ratio(mut self, milk_ratio: f64) -> Self {
        self.milk_ratio = milk_ratio;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Check every numeric field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] for the first field outside
    /// its range. NaN is always out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("size", self.size, &SIZE_RANGE)?;
        check_range("strength", self.strength, &STRENGTH_RANGE)?;
        check_range("milkRatio", self.milk_ratio, &MILK_RATIO_RANGE)?;
        if let Some(temperature) = self.temperature {
            check_range("temperature", temperature, &TEMPERATURE_RANGE)?;
        }
        Ok(())
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<(), ValidationError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Percentage-of-capacity deltas required by one brew.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceConsumption {
    pub water_pct: f64,
    pub milk_pct: f64,
    pub beans_pct: f64,
}

/// A supply that cannot cover the requested amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortfall {
    pub supply: Supply,
    pub required: f64,
    pub available: f64,
}

impl ResourceConsumption {
    #[must_use]
    pub fn for_command(command: &BrewCommand, capacities: &Capacities) -> Self {
        let recipe = command.brew_type.recipe();
        let water = recipe.water_ml * command.size;
        let mut milk = recipe.milk_ml * command.size;
        if command.milk_ratio > 0.0 {
            milk *= command.milk_ratio;
        }
        let beans = recipe.beans_g * command.strength;

        Self {
            water_pct: water / capacities.water_ml * 100.0,
            milk_pct: milk / capacities.milk_ml * 100.0,
            beans_pct: beans / capacities.beans_g * 100.0,
        }
    }

    fn required(&self) -> [(Supply, f64); 3] {
        [
            (Supply::Water, self.water_pct),
            (Supply::Milk, self.milk_pct),
            (Supply::Beans, self.beans_pct),
        ]
    }

    /// Compute the deduction against `levels`, all or nothing.
    ///
    /// Supplies that are not required are left untouched; an unreported
    /// level counts as empty.
    ///
    /// # Errors
    ///
    /// Returns the first [`Shortfall`] when any requirement exceeds the
    /// current level.
    pub fn deduct_from(&self, levels: &Levels) -> Result<StateUpdate, Shortfall> {
        let mut next = Levels::default();
        for (supply, required) in self.required() {
            if required <= 0.0 {
                continue;
            }
            let available = levels.get(supply).unwrap_or(0.0);
            if required > available {
                return Err(Shortfall {
                    supply,
                    required,
                    available,
                });
            }
            next.set(supply, Some(available - required));
        }
        Ok(StateUpdate {
            levels: next,
            ..StateUpdate::default()
        })
    }
}

/// Why a brew was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrewFailure {
    InvalidCommand,
    NotOperational,
    InsufficientSupply,
}

/// Outcome of a brew command. Refusals are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrewResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BrewFailure>,
}

impl BrewResult {
    #[must_use]
    pub fn brewed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            failure: None,
        }
    }

    #[must_use]
    pub fn refused(failure: BrewFailure, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            failure: Some(failure),
        }
    }
}
