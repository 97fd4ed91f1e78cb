//! Temperature units and setting bounds.
//!
//! Everything inside the coordinator and on the wire is Celsius and seconds;
//! the display unit only matters at the boundary with the user.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownUnit;

/// Unit a user sees temperatures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayUnit {
    /// Degrees Fahrenheit.
    #[default]
    #[serde(rename = "°F", alias = "F", alias = "fahrenheit")]
    Fahrenheit,
    /// Degrees Celsius.
    #[serde(rename = "°C", alias = "C", alias = "celsius")]
    Celsius,
}

impl DisplayUnit {
    /// Unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            DisplayUnit::Fahrenheit => "°F",
            DisplayUnit::Celsius => "°C",
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for DisplayUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('°').to_ascii_lowercase();
        match normalized.as_str() {
            "f" | "fahrenheit" => Ok(DisplayUnit::Fahrenheit),
            "c" | "celsius" => Ok(DisplayUnit::Celsius),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

/// °C to °F.
pub fn celsius_to_fahrenheit(c: f32) -> f32 {
    c * 9.0 / 5.0 + 32.0
}

/// °F to °C.
pub fn fahrenheit_to_celsius(f: f32) -> f32 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert a value shown in `unit` to Celsius.
pub fn display_to_canonical(value: f32, unit: DisplayUnit) -> f32 {
    match unit {
        DisplayUnit::Celsius => value,
        DisplayUnit::Fahrenheit => fahrenheit_to_celsius(value),
    }
}

/// Convert a Celsius value for display in `unit`.
pub fn canonical_to_display(value_c: f32, unit: DisplayUnit) -> f32 {
    match unit {
        DisplayUnit::Celsius => value_c,
        DisplayUnit::Fahrenheit => celsius_to_fahrenheit(value_c),
    }
}

// ============================================================================
// Bounds
// ============================================================================

/// Allowed target temperature range in one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureBounds {
    /// Lowest allowed value.
    pub min: f32,
    /// Highest allowed value.
    pub max: f32,
    /// Granularity offered to users.
    pub step: f32,
}

/// Target temperature bounds in °C.
pub const CELSIUS_BOUNDS: TemperatureBounds = TemperatureBounds {
    min: 0.0,
    max: 100.0,
    step: 0.5,
};

/// Target temperature bounds in °F.
pub const FAHRENHEIT_BOUNDS: TemperatureBounds = TemperatureBounds {
    min: 32.0,
    max: 212.0,
    step: 1.0,
};

/// Longest cook time (24 hours). 0 means no limit.
pub const MAX_DURATION_SECONDS: u32 = 24 * 60 * 60;

impl TemperatureBounds {
    /// Bounds for `unit`.
    pub fn for_unit(unit: DisplayUnit) -> Self {
        match unit {
            DisplayUnit::Celsius => CELSIUS_BOUNDS,
            DisplayUnit::Fahrenheit => FAHRENHEIT_BOUNDS,
        }
    }

    /// Whether `value` is finite and within range.
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Round `value` to the nearest step and clamp it into range.
    pub fn snap(&self, value: f32) -> f32 {
        let snapped = (value / self.step).round() * self.step;
        snapped.clamp(self.min, self.max)
    }
}
