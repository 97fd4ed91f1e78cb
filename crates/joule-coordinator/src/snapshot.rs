//! Published device state.

use joule_protocol::ProgramStep;
use serde::{Serialize, Serializer};

use crate::units::{canonical_to_display, DisplayUnit};

/// Default target temperature in °C.
pub const DEFAULT_TARGET_C: f32 = 60.0;

/// Everything a consumer can read about the circulator.
///
/// Temperatures are °C and durations seconds; `display_unit` is only a
/// preference for presentation. A snapshot is replaced as a whole on every
/// update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    /// Last reported bath temperature.
    pub current_temperature_c: f32,
    /// Whether a cook is running, as asserted locally or confirmed by the device.
    pub is_operating: bool,
    /// Target temperature for the next or current cook.
    pub target_temperature_c: f32,
    /// Cook time in seconds; 0 means no limit.
    pub duration_seconds: u32,
    /// Unit temperatures are shown in.
    pub display_unit: DisplayUnit,
    /// Last reported time remaining.
    pub time_remaining_seconds: u32,
    /// Last reported program step, if any data point has arrived.
    #[serde(serialize_with = "serialize_step")]
    pub program_step: Option<ProgramStep>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            current_temperature_c: 0.0,
            is_operating: false,
            target_temperature_c: DEFAULT_TARGET_C,
            duration_seconds: 0,
            display_unit: DisplayUnit::default(),
            time_remaining_seconds: 0,
            program_step: None,
        }
    }
}

impl Snapshot {
    /// Bath temperature in the display unit.
    pub fn current_temperature_display(&self) -> f32 {
        canonical_to_display(self.current_temperature_c, self.display_unit)
    }

    /// Target temperature in the display unit.
    pub fn target_temperature_display(&self) -> f32 {
        canonical_to_display(self.target_temperature_c, self.display_unit)
    }
}

fn serialize_step<S: Serializer>(step: &Option<ProgramStep>, s: S) -> Result<S::Ok, S::Error> {
    match step {
        Some(step) => s.serialize_some(step.name()),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_defaults() {
        let snapshot = Snapshot::default();
        assert!(!snapshot.is_operating);
        assert_abs_diff_eq!(snapshot.target_temperature_c, 60.0);
        assert_eq!(snapshot.duration_seconds, 0);
        assert_eq!(snapshot.display_unit, DisplayUnit::Fahrenheit);
        assert_eq!(snapshot.program_step, None);
    }

    #[test]
    fn test_display_conversion() {
        let snapshot = Snapshot {
            current_temperature_c: 100.0,
            ..Snapshot::default()
        };
        assert_abs_diff_eq!(snapshot.current_temperature_display(), 212.0);
        assert_abs_diff_eq!(snapshot.target_temperature_display(), 140.0, epsilon = 1e-4);

        let snapshot = Snapshot {
            display_unit: DisplayUnit::Celsius,
            ..snapshot
        };
        assert_abs_diff_eq!(snapshot.current_temperature_display(), 100.0);
    }

    #[test]
    fn test_serialize() {
        let snapshot = Snapshot {
            program_step: Some(ProgramStep::Cook),
            ..Snapshot::default()
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["program_step"], "cook");
        assert_eq!(json["display_unit"], "°F");
        assert_eq!(json["is_operating"], false);
    }
}
