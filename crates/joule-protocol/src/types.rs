//! Common types used in the protocol.

use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::error::AddressError;

/// A 6-byte Bluetooth device address carried in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceAddress(pub [u8; ADDRESS_SIZE]);

impl DeviceAddress {
    /// Create a new address from bytes.
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        DeviceAddress(bytes)
    }

    /// Create from a slice. Returns None if slice is wrong length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == ADDRESS_SIZE {
            let mut bytes = [0u8; ADDRESS_SIZE];
            bytes.copy_from_slice(slice);
            Some(DeviceAddress(bytes))
        } else {
            None
        }
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// True for the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }
}

impl AsRef<[u8]> for DeviceAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    /// Parse `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split([':', '-']).collect();
        if octets.len() != ADDRESS_SIZE {
            return Err(AddressError::WrongLength(octets.len()));
        }

        let mut bytes = [0u8; ADDRESS_SIZE];
        for (slot, octet) in bytes.iter_mut().zip(&octets) {
            if octet.len() != 2 {
                return Err(AddressError::InvalidOctet(octet.to_string()));
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| AddressError::InvalidOctet(octet.to_string()))?;
        }
        Ok(DeviceAddress(bytes))
    }
}

/// Implement equality and hashing on the wire value, so `Unknown(k)` for a
/// known `k` is the same value as the named variant, plus `normalized()`.
macro_rules! wire_value_identity {
    ($($name:ident),+) => {$(
        impl $name {
            /// The named variant for a known wire value, `Unknown` otherwise.
            pub fn normalized(self) -> Self {
                Self::from(u32::from(self))
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                u32::from(*self) == u32::from(*other)
            }
        }

        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                u32::from(*self).hash(state);
            }
        }
    )+};
}

wire_value_identity!(ProgramType, ProgramStep, ErrorState);

/// Program type sent with a start request.
#[derive(Debug, Clone, Copy, Default)]
pub enum ProgramType {
    /// Manual cook: hold the set point.
    #[default]
    Manual,
    /// Automatic (guided) cook.
    Automatic,
    /// Unknown type.
    Unknown(u32),
}

impl From<u32> for ProgramType {
    fn from(value: u32) -> Self {
        match value {
            PROGRAM_TYPE_MANUAL => ProgramType::Manual,
            PROGRAM_TYPE_AUTOMATIC => ProgramType::Automatic,
            _ => ProgramType::Unknown(value),
        }
    }
}

impl From<ProgramType> for u32 {
    fn from(value: ProgramType) -> Self {
        match value {
            ProgramType::Manual => PROGRAM_TYPE_MANUAL,
            ProgramType::Automatic => PROGRAM_TYPE_AUTOMATIC,
            ProgramType::Unknown(v) => v,
        }
    }
}

/// Phase of the circulator's current program as reported in data points.
#[derive(Debug, Clone, Copy, Default)]
pub enum ProgramStep {
    /// No program running.
    #[default]
    Stopped,
    /// Heating the bath toward the set point.
    PreHeat,
    /// At temperature, waiting for food.
    WaitForFood,
    /// Cooking.
    Cook,
    /// Finished, waiting for the food to be removed.
    WaitForRemoveFood,
    /// Halted on error.
    Error,
    /// Unknown step.
    Unknown(u32),
}

impl ProgramStep {
    /// Whether this step means the circulator is running a program.
    ///
    /// Returns `None` for unrecognized steps, which carry no information.
    pub fn is_operating(&self) -> Option<bool> {
        match self.normalized() {
            ProgramStep::Stopped | ProgramStep::Error => Some(false),
            ProgramStep::PreHeat
            | ProgramStep::WaitForFood
            | ProgramStep::Cook
            | ProgramStep::WaitForRemoveFood => Some(true),
            ProgramStep::Unknown(_) => None,
        }
    }

    /// Short lowercase name for display.
    pub fn name(&self) -> &'static str {
        match self.normalized() {
            ProgramStep::Stopped => "stopped",
            ProgramStep::PreHeat => "pre-heat",
            ProgramStep::WaitForFood => "wait-for-food",
            ProgramStep::Cook => "cook",
            ProgramStep::WaitForRemoveFood => "wait-for-remove-food",
            ProgramStep::Error => "error",
            ProgramStep::Unknown(_) => "unknown",
        }
    }
}

impl From<u32> for ProgramStep {
    fn from(value: u32) -> Self {
        match value {
            PROGRAM_STEP_STOPPED => ProgramStep::Stopped,
            PROGRAM_STEP_PRE_HEAT => ProgramStep::PreHeat,
            PROGRAM_STEP_WAIT_FOR_FOOD => ProgramStep::WaitForFood,
            PROGRAM_STEP_COOK => ProgramStep::Cook,
            PROGRAM_STEP_WAIT_FOR_REMOVE_FOOD => ProgramStep::WaitForRemoveFood,
            PROGRAM_STEP_ERROR => ProgramStep::Error,
            _ => ProgramStep::Unknown(value),
        }
    }
}

impl From<ProgramStep> for u32 {
    fn from(value: ProgramStep) -> Self {
        match value {
            ProgramStep::Stopped => PROGRAM_STEP_STOPPED,
            ProgramStep::PreHeat => PROGRAM_STEP_PRE_HEAT,
            ProgramStep::WaitForFood => PROGRAM_STEP_WAIT_FOR_FOOD,
            ProgramStep::Cook => PROGRAM_STEP_COOK,
            ProgramStep::WaitForRemoveFood => PROGRAM_STEP_WAIT_FOR_REMOVE_FOOD,
            ProgramStep::Error => PROGRAM_STEP_ERROR,
            ProgramStep::Unknown(v) => v,
        }
    }
}

impl fmt::Display for ProgramStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.normalized() {
            ProgramStep::Unknown(v) => write!(f, "unknown({})", v),
            other => f.write_str(other.name()),
        }
    }
}

/// Error state reported in data points.
#[derive(Debug, Clone, Copy, Default)]
pub enum ErrorState {
    /// No error.
    #[default]
    NoError,
    /// Recoverable error.
    SoftError,
    /// Unrecoverable error.
    HardError,
    /// Unknown state.
    Unknown(u32),
}

impl From<u32> for ErrorState {
    fn from(value: u32) -> Self {
        match value {
            ERROR_STATE_NO_ERROR => ErrorState::NoError,
            ERROR_STATE_SOFT_ERROR => ErrorState::SoftError,
            ERROR_STATE_HARD_ERROR => ErrorState::HardError,
            _ => ErrorState::Unknown(value),
        }
    }
}

impl From<ErrorState> for u32 {
    fn from(value: ErrorState) -> Self {
        match value {
            ErrorState::NoError => ERROR_STATE_NO_ERROR,
            ErrorState::SoftError => ERROR_STATE_SOFT_ERROR,
            ErrorState::HardError => ERROR_STATE_HARD_ERROR,
            ErrorState::Unknown(v) => v,
        }
    }
}
