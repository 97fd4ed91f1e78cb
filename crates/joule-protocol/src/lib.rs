//! Joule Circulator Stream Protocol
//!
//! This crate provides types and utilities for talking to a Joule sous-vide
//! circulator. The device exchanges protobuf-encoded `StreamMessage`s over a
//! single BLE characteristic; this crate implements the subset needed to
//! start and stop a cook and to read live data.
//!
//! # Protocol Overview
//!
//! Each message is an envelope carrying a handle, an end flag, sender and
//! recipient addresses, and exactly one content field:
//!
//! - **StartProgramRequest** (field 50): set point, cook time, program type
//! - **StopCirculatorRequest** (field 60): no fields
//! - **BeginLiveFeedRequest** (field 70): feed id
//! - **CirculatorDataPoint** (field 90): bath temperature, program step,
//!   time remaining and feed bookkeeping
//!
//! Decoding never fails: unmodelled content and malformed frames come back as
//! [`WireMessage::Unknown`].
//!
//! # Example
//!
//! ```rust
//! use joule_protocol::{decode, start_message, DeviceAddress, WireMessage};
//!
//! let frame = start_message(60.0, 3600, DeviceAddress::default(), DeviceAddress::default());
//! match decode(&frame) {
//!     WireMessage::StartOperation(req) => assert_eq!(req.duration_s, 3600),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

mod constants;
mod error;
mod frame;
mod messages;
mod types;
pub mod wire;

pub use constants::*;
pub use error::*;
pub use frame::*;
pub use messages::*;
pub use types::*;
