//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while parsing or framing a wire message.
///
/// Parse errors never escape [`crate::decode`]; they are available through
/// [`crate::Envelope::try_decode`] for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A varint ran past the end of the buffer.
    #[error("truncated varint at offset {offset}")]
    TruncatedVarint {
        /// Offset where the varint started.
        offset: usize,
    },

    /// A varint used more than ten bytes.
    #[error("varint too long at offset {offset}")]
    VarintTooLong {
        /// Offset where the varint started.
        offset: usize,
    },

    /// A field's payload ran past the end of the buffer.
    #[error("truncated field {field}: expected {expected} bytes, got {actual}")]
    TruncatedField {
        /// Field number being read.
        field: u32,
        /// Bytes the field declared.
        expected: usize,
        /// Bytes remaining in the buffer.
        actual: usize,
    },

    /// Wire type is not one of VARINT, FIXED64, LEN or FIXED32.
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType {
        /// Field number carrying the wire type.
        field: u32,
        /// The wire type found.
        wire_type: u8,
    },

    /// Field number zero is reserved.
    #[error("invalid field number 0 at offset {offset}")]
    InvalidFieldNumber {
        /// Offset of the offending tag.
        offset: usize,
    },

    /// Payload does not fit in one bridge frame.
    #[error("frame payload of {len} bytes exceeds {max}")]
    FrameTooLarge {
        /// Payload length.
        len: usize,
        /// Largest payload a frame can carry.
        max: usize,
    },
}

/// Error parsing a textual device address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Address does not have six octets.
    #[error("address must have 6 octets, got {0}")]
    WrongLength(usize),

    /// An octet is not two hex digits.
    #[error("invalid octet '{0}' in address")]
    InvalidOctet(String),
}
