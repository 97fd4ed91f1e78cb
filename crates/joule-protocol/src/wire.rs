//! Wire-format primitives.
//!
//! Every field on the wire is a varint tag `(field_number << 3) | wire_type`
//! followed by a payload whose size is determined by the wire type:
//!
//! ```text
//! +-----------------+------------------------------------------+
//! | tag (varint)    | payload                                  |
//! +-----------------+------------------------------------------+
//!   wire type 0       varint
//!   wire type 1       8 bytes little-endian
//!   wire type 2       varint length + bytes
//!   wire type 5       4 bytes little-endian
//! ```

use bytes::BufMut;

use crate::constants::*;
use crate::error::ProtocolError;

// ============================================================================
// Encoding
// ============================================================================

/// Append an unsigned varint.
pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value > 0x7F {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Append a field tag.
pub fn encode_tag(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    encode_varint(buf, (u64::from(field) << 3) | u64::from(wire_type));
}

/// Append a varint field (tag + value).
pub fn put_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    encode_tag(buf, field, WIRETYPE_VARINT);
    encode_varint(buf, value);
}

/// Append a float field (tag + 4-byte LE IEEE 754).
pub fn put_float_field(buf: &mut Vec<u8>, field: u32, value: f32) {
    encode_tag(buf, field, WIRETYPE_FIXED32);
    buf.put_f32_le(value);
}

/// Append a fixed32 field (tag + 4-byte LE unsigned).
pub fn put_fixed32_field(buf: &mut Vec<u8>, field: u32, value: u32) {
    encode_tag(buf, field, WIRETYPE_FIXED32);
    buf.put_u32_le(value);
}

/// Append a length-delimited field (tag + length + bytes).
pub fn put_bytes_field(buf: &mut Vec<u8>, field: u32, value: &[u8]) {
    encode_tag(buf, field, WIRETYPE_LENGTH_DELIMITED);
    encode_varint(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a varint at `offset`. Returns `(value, new_offset)`.
pub fn decode_varint(data: &[u8], offset: usize) -> Result<(u64, usize), ProtocolError> {
    let start = offset;
    let mut result: u64 = 0;
    let mut pos = offset;

    for i in 0..MAX_VARINT_LEN {
        let byte = *data
            .get(pos)
            .ok_or(ProtocolError::TruncatedVarint { offset: start })?;
        pos += 1;
        result |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((result, pos));
        }
    }

    Err(ProtocolError::VarintTooLong { offset: start })
}

/// Payload of a single decoded field, borrowing from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// Wire type 0.
    Varint(u64),
    /// Wire type 1.
    Fixed64([u8; 8]),
    /// Wire type 2.
    Bytes(&'a [u8]),
    /// Wire type 5.
    Fixed32([u8; 4]),
}

impl<'a> FieldValue<'a> {
    /// Interpret as a uint32. Varints keep their low 32 bits; fixed32 is
    /// read little-endian.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::Varint(v) => Some(*v as u32),
            FieldValue::Fixed32(b) => Some(u32::from_le_bytes(*b)),
            _ => None,
        }
    }

    /// Interpret as a float32. Only fixed32 payloads qualify.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FieldValue::Fixed32(b) => Some(f32::from_le_bytes(*b)),
            _ => None,
        }
    }

    /// Interpret as a bool varint.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Varint(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Interpret as a length-delimited payload.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Number of payload bytes (excluding tag and length prefix).
    pub fn payload_len(&self) -> usize {
        match self {
            FieldValue::Varint(_) => 0,
            FieldValue::Fixed64(_) => 8,
            FieldValue::Bytes(b) => b.len(),
            FieldValue::Fixed32(_) => 4,
        }
    }
}

/// A decoded `(field_number, payload)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Field number from the tag.
    pub number: u32,
    /// Field payload.
    pub value: FieldValue<'a>,
}

/// Iterator over the fields of a message body.
///
/// Yields `Err` once on the first malformed field and then stops.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> FieldReader<'a> {
    /// Create a reader over a message body.
    pub fn new(data: &'a [u8]) -> Self {
        FieldReader {
            data,
            offset: 0,
            failed: false,
        }
    }

    /// Current byte offset into the body.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, field: u32, len: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.data.len() - self.offset;
        if len > remaining {
            return Err(ProtocolError::TruncatedField {
                field,
                expected: len,
                actual: remaining,
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_field(&mut self) -> Result<Field<'a>, ProtocolError> {
        let tag_offset = self.offset;
        let (tag, offset) = decode_varint(self.data, self.offset)?;
        self.offset = offset;

        let wire_type = (tag & 0x07) as u8;
        let number = u32::try_from(tag >> 3)
            .ok()
            .filter(|n| *n != 0)
            .ok_or(ProtocolError::InvalidFieldNumber { offset: tag_offset })?;

        let value = match wire_type {
            WIRETYPE_VARINT => {
                let (v, offset) = decode_varint(self.data, self.offset)?;
                self.offset = offset;
                FieldValue::Varint(v)
            }
            WIRETYPE_FIXED64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(number, 8)?);
                FieldValue::Fixed64(raw)
            }
            WIRETYPE_LENGTH_DELIMITED => {
                let (len, offset) = decode_varint(self.data, self.offset)?;
                self.offset = offset;
                let len = usize::try_from(len).unwrap_or(usize::MAX);
                FieldValue::Bytes(self.take(number, len)?)
            }
            WIRETYPE_FIXED32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(self.take(number, 4)?);
                FieldValue::Fixed32(raw)
            }
            other => {
                return Err(ProtocolError::UnsupportedWireType {
                    field: number,
                    wire_type: other,
                })
            }
        };

        Ok(Field { number, value })
    }
}

impl<'a> Iterator for FieldReader<'a> {
    type Item = Result<Field<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let result = self.read_field();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Parse a whole message body into fields, failing on the first malformed one.
pub fn decode_fields(data: &[u8]) -> Result<Vec<Field<'_>>, ProtocolError> {
    FieldReader::new(data).collect()
}
