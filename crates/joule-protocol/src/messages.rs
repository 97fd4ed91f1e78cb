//! Stream messages exchanged with the circulator.
//!
//! Every frame is a `StreamMessage` envelope: a small header followed by
//! exactly one content field (a protobuf oneof). Only the content kinds
//! needed to start/stop a cook and read live data are modelled; anything
//! else decodes to [`WireMessage::Unknown`].

use tracing::debug;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::*;
use crate::wire::*;

// ============================================================================
// Content Messages
// ============================================================================

/// Start a cook program (`StartProgramRequest` wrapping a `CirculatorProgram`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartOperationRequest {
    /// Target bath temperature in °C.
    pub set_point_c: f32,
    /// Cook time in seconds. 0 means unlimited.
    pub duration_s: u32,
    /// Program type.
    pub mode: ProgramType,
}

impl StartOperationRequest {
    /// A manual cook at `set_point_c` for `duration_s` seconds.
    pub fn manual(set_point_c: f32, duration_s: u32) -> Self {
        StartOperationRequest {
            set_point_c,
            duration_s,
            mode: ProgramType::Manual,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut program = Vec::with_capacity(16);
        put_float_field(&mut program, PROGRAM_FIELD_SET_POINT, self.set_point_c);
        if self.duration_s > 0 {
            put_varint_field(&mut program, PROGRAM_FIELD_COOK_TIME, u64::from(self.duration_s));
        }
        if self.mode != ProgramType::Manual {
            put_varint_field(
                &mut program,
                PROGRAM_FIELD_PROGRAM_TYPE,
                u64::from(u32::from(self.mode)),
            );
        }

        let mut body = Vec::with_capacity(program.len() + 2);
        put_bytes_field(&mut body, PROGRAM_FIELD_PROGRAM, &program);
        body
    }

    fn decode_body(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut request = StartOperationRequest::manual(0.0, 0);
        for field in FieldReader::new(data) {
            let field = field?;
            if field.number != PROGRAM_FIELD_PROGRAM {
                continue;
            }
            if let Some(program) = field.value.as_bytes() {
                request = Self::decode_program(program)?;
            }
        }
        Ok(request)
    }

    fn decode_program(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut request = StartOperationRequest::manual(0.0, 0);
        for field in FieldReader::new(data) {
            let field = field?;
            match field.number {
                PROGRAM_FIELD_SET_POINT => {
                    if let Some(v) = field.value.as_f32() {
                        request.set_point_c = v;
                    }
                }
                PROGRAM_FIELD_COOK_TIME => {
                    if let Some(v) = field.value.as_u32() {
                        request.duration_s = v;
                    }
                }
                PROGRAM_FIELD_PROGRAM_TYPE => {
                    if let Some(v) = field.value.as_u32() {
                        request.mode = ProgramType::from(v);
                    }
                }
                _ => {}
            }
        }
        Ok(request)
    }
}

/// Stop the running program. Has no fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopRequest;

/// Ask the circulator to start streaming data points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginTelemetryRequest {
    /// Feed identifier echoed back in each data point.
    pub feed_id: u32,
}

impl Default for BeginTelemetryRequest {
    fn default() -> Self {
        BeginTelemetryRequest {
            feed_id: DEFAULT_FEED_ID,
        }
    }
}

impl BeginTelemetryRequest {
    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(6);
        put_varint_field(&mut body, LIVE_FEED_FIELD_FEED_ID, u64::from(self.feed_id));
        body
    }

    fn decode_body(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut request = BeginTelemetryRequest { feed_id: 0 };
        for field in FieldReader::new(data) {
            let field = field?;
            if field.number == LIVE_FEED_FIELD_FEED_ID {
                if let Some(v) = field.value.as_u32() {
                    request.feed_id = v;
                }
            }
        }
        Ok(request)
    }
}

/// A live reading from the circulator (`CirculatorDataPoint`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryDataPoint {
    /// Feed identifier from the originating request.
    pub feed_id: u32,
    /// Monotonic sequence number within the feed.
    pub sequence_number: u32,
    /// Device timestamp.
    pub timestamp: u32,
    /// Error state.
    pub error_state: ErrorState,
    /// Bath temperature in °C.
    pub bath_temp_c: f32,
    /// Current program step.
    pub step: ProgramStep,
    /// Seconds left in the cook.
    pub time_remaining_s: u32,
}

impl TelemetryDataPoint {
    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(32);
        put_varint_field(&mut body, DATA_POINT_FIELD_FEED_ID, u64::from(self.feed_id));
        put_varint_field(
            &mut body,
            DATA_POINT_FIELD_SEQUENCE_NUMBER,
            u64::from(self.sequence_number),
        );
        put_varint_field(&mut body, DATA_POINT_FIELD_TIMESTAMP, u64::from(self.timestamp));
        put_varint_field(
            &mut body,
            DATA_POINT_FIELD_ERROR_STATE,
            u64::from(u32::from(self.error_state)),
        );
        put_float_field(&mut body, DATA_POINT_FIELD_BATH_TEMP, self.bath_temp_c);
        put_varint_field(
            &mut body,
            DATA_POINT_FIELD_PROGRAM_STEP,
            u64::from(u32::from(self.step)),
        );
        put_varint_field(
            &mut body,
            DATA_POINT_FIELD_TIME_REMAINING,
            u64::from(self.time_remaining_s),
        );
        body
    }

    fn decode_body(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut point = TelemetryDataPoint::default();
        for field in FieldReader::new(data) {
            let field = field?;
            let value = field.value;
            match field.number {
                DATA_POINT_FIELD_FEED_ID => {
                    if let Some(v) = value.as_u32() {
                        point.feed_id = v;
                    }
                }
                DATA_POINT_FIELD_SEQUENCE_NUMBER => {
                    if let Some(v) = value.as_u32() {
                        point.sequence_number = v;
                    }
                }
                DATA_POINT_FIELD_TIMESTAMP => {
                    if let Some(v) = value.as_u32() {
                        point.timestamp = v;
                    }
                }
                DATA_POINT_FIELD_ERROR_STATE => {
                    if let Some(v) = value.as_u32() {
                        point.error_state = ErrorState::from(v);
                    }
                }
                DATA_POINT_FIELD_BATH_TEMP => {
                    if let Some(v) = value.as_f32() {
                        point.bath_temp_c = v;
                    }
                }
                DATA_POINT_FIELD_PROGRAM_STEP => {
                    if let Some(v) = value.as_u32() {
                        point.step = ProgramStep::from(v);
                    }
                }
                DATA_POINT_FIELD_TIME_REMAINING => {
                    if let Some(v) = value.as_u32() {
                        point.time_remaining_s = v;
                    }
                }
                _ => {}
            }
        }
        Ok(point)
    }
}

/// Content of a stream message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireMessage {
    /// Start a cook (field 50).
    StartOperation(StartOperationRequest),
    /// Stop the cook (field 60).
    Stop(StopRequest),
    /// Begin the live feed (field 70).
    BeginTelemetry(BeginTelemetryRequest),
    /// Live data point (field 90).
    Telemetry(TelemetryDataPoint),
    /// Content this crate does not model, or an undecodable frame.
    Unknown {
        /// Content field number, or 0 when there was none.
        tag: u32,
        /// Length of the unmodelled payload (or of the whole frame when
        /// it could not be parsed).
        raw_len: usize,
    },
}

impl WireMessage {
    /// Oneof field number for this content, if it has one.
    pub fn field_number(&self) -> Option<u32> {
        match self {
            WireMessage::StartOperation(_) => Some(FIELD_START_PROGRAM_REQUEST),
            WireMessage::Stop(_) => Some(FIELD_STOP_CIRCULATOR_REQUEST),
            WireMessage::BeginTelemetry(_) => Some(FIELD_BEGIN_LIVE_FEED_REQUEST),
            WireMessage::Telemetry(_) => Some(FIELD_CIRCULATOR_DATA_POINT),
            WireMessage::Unknown { tag, .. } => {
                if *tag >= FIRST_CONTENT_FIELD && !is_modelled_content(*tag) {
                    Some(*tag)
                } else {
                    None
                }
            }
        }
    }

    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::StartOperation(_) => "StartOperationRequest",
            WireMessage::Stop(_) => "StopRequest",
            WireMessage::BeginTelemetry(_) => "BeginTelemetryRequest",
            WireMessage::Telemetry(_) => "TelemetryDataPoint",
            WireMessage::Unknown { .. } => "Unknown",
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            WireMessage::StartOperation(req) => req.encode_body(),
            WireMessage::Stop(_) => Vec::new(),
            WireMessage::BeginTelemetry(req) => req.encode_body(),
            WireMessage::Telemetry(point) => point.encode_body(),
            WireMessage::Unknown { raw_len, .. } => vec![0u8; *raw_len],
        }
    }

    fn decode_content(field: u32, data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(match field {
            FIELD_START_PROGRAM_REQUEST => {
                WireMessage::StartOperation(StartOperationRequest::decode_body(data)?)
            }
            FIELD_STOP_CIRCULATOR_REQUEST => WireMessage::Stop(StopRequest),
            FIELD_BEGIN_LIVE_FEED_REQUEST => {
                WireMessage::BeginTelemetry(BeginTelemetryRequest::decode_body(data)?)
            }
            FIELD_CIRCULATOR_DATA_POINT => {
                WireMessage::Telemetry(TelemetryDataPoint::decode_body(data)?)
            }
            other => WireMessage::Unknown {
                tag: other,
                raw_len: data.len(),
            },
        })
    }
}

fn is_modelled_content(field: u32) -> bool {
    matches!(
        field,
        FIELD_START_PROGRAM_REQUEST
            | FIELD_STOP_CIRCULATOR_REQUEST
            | FIELD_BEGIN_LIVE_FEED_REQUEST
            | FIELD_CIRCULATOR_DATA_POINT
    )
}

// ============================================================================
// Envelope
// ============================================================================

/// A `StreamMessage`: header fields plus one content message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    /// Request/reply correlation handle.
    pub handle: u32,
    /// End-of-stream flag.
    pub end: bool,
    /// Sender address.
    pub sender: DeviceAddress,
    /// Recipient address.
    pub recipient: DeviceAddress,
    /// Content.
    pub message: WireMessage,
}

impl Envelope {
    /// Wrap a message with a default (zeroed) header.
    pub fn new(message: WireMessage) -> Self {
        Envelope {
            handle: 0,
            end: false,
            sender: DeviceAddress::default(),
            recipient: DeviceAddress::default(),
            message,
        }
    }

    /// Set the sender and recipient addresses.
    pub fn with_route(mut self, sender: DeviceAddress, recipient: DeviceAddress) -> Self {
        self.sender = sender;
        self.recipient = recipient;
        self
    }

    /// Serialize to wire bytes.
    ///
    /// The handle and both addresses are always written; `end` only when set.
    /// `Unknown` content is written back as a zero-filled payload under its
    /// tag when the tag is a content field number, and omitted otherwise.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        put_fixed32_field(&mut buf, FIELD_HANDLE, self.handle);
        if self.end {
            put_varint_field(&mut buf, FIELD_END, 1);
        }
        put_bytes_field(&mut buf, FIELD_SENDER_ADDRESS, self.sender.as_bytes());
        put_bytes_field(&mut buf, FIELD_RECIPIENT_ADDRESS, self.recipient.as_bytes());

        if let Some(field) = self.message.field_number() {
            put_bytes_field(&mut buf, field, &self.message.encode_body());
        }
        buf
    }

    /// Parse wire bytes, reporting the first structural error.
    pub fn try_decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut envelope = Envelope::new(WireMessage::Unknown { tag: 0, raw_len: 0 });

        for field in FieldReader::new(data) {
            let field = field?;
            let value = field.value;
            match field.number {
                FIELD_HANDLE => {
                    if let Some(v) = value.as_u32() {
                        envelope.handle = v;
                    }
                }
                FIELD_END => {
                    if let Some(v) = value.as_bool() {
                        envelope.end = v;
                    }
                }
                FIELD_SENDER_ADDRESS => {
                    if let Some(addr) = value.as_bytes().and_then(DeviceAddress::from_slice) {
                        envelope.sender = addr;
                    }
                }
                FIELD_RECIPIENT_ADDRESS => {
                    if let Some(addr) = value.as_bytes().and_then(DeviceAddress::from_slice) {
                        envelope.recipient = addr;
                    }
                }
                n if is_modelled_content(n) => {
                    // Wrong wire type for a known content field is skipped
                    if let Some(body) = value.as_bytes() {
                        envelope.message = WireMessage::decode_content(n, body)?;
                    }
                }
                n if n >= FIRST_CONTENT_FIELD => {
                    envelope.message = WireMessage::Unknown {
                        tag: n,
                        raw_len: value.payload_len(),
                    };
                }
                _ => {}
            }
        }

        Ok(envelope)
    }

    /// Parse wire bytes. Never fails: malformed input yields an envelope
    /// with default header and `Unknown { tag: 0, raw_len: data.len() }`.
    pub fn decode(data: &[u8]) -> Self {
        match Self::try_decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(
                    "Failed to decode stream message ({} bytes): {} [{}]",
                    data.len(),
                    e,
                    hex_preview(data)
                );
                Envelope::new(WireMessage::Unknown {
                    tag: 0,
                    raw_len: data.len(),
                })
            }
        }
    }
}

fn hex_preview(data: &[u8]) -> String {
    const MAX: usize = 32;
    let mut out: String = data
        .iter()
        .take(MAX)
        .map(|b| format!("{:02x}", b))
        .collect();
    if data.len() > MAX {
        out.push_str("..");
    }
    out
}

// ============================================================================
// High-level API
// ============================================================================

/// Encode a message in a default envelope.
pub fn encode(message: &WireMessage) -> Vec<u8> {
    Envelope::new(*message).encode()
}

/// Decode the content of a frame. Never fails.
pub fn decode(data: &[u8]) -> WireMessage {
    Envelope::decode(data).message
}

/// Build a manual start request for `set_point_c` °C lasting `duration_s` seconds.
pub fn start_message(
    set_point_c: f32,
    duration_s: u32,
    sender: DeviceAddress,
    recipient: DeviceAddress,
) -> Vec<u8> {
    Envelope::new(WireMessage::StartOperation(StartOperationRequest::manual(
        set_point_c,
        duration_s,
    )))
    .with_route(sender, recipient)
    .encode()
}

/// Build a stop request.
pub fn stop_message(sender: DeviceAddress, recipient: DeviceAddress) -> Vec<u8> {
    Envelope::new(WireMessage::Stop(StopRequest))
        .with_route(sender, recipient)
        .encode()
}

/// Build a live-feed request.
pub fn live_feed_message(feed_id: u32, sender: DeviceAddress, recipient: DeviceAddress) -> Vec<u8> {
    Envelope::new(WireMessage::BeginTelemetry(BeginTelemetryRequest { feed_id }))
        .with_route(sender, recipient)
        .encode()
}

/// Extract a data point from a notification, if it carries one.
pub fn parse_notification(data: &[u8]) -> Option<TelemetryDataPoint> {
    match decode(data) {
        WireMessage::Telemetry(point) => Some(point),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn data_point_frame(bath_temp_c: f32, step: u32, time_remaining_s: u32) -> Vec<u8> {
        let mut body = Vec::new();
        put_float_field(&mut body, DATA_POINT_FIELD_BATH_TEMP, bath_temp_c);
        put_varint_field(&mut body, DATA_POINT_FIELD_PROGRAM_STEP, u64::from(step));
        put_varint_field(&mut body, DATA_POINT_FIELD_TIME_REMAINING, u64::from(time_remaining_s));

        let mut frame = Vec::new();
        put_fixed32_field(&mut frame, FIELD_HANDLE, 0);
        put_bytes_field(&mut frame, FIELD_CIRCULATOR_DATA_POINT, &body);
        frame
    }

    #[test]
    fn test_start_request_layout() {
        let frame = start_message(60.0, 3600, DeviceAddress::default(), DeviceAddress::default());
        let fields = decode_fields(&frame).unwrap();

        assert_eq!(fields[0].number, FIELD_HANDLE);
        assert_eq!(fields[0].value, FieldValue::Fixed32([0; 4]));
        assert_eq!(fields[1].number, FIELD_SENDER_ADDRESS);
        assert_eq!(fields[2].number, FIELD_RECIPIENT_ADDRESS);
        assert_eq!(fields[3].number, FIELD_START_PROGRAM_REQUEST);

        let outer = decode_fields(fields[3].value.as_bytes().unwrap()).unwrap();
        assert_eq!(outer.len(), 1);
        let program = decode_fields(outer[0].value.as_bytes().unwrap()).unwrap();
        assert_eq!(program[0].number, PROGRAM_FIELD_SET_POINT);
        assert_eq!(program[0].value, FieldValue::Fixed32(60.0f32.to_le_bytes()));
        assert_eq!(program[1].number, PROGRAM_FIELD_COOK_TIME);
        assert_eq!(program[1].value, FieldValue::Varint(3600));
        // MANUAL is the default and is not written
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn test_start_request_zero_duration_omitted() {
        let body = StartOperationRequest::manual(55.5, 0).encode_body();
        let outer = decode_fields(&body).unwrap();
        let program = decode_fields(outer[0].value.as_bytes().unwrap()).unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_start_request_automatic_written() {
        let req = StartOperationRequest {
            set_point_c: 70.0,
            duration_s: 0,
            mode: ProgramType::Automatic,
        };
        let body = req.encode_body();
        let outer = decode_fields(&body).unwrap().remove(0);
        let program = decode_fields(outer.value.as_bytes().unwrap()).unwrap();
        assert_eq!(program[1].number, PROGRAM_FIELD_PROGRAM_TYPE);
        assert_eq!(program[1].value, FieldValue::Varint(1));
    }

    #[test]
    fn test_stop_request_layout() {
        let frame = encode(&WireMessage::Stop(StopRequest));
        let fields = decode_fields(&frame).unwrap();
        let last = fields.last().unwrap();
        assert_eq!(last.number, FIELD_STOP_CIRCULATOR_REQUEST);
        assert_eq!(last.value, FieldValue::Bytes(&[]));
    }

    #[test]
    fn test_live_feed_layout() {
        let frame = live_feed_message(1, DeviceAddress::default(), DeviceAddress::default());
        let fields = decode_fields(&frame).unwrap();
        let last = fields.last().unwrap();
        assert_eq!(last.number, FIELD_BEGIN_LIVE_FEED_REQUEST);
        assert_eq!(last.value, FieldValue::Bytes(&[0x08, 0x01]));
    }

    #[test]
    fn test_round_trip_each_kind() {
        let messages = [
            WireMessage::StartOperation(StartOperationRequest::manual(62.5, 5400)),
            WireMessage::Stop(StopRequest),
            WireMessage::BeginTelemetry(BeginTelemetryRequest { feed_id: 7 }),
            WireMessage::Telemetry(TelemetryDataPoint {
                feed_id: 1,
                sequence_number: 99,
                timestamp: 1_700_000_000,
                error_state: ErrorState::SoftError,
                bath_temp_c: 58.25,
                step: ProgramStep::Cook,
                time_remaining_s: 1800,
            }),
        ];
        for message in messages {
            assert_eq!(decode(&encode(&message)), message);
        }
    }

    #[test]
    fn test_envelope_header_round_trip() {
        let sender: DeviceAddress = "01:02:03:04:05:06".parse().unwrap();
        let recipient: DeviceAddress = "C8:DF:84:2A:0B:1E".parse().unwrap();
        let mut envelope = Envelope::new(WireMessage::Stop(StopRequest)).with_route(sender, recipient);
        envelope.handle = 0xDEAD_BEEF;
        envelope.end = true;

        assert_eq!(Envelope::decode(&envelope.encode()), envelope);
    }

    #[test]
    fn test_decode_data_point() {
        let point = parse_notification(&data_point_frame(65.0, 3, 3600)).unwrap();
        assert_relative_eq!(point.bath_temp_c, 65.0);
        assert_eq!(point.step, ProgramStep::Cook);
        assert_eq!(point.time_remaining_s, 3600);
        assert_eq!(point.error_state, ErrorState::NoError);
    }

    #[test]
    fn test_decode_data_point_unknown_step() {
        let point = parse_notification(&data_point_frame(20.0, 42, 0)).unwrap();
        assert_eq!(point.step, ProgramStep::Unknown(42));
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let mut body = Vec::new();
        put_varint_field(&mut body, 99, 12345);
        put_bytes_field(&mut body, 20, b"ignored");
        put_float_field(&mut body, DATA_POINT_FIELD_BATH_TEMP, 40.0);

        let mut frame = Vec::new();
        put_varint_field(&mut frame, 2, 1);
        put_bytes_field(&mut frame, FIELD_CIRCULATOR_DATA_POINT, &body);

        let point = parse_notification(&frame).unwrap();
        assert_relative_eq!(point.bath_temp_c, 40.0);
    }

    #[test]
    fn test_decode_fixed32_uint_accepted() {
        let mut body = Vec::new();
        put_fixed32_field(&mut body, DATA_POINT_FIELD_TIME_REMAINING, 600);
        let mut frame = Vec::new();
        put_bytes_field(&mut frame, FIELD_CIRCULATOR_DATA_POINT, &body);

        assert_eq!(parse_notification(&frame).unwrap().time_remaining_s, 600);
    }

    #[test]
    fn test_decode_wrong_wire_type_skipped() {
        let mut body = Vec::new();
        // bath temp as a varint is not a float; ignore it
        put_varint_field(&mut body, DATA_POINT_FIELD_BATH_TEMP, 65);
        let mut frame = Vec::new();
        put_bytes_field(&mut frame, FIELD_CIRCULATOR_DATA_POINT, &body);

        assert_relative_eq!(parse_notification(&frame).unwrap().bath_temp_c, 0.0);

        // data point field as a varint is not a message
        let mut frame = Vec::new();
        put_varint_field(&mut frame, FIELD_CIRCULATOR_DATA_POINT, 1);
        assert_eq!(decode(&frame), WireMessage::Unknown { tag: 0, raw_len: 0 });
    }

    #[test]
    fn test_decode_unmodelled_content() {
        let mut frame = Vec::new();
        put_fixed32_field(&mut frame, FIELD_HANDLE, 5);
        put_bytes_field(&mut frame, 153, &[1, 2, 3]);
        assert_eq!(decode(&frame), WireMessage::Unknown { tag: 153, raw_len: 3 });
        assert!(parse_notification(&frame).is_none());
    }

    #[test]
    fn test_unknown_content_round_trip() {
        let message = WireMessage::Unknown { tag: 153, raw_len: 3 };
        assert_eq!(decode(&encode(&message)), message);

        // No content field to write back
        let message = WireMessage::Unknown { tag: 0, raw_len: 12 };
        assert_eq!(decode(&encode(&message)), WireMessage::Unknown { tag: 0, raw_len: 0 });
    }

    #[test]
    fn test_decode_last_content_wins() {
        let mut frame = data_point_frame(50.0, 1, 0);
        put_bytes_field(&mut frame, FIELD_STOP_CIRCULATOR_REQUEST, &[]);
        assert_eq!(decode(&frame), WireMessage::Stop(StopRequest));
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(&[]), WireMessage::Unknown { tag: 0, raw_len: 0 });
        assert!(parse_notification(&[]).is_none());
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(
            decode(b"\xff\xff\xff"),
            WireMessage::Unknown { tag: 0, raw_len: 3 }
        );
        assert!(Envelope::try_decode(b"\xff\xff\xff").is_err());
    }

    #[test]
    fn test_decode_truncated_by_one_byte() {
        let frame = data_point_frame(65.0, 3, 3600);
        let truncated = &frame[..frame.len() - 1];
        assert_eq!(
            decode(truncated),
            WireMessage::Unknown {
                tag: 0,
                raw_len: truncated.len()
            }
        );
        assert!(parse_notification(truncated).is_none());
    }

    #[test]
    fn test_decode_single_byte() {
        assert_eq!(decode(&[0x08]), WireMessage::Unknown { tag: 0, raw_len: 1 });
    }

    #[test]
    fn test_short_address_ignored() {
        let mut frame = Vec::new();
        put_bytes_field(&mut frame, FIELD_SENDER_ADDRESS, &[1, 2]);
        put_bytes_field(&mut frame, FIELD_STOP_CIRCULATOR_REQUEST, &[]);
        let envelope = Envelope::decode(&frame);
        assert!(envelope.sender.is_zero());
        assert_eq!(envelope.message, WireMessage::Stop(StopRequest));
    }

    #[test]
    fn test_hex_preview() {
        assert_eq!(hex_preview(&[0xAB, 0x01]), "ab01");
        assert!(hex_preview(&[0u8; 40]).ends_with(".."));
    }
}
