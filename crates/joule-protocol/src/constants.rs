//! Protocol constants
//!
//! Field numbers and wire types for the circulator stream protocol. The
//! numbering follows the reverse-engineered `StreamMessage` schema used by the
//! vendor's mobile app; only the fields this crate models are listed.

// ============================================================================
// Wire Types
// ============================================================================

/// Base-128 varint.
pub const WIRETYPE_VARINT: u8 = 0;
/// 8 bytes, little-endian.
pub const WIRETYPE_FIXED64: u8 = 1;
/// Varint length followed by that many bytes.
pub const WIRETYPE_LENGTH_DELIMITED: u8 = 2;
/// 4 bytes, little-endian.
pub const WIRETYPE_FIXED32: u8 = 5;

/// Longest varint accepted on decode (64 bits / 7 bits per byte).
pub const MAX_VARINT_LEN: usize = 10;

// ============================================================================
// StreamMessage Header Fields
// ============================================================================

/// Request/reply correlation handle (fixed32).
pub const FIELD_HANDLE: u32 = 1;
/// End-of-stream flag (bool varint).
pub const FIELD_END: u32 = 4;
/// Sender address (bytes).
pub const FIELD_SENDER_ADDRESS: u32 = 5;
/// Recipient address (bytes).
pub const FIELD_RECIPIENT_ADDRESS: u32 = 6;

/// Envelope field numbers at or above this value belong to the content oneof.
pub const FIRST_CONTENT_FIELD: u32 = 10;

// ============================================================================
// StreamMessage Content Fields (oneof)
// ============================================================================

/// Start a cook program.
pub const FIELD_START_PROGRAM_REQUEST: u32 = 50;
/// Stop the running program.
pub const FIELD_STOP_CIRCULATOR_REQUEST: u32 = 60;
/// Begin streaming live data points.
pub const FIELD_BEGIN_LIVE_FEED_REQUEST: u32 = 70;
/// A live data point from the circulator.
pub const FIELD_CIRCULATOR_DATA_POINT: u32 = 90;

// ============================================================================
// Nested Message Fields
// ============================================================================

/// StartProgramRequest: embedded CirculatorProgram.
pub const PROGRAM_FIELD_PROGRAM: u32 = 1;

/// CirculatorProgram: set point in °C (float).
pub const PROGRAM_FIELD_SET_POINT: u32 = 1;
/// CirculatorProgram: cook time in seconds (uint32, 0 = unlimited).
pub const PROGRAM_FIELD_COOK_TIME: u32 = 2;
/// CirculatorProgram: program type (enum).
pub const PROGRAM_FIELD_PROGRAM_TYPE: u32 = 5;

/// BeginLiveFeedRequest: feed identifier (uint32).
pub const LIVE_FEED_FIELD_FEED_ID: u32 = 1;

/// CirculatorDataPoint: feed identifier.
pub const DATA_POINT_FIELD_FEED_ID: u32 = 1;
/// CirculatorDataPoint: sequence number.
pub const DATA_POINT_FIELD_SEQUENCE_NUMBER: u32 = 2;
/// CirculatorDataPoint: device timestamp.
pub const DATA_POINT_FIELD_TIMESTAMP: u32 = 3;
/// CirculatorDataPoint: error state (enum).
pub const DATA_POINT_FIELD_ERROR_STATE: u32 = 4;
/// CirculatorDataPoint: bath temperature in °C (float).
pub const DATA_POINT_FIELD_BATH_TEMP: u32 = 10;
/// CirculatorDataPoint: program step (enum).
pub const DATA_POINT_FIELD_PROGRAM_STEP: u32 = 11;
/// CirculatorDataPoint: time remaining in seconds.
pub const DATA_POINT_FIELD_TIME_REMAINING: u32 = 12;

// ============================================================================
// Enumeration Values
// ============================================================================

/// ProgramType: manual cook.
pub const PROGRAM_TYPE_MANUAL: u32 = 0;
/// ProgramType: automatic (guided) cook.
pub const PROGRAM_TYPE_AUTOMATIC: u32 = 1;

/// ProgramStep: no program running (the schema's default value).
pub const PROGRAM_STEP_STOPPED: u32 = 0;
/// ProgramStep: heating the bath to the set point.
pub const PROGRAM_STEP_PRE_HEAT: u32 = 1;
/// ProgramStep: at temperature, waiting for food.
pub const PROGRAM_STEP_WAIT_FOR_FOOD: u32 = 2;
/// ProgramStep: cooking.
pub const PROGRAM_STEP_COOK: u32 = 3;
/// ProgramStep: done, waiting for food to be removed.
pub const PROGRAM_STEP_WAIT_FOR_REMOVE_FOOD: u32 = 4;
/// ProgramStep: program halted on error.
pub const PROGRAM_STEP_ERROR: u32 = 5;

/// ErrorState: no error.
pub const ERROR_STATE_NO_ERROR: u32 = 0;
/// ErrorState: recoverable error.
pub const ERROR_STATE_SOFT_ERROR: u32 = 1;
/// ErrorState: unrecoverable error.
pub const ERROR_STATE_HARD_ERROR: u32 = 2;

// ============================================================================
// Defaults
// ============================================================================

/// Size of a device address in bytes.
pub const ADDRESS_SIZE: usize = 6;

/// Feed identifier used when requesting live data.
pub const DEFAULT_FEED_ID: u32 = 1;
