//! Error definitions shared across library modules.
//! Structural errors (rules, conflicts) surface to whoever asked for the edit;
//! transport errors are counted by the bridge runner and never stop it.
use crate::protocol::transport::can_id::ArbitrationId;
use thiserror_no_std::Error;

//==================================================================================FRAME_ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur while building an arbitration identifier.
pub enum CanIdError {
    /// Standard identifiers are limited to 11 bits.
    #[error("Standard identifier out of range: {raw:#X} > 0x7FF")]
    StandardOutOfRange { raw: u32 },
    /// Extended identifiers are limited to 29 bits.
    #[error("Extended identifier out of range: {raw:#X} > 0x1FFFFFFF")]
    ExtendedOutOfRange { raw: u32 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised when a frame is assembled from raw parts.
pub enum FrameError {
    /// Classical CAN carries at most eight data bytes.
    #[error("Payload too long: {len} bytes (max 8)")]
    PayloadTooLong { len: usize },
    /// Identifier does not fit its addressing mode.
    #[error(transparent)]
    Id(#[from] CanIdError),
}

//==================================================================================RULE_ERRORS
#[derive(Error, Debug, Clone, Copy, PartialEq)]
/// A rule or bit-field that cannot be accepted into a translation table.
pub enum InvalidRuleError {
    /// Bit length must stay in the [1, 64] range.
    #[error("Invalid bit length {length} (expected 1..=64)")]
    BitLengthOutOfRange { length: u32 },
    /// Start bit must stay in the [0, 63] range.
    #[error("Invalid start bit {start} (expected 0..=63)")]
    StartBitOutOfRange { start: u32 },
    /// The field runs past the end of the declared frame.
    #[error("Field {start}+{length} exceeds a {frame_len}-byte frame")]
    FieldPastEndOfFrame { start: u8, length: u8, frame_len: u8 },
    /// Frame length must stay in the [1, 8] range.
    #[error("Invalid frame length {len} (expected 1..=8)")]
    FrameLengthOutOfRange { len: u8 },
    /// A zero scale cannot be inverted during composition.
    #[error("Scale must be non-zero")]
    ZeroScale,
    /// Scale, offset and limits must all be finite numbers.
    #[error("Scale, offset and limits must be finite")]
    NonFinite,
    /// `min_value` is above `max_value`.
    #[error("Inverted physical limits: min {min} > max {max}")]
    InvertedLimits { min: f64, max: f64 },
    /// Source or destination identifier is out of range.
    #[error(transparent)]
    Id(#[from] CanIdError),
    /// The rule collides with a rule loaded before it.
    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
/// Load-time failure naming the offending rule.
#[error("Rule #{index} (source id {source_id:#X}) rejected: {reason}")]
pub struct RuleLoadError {
    /// Position of the rule in the collection handed to the loader.
    pub index: usize,
    /// Raw source identifier of the rule, for diagnostics.
    pub source_id: u32,
    /// Why it was rejected.
    pub reason: InvalidRuleError,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Table edit refused because it would corrupt a destination layout.
pub enum ConflictError {
    /// The destination bit range overlaps a range already claimed for the same destination.
    #[error("Destination {destination} bits {start}+{length} overlap an existing rule")]
    OverlappingDestination {
        destination: ArbitrationId,
        start: u8,
        length: u8,
    },
    /// Every rule feeding a destination must agree on its frame length.
    #[error("Destination {destination} has frame length {existing}, rule asks for {requested}")]
    FrameLengthMismatch {
        destination: ArbitrationId,
        existing: u8,
        requested: u8,
    },
}

//==================================================================================TRANSPORT_ERRORS
#[derive(Error, Debug)]
/// Source bus failed to deliver a frame.
#[error("CAN bus receive error: {0:?}")]
pub struct BusReadError<E: core::fmt::Debug>(pub E);

#[derive(Error, Debug)]
/// Target bus refused or did not complete a transmission.
pub enum SendFailure<E: core::fmt::Debug> {
    /// CAN layer refused or failed to send the frame.
    #[error("CAN bus send error: {0:?}")]
    Bus(E),
    /// Transmission did not complete within the configured window.
    #[error("CAN bus send timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },
}

//==================================================================================COMPOSE_WARNING
#[derive(Error, Debug, Clone, Copy, PartialEq)]
/// Value saturated while being written into a destination field.
/// Not an error: the frame is still sent with the clamped value.
#[error("Value {requested} out of range, saturated to {applied}")]
pub struct OutOfRangeWarning {
    /// Physical value handed to the composer.
    pub requested: f64,
    /// Physical value actually encoded after clamping.
    pub applied: f64,
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Errors raised during bitwise buffer reads.
pub enum BitReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bits than the target type can hold.
    #[error("Cannot read more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}
//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Errors raised during bitwise writes into a buffer.
pub enum BitWriterError {
    /// Attempted to write beyond the provided capacity.
    #[error("Attempted to write out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Field is too large for the provided type.
    #[error("Cannot write more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}
