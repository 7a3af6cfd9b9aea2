//! In-memory representation of a classical CAN data frame.
//!
//! Frames are immutable once built: the pipeline moves them from one stage to
//! the next and derives new frames instead of editing existing ones.
use crate::error::FrameError;
use crate::protocol::transport::can_id::ArbitrationId;
use embassy_time::Instant;

/// Maximum payload length of a classical CAN frame.
pub const MAX_CAN_PAYLOAD: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Raw CAN frame as read from, or written to, a bus.
pub struct CanFrame {
    /// 11- or 29-bit identifier (the variant carries the extended flag).
    id: ArbitrationId,
    /// Payload buffer. Bytes past `len` are always zero.
    data: [u8; MAX_CAN_PAYLOAD],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    len: usize,
    /// Arrival (or creation) instant on the monotonic clock.
    timestamp: Instant,
}

impl CanFrame {
    /// Build a frame from an identifier and up to eight payload bytes.
    /// The timestamp starts at the clock origin; see [`CanFrame::with_timestamp`].
    pub fn new(id: ArbitrationId, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_CAN_PAYLOAD {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        let mut data = [0u8; MAX_CAN_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            data,
            len: payload.len(),
            timestamp: Instant::from_ticks(0),
        })
    }

    /// Build a frame from the raw identifier + extended flag pair.
    pub fn from_raw(raw_id: u32, extended: bool, payload: &[u8]) -> Result<Self, FrameError> {
        let id = ArbitrationId::from_raw(raw_id, extended)?;
        Self::new(id, payload)
    }

    /// Infallible constructor for buffers already sized by the caller.
    pub(crate) fn from_parts(
        id: ArbitrationId,
        data: [u8; MAX_CAN_PAYLOAD],
        len: usize,
        timestamp: Instant,
    ) -> Self {
        let len = len.min(MAX_CAN_PAYLOAD);
        let mut clean = [0u8; MAX_CAN_PAYLOAD];
        clean[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            data: clean,
            len,
            timestamp,
        }
    }

    /// Return the same frame stamped with `timestamp`.
    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Arbitration identifier.
    #[inline]
    pub fn arbitration_id(&self) -> ArbitrationId {
        self.id
    }

    /// Valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Data length code.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when the frame carries no data bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` for 29-bit identifiers.
    #[inline]
    pub fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    /// Arrival instant.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

//==================================================================================EMBEDDED_CAN
/// Lets HAL drivers built on `embedded-can` hand their frames to the bridge
/// directly. Remote frames are never bridged.
impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<embedded_can::Id>, data: &[u8]) -> Option<Self> {
        CanFrame::new(ArbitrationId::from(id.into()), data).ok()
    }

    fn new_remote(_id: impl Into<embedded_can::Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> embedded_can::Id {
        self.id.into()
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }
}
