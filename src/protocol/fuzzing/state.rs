//! Per-identifier fuzzing state.
use super::mutation::Mutation;
use crate::protocol::transport::can_frame::MAX_CAN_PAYLOAD;
use alloc::collections::BTreeSet;
use embassy_time::Instant;

/// Lifecycle of an unmapped identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FuzzStatus {
    /// Never seen since the last reset.
    #[default]
    Unseen,
    /// Seen, not (yet) mutated.
    Observed,
    /// Mutations are being emitted.
    Fuzzing,
    /// Nothing left to try for this identifier during this run.
    Exhausted,
}

/// Bookkeeping the fuzzer keeps for one identifier.
#[derive(Debug, Clone)]
pub(crate) struct FuzzState {
    pub(crate) first_seen: Instant,
    pub(crate) sightings: u32,
    pub(crate) last_payload: [u8; MAX_CAN_PAYLOAD],
    pub(crate) last_len: u8,
    pub(crate) attempts: u32,
    pub(crate) emitted: u32,
    pub(crate) send_failures: u32,
    /// Mutations sent successfully. Bounded by the mutation cap.
    pub(crate) tried: BTreeSet<Mutation>,
    pub(crate) last_emission: Option<Instant>,
    pub(crate) status: FuzzStatus,
}

impl FuzzState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            sightings: 0,
            last_payload: [0; MAX_CAN_PAYLOAD],
            last_len: 0,
            attempts: 0,
            emitted: 0,
            send_failures: 0,
            tried: BTreeSet::new(),
            last_emission: None,
            status: FuzzStatus::Observed,
        }
    }

    /// Record a sighting of `payload`.
    pub(crate) fn sighted(&mut self, payload: &[u8]) {
        let len = payload.len().min(MAX_CAN_PAYLOAD);
        self.sightings = self.sightings.saturating_add(1);
        self.last_payload = [0; MAX_CAN_PAYLOAD];
        self.last_payload[..len].copy_from_slice(&payload[..len]);
        self.last_len = len as u8;
    }

    /// Read-only copy for inspection.
    pub(crate) fn snapshot(&self) -> FuzzSnapshot {
        FuzzSnapshot {
            status: self.status,
            first_seen: Some(self.first_seen),
            sightings: self.sightings,
            attempts: self.attempts,
            emitted: self.emitted,
            send_failures: self.send_failures,
            tried: self.tried.len(),
            last_emission: self.last_emission,
            last_payload: self.last_payload,
            last_len: self.last_len,
        }
    }
}

/// Copy of one identifier's fuzzing state, as published to inspectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FuzzSnapshot {
    pub status: FuzzStatus,
    /// `None` for unseen identifiers.
    pub first_seen: Option<Instant>,
    pub sightings: u32,
    /// Mutations handed out for sending, including failed sends.
    pub attempts: u32,
    /// Mutations sent successfully.
    pub emitted: u32,
    pub send_failures: u32,
    /// Distinct mutations recorded as tried.
    pub tried: usize,
    pub last_emission: Option<Instant>,
    last_payload: [u8; MAX_CAN_PAYLOAD],
    last_len: u8,
}

impl FuzzSnapshot {
    /// Last payload observed on the bus for this identifier.
    pub fn last_payload(&self) -> &[u8] {
        &self.last_payload[..self.last_len as usize]
    }
}
