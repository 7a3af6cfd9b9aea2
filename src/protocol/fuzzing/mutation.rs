//! Payload mutations tried on unmapped traffic.
//!
//! The candidate space of a payload is enumerated byte by byte: eight single
//! bit flips, then `±1..=max_delta` wrapping nudges. Every candidate changes
//! the payload, so a mutated frame always differs from the one it came from.

/// Largest nudge magnitude; keeps every delta non-zero modulo 256.
pub const MAX_NUDGE: u8 = i8::MAX as u8;

/// One change applied to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mutation {
    /// Invert bit `bit` (0 = LSB) of byte `byte`.
    BitFlip { byte: u8, bit: u8 },
    /// Add `delta` to byte `byte`, wrapping.
    Nudge { byte: u8, delta: i8 },
}

impl Mutation {
    /// Number of candidates for a payload of `len` bytes.
    pub fn candidate_count(len: usize, max_delta: u8) -> usize {
        len * per_byte(max_delta)
    }

    /// Candidate number `index` in enumeration order, if it exists.
    pub fn from_index(index: usize, len: usize, max_delta: u8) -> Option<Self> {
        if index >= Self::candidate_count(len, max_delta) {
            return None;
        }
        let per_byte = per_byte(max_delta);
        let byte = (index / per_byte) as u8;
        let slot = index % per_byte;
        if slot < 8 {
            return Some(Self::BitFlip {
                byte,
                bit: slot as u8,
            });
        }
        let step = slot - 8;
        let magnitude = (step / 2 + 1) as i8;
        let delta = if step % 2 == 0 { magnitude } else { -magnitude };
        Some(Self::Nudge { byte, delta })
    }

    /// Byte the mutation touches.
    pub fn byte(&self) -> u8 {
        match *self {
            Self::BitFlip { byte, .. } | Self::Nudge { byte, .. } => byte,
        }
    }

    /// Apply to `payload`. Returns `false`, leaving the payload alone, when
    /// the byte is past its end.
    pub fn apply(&self, payload: &mut [u8]) -> bool {
        let Some(target) = payload.get_mut(self.byte() as usize) else {
            return false;
        };
        match *self {
            Self::BitFlip { bit, .. } => *target ^= 1 << (bit & 7),
            Self::Nudge { delta, .. } => *target = target.wrapping_add(delta as u8),
        }
        true
    }
}

fn per_byte(max_delta: u8) -> usize {
    8 + 2 * max_delta.min(MAX_NUDGE) as usize
}
