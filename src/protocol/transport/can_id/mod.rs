//! Arbitration identifiers for classical CAN: 11-bit standard or 29-bit
//! extended. The addressing mode is part of the identity, so `0x100` standard
//! and `0x100` extended are two distinct keys for translation and fuzzing.
use crate::error::CanIdError;
use core::fmt;
use embedded_can::{ExtendedId, Id, StandardId};

/// Highest standard (11-bit) identifier.
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Highest extended (29-bit) identifier.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

//==================================================================================ARBITRATION_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Arbitration identifier. Standard ids sort before extended ones.
///
/// [`ArbitrationId::standard`] and [`ArbitrationId::extended`] check the
/// range; the variants themselves do not. Bits above the addressing range
/// are dropped when the id reaches the bus (see `From<ArbitrationId> for Id`).
pub enum ArbitrationId {
    /// 11-bit identifier, `0..=0x7FF`.
    Standard(u16),
    /// 29-bit identifier, `0..=0x1FFF_FFFF`.
    Extended(u32),
}

impl ArbitrationId {
    /// Build a standard identifier, rejecting values above `0x7FF`.
    pub fn standard(raw: u16) -> Result<Self, CanIdError> {
        if raw as u32 > MAX_STANDARD_ID {
            return Err(CanIdError::StandardOutOfRange { raw: raw as u32 });
        }
        Ok(Self::Standard(raw))
    }

    /// Build an extended identifier, rejecting values above `0x1FFF_FFFF`.
    pub fn extended(raw: u32) -> Result<Self, CanIdError> {
        if raw > MAX_EXTENDED_ID {
            return Err(CanIdError::ExtendedOutOfRange { raw });
        }
        Ok(Self::Extended(raw))
    }

    /// Build an identifier from the raw integer + extended flag pair used by rule records.
    pub fn from_raw(raw: u32, extended: bool) -> Result<Self, CanIdError> {
        if extended {
            Self::extended(raw)
        } else if raw > MAX_STANDARD_ID {
            Err(CanIdError::StandardOutOfRange { raw })
        } else {
            Ok(Self::Standard(raw as u16))
        }
    }

    /// Raw numeric value without the addressing mode.
    pub fn raw(&self) -> u32 {
        match *self {
            Self::Standard(raw) => raw as u32,
            Self::Extended(raw) => raw,
        }
    }

    /// `true` for 29-bit identifiers.
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

impl fmt::Display for ArbitrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Standard(raw) => write!(f, "{:#05X}", raw),
            Self::Extended(raw) => write!(f, "{:#010X}", raw),
        }
    }
}

//==================================================================================EMBEDDED_CAN
impl From<Id> for ArbitrationId {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => Self::Standard(id.as_raw()),
            Id::Extended(id) => Self::Extended(id.as_raw()),
        }
    }
}

impl From<ArbitrationId> for Id {
    fn from(id: ArbitrationId) -> Self {
        // Only the low 11 / 29 bits are transmitted.
        match id {
            ArbitrationId::Standard(raw) => Id::Standard(
                StandardId::new(raw & MAX_STANDARD_ID as u16).unwrap_or(StandardId::ZERO),
            ),
            ArbitrationId::Extended(raw) => Id::Extended(
                ExtendedId::new(raw & MAX_EXTENDED_ID).unwrap_or(ExtendedId::ZERO),
            ),
        }
    }
}
