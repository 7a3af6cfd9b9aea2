//! Field transform: turns a validated [`BitField`] into a physical value and
//! back.
//!
//! * `extract` reads the raw bits, sign-extends them when the field is signed
//!   and applies `physical = raw * scale + offset`.
//! * `compose` inverts that conversion, saturates the raw value to what the
//!   field can hold and writes it without touching neighbouring bits.
//! * `extract_int` / `compose_raw` move the raw integer itself, for fields
//!   sharing one conversion. Values wider than an `f64` mantissa stay exact.
use super::bits::{BitReader, BitWriter};
use crate::core::BitField;
use crate::error::{BitReaderError, BitWriterError, OutOfRangeWarning};

//==================================================================================EXTRACT
/// Read the raw bit pattern of `field` from `payload`, right-aligned.
///
/// Fails with [`BitReaderError::OutOfBounds`] when the payload is shorter than
/// the field requires (short frame on the bus).
pub fn extract_raw(payload: &[u8], field: &BitField) -> Result<u64, BitReaderError> {
    let mut reader = BitReader::new(payload);
    reader.seek(field.start_bit() as usize)?;
    reader.read(field.byte_order(), field.length())
}

/// Read the raw integer of `field`, sign-extended when the field is signed.
pub fn extract_int(payload: &[u8], field: &BitField) -> Result<i128, BitReaderError> {
    let bits = extract_raw(payload, field)?;
    Ok(if field.is_signed() {
        sign_extend(bits, field.length()) as i128
    } else {
        bits as i128
    })
}

/// Read `field` from `payload` and convert it to its physical value.
pub fn extract(payload: &[u8], field: &BitField) -> Result<f64, BitReaderError> {
    let bits = extract_raw(payload, field)?;
    let raw = if field.is_signed() {
        sign_extend(bits, field.length()) as f64
    } else {
        bits as f64
    };
    Ok(physical(raw, field))
}

//==================================================================================COMPOSE
/// Result of converting a physical value into a raw field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoded {
    /// Raw integer, guaranteed to lie within [`BitField::raw_range`].
    pub raw: i128,
    /// Physical value the raw integer stands for.
    pub applied: f64,
    /// `true` when limits or the representable range altered the value.
    pub clamped: bool,
}

/// Convert a physical value into the raw integer stored by `field`.
///
/// Physical limits are applied first, then `raw = round((value - offset) / scale)`
/// with halves rounded away from zero, then saturation to the field width.
/// NaN saturates to raw 0.
pub fn encode(value: f64, field: &BitField) -> Encoded {
    let (lo, hi) = field.raw_range();

    if value.is_nan() {
        return Encoded {
            raw: 0,
            applied: field.offset(),
            clamped: true,
        };
    }

    let mut limited = value;
    let mut clamped = false;
    let (min_value, max_value) = field.limits();
    if let Some(min) = min_value {
        if limited < min {
            limited = min;
            clamped = true;
        }
    }
    if let Some(max) = max_value {
        if limited > max {
            limited = max;
            clamped = true;
        }
    }

    let mut raw = round_half_away(limited - field.offset(), field.scale());
    if raw < lo || raw > hi {
        raw = raw.clamp(lo, hi);
        // 64-bit bounds are not exact in f64: a value equal to the rounded
        // bound is the bound itself, not an overflow.
        clamped |= physical(raw as f64, field) != limited;
    }

    Encoded {
        raw,
        applied: physical(raw as f64, field),
        clamped,
    }
}

/// Write `value` into `field` inside `payload`.
///
/// Returns `Ok(Some(warning))` when the value had to be saturated; the bits
/// are written with the saturated value in that case.
pub fn compose(
    value: f64,
    field: &BitField,
    payload: &mut [u8],
) -> Result<Option<OutOfRangeWarning>, BitWriterError> {
    let encoded = encode(value, field);
    write_raw(encoded.raw, field, payload)?;
    Ok(encoded.clamped.then_some(OutOfRangeWarning {
        requested: value,
        applied: encoded.applied,
    }))
}

/// `true` when both fields share scale and offset, so the raw integer can be
/// copied from one to the other without a physical round trip.
pub fn same_conversion(source: &BitField, destination: &BitField) -> bool {
    source.scale() == destination.scale() && source.offset() == destination.offset()
}

/// Write a raw integer read from a field with the same conversion as `field`.
///
/// The integer is saturated to the field width without going through `f64`.
/// Physical limits, when set and crossed, are applied through [`compose`].
pub fn compose_raw(
    raw: i128,
    field: &BitField,
    payload: &mut [u8],
) -> Result<Option<OutOfRangeWarning>, BitWriterError> {
    let requested = physical(raw as f64, field);
    let (min_value, max_value) = field.limits();
    let below = min_value.is_some_and(|min| requested < min);
    let above = max_value.is_some_and(|max| requested > max);
    if below || above {
        return compose(requested, field, payload);
    }

    let (lo, hi) = field.raw_range();
    let saturated = raw.clamp(lo, hi);
    write_raw(saturated, field, payload)?;
    Ok((saturated != raw).then_some(OutOfRangeWarning {
        requested,
        applied: physical(saturated as f64, field),
    }))
}

/// Write a raw integer (already within range) as two's complement bits.
pub fn write_raw(raw: i128, field: &BitField, payload: &mut [u8]) -> Result<(), BitWriterError> {
    let length = field.length();
    let bits = if length >= 64 {
        raw as u64
    } else {
        (raw as u64) & ((1u64 << length) - 1)
    };
    let mut writer = BitWriter::new(payload);
    writer.seek(field.start_bit() as usize)?;
    writer.write(field.byte_order(), bits, length)
}

//==================================================================================HELPERS
#[inline]
fn physical(raw: f64, field: &BitField) -> f64 {
    raw * field.scale() + field.offset()
}

/// Sign-extend a value read on `bits` bits into an `i64`.
fn sign_extend(value: u64, bits: u8) -> i64 {
    // Reading the full 64 bits already yields the correct representation.
    if bits >= 64 {
        return value as i64;
    }

    let sign_bit_mask = 1u64 << (bits - 1);
    if (value & sign_bit_mask) != 0 {
        // Fill the upper bits with ones.
        let extension_mask = u64::MAX << bits;
        (value | extension_mask) as i64
    } else {
        value as i64
    }
}

/// `round(numerator / scale)` with halves away from zero. `core` has no
/// `f64::round`, so the fractional part is handled by hand; the `as` cast
/// saturates out-of-range quotients.
fn round_half_away(numerator: f64, scale: f64) -> i128 {
    let quotient = numerator / scale;
    let truncated = quotient as i128;
    let fraction = quotient - truncated as f64;
    if fraction >= 0.5 {
        truncated.saturating_add(1)
    } else if fraction <= -0.5 {
        truncated.saturating_sub(1)
    } else {
        truncated
    }
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
