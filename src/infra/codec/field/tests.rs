//! Extraction and composition of physical values.
use super::*;
use crate::core::{ByteOrder, FieldSpec};

fn field(spec: FieldSpec) -> BitField {
    BitField::from_spec(&spec, 8).unwrap()
}

//==================================================================================EXTRACT
#[test]
/// Bits 0..8 little-endian of `[0x12, 0x34]` give 18.
fn test_extract_first_byte() {
    let f = field(FieldSpec::new(0, 8));
    assert_eq!(extract(&[0x12, 0x34], &f).unwrap(), 18.0);
}

#[test]
/// Big-endian fields read their MSB at the start bit.
fn test_extract_big_endian() {
    let f = field(FieldSpec::new(4, 8).byte_order(ByteOrder::BigEndian));
    assert_eq!(extract_raw(&[0x12, 0x34], &f).unwrap(), 0x23);
}

#[test]
/// Signed fields are sign-extended before scaling.
fn test_extract_signed() {
    let f = field(FieldSpec::new(0, 4).signed());
    assert_eq!(extract(&[0x0F], &f).unwrap(), -1.0);
    assert_eq!(extract(&[0x08], &f).unwrap(), -8.0);
    assert_eq!(extract(&[0x07], &f).unwrap(), 7.0);

    let full = field(FieldSpec::new(0, 64).signed());
    assert_eq!(extract(&[0xFF; 8], &full).unwrap(), -1.0);
}

#[test]
/// Scale and offset are applied after the raw read.
fn test_extract_scaled() {
    let f = field(FieldSpec::new(0, 16).scaled(0.5, -40.0));
    // raw 0x0064 = 100 -> 100 * 0.5 - 40 = 10
    assert_eq!(extract(&[0x64, 0x00], &f).unwrap(), 10.0);
}

#[test]
/// A payload shorter than the field is reported, not padded.
fn test_extract_short_payload() {
    let f = field(FieldSpec::new(8, 8));
    assert!(matches!(
        extract(&[0x12], &f),
        Err(BitReaderError::OutOfBounds { .. })
    ));
}

//==================================================================================COMPOSE
#[test]
/// Composition writes only the field's bits.
fn test_compose_into_second_byte() {
    let f = field(FieldSpec::new(8, 8));
    let mut payload = [0u8; 8];
    assert_eq!(compose(18.0, &f, &mut payload).unwrap(), None);
    assert_eq!(payload, [0, 0x12, 0, 0, 0, 0, 0, 0]);

    let mut busy = [0xFFu8; 2];
    compose(0.0, &field(FieldSpec::new(4, 4)), &mut busy).unwrap();
    assert_eq!(busy, [0x0F, 0xFF]);
}

#[test]
/// Rounding is half away from zero on both sides.
fn test_compose_rounding() {
    let f = field(FieldSpec::new(0, 8).signed());
    assert_eq!(encode(2.5, &f).raw, 3);
    assert_eq!(encode(-2.5, &f).raw, -3);
    assert_eq!(encode(2.49, &f).raw, 2);
    assert_eq!(encode(-2.49, &f).raw, -2);
}

#[test]
/// Out-of-range values saturate and produce a warning.
fn test_compose_saturates() {
    let f = field(FieldSpec::new(0, 8));
    let mut payload = [0u8; 1];
    let warning = compose(300.0, &f, &mut payload).unwrap();
    assert_eq!(payload, [0xFF]);
    assert_eq!(
        warning,
        Some(OutOfRangeWarning {
            requested: 300.0,
            applied: 255.0
        })
    );

    let warning = compose(-1.0, &f, &mut payload).unwrap();
    assert_eq!(payload, [0x00]);
    assert_eq!(warning.map(|w| w.applied), Some(0.0));

    let signed = field(FieldSpec::new(0, 8).signed());
    compose(-1000.0, &signed, &mut payload).unwrap();
    assert_eq!(payload, [0x80]);
}

#[test]
/// Infinities saturate too.
fn test_compose_infinite() {
    let f = field(FieldSpec::new(0, 12));
    let encoded = encode(f64::INFINITY, &f);
    assert_eq!(encoded.raw, 4095);
    assert!(encoded.clamped);
    assert_eq!(encode(f64::NEG_INFINITY, &f).raw, 0);
}

#[test]
/// NaN encodes as raw 0 with a warning.
fn test_compose_nan() {
    let f = field(FieldSpec::new(0, 8).scaled(1.0, 5.0));
    let mut payload = [0xAAu8; 1];
    let warning = compose(f64::NAN, &f, &mut payload).unwrap().unwrap();
    assert_eq!(payload, [0x00]);
    assert!(warning.requested.is_nan());
    assert_eq!(warning.applied, 5.0);
}

#[test]
/// Physical limits apply before encoding.
fn test_compose_limits() {
    let f = field(FieldSpec::new(0, 8).limits(Some(10.0), Some(100.0)));
    let mut payload = [0u8; 1];
    let warning = compose(150.0, &f, &mut payload).unwrap();
    assert_eq!(payload, [100]);
    assert_eq!(warning.map(|w| w.applied), Some(100.0));

    assert_eq!(compose(50.0, &f, &mut payload).unwrap(), None);
    assert_eq!(payload, [50]);
}

#[test]
/// Negative values land as two's complement inside the field only.
fn test_compose_signed_big_endian() {
    let f = field(FieldSpec::new(4, 8).signed().byte_order(ByteOrder::BigEndian));
    let mut payload = [0u8; 2];
    compose(-2.0, &f, &mut payload).unwrap();
    // 0xFE laid MSB-first over bits 4..12.
    assert_eq!(payload, [0x0F, 0xE0]);
    assert_eq!(extract(&payload, &f).unwrap(), -2.0);
}

//==================================================================================ROUND_TRIP
#[test]
/// Every in-range raw value survives extract then compose.
fn test_round_trip_in_range() {
    for (spec, raws) in [
        (FieldSpec::new(3, 12), [0i128, 1, 2047, 4095]),
        (FieldSpec::new(5, 12).signed(), [-2048, -1, 0, 2047]),
        (
            FieldSpec::new(7, 12).scaled(0.25, 100.0).byte_order(ByteOrder::BigEndian),
            [0, 17, 2048, 4095],
        ),
    ] {
        let f = field(spec);
        for raw in raws {
            let mut payload = [0u8; 8];
            write_raw(raw, &f, &mut payload).unwrap();
            let physical = extract(&payload, &f).unwrap();

            let mut again = [0u8; 8];
            assert_eq!(compose(physical, &f, &mut again).unwrap(), None);
            assert_eq!(again, payload);
        }
    }
}

#[test]
/// Full-width raw values survive an integer copy between fields of the same conversion.
fn test_round_trip_full_width() {
    for (spec, raws) in [
        (
            FieldSpec::new(0, 64),
            [0i128, 1, 0x20_0000_0000_0001, u64::MAX as i128],
        ),
        (
            FieldSpec::new(0, 64).signed(),
            [i64::MIN as i128, -0x20_0000_0000_0001, -1, i64::MAX as i128],
        ),
        (
            FieldSpec::new(0, 60).byte_order(ByteOrder::BigEndian),
            [0, 1, 0x20_0000_0000_0001, (1i128 << 60) - 1],
        ),
    ] {
        let f = field(spec);
        for raw in raws {
            let mut payload = [0u8; 8];
            write_raw(raw, &f, &mut payload).unwrap();
            assert_eq!(extract_int(&payload, &f).unwrap(), raw);

            let mut again = [0u8; 8];
            assert_eq!(compose_raw(raw, &f, &mut again).unwrap(), None);
            assert_eq!(again, payload);
        }
    }
}

#[test]
/// Integer copies saturate to the destination width and report it.
fn test_compose_raw_saturates() {
    let narrow = field(FieldSpec::new(0, 8).signed());
    let mut payload = [0u8; 1];
    let warning = compose_raw(300, &narrow, &mut payload).unwrap().unwrap();
    assert_eq!(payload, [0x7F]);
    assert_eq!((warning.requested, warning.applied), (300.0, 127.0));

    let limited = field(FieldSpec::new(0, 16).limits(None, Some(1000.0)));
    let mut payload = [0u8; 2];
    let warning = compose_raw(4000, &limited, &mut payload).unwrap().unwrap();
    assert_eq!(warning.applied, 1000.0);
    assert_eq!(payload, 1000u16.to_le_bytes());
}

#[test]
/// The largest 64-bit value rounds to 2^64 in f64 and is not reported as a clamp.
fn test_compose_top_of_range() {
    let f = field(FieldSpec::new(0, 64));
    let mut payload = [0u8; 8];
    assert_eq!(compose(u64::MAX as f64, &f, &mut payload).unwrap(), None);
    assert_eq!(payload, [0xFF; 8]);
    assert!(compose(1.0e30, &f, &mut payload).unwrap().is_some());
}

#[test]
/// Only fields with identical scale and offset share the integer path.
fn test_same_conversion() {
    let plain = field(FieldSpec::new(0, 8));
    let wide = field(FieldSpec::new(8, 16).signed());
    let scaled = field(FieldSpec::new(0, 8).scaled(0.5, 0.0));
    assert!(same_conversion(&plain, &wide));
    assert!(!same_conversion(&plain, &scaled));
}
