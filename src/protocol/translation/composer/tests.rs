//! Composition of destination frames from source frames.
use super::*;
use crate::core::{ByteOrder, FieldSpec, RuleSpec};
use embassy_time::Instant;

fn std_id(raw: u16) -> ArbitrationId {
    ArbitrationId::Standard(raw)
}

fn frame(id: u16, payload: &[u8]) -> CanFrame {
    CanFrame::new(std_id(id), payload).unwrap()
}

fn table(specs: &[RuleSpec]) -> TranslationTable {
    TranslationTable::from_specs(specs).unwrap()
}

#[test]
/// 0x100 byte 0 lands in 0x200 byte 1, everything else stays zero.
fn test_basic_translation() {
    let table = table(&[RuleSpec::new(
        0x100,
        FieldSpec::new(0, 8),
        0x200,
        FieldSpec::new(8, 8),
    )]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);

    let source = frame(0x100, &[0x12, 0x34, 0x56, 0x78, 0, 0, 0, 0]).with_timestamp(Instant::from_ticks(7));
    let out = composer.translate(&source, &table);
    assert_eq!(out.frames.len(), 1);
    assert_eq!(out.frames[0].arbitration_id(), std_id(0x200));
    assert_eq!(out.frames[0].payload(), &[0, 0x12, 0, 0, 0, 0, 0, 0]);
    assert_eq!(out.frames[0].timestamp(), Instant::from_ticks(7));
    assert!(out.warnings.is_empty());
    assert_eq!(out.skipped, 0);
}

#[test]
/// Unmapped ids produce nothing.
fn test_unmapped_produces_nothing() {
    let table = TranslationTable::new();
    let mut composer = DestinationComposer::new();
    let out = composer.translate(&frame(0x300, &[1, 2, 3]), &table);
    assert_eq!(out, Translation::default());
}

#[test]
/// Several rules of one source compose one frame; fan-out gives one frame per destination.
fn test_group_by_destination() {
    let table = table(&[
        RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x201, FieldSpec::new(0, 8)),
        RuleSpec::new(0x100, FieldSpec::new(0, 4), 0x200, FieldSpec::new(4, 4)),
        RuleSpec::new(0x100, FieldSpec::new(4, 4), 0x200, FieldSpec::new(0, 4)),
    ]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);

    let out = composer.translate(&frame(0x100, &[0xAB]), &table);
    assert_eq!(out.frames.len(), 2);
    assert_eq!(out.frames[0].arbitration_id(), std_id(0x201));
    assert_eq!(out.frames[0].payload()[0], 0xAB);
    assert_eq!(out.frames[1].arbitration_id(), std_id(0x200));
    assert_eq!(out.frames[1].payload()[0], 0xBA);
}

#[test]
/// A destination fed by two sources carries both signals, in either arrival order.
fn test_fan_in_either_order() {
    let table = table(&[
        RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x200, FieldSpec::new(0, 8)),
        RuleSpec::new(0x101, FieldSpec::new(0, 8), 0x200, FieldSpec::new(8, 8)),
    ]);
    let a = frame(0x100, &[0x11]);
    let b = frame(0x101, &[0x22]);

    let mut forward = DestinationComposer::new();
    forward.sync(&table);
    forward.translate(&a, &table);
    let last_forward = forward.translate(&b, &table);

    let mut backward = DestinationComposer::new();
    backward.sync(&table);
    backward.translate(&b, &table);
    let last_backward = backward.translate(&a, &table);

    assert_eq!(last_forward.frames[0].payload()[..2], [0x11, 0x22]);
    assert_eq!(
        last_forward.frames[0].payload(),
        last_backward.frames[0].payload()
    );
}

#[test]
/// Same frame, same table, same output.
fn test_deterministic() {
    let table = table(&[RuleSpec::new(
        0x100,
        FieldSpec::new(3, 13).signed(),
        0x200,
        FieldSpec::new(17, 13).signed().scaled(0.5, 0.0),
    )]);
    let source = frame(0x100, &[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0]);

    let mut first = DestinationComposer::new();
    first.sync(&table);
    let mut second = DestinationComposer::new();
    second.sync(&table);
    assert_eq!(
        first.translate(&source, &table),
        second.translate(&source, &table)
    );
    assert_eq!(
        first.translate(&source, &table),
        second.translate(&source, &table)
    );
}

#[test]
/// Removing a rule clears its bits from the cached image.
fn test_edit_masks_images() {
    let mut table = table(&[
        RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x200, FieldSpec::new(0, 8)),
        RuleSpec::new(0x101, FieldSpec::new(0, 8), 0x200, FieldSpec::new(8, 8)),
    ]);
    let mut composer = DestinationComposer::new();
    assert_eq!(composer.sync(&table), SyncOutcome::Edited);
    assert_eq!(composer.sync(&table), SyncOutcome::Unchanged);
    composer.translate(&frame(0x100, &[0x11]), &table);
    composer.translate(&frame(0x101, &[0x22]), &table);

    assert!(table.remove(std_id(0x100), std_id(0x200)));
    assert_eq!(composer.sync(&table), SyncOutcome::Edited);
    assert_eq!(composer.image(std_id(0x200)).unwrap()[..2], [0x00, 0x22]);

    let out = composer.translate(&frame(0x101, &[0x33]), &table);
    assert_eq!(out.frames[0].payload()[..2], [0x00, 0x33]);
}

#[test]
/// Bits handed from a removed rule to a new one start from zero.
fn test_edit_swaps_bit_owner() {
    let mut table = table(&[
        RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x200, FieldSpec::new(0, 8)),
        RuleSpec::new(0x101, FieldSpec::new(0, 8), 0x200, FieldSpec::new(8, 8)),
    ]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);
    composer.translate(&frame(0x100, &[0xAA]), &table);

    assert!(table.remove(std_id(0x100), std_id(0x200)));
    let rule = TranslationRule::try_from(&RuleSpec::new(
        0x102,
        FieldSpec::new(0, 8),
        0x200,
        FieldSpec::new(0, 8),
    ))
    .unwrap();
    table.insert(rule).unwrap();
    assert_eq!(composer.sync(&table), SyncOutcome::Edited);

    let out = composer.translate(&frame(0x101, &[0x22]), &table);
    assert_eq!(out.frames[0].payload()[..2], [0x00, 0x22]);

    let out = composer.translate(&frame(0x102, &[0x5A]), &table);
    assert_eq!(out.frames[0].payload()[..2], [0x5A, 0x22]);
}

#[test]
/// A rule replaced by a different field on the same bits loses the old value.
fn test_edit_replaced_rule_drops_bits() {
    let mut table = table(&[RuleSpec::new(
        0x100,
        FieldSpec::new(0, 8),
        0x200,
        FieldSpec::new(0, 8),
    )]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);
    composer.translate(&frame(0x100, &[0xAA]), &table);

    let scaled = TranslationRule::try_from(&RuleSpec::new(
        0x100,
        FieldSpec::new(8, 8),
        0x200,
        FieldSpec::new(0, 8),
    ))
    .unwrap();
    table.replace(scaled).unwrap();
    composer.sync(&table);
    assert_eq!(composer.image(std_id(0x200)).unwrap()[0], 0x00);
}

#[test]
/// 64-bit fields with one conversion are copied bit for bit.
fn test_full_width_copy_is_exact() {
    let table = table(&[
        RuleSpec::new(0x100, FieldSpec::new(0, 64), 0x200, FieldSpec::new(0, 64)),
        RuleSpec::new(
            0x101,
            FieldSpec::new(0, 64).signed(),
            0x201,
            FieldSpec::new(0, 64).signed().byte_order(ByteOrder::BigEndian),
        ),
    ]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);

    let raw = 0x0020_0000_0000_0001u64.to_le_bytes();
    let out = composer.translate(&frame(0x100, &raw), &table);
    assert_eq!(out.frames[0].payload(), &raw);
    assert!(out.warnings.is_empty());

    let out = composer.translate(&frame(0x100, &[0xFF; 8]), &table);
    assert_eq!(out.frames[0].payload(), &[0xFF; 8]);
    assert!(out.warnings.is_empty());

    let value = (-0x0020_0000_0000_0001i64).to_le_bytes();
    let out = composer.translate(&frame(0x101, &value), &table);
    assert_eq!(out.frames[0].payload(), &(-0x0020_0000_0000_0001i64).to_be_bytes());
}

#[test]
/// A table reset drops every image.
fn test_reset_drops_images() {
    let mut table = table(&[RuleSpec::new(
        0x100,
        FieldSpec::new(0, 8),
        0x200,
        FieldSpec::new(0, 8),
    )]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);
    composer.translate(&frame(0x100, &[0x11]), &table);
    assert!(composer.image(std_id(0x200)).is_some());

    table.clear();
    assert_eq!(composer.sync(&table), SyncOutcome::Reset);
    assert!(composer.image(std_id(0x200)).is_none());
}

#[test]
/// Saturated values are reported and the frame is still built.
fn test_clamp_warning() {
    let table = table(&[RuleSpec::new(
        0x100,
        FieldSpec::new(0, 8),
        0x200,
        FieldSpec::new(0, 4),
    )]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);
    let out = composer.translate(&frame(0x100, &[0xFF]), &table);
    assert_eq!(out.frames[0].payload()[0], 0x0F);
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.warnings[0].0, std_id(0x200));
    assert_eq!(out.warnings[0].1.applied, 15.0);
}

#[test]
/// Short source frames skip the rules they cannot satisfy.
fn test_short_frame_skips_rules() {
    let table = table(&[
        RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x200, FieldSpec::new(0, 8)),
        RuleSpec::new(0x100, FieldSpec::new(32, 8), 0x200, FieldSpec::new(8, 8)),
        RuleSpec::new(0x100, FieldSpec::new(40, 8), 0x201, FieldSpec::new(0, 8)),
    ]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);
    let out = composer.translate(&frame(0x100, &[0x42, 0x00]), &table);
    assert_eq!(out.skipped, 2);
    // 0x201 had no applied rule and is not emitted.
    assert_eq!(out.frames.len(), 1);
    assert_eq!(out.frames[0].payload()[..2], [0x42, 0x00]);
}

#[test]
/// The emitted DLC is the destination frame length.
fn test_destination_length() {
    let mut spec = RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x200, FieldSpec::new(8, 8));
    spec.destination_len = 2;
    let table = table(&[spec]);
    let mut composer = DestinationComposer::new();
    composer.sync(&table);
    let out = composer.translate(&frame(0x100, &[0x12; 8]), &table);
    assert_eq!(out.frames[0].payload(), &[0x00, 0x12]);
}
