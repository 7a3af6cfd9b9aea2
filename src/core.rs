//! Defines the "data contract" between the rule-table collaborator and the
//! translation engine.
//!
//! The collaborator hands over plain [`RuleSpec`] records (already parsed from
//! whatever format it reads). They are validated once, at load or edit time,
//! into [`TranslationRule`]s whose [`BitField`]s are guaranteed to fit their
//! frames. Nothing in the hot path re-checks shapes.
use crate::error::InvalidRuleError;
use crate::protocol::transport::can_frame::MAX_CAN_PAYLOAD;
use crate::protocol::transport::can_id::ArbitrationId;

//==================================================================================BYTE_ORDER
/// Bit numbering convention of a field.
///
/// * `LittleEndian` (Intel): bit 0 is the LSB of byte 0, bit 8 the LSB of byte 1.
///   The field's least significant bit sits at `start_bit`.
/// * `BigEndian` (Motorola, sequential numbering): bit 0 is the MSB of byte 0,
///   bit 8 the MSB of byte 1. The field's most significant bit sits at `start_bit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "little", alias = "intel"))]
    LittleEndian,
    #[cfg_attr(feature = "serde", serde(rename = "big", alias = "motorola"))]
    BigEndian,
}

//==================================================================================RAW_RECORDS
/// Raw description of one bit-field, as produced by a rule-table parser.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldSpec {
    /// Bit numbering convention.
    pub byte_order: ByteOrder,
    /// First bit of the field (see [`ByteOrder`]).
    pub start_bit: u32,
    /// Field width in bits.
    pub bit_length: u32,
    /// Two's complement when `true`.
    pub signed: bool,
    /// Physical = raw × scale + offset.
    pub scale: f64,
    /// Physical = raw × scale + offset.
    pub offset: f64,
    /// Optional lower physical bound applied before encoding.
    pub min_value: Option<f64>,
    /// Optional upper physical bound applied before encoding.
    pub max_value: Option<f64>,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            start_bit: 0,
            bit_length: 8,
            signed: false,
            scale: 1.0,
            offset: 0.0,
            min_value: None,
            max_value: None,
        }
    }
}

impl FieldSpec {
    /// Unsigned little-endian field with unit scale, the most common shape.
    pub fn new(start_bit: u32, bit_length: u32) -> Self {
        Self {
            start_bit,
            bit_length,
            ..Self::default()
        }
    }

    /// Switch the bit numbering convention.
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Mark the field as two's complement.
    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    /// Set the linear conversion.
    pub fn scaled(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// Set physical limits.
    pub fn limits(mut self, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }
}

/// Raw translation rule record. Identifiers are plain integers plus an
/// extended flag; lengths are the declared payload sizes of both frames.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleSpec {
    pub source_id: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub source_extended: bool,
    #[cfg_attr(feature = "serde", serde(default = "default_frame_len"))]
    pub source_len: u8,
    pub source: FieldSpec,
    pub destination_id: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub destination_extended: bool,
    #[cfg_attr(feature = "serde", serde(default = "default_frame_len"))]
    pub destination_len: u8,
    pub destination: FieldSpec,
}

#[cfg(feature = "serde")]
fn default_frame_len() -> u8 {
    MAX_CAN_PAYLOAD as u8
}

impl RuleSpec {
    /// Standard-id rule between two full 8-byte frames.
    pub fn new(source_id: u32, source: FieldSpec, destination_id: u32, destination: FieldSpec) -> Self {
        Self {
            source_id,
            source_extended: false,
            source_len: MAX_CAN_PAYLOAD as u8,
            source,
            destination_id,
            destination_extended: false,
            destination_len: MAX_CAN_PAYLOAD as u8,
            destination,
        }
    }
}

//==================================================================================BIT_FIELD
/// Validated bit-field. Construction guarantees `1 <= length <= 64`,
/// `start + length <= 64`, a finite non-zero scale and ordered limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitField {
    byte_order: ByteOrder,
    start_bit: u8,
    length: u8,
    signed: bool,
    scale: f64,
    offset: f64,
    min_value: Option<f64>,
    max_value: Option<f64>,
}

impl BitField {
    /// Validate a raw field against a frame of `frame_len` bytes.
    pub fn from_spec(spec: &FieldSpec, frame_len: u8) -> Result<Self, InvalidRuleError> {
        if frame_len == 0 || frame_len as usize > MAX_CAN_PAYLOAD {
            return Err(InvalidRuleError::FrameLengthOutOfRange { len: frame_len });
        }
        if !(1..=64).contains(&spec.bit_length) {
            return Err(InvalidRuleError::BitLengthOutOfRange {
                length: spec.bit_length,
            });
        }
        if spec.start_bit > 63 {
            return Err(InvalidRuleError::StartBitOutOfRange {
                start: spec.start_bit,
            });
        }
        let (start, length) = (spec.start_bit as u8, spec.bit_length as u8);
        if start as u32 + length as u32 > frame_len as u32 * 8 {
            return Err(InvalidRuleError::FieldPastEndOfFrame {
                start,
                length,
                frame_len,
            });
        }
        let limits_finite = spec.min_value.map_or(true, f64::is_finite)
            && spec.max_value.map_or(true, f64::is_finite);
        if !spec.scale.is_finite() || !spec.offset.is_finite() || !limits_finite {
            return Err(InvalidRuleError::NonFinite);
        }
        if spec.scale == 0.0 {
            return Err(InvalidRuleError::ZeroScale);
        }
        if let (Some(min), Some(max)) = (spec.min_value, spec.max_value) {
            if min > max {
                return Err(InvalidRuleError::InvertedLimits { min, max });
            }
        }

        Ok(Self {
            byte_order: spec.byte_order,
            start_bit: start,
            length,
            signed: spec.signed,
            scale: spec.scale,
            offset: spec.offset,
            min_value: spec.min_value,
            max_value: spec.max_value,
        })
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    #[inline]
    pub fn start_bit(&self) -> u8 {
        self.start_bit
    }

    #[inline]
    pub fn length(&self) -> u8 {
        self.length
    }

    #[inline]
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Optional physical `(min, max)` bounds.
    #[inline]
    pub fn limits(&self) -> (Option<f64>, Option<f64>) {
        (self.min_value, self.max_value)
    }

    /// Inclusive raw range representable by the field.
    pub fn raw_range(&self) -> (i128, i128) {
        let bits = self.length as u32;
        if self.signed {
            let half = 1i128 << (bits - 1);
            (-half, half - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }
}

//==================================================================================TRANSLATION_RULE
/// One validated mapping: a source bit-field copied, through its physical
/// value, into a destination bit-field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationRule {
    source_id: ArbitrationId,
    source: BitField,
    destination_id: ArbitrationId,
    destination: BitField,
    destination_len: u8,
}

impl TranslationRule {
    /// Assemble a rule from validated parts. `destination_len` must hold the destination field.
    pub fn new(
        source_id: ArbitrationId,
        source: BitField,
        destination_id: ArbitrationId,
        destination: BitField,
        destination_len: u8,
    ) -> Result<Self, InvalidRuleError> {
        if destination_len == 0 || destination_len as usize > MAX_CAN_PAYLOAD {
            return Err(InvalidRuleError::FrameLengthOutOfRange {
                len: destination_len,
            });
        }
        let end = destination.start_bit as u32 + destination.length as u32;
        if end > destination_len as u32 * 8 {
            return Err(InvalidRuleError::FieldPastEndOfFrame {
                start: destination.start_bit,
                length: destination.length,
                frame_len: destination_len,
            });
        }
        Ok(Self {
            source_id,
            source,
            destination_id,
            destination,
            destination_len,
        })
    }

    #[inline]
    pub fn source_id(&self) -> ArbitrationId {
        self.source_id
    }

    #[inline]
    pub fn source(&self) -> &BitField {
        &self.source
    }

    #[inline]
    pub fn destination_id(&self) -> ArbitrationId {
        self.destination_id
    }

    #[inline]
    pub fn destination(&self) -> &BitField {
        &self.destination
    }

    /// Payload length of the emitted destination frame.
    #[inline]
    pub fn destination_len(&self) -> u8 {
        self.destination_len
    }
}

impl TryFrom<&RuleSpec> for TranslationRule {
    type Error = InvalidRuleError;

    fn try_from(spec: &RuleSpec) -> Result<Self, Self::Error> {
        let source_id = ArbitrationId::from_raw(spec.source_id, spec.source_extended)?;
        let destination_id =
            ArbitrationId::from_raw(spec.destination_id, spec.destination_extended)?;
        let source = BitField::from_spec(&spec.source, spec.source_len)?;
        let destination = BitField::from_spec(&spec.destination, spec.destination_len)?;
        Self::new(
            source_id,
            source,
            destination_id,
            destination,
            spec.destination_len,
        )
    }
}

//==================================================================================TESTS
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CanIdError;

    #[test]
    /// Lengths outside 1..=64 are refused.
    fn test_bit_length_bounds() {
        assert_eq!(
            BitField::from_spec(&FieldSpec::new(0, 0), 8),
            Err(InvalidRuleError::BitLengthOutOfRange { length: 0 })
        );
        assert_eq!(
            BitField::from_spec(&FieldSpec::new(0, 65), 8),
            Err(InvalidRuleError::BitLengthOutOfRange { length: 65 })
        );
        assert!(BitField::from_spec(&FieldSpec::new(0, 64), 8).is_ok());
    }

    #[test]
    /// A field must fit inside the declared frame, not just inside 64 bits.
    fn test_field_must_fit_frame() {
        assert_eq!(
            BitField::from_spec(&FieldSpec::new(60, 8), 8),
            Err(InvalidRuleError::FieldPastEndOfFrame {
                start: 60,
                length: 8,
                frame_len: 8
            })
        );
        assert!(BitField::from_spec(&FieldSpec::new(8, 8), 2).is_ok());
        assert!(BitField::from_spec(&FieldSpec::new(9, 8), 2).is_err());
        assert_eq!(
            BitField::from_spec(&FieldSpec::new(64, 1), 8),
            Err(InvalidRuleError::StartBitOutOfRange { start: 64 })
        );
    }

    #[test]
    /// Scale must be usable in both directions.
    fn test_scale_checks() {
        let zero = FieldSpec::new(0, 8).scaled(0.0, 0.0);
        assert_eq!(BitField::from_spec(&zero, 8), Err(InvalidRuleError::ZeroScale));
        let nan = FieldSpec::new(0, 8).scaled(f64::NAN, 0.0);
        assert_eq!(BitField::from_spec(&nan, 8), Err(InvalidRuleError::NonFinite));
        let inverted = FieldSpec::new(0, 8).limits(Some(10.0), Some(1.0));
        assert!(matches!(
            BitField::from_spec(&inverted, 8),
            Err(InvalidRuleError::InvertedLimits { .. })
        ));
    }

    #[test]
    /// Raw ranges follow the field width and signedness.
    fn test_raw_range() {
        let u12 = BitField::from_spec(&FieldSpec::new(0, 12), 8).unwrap();
        assert_eq!(u12.raw_range(), (0, 4095));
        let i8_field = BitField::from_spec(&FieldSpec::new(0, 8).signed(), 8).unwrap();
        assert_eq!(i8_field.raw_range(), (-128, 127));
        let u64_field = BitField::from_spec(&FieldSpec::new(0, 64), 8).unwrap();
        assert_eq!(u64_field.raw_range(), (0, u64::MAX as i128));
    }

    #[test]
    /// Identifier and shape errors surface from the raw record conversion.
    fn test_rule_from_spec() {
        let ok = RuleSpec::new(0x100, FieldSpec::new(0, 8), 0x200, FieldSpec::new(8, 8));
        let rule = TranslationRule::try_from(&ok).unwrap();
        assert_eq!(rule.source_id(), ArbitrationId::Standard(0x100));
        assert_eq!(rule.destination_id(), ArbitrationId::Standard(0x200));
        assert_eq!(rule.destination_len(), 8);

        let bad_id = RuleSpec::new(0x900, FieldSpec::new(0, 8), 0x200, FieldSpec::new(0, 8));
        assert!(matches!(
            TranslationRule::try_from(&bad_id),
            Err(InvalidRuleError::Id(CanIdError::StandardOutOfRange { raw: 0x900 }))
        ));

        let mut short = ok;
        short.destination_len = 1;
        assert!(matches!(
            TranslationRule::try_from(&short),
            Err(InvalidRuleError::FieldPastEndOfFrame { frame_len: 1, .. })
        ));
    }
}
