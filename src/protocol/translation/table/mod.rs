//! Translation table: validated rules indexed by source identifier, plus the
//! bit occupancy of every destination frame.
//!
//! The occupancy layouts are what keeps composition well defined: two rules
//! feeding the same destination can never claim the same bit, and they always
//! agree on the destination frame length. Every edit is checked against them
//! and leaves the table untouched when refused.
use crate::core::{BitField, ByteOrder, RuleSpec, TranslationRule};
use crate::error::{ConflictError, InvalidRuleError, RuleLoadError};
use crate::protocol::transport::can_frame::MAX_CAN_PAYLOAD;
use crate::protocol::transport::can_id::ArbitrationId;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

//==================================================================================LAYOUT
/// Bits claimed on one destination frame by the rules that feed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationLayout {
    occupied: [u8; MAX_CAN_PAYLOAD],
    frame_len: u8,
    rule_count: usize,
}

impl DestinationLayout {
    /// Bit mask of every claimed bit, in payload order.
    #[inline]
    pub fn occupied(&self) -> &[u8; MAX_CAN_PAYLOAD] {
        &self.occupied
    }

    /// Payload length shared by every rule of this destination.
    #[inline]
    pub fn frame_len(&self) -> u8 {
        self.frame_len
    }

    /// Number of rules writing into this destination.
    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    fn overlaps(&self, mask: &[u8; MAX_CAN_PAYLOAD]) -> bool {
        self.occupied.iter().zip(mask.iter()).any(|(a, b)| a & b != 0)
    }
}

/// Physical payload bits covered by `field`.
pub fn field_mask(field: &BitField) -> [u8; MAX_CAN_PAYLOAD] {
    let mut mask = [0u8; MAX_CAN_PAYLOAD];
    let start = field.start_bit() as usize;
    for position in start..start + field.length() as usize {
        let bit = match field.byte_order() {
            ByteOrder::LittleEndian => position % 8,
            ByteOrder::BigEndian => 7 - position % 8,
        };
        if let Some(byte) = mask.get_mut(position / 8) {
            *byte |= 1 << bit;
        }
    }
    mask
}

//==================================================================================TABLE
/// Ordered rule set. Rules of one source keep their insertion order, which is
/// also the order they are applied in.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    by_source: BTreeMap<ArbitrationId, Vec<TranslationRule>>,
    layouts: BTreeMap<ArbitrationId, DestinationLayout>,
    /// Bumped on every successful edit.
    generation: u64,
    /// Bumped when the whole rule set is swapped or cleared.
    epoch: u64,
}

impl TranslationTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and load raw rule records. The first bad record aborts the
    /// load and is named in the error.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, RuleLoadError> {
        let mut table = Self::new();
        for (index, spec) in specs.iter().enumerate() {
            let reject = |reason: InvalidRuleError| RuleLoadError {
                index,
                source_id: spec.source_id,
                reason,
            };
            let rule = TranslationRule::try_from(spec).map_err(reject)?;
            table
                .insert(rule)
                .map_err(|conflict| reject(InvalidRuleError::Conflict(conflict)))?;
        }
        Ok(table)
    }

    /// Load already validated rules, checking them against each other.
    pub fn from_rules<I>(rules: I) -> Result<Self, RuleLoadError>
    where
        I: IntoIterator<Item = TranslationRule>,
    {
        let mut table = Self::new();
        for (index, rule) in rules.into_iter().enumerate() {
            table.insert(rule).map_err(|conflict| RuleLoadError {
                index,
                source_id: rule.source_id().raw(),
                reason: InvalidRuleError::Conflict(conflict),
            })?;
        }
        Ok(table)
    }

    /// Swap the whole rule set for `specs`. Starts a new epoch on success.
    pub fn reload(&mut self, specs: &[RuleSpec]) -> Result<(), RuleLoadError> {
        let mut fresh = Self::from_specs(specs)?;
        fresh.generation = self.generation + 1;
        fresh.epoch = self.epoch + 1;
        *self = fresh;

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Rule table loaded: {} rules, epoch {}",
            self.len(),
            self.epoch
        );
        Ok(())
    }

    /// Drop every rule. Starts a new epoch.
    pub fn clear(&mut self) {
        self.by_source.clear();
        self.layouts.clear();
        self.generation += 1;
        self.epoch += 1;
    }

    /// Rules for `source`, in insertion order. Empty when the id is unmapped.
    pub fn lookup(&self, source: ArbitrationId) -> &[TranslationRule] {
        self.by_source
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `true` when at least one rule reads `source`.
    pub fn is_mapped(&self, source: ArbitrationId) -> bool {
        self.by_source.contains_key(&source)
    }

    /// Append a rule after the existing rules of its source.
    pub fn insert(&mut self, rule: TranslationRule) -> Result<(), ConflictError> {
        let destination = rule.destination_id();
        if let Some(layout) = self.layouts.get(&destination) {
            check_against(layout, &rule)?;
        }

        self.by_source.entry(rule.source_id()).or_default().push(rule);
        self.refresh_layout(destination);
        self.generation += 1;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Rule inserted: {} -> {} bits {}+{}",
            rule.source_id(),
            destination,
            rule.destination().start_bit(),
            rule.destination().length()
        );
        Ok(())
    }

    /// Swap every rule of the `(source, destination)` pair for `rule`, at the
    /// position of the first one. Behaves as [`insert`](Self::insert) when the
    /// pair has no rule yet.
    pub fn replace(&mut self, rule: TranslationRule) -> Result<(), ConflictError> {
        let source = rule.source_id();
        let destination = rule.destination_id();
        let position = self
            .by_source
            .get(&source)
            .and_then(|rules| rules.iter().position(|r| r.destination_id() == destination));
        let Some(position) = position else {
            return self.insert(rule);
        };

        // Conflicts are checked against what survives the swap.
        if let Some(remaining) = self.scan_destination(destination, |r| r.source_id() != source) {
            check_against(&remaining, &rule)?;
        }

        if let Some(rules) = self.by_source.get_mut(&source) {
            let previous = core::mem::take(rules);
            for (index, existing) in previous.into_iter().enumerate() {
                if index == position {
                    rules.push(rule);
                } else if existing.destination_id() != destination {
                    rules.push(existing);
                }
            }
        }
        self.refresh_layout(destination);
        self.generation += 1;
        Ok(())
    }

    /// Remove every rule of the `(source, destination)` pair.
    /// Returns `false` (and changes nothing) when there was none.
    pub fn remove(&mut self, source: ArbitrationId, destination: ArbitrationId) -> bool {
        let Some(rules) = self.by_source.get_mut(&source) else {
            return false;
        };
        let before = rules.len();
        rules.retain(|r| r.destination_id() != destination);
        if rules.len() == before {
            return false;
        }
        if rules.is_empty() {
            self.by_source.remove(&source);
        }
        self.refresh_layout(destination);
        self.generation += 1;
        true
    }

    /// Occupancy of `destination`, if any rule writes into it.
    pub fn layout(&self, destination: ArbitrationId) -> Option<&DestinationLayout> {
        self.layouts.get(&destination)
    }

    /// All destination layouts, by destination id.
    pub fn layouts(&self) -> impl Iterator<Item = (ArbitrationId, &DestinationLayout)> {
        self.layouts.iter().map(|(id, layout)| (*id, layout))
    }

    /// Every rule, grouped by source id then insertion order.
    pub fn rules(&self) -> impl Iterator<Item = &TranslationRule> {
        self.by_source.values().flatten()
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Rebuild the layout of `destination` from the rules currently stored.
    fn refresh_layout(&mut self, destination: ArbitrationId) {
        match self.scan_destination(destination, |_| true) {
            Some(layout) => {
                self.layouts.insert(destination, layout);
            }
            None => {
                self.layouts.remove(&destination);
            }
        }
    }

    /// Layout made of the rules of `destination` accepted by `keep`.
    fn scan_destination<F>(&self, destination: ArbitrationId, keep: F) -> Option<DestinationLayout>
    where
        F: Fn(&TranslationRule) -> bool,
    {
        let mut layout: Option<DestinationLayout> = None;
        for rule in self
            .rules()
            .filter(|r| r.destination_id() == destination && keep(r))
        {
            let mask = field_mask(rule.destination());
            let entry = layout.get_or_insert(DestinationLayout {
                occupied: [0; MAX_CAN_PAYLOAD],
                frame_len: rule.destination_len(),
                rule_count: 0,
            });
            for (byte, bits) in entry.occupied.iter_mut().zip(mask.iter()) {
                *byte |= bits;
            }
            entry.rule_count += 1;
        }
        layout
    }
}

/// Refuse `rule` when it disagrees with `layout` on length or bits.
fn check_against(layout: &DestinationLayout, rule: &TranslationRule) -> Result<(), ConflictError> {
    let destination = rule.destination_id();
    if layout.frame_len != rule.destination_len() {
        return Err(ConflictError::FrameLengthMismatch {
            destination,
            existing: layout.frame_len,
            requested: rule.destination_len(),
        });
    }
    if layout.overlaps(&field_mask(rule.destination())) {
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "Rule refused: {} bits {}+{} overlap an existing rule",
            destination,
            rule.destination().start_bit(),
            rule.destination().length()
        );
        return Err(ConflictError::OverlappingDestination {
            destination,
            start: rule.destination().start_bit(),
            length: rule.destination().length(),
        });
    }
    Ok(())
}
