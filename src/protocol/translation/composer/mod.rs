//! Destination composer: turns one source frame into the destination frames
//! its rules feed.
//!
//! The composer remembers the last payload it built for every destination
//! (its *image*). Each pass starts from that image, so a destination fed by
//! several source ids carries the latest bits of every rule. Bits no rule
//! claims are always zero. When the table is edited, an image only keeps the
//! bits of rules present unchanged before and after the edit; everything else
//! drops to zero until its new owner writes it. A table reset drops the images.
use super::table::{field_mask, TranslationTable};
use crate::core::TranslationRule;
use crate::error::OutOfRangeWarning;
use crate::infra::codec::field::{compose, compose_raw, extract, extract_int, same_conversion};
use crate::protocol::transport::can_frame::{CanFrame, MAX_CAN_PAYLOAD};
use crate::protocol::transport::can_id::ArbitrationId;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// What [`DestinationComposer::sync`] had to do to follow the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Same table as last time.
    Unchanged,
    /// Rules were edited; images kept only the bits of surviving rules.
    Edited,
    /// The rule set was swapped or cleared; images were dropped.
    Reset,
}

/// Output of one translation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    /// One frame per destination with at least one applied rule, in rule order.
    pub frames: Vec<CanFrame>,
    /// Values saturated while composing, with the destination they went to.
    pub warnings: Vec<(ArbitrationId, OutOfRangeWarning)>,
    /// Rules skipped because the source payload was too short for them.
    pub skipped: u32,
}

/// Per-destination images and the table version they follow.
#[derive(Debug, Default)]
pub struct DestinationComposer {
    images: BTreeMap<ArbitrationId, [u8; MAX_CAN_PAYLOAD]>,
    /// Rules of the table the images were last synced with.
    owners: Vec<TranslationRule>,
    generation: u64,
    epoch: u64,
}

impl DestinationComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the images in line with `table`.
    pub fn sync(&mut self, table: &TranslationTable) -> SyncOutcome {
        if table.epoch() != self.epoch {
            self.images.clear();
            self.owners = table.rules().copied().collect();
            self.epoch = table.epoch();
            self.generation = table.generation();
            return SyncOutcome::Reset;
        }
        if table.generation() == self.generation {
            return SyncOutcome::Unchanged;
        }

        let owners = &self.owners;
        self.images.retain(|destination, image| {
            if table.layout(*destination).is_none() {
                return false;
            }
            // A rule keeps its bits only if it was already there, unchanged.
            let mut kept = [0u8; MAX_CAN_PAYLOAD];
            for rule in table
                .rules()
                .filter(|r| r.destination_id() == *destination && owners.contains(r))
            {
                for (byte, bits) in kept.iter_mut().zip(field_mask(rule.destination()).iter()) {
                    *byte |= bits;
                }
            }
            for (byte, mask) in image.iter_mut().zip(kept.iter()) {
                *byte &= mask;
            }
            true
        });
        self.owners = table.rules().copied().collect();
        self.generation = table.generation();
        SyncOutcome::Edited
    }

    /// Last payload built for `destination`, if any.
    pub fn image(&self, destination: ArbitrationId) -> Option<&[u8; MAX_CAN_PAYLOAD]> {
        self.images.get(&destination)
    }

    /// Drop every image.
    pub fn reset(&mut self) {
        self.images.clear();
    }

    /// Apply the rules of `frame`'s id and build the destination frames.
    ///
    /// The emitted frames carry the source frame's timestamp. Callers should
    /// [`sync`](Self::sync) with `table` first.
    pub fn translate(&mut self, frame: &CanFrame, table: &TranslationTable) -> Translation {
        let rules = table.lookup(frame.arbitration_id());
        let mut translation = Translation::default();

        // Destinations in order of their first rule.
        let mut destinations: Vec<(ArbitrationId, u8)> = Vec::new();
        for rule in rules {
            let destination = rule.destination_id();
            if !destinations.iter().any(|(id, _)| *id == destination) {
                destinations.push((destination, rule.destination_len()));
            }
        }

        for (destination, frame_len) in destinations {
            let mut image = self
                .images
                .get(&destination)
                .copied()
                .unwrap_or([0; MAX_CAN_PAYLOAD]);
            let mut applied = 0usize;

            for rule in rules.iter().filter(|r| r.destination_id() == destination) {
                match apply_rule(rule, frame.payload(), &mut image) {
                    Ok(warning) => {
                        applied += 1;
                        if let Some(warning) = warning {
                            #[cfg(feature = "defmt")]
                            defmt::warn!(
                                "Value {} saturated to {} for {}",
                                warning.requested,
                                warning.applied,
                                destination
                            );
                            translation.warnings.push((destination, warning));
                        }
                    }
                    Err(()) => {
                        #[cfg(feature = "defmt")]
                        defmt::debug!(
                            "Rule skipped: {} carries {} bytes, field needs bit {}",
                            frame.arbitration_id(),
                            frame.len(),
                            rule.source().start_bit() + rule.source().length()
                        );
                        translation.skipped += 1;
                    }
                }
            }

            if applied == 0 {
                continue;
            }
            self.images.insert(destination, image);
            translation.frames.push(CanFrame::from_parts(
                destination,
                image,
                frame_len as usize,
                frame.timestamp(),
            ));
        }

        translation
    }
}

/// Copy one rule's value from `payload` into `image`.
/// `Err(())` when the source payload is too short for the rule's field.
fn apply_rule(
    rule: &TranslationRule,
    payload: &[u8],
    image: &mut [u8; MAX_CAN_PAYLOAD],
) -> Result<Option<OutOfRangeWarning>, ()> {
    // Destination fields are validated against the frame length at rule construction.
    if same_conversion(rule.source(), rule.destination()) {
        // Integer copy: exact for fields wider than an f64 mantissa.
        let raw = extract_int(payload, rule.source()).map_err(|_| ())?;
        return compose_raw(raw, rule.destination(), image).map_err(|_| ());
    }
    let value = extract(payload, rule.source()).map_err(|_| ())?;
    compose(value, rule.destination(), image).map_err(|_| ())
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
