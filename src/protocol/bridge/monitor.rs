//! Inspection state shared between the bridge runner and its editors:
//! pipeline counters, published fuzzing snapshots, the live fuzz
//! configuration and the stop signal.
//!
//! Everything here is behind short blocking critical sections; the runner
//! never awaits while holding one.
use crate::protocol::fuzzing::{FuzzConfig, FuzzSnapshot};
use crate::protocol::transport::can_id::ArbitrationId;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

//==================================================================================STATS
/// Last transport fault seen by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FaultKind {
    /// The source bus failed to deliver a frame.
    Read,
    /// The target bus refused a frame.
    Send,
    /// The target bus did not complete a send in time.
    SendTimeout,
}

/// Running counters of one bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineStats {
    /// Frames read from the source bus.
    pub frames_received: u64,
    /// Source frames that matched at least one rule.
    pub frames_translated: u64,
    /// Translated frames handed to the target bus successfully.
    pub frames_emitted: u64,
    /// Source frames without any rule.
    pub unmapped: u64,
    pub read_errors: u64,
    /// Sends refused by the target bus (translated or synthetic).
    pub send_failures: u64,
    /// Sends that hit the send timeout.
    pub send_timeouts: u64,
    /// Values saturated while composing.
    pub clamped_values: u64,
    /// Rules skipped because the source frame was too short.
    pub skipped_rules: u64,
    /// Synthetic frames sent successfully.
    pub mutations_emitted: u64,
    /// Synthetic frames that failed to send.
    pub mutation_failures: u64,
    /// Emitted-frame events dropped because the feed was full.
    pub monitor_overflows: u64,
    pub last_fault: Option<FaultKind>,
}

impl PipelineStats {
    pub const fn new() -> Self {
        Self {
            frames_received: 0,
            frames_translated: 0,
            frames_emitted: 0,
            unmapped: 0,
            read_errors: 0,
            send_failures: 0,
            send_timeouts: 0,
            clamped_values: 0,
            skipped_rules: 0,
            mutations_emitted: 0,
            mutation_failures: 0,
            monitor_overflows: 0,
            last_fault: None,
        }
    }
}

//==================================================================================MONITOR
#[derive(Clone, Copy)]
struct ConfigSlot {
    revision: u32,
    config: FuzzConfig,
}

/// Shared inspection state of one bridge. Usually a `static`.
pub struct BridgeMonitor<M: RawMutex> {
    stats: Mutex<M, Cell<PipelineStats>>,
    fuzz_config: Mutex<M, Cell<ConfigSlot>>,
    fuzz_states: Mutex<M, RefCell<BTreeMap<ArbitrationId, FuzzSnapshot>>>,
    stop: Signal<M, ()>,
}

impl<M: RawMutex> BridgeMonitor<M> {
    pub const fn new(config: FuzzConfig) -> Self {
        Self {
            stats: Mutex::new(Cell::new(PipelineStats::new())),
            fuzz_config: Mutex::new(Cell::new(ConfigSlot {
                revision: 0,
                config,
            })),
            fuzz_states: Mutex::new(RefCell::new(BTreeMap::new())),
            stop: Signal::new(),
        }
    }

    /// Copy of the counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats.lock(Cell::get)
    }

    pub(crate) fn update_stats(&self, update: impl FnOnce(&mut PipelineStats)) {
        self.stats.lock(|cell| {
            let mut stats = cell.get();
            update(&mut stats);
            cell.set(stats);
        });
    }

    /// Current fuzz configuration.
    pub fn fuzz_config(&self) -> FuzzConfig {
        self.fuzz_config.lock(|cell| cell.get().config)
    }

    /// Replace the fuzz configuration; the runner applies it at its next frame.
    pub fn set_fuzz_config(&self, config: FuzzConfig) {
        self.fuzz_config.lock(|cell| {
            let slot = cell.get();
            cell.set(ConfigSlot {
                revision: slot.revision.wrapping_add(1),
                config,
            });
        });
    }

    /// Flip only the master switch.
    pub fn set_fuzzing_enabled(&self, enabled: bool) {
        let config = FuzzConfig {
            enabled,
            ..self.fuzz_config()
        };
        self.set_fuzz_config(config);
    }

    /// Configuration if it changed since `revision` (always, for `None`).
    pub(crate) fn fuzz_config_since(&self, revision: Option<u32>) -> Option<(u32, FuzzConfig)> {
        self.fuzz_config.lock(|cell| {
            let slot = cell.get();
            (revision != Some(slot.revision)).then_some((slot.revision, slot.config))
        })
    }

    /// Published fuzzing state of `id`; unknown ids report `Unseen`.
    pub fn fuzz_state(&self, id: ArbitrationId) -> FuzzSnapshot {
        self.fuzz_states
            .lock(|states| states.borrow().get(&id).copied())
            .unwrap_or_default()
    }

    /// Every published fuzzing state, by identifier.
    ///
    /// The vector is allocated outside the lock; if states were added
    /// meanwhile the copy starts over with the new size.
    pub fn fuzz_states(&self) -> Vec<(ArbitrationId, FuzzSnapshot)> {
        loop {
            let len = self.fuzz_states.lock(|states| states.borrow().len());
            let mut out = Vec::with_capacity(len);
            let filled = self.fuzz_states.lock(|states| {
                let states = states.borrow();
                if states.len() > out.capacity() {
                    return false;
                }
                out.extend(states.iter().map(|(id, snapshot)| (*id, *snapshot)));
                true
            });
            if filled {
                return out;
            }
        }
    }

    pub(crate) fn publish_fuzz_state(&self, id: ArbitrationId, snapshot: FuzzSnapshot) {
        self.fuzz_states.lock(|states| {
            states.borrow_mut().insert(id, snapshot);
        });
    }

    pub(crate) fn clear_fuzz_states(&self) {
        self.fuzz_states.lock(|states| states.borrow_mut().clear());
    }

    /// Ask the runner to stop after the frame it is handling.
    pub fn request_stop(&self) {
        self.stop.signal(());
    }

    pub(crate) fn stop_signal(&self) -> &Signal<M, ()> {
        &self.stop
    }
}

impl<M: RawMutex> Default for BridgeMonitor<M> {
    fn default() -> Self {
        Self::new(FuzzConfig::new())
    }
}
