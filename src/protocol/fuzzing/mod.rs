//! Adaptive fuzzing of unmapped traffic.
//!
//! Every identifier without a translation rule gets a small state machine:
//!
//! ```text
//! unseen ──first sighting──▶ observed ──threshold + delay──▶ fuzzing ──cap / budget──▶ exhausted
//! ```
//!
//! While fuzzing, each new sighting may produce one synthetic frame: the
//! last-seen payload with one untried [`Mutation`] applied. Emissions are
//! bounded per identifier (`mutation_cap`, `emission_budget`,
//! `per_id_interval_ms`) and globally (`max_mutations_per_window` per
//! `rate_window_ms`), so the target bus is never flooded.
//!
//! The fuzzer is owned by the bridge runner; it never sends anything itself.
//! `observe` hands back a [`PendingMutation`] and the runner reports the
//! outcome through `record_sent` / `record_failure`.
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::ArbitrationId;
use alloc::collections::BTreeMap;
use embassy_time::{Duration, Instant};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub mod mutation;
pub mod rate_budget;
pub mod state;

pub use mutation::Mutation;
pub use rate_budget::EmissionWindow;
pub use state::{FuzzSnapshot, FuzzStatus};
use state::FuzzState;

//==================================================================================CONFIG
/// Fuzzer tuning. Disabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FuzzConfig {
    /// Master switch. Identifiers are still observed while disabled.
    pub enabled: bool,
    /// Sightings required before an identifier may be fuzzed.
    pub observation_threshold: u32,
    /// Minimum time between first sighting and the first mutation (ms).
    pub min_observation_ms: u32,
    /// Distinct mutations sent per identifier before it is exhausted.
    pub mutation_cap: u32,
    /// Attempts (including failed sends) per identifier before it is exhausted.
    pub emission_budget: u32,
    /// Minimum gap between two attempts on the same identifier (ms).
    pub per_id_interval_ms: u32,
    /// Global attempt ceiling per `rate_window_ms`.
    pub max_mutations_per_window: u32,
    /// Length of the sliding window for the global ceiling (ms).
    pub rate_window_ms: u32,
    /// Largest nudge applied to a byte (capped at 127).
    pub max_delta: u8,
    /// Seed of the candidate picker; same seed, same traffic, same mutations.
    pub seed: u64,
}

impl FuzzConfig {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            observation_threshold: 2,
            min_observation_ms: 0,
            mutation_cap: 16,
            emission_budget: 32,
            per_id_interval_ms: 100,
            max_mutations_per_window: 20,
            rate_window_ms: 1_000,
            max_delta: 4,
            seed: 0x5EED,
        }
    }

    /// Same configuration, switched on.
    pub const fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================FUZZER
/// Synthetic frame the runner should send, and the mutation that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub frame: CanFrame,
    pub mutation: Mutation,
}

/// Owner of every per-identifier state and of the global emission window.
pub struct Fuzzer {
    config: FuzzConfig,
    states: BTreeMap<ArbitrationId, FuzzState>,
    window: EmissionWindow,
    rng: SmallRng,
}

impl Fuzzer {
    pub fn new(config: FuzzConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
            window: EmissionWindow::new(),
            rng: SmallRng::seed_from_u64(config.seed),
        }
    }

    #[inline]
    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    /// Swap the configuration; applies from the next sighting on.
    /// A new seed restarts the candidate picker.
    pub fn reconfigure(&mut self, config: FuzzConfig) {
        if config.seed != self.config.seed {
            self.rng = SmallRng::seed_from_u64(config.seed);
        }
        self.config = config;
    }

    /// Feed one unmapped frame seen at `now`.
    ///
    /// Returns the synthetic frame to send, if this sighting earns one.
    pub fn observe(&mut self, frame: &CanFrame, now: Instant) -> Option<PendingMutation> {
        let id = frame.arbitration_id();
        let config = self.config;

        let state = match self.states.get_mut(&id) {
            Some(state) => state,
            None => {
                let mut state = FuzzState::new(now);
                state.sighted(frame.payload());
                self.states.insert(id, state);

                #[cfg(feature = "defmt")]
                defmt::debug!("Unmapped id {} observed", id);
                return None;
            }
        };
        state.sighted(frame.payload());

        match state.status {
            FuzzStatus::Unseen | FuzzStatus::Observed => {
                let observed_for = now.saturating_duration_since(state.first_seen);
                if config.enabled
                    && state.sightings >= config.observation_threshold
                    && observed_for >= Duration::from_millis(config.min_observation_ms as u64)
                {
                    state.status = FuzzStatus::Fuzzing;

                    #[cfg(feature = "defmt")]
                    defmt::info!(
                        "Fuzzing {} after {} sightings",
                        id,
                        state.sightings
                    );
                } else {
                    state.status = FuzzStatus::Observed;
                }
                None
            }
            FuzzStatus::Fuzzing => {
                if exhausted(state, &config) {
                    state.status = FuzzStatus::Exhausted;

                    #[cfg(feature = "defmt")]
                    defmt::info!("Fuzzing {} exhausted", id);
                    return None;
                }
                if !config.enabled {
                    return None;
                }
                if let Some(last) = state.last_emission {
                    let gap = Duration::from_millis(config.per_id_interval_ms as u64);
                    if now.saturating_duration_since(last) < gap {
                        return None;
                    }
                }

                let Some(mutation) = pick_untried(state, &config, &mut self.rng) else {
                    state.status = FuzzStatus::Exhausted;

                    #[cfg(feature = "defmt")]
                    defmt::info!("Fuzzing {} exhausted: no untried candidate", id);
                    return None;
                };

                if !self.window.try_acquire(
                    now,
                    config.max_mutations_per_window,
                    config.rate_window_ms,
                ) {
                    #[cfg(feature = "defmt")]
                    defmt::trace!("Global mutation ceiling reached, {} waits", id);
                    return None;
                }

                let mut data = state.last_payload;
                let len = state.last_len as usize;
                mutation.apply(&mut data[..len]);
                state.attempts = state.attempts.saturating_add(1);
                state.last_emission = Some(now);

                Some(PendingMutation {
                    frame: CanFrame::from_parts(id, data, len, now),
                    mutation,
                })
            }
            FuzzStatus::Exhausted => None,
        }
    }

    /// The synthetic frame built with `mutation` reached the bus.
    pub fn record_sent(&mut self, id: ArbitrationId, mutation: Mutation) {
        let cap = self.config.mutation_cap as usize;
        if let Some(state) = self.states.get_mut(&id) {
            state.tried.insert(mutation);
            state.emitted = state.emitted.saturating_add(1);
            if state.tried.len() >= cap && state.status == FuzzStatus::Fuzzing {
                state.status = FuzzStatus::Exhausted;

                #[cfg(feature = "defmt")]
                defmt::info!("Fuzzing {} exhausted: mutation cap reached", id);
            }
        }
    }

    /// The synthetic frame for `id` could not be sent. Status and tried set
    /// are left as they were.
    pub fn record_failure(&mut self, id: ArbitrationId) {
        if let Some(state) = self.states.get_mut(&id) {
            state.send_failures = state.send_failures.saturating_add(1);
        }
    }

    /// State of `id`; unknown ids report [`FuzzStatus::Unseen`].
    pub fn snapshot(&self, id: ArbitrationId) -> FuzzSnapshot {
        self.states
            .get(&id)
            .map(FuzzState::snapshot)
            .unwrap_or_default()
    }

    /// Snapshot of every tracked identifier.
    pub fn states(&self) -> impl Iterator<Item = (ArbitrationId, FuzzSnapshot)> + '_ {
        self.states.iter().map(|(id, state)| (*id, state.snapshot()))
    }

    /// Number of tracked identifiers.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Forget every identifier and restart the picker from the seed.
    pub fn reset(&mut self) {
        self.states.clear();
        self.window.clear();
        self.rng = SmallRng::seed_from_u64(self.config.seed);
    }
}

fn exhausted(state: &FuzzState, config: &FuzzConfig) -> bool {
    state.tried.len() >= config.mutation_cap as usize || state.attempts >= config.emission_budget
}

/// Random start, then linear probe over the candidate space.
fn pick_untried(state: &FuzzState, config: &FuzzConfig, rng: &mut SmallRng) -> Option<Mutation> {
    let len = state.last_len as usize;
    let candidates = Mutation::candidate_count(len, config.max_delta);
    if candidates == 0 {
        return None;
    }
    let start = rng.gen_range(0..candidates);
    (0..candidates)
        .filter_map(|step| Mutation::from_index((start + step) % candidates, len, config.max_delta))
        .find(|mutation| !state.tried.contains(mutation))
}
