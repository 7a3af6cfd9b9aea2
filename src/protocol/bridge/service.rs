//! Bridge service: reads the source bus, translates mapped frames onto the
//! target bus and hands unmapped ones to the fuzzer.
//!
//! The service splits into:
//!
//! * an editor handle (`BridgeEditor`) to edit rules and inspect the bridge
//!   while it runs;
//! * an optional frame feed (`EmittedFrames`) reporting every frame written
//!   to the target bus, translated or synthetic;
//! * the runner (`BridgeRunner`) that owns both buses and drives the loop.
//!
//! The rule table, the monitor and the feed channel are provided by the
//! caller (typically as `static`s), so several tasks can share them.
use core::fmt::Debug;

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, Receiver},
};
use embassy_time::Instant;
use futures_util::{future::select, future::Either, pin_mut};

use super::monitor::{BridgeMonitor, FaultKind, PipelineStats};
use crate::core::{RuleSpec, TranslationRule};
use crate::error::{BusReadError, ConflictError, InvalidRuleError, RuleLoadError, SendFailure};
use crate::protocol::fuzzing::{FuzzConfig, FuzzSnapshot, Fuzzer, Mutation};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::ArbitrationId;
use crate::protocol::transport::traits::{can_bus::CanBus, korri_timer::KorriTimer};
use crate::protocol::transport::{CAN_SEND_TIMEOUT_MS, READ_ERROR_BACKOFF_MS};
use crate::protocol::translation::composer::{DestinationComposer, SyncOutcome};
use crate::protocol::translation::shared_table::SharedTable;
use crate::protocol::translation::table::TranslationTable;
use alloc::sync::Arc;
use alloc::vec::Vec;

//==================================================================================CONFIG
/// Transport timing of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TranslatorConfig {
    /// Longest wait for one send on the target bus (ms).
    pub send_timeout_ms: u32,
    /// Pause after a failed receive on the source bus (ms).
    pub read_error_backoff_ms: u32,
}

impl TranslatorConfig {
    pub const fn new() -> Self {
        Self {
            send_timeout_ms: CAN_SEND_TIMEOUT_MS,
            read_error_backoff_ms: READ_ERROR_BACKOFF_MS,
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================FEED
/// Origin of a frame written to the target bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmittedKind {
    /// Built by the rules of source frame `source`.
    Translated { source: ArbitrationId },
    /// Built by the fuzzer.
    Synthetic { mutation: Mutation },
}

/// Frame written to the target bus, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFrame {
    pub kind: EmittedKind,
    pub frame: CanFrame,
}

impl EmittedFrame {
    /// `true` for frames built by the fuzzer.
    pub fn is_synthetic(&self) -> bool {
        matches!(self.kind, EmittedKind::Synthetic { .. })
    }
}

//==================================================================================SERVICE
/// Service assembling the bridge components.
pub struct BridgeService<'a, S, D, T, M, const CAP: usize>
where
    S: CanBus,
    D: CanBus,
    T: KorriTimer,
    M: RawMutex,
{
    source: S,
    target: D,
    timer: T,
    config: TranslatorConfig,
    table: &'a SharedTable<M>,
    monitor: &'a BridgeMonitor<M>,
    frame_channel: Option<&'a Channel<M, EmittedFrame, CAP>>,
}

impl<'a, S, D, T, M, const CAP: usize> BridgeService<'a, S, D, T, M, CAP>
where
    S: CanBus,
    D: CanBus,
    T: KorriTimer,
    M: RawMutex,
{
    pub fn new(
        source: S,
        target: D,
        timer: T,
        config: TranslatorConfig,
        table: &'a SharedTable<M>,
        monitor: &'a BridgeMonitor<M>,
        frame_channel: Option<&'a Channel<M, EmittedFrame, CAP>>,
    ) -> Self {
        Self {
            source,
            target,
            timer,
            config,
            table,
            monitor,
            frame_channel,
        }
    }

    /// Split into editor/feed/runner components.
    pub fn into_parts(self) -> BridgeParts<'a, S, D, T, M, CAP> {
        let editor = BridgeEditor::new(self.table, self.monitor);
        let frames = self.frame_channel.map(|channel| EmittedFrames {
            receiver: channel.receiver(),
        });
        BridgeParts {
            editor,
            frames,
            runner: BridgeRunner {
                source: self.source,
                target: self.target,
                timer: self.timer,
                config: self.config,
                table: self.table,
                monitor: self.monitor,
                frame_channel: self.frame_channel,
                composer: DestinationComposer::new(),
                fuzzer: Fuzzer::new(self.monitor.fuzz_config()),
                config_revision: None,
            },
        }
    }
}

/// Bundle returned by [`BridgeService::into_parts`].
pub struct BridgeParts<'a, S, D, T, M, const CAP: usize>
where
    S: CanBus,
    D: CanBus,
    T: KorriTimer,
    M: RawMutex,
{
    pub editor: BridgeEditor<'a, M>,
    pub frames: Option<EmittedFrames<'a, M, CAP>>,
    pub runner: BridgeRunner<'a, S, D, T, M, CAP>,
}

//==================================================================================EDITOR
/// Operator-facing handle: rule edits, inspection and stop.
pub struct BridgeEditor<'a, M: RawMutex> {
    table: &'a SharedTable<M>,
    monitor: &'a BridgeMonitor<M>,
}

impl<M: RawMutex> Clone for BridgeEditor<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for BridgeEditor<'_, M> {}

impl<'a, M: RawMutex> BridgeEditor<'a, M> {
    /// Handle over a table/monitor pair, with or without a running bridge.
    pub fn new(table: &'a SharedTable<M>, monitor: &'a BridgeMonitor<M>) -> Self {
        Self { table, monitor }
    }

    /// Replace the whole rule set. Fuzzing state is reset at the next frame.
    pub fn load(&self, specs: &[RuleSpec]) -> Result<(), RuleLoadError> {
        self.table.load(specs)
    }

    pub fn insert(&self, rule: TranslationRule) -> Result<(), ConflictError> {
        self.table.insert(rule)
    }

    /// Validate a raw record, then insert it.
    pub fn insert_spec(&self, spec: &RuleSpec) -> Result<(), InvalidRuleError> {
        let rule = TranslationRule::try_from(spec)?;
        Ok(self.table.insert(rule)?)
    }

    pub fn replace(&self, rule: TranslationRule) -> Result<(), ConflictError> {
        self.table.replace(rule)
    }

    pub fn remove(&self, source: ArbitrationId, destination: ArbitrationId) -> bool {
        self.table.remove(source, destination)
    }

    /// Drop every rule. Fuzzing state is reset at the next frame.
    pub fn clear(&self) {
        self.table.clear()
    }

    pub fn snapshot(&self) -> Arc<TranslationTable> {
        self.table.snapshot()
    }

    pub fn fuzz_states(&self) -> Vec<(ArbitrationId, FuzzSnapshot)> {
        self.monitor.fuzz_states()
    }

    pub fn fuzz_state(&self, id: ArbitrationId) -> FuzzSnapshot {
        self.monitor.fuzz_state(id)
    }

    pub fn stats(&self) -> PipelineStats {
        self.monitor.stats()
    }

    pub fn fuzz_config(&self) -> FuzzConfig {
        self.monitor.fuzz_config()
    }

    pub fn set_fuzz_config(&self, config: FuzzConfig) {
        self.monitor.set_fuzz_config(config)
    }

    pub fn set_fuzzing_enabled(&self, enabled: bool) {
        self.monitor.set_fuzzing_enabled(enabled)
    }

    /// Ask the runner to stop; it finishes the frame in hand first.
    pub fn request_stop(&self) {
        self.monitor.request_stop()
    }
}

/// Optional receiver of every frame written to the target bus.
pub struct EmittedFrames<'a, M: RawMutex, const CAP: usize> {
    receiver: Receiver<'a, M, EmittedFrame, CAP>,
}

impl<'a, M: RawMutex, const CAP: usize> EmittedFrames<'a, M, CAP> {
    pub async fn recv(&mut self) -> EmittedFrame {
        self.receiver.receive().await
    }

    pub fn try_recv(&mut self) -> Option<EmittedFrame> {
        self.receiver.try_receive().ok()
    }
}

//==================================================================================RUNNER
/// Runner that drives the bridge loop. Owns both buses.
pub struct BridgeRunner<'a, S, D, T, M, const CAP: usize>
where
    S: CanBus,
    D: CanBus,
    T: KorriTimer,
    M: RawMutex,
{
    source: S,
    target: D,
    timer: T,
    config: TranslatorConfig,
    table: &'a SharedTable<M>,
    monitor: &'a BridgeMonitor<M>,
    frame_channel: Option<&'a Channel<M, EmittedFrame, CAP>>,
    composer: DestinationComposer,
    fuzzer: Fuzzer,
    config_revision: Option<u32>,
}

impl<'a, S, D, T, M, const CAP: usize> BridgeRunner<'a, S, D, T, M, CAP>
where
    S: CanBus,
    D: CanBus,
    T: KorriTimer,
    M: RawMutex,
{
    /// Run until [`BridgeEditor::request_stop`] is called, then return the
    /// final counters. Transport errors are counted, never returned.
    pub async fn run(mut self) -> PipelineStats {
        #[cfg(feature = "defmt")]
        defmt::info!("Bridge running");

        loop {
            let received = {
                let stop = self.monitor.stop_signal().wait();
                let recv = self.source.recv();
                pin_mut!(stop);
                pin_mut!(recv);

                // `select` polls the stop future first.
                match select(stop, recv).await {
                    Either::Left(((), _pending_recv)) => None,
                    Either::Right((result, _pending_stop)) => Some(result),
                }
            };

            match received {
                None => break,
                Some(Ok(frame)) => self.handle_frame(frame).await,
                Some(Err(err)) => self.handle_read_error(BusReadError(err)).await,
            }
        }

        self.fuzzer.reset();
        self.monitor.clear_fuzz_states();
        let stats = self.monitor.stats();

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Bridge stopped: {} received, {} emitted, {} mutations",
            stats.frames_received,
            stats.frames_emitted,
            stats.mutations_emitted
        );
        stats
    }

    async fn handle_frame(&mut self, frame: CanFrame) {
        // Drivers that do not timestamp leave the clock origin; stamp on receipt.
        let now = self.timer.now();
        let frame = if frame.timestamp() == Instant::from_ticks(0) {
            frame.with_timestamp(now)
        } else {
            frame
        };
        let id = frame.arbitration_id();
        self.monitor.update_stats(|s| s.frames_received += 1);

        let table = self.table.snapshot();
        if self.composer.sync(&table) == SyncOutcome::Reset {
            #[cfg(feature = "defmt")]
            defmt::info!("Rule table reset, fuzzing state cleared");
            self.fuzzer.reset();
            self.monitor.clear_fuzz_states();
        }
        if let Some((revision, config)) = self.monitor.fuzz_config_since(self.config_revision) {
            self.fuzzer.reconfigure(config);
            self.config_revision = Some(revision);
        }

        if table.is_mapped(id) {
            let translation = self.composer.translate(&frame, &table);
            self.monitor.update_stats(|s| {
                s.frames_translated += 1;
                s.clamped_values += translation.warnings.len() as u64;
                s.skipped_rules += translation.skipped as u64;
            });

            // In rule order, all of them before the next source frame.
            for out in translation.frames {
                match self.send(&out).await {
                    Ok(()) => {
                        self.monitor.update_stats(|s| s.frames_emitted += 1);
                        self.publish(EmittedKind::Translated { source: id }, out);
                    }
                    Err(failure) => self.record_send_failure(&failure),
                }
            }
        } else {
            self.monitor.update_stats(|s| s.unmapped += 1);

            if let Some(pending) = self.fuzzer.observe(&frame, now) {
                match self.send(&pending.frame).await {
                    Ok(()) => {
                        self.fuzzer.record_sent(id, pending.mutation);
                        self.monitor.update_stats(|s| s.mutations_emitted += 1);

                        #[cfg(feature = "defmt")]
                        defmt::debug!("Mutation {} sent on {}", pending.mutation, id);
                        self.publish(
                            EmittedKind::Synthetic {
                                mutation: pending.mutation,
                            },
                            pending.frame,
                        );
                    }
                    Err(failure) => {
                        self.fuzzer.record_failure(id);
                        self.monitor.update_stats(|s| s.mutation_failures += 1);
                        self.record_send_failure(&failure);
                    }
                }
            }
            self.monitor.publish_fuzz_state(id, self.fuzzer.snapshot(id));
        }
    }

    async fn handle_read_error(&mut self, _error: BusReadError<S::Error>) {
        self.monitor.update_stats(|s| {
            s.read_errors += 1;
            s.last_fault = Some(FaultKind::Read);
        });

        #[cfg(feature = "defmt")]
        defmt::warn!(
            "Source bus read failed, backing off {} ms",
            self.config.read_error_backoff_ms
        );
        self.timer.delay_ms(self.config.read_error_backoff_ms).await;
    }

    /// Send one frame on the target bus, bounded by the send timeout.
    async fn send(&mut self, frame: &CanFrame) -> Result<(), SendFailure<D::Error>> {
        let timeout_ms = self.config.send_timeout_ms;
        let send_future = self.target.send(frame);
        let timeout_future = self.timer.delay_ms(timeout_ms);
        pin_mut!(send_future);
        pin_mut!(timeout_future);

        match select(send_future, timeout_future).await {
            Either::Left((result, _)) => result.map_err(SendFailure::Bus),
            Either::Right(((), _)) => Err(SendFailure::Timeout { timeout_ms }),
        }
    }

    fn record_send_failure<E: Debug>(&self, failure: &SendFailure<E>) {
        let timed_out = matches!(failure, SendFailure::Timeout { .. });
        self.monitor.update_stats(|s| {
            s.send_failures += 1;
            if timed_out {
                s.send_timeouts += 1;
                s.last_fault = Some(FaultKind::SendTimeout);
            } else {
                s.last_fault = Some(FaultKind::Send);
            }
        });

        #[cfg(feature = "defmt")]
        defmt::warn!("Target bus send failed (timeout: {})", timed_out);
    }

    /// Report a written frame on the feed, without ever waiting for room.
    fn publish(&self, kind: EmittedKind, frame: CanFrame) {
        if let Some(channel) = self.frame_channel {
            if channel.try_send(EmittedFrame { kind, frame }).is_err() {
                self.monitor.update_stats(|s| s.monitor_overflows += 1);
            }
        }
    }
}
