//! # Loopback Bridge Example
//!
//! Host-side walkthrough of korri-bridge:
//! - Load a JSON rule table into a shared table
//! - Bridge two in-memory buses
//! - Let the fuzzer probe one unmapped identifier
//! - Print the emitted-frame feed and the final counters
//!
//! ```bash
//! cargo run --example loopback_bridge --features serde
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use korri_bridge::core::RuleSpec;
use korri_bridge::protocol::bridge::{
    BridgeMonitor, BridgeService, EmittedFrame, EmittedKind, TranslatorConfig,
};
use korri_bridge::protocol::fuzzing::FuzzConfig;
use korri_bridge::protocol::transport::can_frame::CanFrame;
use korri_bridge::protocol::transport::can_id::ArbitrationId;
use korri_bridge::protocol::transport::traits::{can_bus::CanBus, korri_timer::KorriTimer};
use korri_bridge::protocol::translation::shared_table::SharedTable;
use static_cell::StaticCell;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

// ============================================================================
// In-memory bus and timer
// ============================================================================

/// One end of an in-memory CAN link.
struct LoopbackBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: mpsc::UnboundedReceiver<CanFrame>,
}

impl LoopbackBus {
    fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

impl CanBus for LoopbackBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(frame.clone()).map_err(|_| ())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        self.rx.recv().await.ok_or(())
    }
}

struct TokioTimer;

impl KorriTimer for TokioTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}

// ============================================================================
// Rule table
// ============================================================================

/// Vehicle A engine speed (0x0C0, 16 bits, 0.25 rpm/bit) becomes vehicle B
/// engine speed (0x2A0, big-endian 16 bits, 1 rpm/bit), and the A coolant
/// temperature byte (offset -40 °C) lands next to it on the same frame.
const RULES_JSON: &str = r#"[
    {
        "source_id": 192,
        "source": { "start_bit": 0, "bit_length": 16, "scale": 0.25 },
        "destination_id": 672,
        "destination_len": 4,
        "destination": { "byte_order": "big", "start_bit": 0, "bit_length": 16, "max_value": 8000.0 }
    },
    {
        "source_id": 192,
        "source": { "start_bit": 16, "bit_length": 8, "offset": -40.0 },
        "destination_id": 672,
        "destination_len": 4,
        "destination": { "start_bit": 16, "bit_length": 8, "signed": true }
    }
]"#;

static FEED: StaticCell<Channel<CriticalSectionRawMutex, EmittedFrame, 16>> = StaticCell::new();

#[tokio::main]
async fn main() {
    println!("=== korri-bridge loopback ===\n");

    // ======================================================================
    // 1. Load the rules
    // ======================================================================
    let specs: Vec<RuleSpec> = match serde_json::from_str(RULES_JSON) {
        Ok(specs) => specs,
        Err(err) => {
            eprintln!("Invalid rule file: {}", err);
            return;
        }
    };
    let table: SharedTable<CriticalSectionRawMutex> = SharedTable::default();
    if let Err(err) = table.load(&specs) {
        eprintln!("Rule table rejected: {}", err);
        return;
    }
    println!("1. Loaded {} rules", table.snapshot().len());

    // ======================================================================
    // 2. Build the bridge
    // ======================================================================
    let fuzzing = FuzzConfig {
        per_id_interval_ms: 0,
        mutation_cap: 4,
        ..FuzzConfig::new().enabled()
    };
    let monitor: BridgeMonitor<CriticalSectionRawMutex> = BridgeMonitor::new(fuzzing);
    let feed = FEED.init(Channel::new());

    let (source, mut vehicle_a) = LoopbackBus::pair();
    let (target, mut vehicle_b) = LoopbackBus::pair();
    let parts = BridgeService::new(
        source,
        target,
        TokioTimer,
        TranslatorConfig::new(),
        &table,
        &monitor,
        Some(&*feed),
    )
    .into_parts();
    let editor = parts.editor;
    let Some(mut frames) = parts.frames else {
        return;
    };
    println!("2. Bridge ready, fuzzing enabled\n");

    // ======================================================================
    // 3. Drive some traffic
    // ======================================================================
    let (stats, ()) = tokio::join!(parts.runner.run(), async {
        // 3000 rpm, 90 °C.
        let rpm = ((3000.0 / 0.25) as u16).to_le_bytes();
        let engine = [rpm[0], rpm[1], 130, 0, 0, 0, 0, 0];
        let unknown = [0x10, 0x20, 0x30, 0x40];

        for _ in 0..3 {
            if let Ok(frame) = CanFrame::new(ArbitrationId::Standard(0x0C0), &engine) {
                let _ = vehicle_a.send(&frame).await;
            }
            if let Ok(frame) = CanFrame::new(ArbitrationId::Standard(0x7A1), &unknown) {
                let _ = vehicle_a.send(&frame).await;
            }
            sleep(Duration::from_millis(20)).await;
        }

        println!("3. Frames seen on vehicle B:");
        while let Some(event) = frames.try_recv() {
            let origin = match event.kind {
                EmittedKind::Translated { source } => format!("from {:?}", source),
                EmittedKind::Synthetic { mutation } => format!("fuzz {:?}", mutation),
            };
            println!(
                "   {:?} {:02X?} ({})",
                event.frame.arbitration_id(),
                event.frame.payload(),
                origin
            );
        }
        while vehicle_b.rx.try_recv().is_ok() {}

        for (id, state) in editor.fuzz_states() {
            println!(
                "   {:?}: {:?}, {} sightings, {} mutations sent",
                id, state.status, state.sightings, state.emitted
            );
        }
        editor.request_stop();
    });

    // ======================================================================
    // 4. Final counters
    // ======================================================================
    println!("\n4. Counters:");
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{:?}", stats),
    }
}
