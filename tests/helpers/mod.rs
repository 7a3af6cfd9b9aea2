/// Test doubles to simulate the CAN buses and timer during integration tests.
use korri_bridge::protocol::transport::{
    can_frame::CanFrame,
    traits::{can_bus::CanBus, korri_timer::KorriTimer},
};
use embassy_time::Instant;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout, Duration};

#[derive(Clone)]
#[allow(dead_code)]
/// In-memory CAN bus reproducing the `CanBus` trait behavior.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<CanFrame>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected buses (bridge ↔ host).
    pub fn create_pair() -> (Self, Self) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();

        let dut_bus = Self {
            tx: dut_tx,
            rx: Arc::new(Mutex::new(dut_rx)),
        };

        let host_bus = Self {
            tx: host_tx,
            rx: Arc::new(Mutex::new(host_rx)),
        };

        (dut_bus, host_bus)
    }

    /// Next frame within `millis`, `None` if the bus stays quiet.
    pub async fn recv_within(&mut self, millis: u64) -> Option<CanFrame> {
        timeout(Duration::from_millis(millis), self.recv())
            .await
            .ok()
            .and_then(Result::ok)
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(frame.clone()).map_err(|_| ())?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }
}

#[allow(dead_code)]
/// Target bus whose controller rejects every frame.
pub struct RefusingBus;

impl CanBus for RefusingBus {
    type Error = ();

    async fn send<'a>(&'a mut self, _frame: &'a CanFrame) -> Result<(), Self::Error> {
        Err(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        std::future::pending().await
    }
}

#[allow(dead_code)]
/// Target bus whose sends never complete (bus-off, saturated mailbox).
pub struct StalledBus;

impl CanBus for StalledBus {
    type Error = ();

    async fn send<'a>(&'a mut self, _frame: &'a CanFrame) -> Result<(), Self::Error> {
        std::future::pending().await
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        std::future::pending().await
    }
}

#[allow(dead_code)]
/// Source bus replaying a fixed script of frames and read errors, then idle.
pub struct ScriptedSource {
    script: VecDeque<Result<CanFrame, ()>>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<CanFrame, ()>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl CanBus for ScriptedSource {
    type Error = ();

    async fn send<'a>(&'a mut self, _frame: &'a CanFrame) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        match self.script.pop_front() {
            Some(step) => step,
            None => std::future::pending().await,
        }
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive delays in tests.
pub struct MockTimer;

impl KorriTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}

#[allow(dead_code)]
/// Tokio-backed timer whose clock is frozen at `now`.
pub struct FrozenClock {
    pub now: Instant,
}

impl KorriTimer for FrozenClock {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }

    fn now(&self) -> Instant {
        self.now
    }
}

#[allow(dead_code)]
/// Poll `condition` every millisecond until it holds; panics after `millis`.
pub async fn wait_until(millis: u64, mut condition: impl FnMut() -> bool) {
    let waited = timeout(Duration::from_millis(millis), async {
        while !condition() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within {} ms", millis);
}
