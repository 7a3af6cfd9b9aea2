//! Global ceiling on mutation attempts across all identifiers.
use alloc::collections::VecDeque;
use embassy_time::{Duration, Instant};

/// Sliding log of recent attempts. Any window of `window_ms` holds at most
/// `limit` of them.
#[derive(Debug, Default, Clone)]
pub struct EmissionWindow {
    log: VecDeque<Instant>,
}

impl EmissionWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot at `now`. Returns `false` when the window is full.
    pub fn try_acquire(&mut self, now: Instant, limit: u32, window_ms: u32) -> bool {
        let window = Duration::from_millis(window_ms as u64);
        while let Some(oldest) = self.log.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.log.pop_front();
            } else {
                break;
            }
        }
        if self.log.len() >= limit as usize {
            return false;
        }
        self.log.push_back(now);
        true
    }

    /// Attempts still inside the window as of the last claim.
    pub fn in_flight(&self) -> usize {
        self.log.len()
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}
