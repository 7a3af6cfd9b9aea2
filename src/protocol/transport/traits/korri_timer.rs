//! Asynchronous timer abstraction providing the timing primitives required
//! by send timeouts, error back-off, and fuzzing rate control.
use embassy_time::Instant;

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait KorriTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(
        &'a mut self,
        millis: u32,
    ) -> impl core::future::Future<Output = ()> + 'a;

    /// Current monotonic instant. Defaults to the embassy time driver;
    /// test clocks may override it.
    fn now(&self) -> Instant {
        Instant::now()
    }
}
