//! Transport layer: CAN frame representation, arbitration identifiers, and the
//! bus/timer abstraction traits the bridge is generic over.
//!
//! ## Timing Constants
//!
//! Defaults used by the bridge runner when talking to the buses.

pub mod can_frame;
pub mod can_id;
pub mod traits;

/// Recommended timeout for sending a single CAN frame on the target bus (ms).
///
/// Prevents the runner from blocking indefinitely when the target bus is
/// faulty, disconnected, or saturated. A send that does not complete in time
/// is counted as a send failure and the runner moves on to the next frame.
///
/// # Timeout rationale
///
/// At 500 kbps one 8-byte frame takes ~0.25 ms on the wire; with arbitration
/// losses and controller retransmissions ~10–20 ms is a realistic worst case.
/// A ×5 safety margin gives 100 ms.
pub const CAN_SEND_TIMEOUT_MS: u32 = 100;

/// Pause inserted after a failed receive on the source bus (ms).
///
/// A faulted transport tends to fail every call; backing off keeps the runner
/// from spinning while the fault persists.
pub const READ_ERROR_BACKOFF_MS: u32 = 100;
