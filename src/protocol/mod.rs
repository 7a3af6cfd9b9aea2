//! Protocol layers of the bridge: CAN transport, rule-driven translation,
//! fuzzing of unmapped traffic and the pipeline that runs them.
pub mod bridge;
pub mod fuzzing;
pub mod translation;
pub mod transport;
