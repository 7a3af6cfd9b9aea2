//! Translator pipeline: the service tying the source bus, the rule table,
//! the fuzzer and the target bus together, and the state it shares with
//! operator tasks.
pub mod monitor;
pub mod service;

pub use monitor::{BridgeMonitor, FaultKind, PipelineStats};
pub use service::{
    BridgeEditor, BridgeParts, BridgeRunner, BridgeService, EmittedFrame, EmittedFrames,
    EmittedKind, TranslatorConfig,
};
