//! `korri-bridge` library: rule-driven translation of CAN traffic between two
//! vehicle platforms, in a `no_std` + `alloc` environment. Frames read on a
//! source bus are decoded field by field, re-encoded into the target layout
//! and written to a target bus; frames without a rule can be fed to a bounded
//! fuzzer to explore the target's unknown message space.
#![no_std]
extern crate alloc;
//==================================================================================
/// Rule data model: byte orders, raw rule records, validated bit-fields and rules.
pub mod core;
/// Domain and low-level errors (identifiers, rules, conflicts, transport).
pub mod error;
/// Bit-level codec used to read and write signal fields.
pub mod infra;
/// Transport, translation, fuzzing and the bridge pipeline.
pub mod protocol;
//==================================================================================
