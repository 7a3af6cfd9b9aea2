//! Bit-level codec: positional readers/writers and the physical-value
//! conversions built on top of them.
pub mod bits;
pub mod field;
