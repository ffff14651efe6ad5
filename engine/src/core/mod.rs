//! Deterministic, pure logic shared by the engine.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! values and return deterministic outputs suitable for tests.

pub mod catalog;
pub mod decode;
pub mod directive;
pub mod prerequisites;
pub mod sequence;
pub mod types;
