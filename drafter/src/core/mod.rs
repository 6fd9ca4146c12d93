//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! run state and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod document;
pub mod interrupt;
pub mod invariants;
pub mod node;
pub mod selector;
pub mod types;
