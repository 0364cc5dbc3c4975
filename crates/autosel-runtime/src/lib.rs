#![warn(missing_docs)]

//! Algorithm selection engine: enumerates candidate kernel implementations
//! for an operation, benchmarks and verifies them, and caches the winner.

#[macro_use]
extern crate derive_new;

/// Engine configuration module.
pub mod config;
/// Tensor and layout metadata exchanged with the engine.
pub mod meta;
/// Process-wide named counters.
pub mod counters;
/// Kernel source template rendering.
pub mod template;
/// Autotune module.
pub mod tune;

pub use autosel_common::benchmark;
