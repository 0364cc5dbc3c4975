#![warn(missing_docs)]

//! Common leaf types shared across the autosel workspace: benchmark timing
//! containers, element descriptors, tolerance comparison and RNG helpers.

/// Benchmark timing containers and statistics.
pub mod benchmark;
/// Storage element descriptors.
pub mod element;
/// Seeded random number generation.
pub mod rand;
/// Tolerance-based approximate comparison.
pub mod tolerance;
