#![warn(missing_docs)]

//! CPU tensor operations with autotuned kernel selection.
//!
//! Every tuned operation enumerates candidate kernels (blocked template
//! instantiations plus a library fallback), verifies them against the eager
//! reference within the configured tolerance, and lets the selection engine
//! pick a winner per operation site.

mod element;
mod tensor;
mod tune_key;

/// Parameterized candidate kernels.
pub mod kernels;
/// Tuned operation entry points.
pub mod ops;
/// Eager reference implementations.
pub mod reference;
/// Kernel source templates for the candidate kernels.
pub mod templates;

pub use element::*;
pub use tensor::*;
pub use tune_key::*;
