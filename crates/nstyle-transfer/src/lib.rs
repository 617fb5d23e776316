#![deny(missing_docs)]
//! Style transfer orchestration: configuration, optimization rounds and output persistence.
//!
//! The orchestrator wires the image codec, the frozen feature extractor, the loss model
//! and the L-BFGS solver into a single-shot batch job: decode and resize the inputs,
//! run a fixed number of optimization rounds over the generated image's pixels and
//! persist one output image per round. Restarting the solver every round gives it fresh
//! internal state, which mitigates stagnation and line-search failures on the long runs.

/// Run configuration.
pub mod config;

/// The loss/gradient objective evaluated by the solver.
pub mod objective;

/// The transfer session and its stages.
pub mod session;

/// Error types for the transfer module.
pub mod error;

pub use crate::config::{SeedImage, TransferConfig};
pub use crate::error::TransferError;
pub use crate::objective::TransferObjective;
pub use crate::session::{Stage, StyleTransfer};
