#![deny(missing_docs)]
//! Bounded-memory quasi-Newton (L-BFGS) optimization for the nstyle style transfer crates.
//!
//! The solver operates on flat `f32` vectors and queries the loss and analytic gradient
//! through an explicit [`LossAndGrad`] context object, so that the objective carries its
//! own state instead of hiding it in closure captures.

/// The L-BFGS solver.
pub mod lbfgs;

pub use crate::lbfgs::{
    minimize, LbfgsConfig, LbfgsError, LossAndGrad, Minimum, TerminationReason,
};
