//! Shared utilities
//!
//! Random number generation and the activation/loss helpers used by the
//! classifier and the optimization step.

pub mod activations;
pub mod rng;

pub use activations::{argmax_rows, batch_accuracy, relu_inplace, softmax_cross_entropy, softmax_rows};
pub use rng::SimpleRng;
