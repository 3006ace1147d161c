//! Optimizer abstractions for parameter updates
//!
//! An optimizer turns the gradients accumulated in a [`Parameter`] into a
//! parameter update. Stateful optimizers expose their per-parameter slots so
//! checkpoints can persist and restore them.
//!
//! # Available Optimizers
//!
//! - [`Momentum`]: SGD with a momentum accumulator per parameter

pub mod momentum;

pub use momentum::Momentum;

use crate::layers::Parameter;
use std::collections::BTreeMap;

/// Core trait for optimizers.
///
/// # Example
///
/// ```ignore
/// for param in classifier.parameters_mut() {
///     optimizer.update(param, state.learning_rate);
/// }
/// ```
pub trait Optimizer {
    /// Apply one update to `parameter` using its accumulated gradient.
    ///
    /// The gradient is left untouched; callers zero it before the next
    /// backward pass.
    fn update(&mut self, parameter: &mut Parameter, learning_rate: f32);

    /// Drop all accumulated state.
    fn reset(&mut self);

    /// Per-parameter state keyed by parameter name.
    fn slots(&self) -> BTreeMap<String, Vec<f32>>;

    /// Replace the per-parameter state, e.g. from a checkpoint.
    fn load_slots(&mut self, slots: BTreeMap<String, Vec<f32>>);
}
