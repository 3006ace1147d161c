//! Momentum SGD
//!
//! For every parameter an accumulator is kept across steps:
//!
//! ```text
//! accum = momentum * accum + grad
//! param = param - lr * accum
//! ```
//!
//! The learning rate is supplied per call because the training loop owns it
//! and decays it between epochs.

use crate::layers::Parameter;
use crate::optimizers::Optimizer;
use std::collections::BTreeMap;

/// Momentum optimizer with one accumulator per parameter name.
///
/// # Example
///
/// ```
/// use alexnet_trainer::layers::Parameter;
/// use alexnet_trainer::optimizers::{Momentum, Optimizer};
///
/// let mut optimizer = Momentum::new(0.9);
/// let mut p = Parameter::new("w", vec![1], vec![1.0], true);
/// p.grad_mut()[0] = 1.0;
/// optimizer.update(&mut p, 0.1);
/// assert!((p.value()[0] - 0.9).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct Momentum {
    momentum: f32,
    accumulators: BTreeMap<String, Vec<f32>>,
}

impl Momentum {
    pub fn new(momentum: f32) -> Self {
        Self {
            momentum,
            accumulators: BTreeMap::new(),
        }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Optimizer for Momentum {
    /// # Panics
    ///
    /// Panics if a restored accumulator has a different length than the parameter.
    fn update(&mut self, parameter: &mut Parameter, learning_rate: f32) {
        let momentum = self.momentum;
        let accum = self
            .accumulators
            .entry(parameter.name().to_string())
            .or_insert_with(|| vec![0.0; parameter.len()]);
        assert_eq!(
            accum.len(),
            parameter.len(),
            "accumulator and parameter must have the same length"
        );

        let (values, grads) = parameter.value_and_grad();
        for ((w, &g), a) in values.iter_mut().zip(grads.iter()).zip(accum.iter_mut()) {
            *a = momentum * *a + g;
            *w -= learning_rate * *a;
        }
    }

    fn reset(&mut self) {
        self.accumulators.clear();
    }

    fn slots(&self) -> BTreeMap<String, Vec<f32>> {
        self.accumulators.clone()
    }

    fn load_slots(&mut self, slots: BTreeMap<String, Vec<f32>>) {
        self.accumulators = slots;
    }
}
