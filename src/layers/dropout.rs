//! Dropout layer implementation for regularization
//!
//! Keeps each unit with probability `keep_prob` and scales kept units by
//! `1 / keep_prob` so that the expected activation is unchanged. With
//! `keep_prob == 1.0` (evaluation, kernel capture) the layer is the identity.

use crate::layers::Layer;
use crate::utils::SimpleRng;
use std::cell::RefCell;

/// Dropout layer.
///
/// # Fields
///
/// * `size` - Number of input/output features (dropout doesn't change dimensions)
/// * `keep_prob` - Probability of keeping each unit for the next forward pass
/// * `mask` - Scale factor applied to each unit in the last forward pass
/// * `rng` - Random number generator for mask generation
///
/// # Example
///
/// ```
/// use alexnet_trainer::layers::{DropoutLayer, Layer};
/// use alexnet_trainer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let mut layer = DropoutLayer::new("dropout6", 8, &mut rng);
/// layer.set_keep_prob(1.0);
/// let input = vec![1.0f32; 8];
/// let mut output = vec![0.0f32; 8];
/// layer.forward(&input, &mut output, 1);
/// assert_eq!(output, input);
/// ```
pub struct DropoutLayer {
    name: String,
    size: usize,
    keep_prob: f32,
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl DropoutLayer {
    /// Creates a dropout layer in evaluation mode (`keep_prob = 1.0`).
    ///
    /// The layer forks its own stream from `rng`.
    pub fn new(name: &str, size: usize, rng: &mut SimpleRng) -> Self {
        Self {
            name: name.to_string(),
            size,
            keep_prob: 1.0,
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(rng.fork()),
        }
    }

    pub fn keep_prob(&self) -> f32 {
        self.keep_prob
    }

    fn is_active(&self) -> bool {
        self.keep_prob < 1.0
    }
}

impl Layer for DropoutLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let total_size = batch_size * self.size;
        assert_eq!(input.len(), total_size, "dropout input length mismatch");
        assert_eq!(output.len(), total_size, "dropout output length mismatch");

        if !self.is_active() {
            output.copy_from_slice(input);
            return;
        }

        let scale = 1.0 / self.keep_prob;
        let mut mask = self.mask.borrow_mut();
        let mut rng = self.rng.borrow_mut();
        mask.resize(total_size, 0.0);

        for ((m, out), &x) in mask.iter_mut().zip(output.iter_mut()).zip(input) {
            *m = if rng.next_f32() < self.keep_prob { scale } else { 0.0 };
            *out = x * *m;
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let total_size = batch_size * self.size;
        assert_eq!(grad_output.len(), total_size, "dropout grad_output length mismatch");
        assert_eq!(grad_input.len(), total_size, "dropout grad_input length mismatch");

        if !self.is_active() {
            grad_input.copy_from_slice(grad_output);
            return;
        }

        let mask = self.mask.borrow();
        assert_eq!(mask.len(), total_size, "dropout backward without matching forward");
        for ((gi, &go), &m) in grad_input.iter_mut().zip(grad_output).zip(mask.iter()) {
            *gi = go * m;
        }
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    /// # Panics
    ///
    /// Panics unless `0 < keep_prob <= 1`.
    fn set_keep_prob(&mut self, keep_prob: f32) {
        assert!(
            keep_prob > 0.0 && keep_prob <= 1.0,
            "keep_prob must be in range (0.0, 1.0]"
        );
        self.keep_prob = keep_prob;
    }
}
