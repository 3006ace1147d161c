//! ReLU as a layer, so it can sit in the sequential stack.

use crate::layers::Layer;
use crate::utils::relu_inplace;

pub struct ReluLayer {
    name: String,
    size: usize,
}

impl ReluLayer {
    pub fn new(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }
}

impl Layer for ReluLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.size, "relu input length mismatch");
        output.copy_from_slice(input);
        relu_inplace(output);
    }

    fn backward(
        &self,
        _input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        _batch_size: usize,
    ) {
        // Zero gradient where the activation was clamped.
        for ((gi, &go), &y) in grad_input.iter_mut().zip(grad_output).zip(output) {
            *gi = if y > 0.0 { go } else { 0.0 };
        }
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }
}
