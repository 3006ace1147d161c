//! Dense (fully connected) layer implementation
//!
//! `output = input × weights + biases`, weights stored row-major
//! `[input_size][output_size]`.

use crate::layers::{Layer, Parameter};
use crate::utils::SimpleRng;

/// Dense (fully connected) layer with weights and biases.
pub struct DenseLayer {
    name: String,
    input_size: usize,
    output_size: usize,
    weights: Parameter,
    biases: Parameter,
}

impl DenseLayer {
    /// Create a new DenseLayer with Xavier initialization.
    ///
    /// Weights are sampled from `[-limit, limit]` with
    /// `limit = sqrt(6 / (input_size + output_size))`; biases start at zero.
    ///
    /// # Example
    ///
    /// ```
    /// use alexnet_trainer::layers::{DenseLayer, Layer};
    /// use alexnet_trainer::utils::SimpleRng;
    ///
    /// let mut rng = SimpleRng::new(42);
    /// let layer = DenseLayer::new("fc8", 4096, 2, &mut rng);
    /// assert_eq!(layer.parameter_count(), 4096 * 2 + 2);
    /// ```
    pub fn new(name: &str, input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights: Vec<f32> = (0..input_size * output_size)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Self {
            name: name.to_string(),
            input_size,
            output_size,
            weights: Parameter::new(
                format!("{name}/weights"),
                vec![input_size, output_size],
                weights,
                true,
            ),
            biases: Parameter::new(
                format!("{name}/biases"),
                vec![output_size],
                vec![0.0; output_size],
                false,
            ),
        }
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size, "dense input length mismatch");
        assert_eq!(output.len(), batch_size * self.output_size, "dense output length mismatch");

        let weights = self.weights.value();
        let biases = self.biases.value();

        for (x, y) in input
            .chunks_exact(self.input_size)
            .zip(output.chunks_exact_mut(self.output_size))
        {
            y.copy_from_slice(biases);
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let row = &weights[i * self.output_size..(i + 1) * self.output_size];
                for (yj, &w) in y.iter_mut().zip(row) {
                    *yj += xi * w;
                }
            }
        }
    }

    fn backward(
        &self,
        input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(
            grad_output.len(),
            batch_size * self.output_size,
            "dense grad_output length mismatch"
        );

        let weights = self.weights.value();
        let mut grad_w = self.weights.grad_mut();
        let mut grad_b = self.biases.grad_mut();
        let want_input_grad = !grad_input.is_empty();

        for b in 0..batch_size {
            let x = &input[b * self.input_size..(b + 1) * self.input_size];
            let g = &grad_output[b * self.output_size..(b + 1) * self.output_size];

            for (gb, &gj) in grad_b.iter_mut().zip(g) {
                *gb += gj;
            }

            for (i, &xi) in x.iter().enumerate() {
                let row = i * self.output_size;
                let mut acc = 0.0f32;
                for j in 0..self.output_size {
                    grad_w[row + j] += xi * g[j];
                    acc += g[j] * weights[row + j];
                }
                if want_input_grad {
                    grad_input[b * self.input_size + i] = acc;
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weights, &self.biases]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weights, &mut self.biases]
    }
}
