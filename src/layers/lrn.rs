//! Local response normalization across channels
//!
//! For channel `c` at a spatial position:
//!
//! ```text
//! s_c = bias + alpha * sum_{j = c - r}^{c + r} a_j^2
//! b_c = a_c * s_c^(-beta)
//! ```
//!
//! where `r` is the depth radius and the sum is clipped to valid channels.

use crate::layers::Layer;

pub struct LrnLayer {
    name: String,
    channels: usize,
    spatial: usize,
    depth_radius: usize,
    bias: f32,
    alpha: f32,
    beta: f32,
}

impl LrnLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        channels: usize,
        height: usize,
        width: usize,
        depth_radius: usize,
        bias: f32,
        alpha: f32,
        beta: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            channels,
            spatial: height * width,
            depth_radius,
            bias,
            alpha,
            beta,
        }
    }

    fn window(&self, c: usize) -> std::ops::RangeInclusive<usize> {
        c.saturating_sub(self.depth_radius)..=(c + self.depth_radius).min(self.channels - 1)
    }

    /// `s_c` for every channel of one spatial position of one sample.
    fn scales(&self, sample: &[f32], pos: usize, scales: &mut [f32]) {
        for (c, s) in scales.iter_mut().enumerate() {
            let sq: f32 = self
                .window(c)
                .map(|j| {
                    let a = sample[j * self.spatial + pos];
                    a * a
                })
                .sum();
            *s = self.bias + self.alpha * sq;
        }
    }
}

impl Layer for LrnLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size(), "lrn input length mismatch");
        let mut scales = vec![0.0f32; self.channels];
        let sample_len = self.input_size();

        for (sample, out) in input
            .chunks_exact(sample_len)
            .zip(output.chunks_exact_mut(sample_len))
        {
            for pos in 0..self.spatial {
                self.scales(sample, pos, &mut scales);
                for (c, &s) in scales.iter().enumerate() {
                    let idx = c * self.spatial + pos;
                    out[idx] = sample[idx] * s.powf(-self.beta);
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
        _batch_size: usize,
    ) {
        let sample_len = self.input_size();
        let mut scales = vec![0.0f32; self.channels];
        // g_c * a_c * s_c^(-beta-1), shared by every channel in c's window
        let mut cross = vec![0.0f32; self.channels];

        for ((sample, g), gi) in input
            .chunks_exact(sample_len)
            .zip(grad_output.chunks_exact(sample_len))
            .zip(grad_input.chunks_exact_mut(sample_len))
        {
            for pos in 0..self.spatial {
                self.scales(sample, pos, &mut scales);
                for c in 0..self.channels {
                    let idx = c * self.spatial + pos;
                    cross[c] = g[idx] * sample[idx] * scales[c].powf(-self.beta - 1.0);
                }
                for i in 0..self.channels {
                    let idx = i * self.spatial + pos;
                    let shared: f32 = self.window(i).map(|c| cross[c]).sum();
                    gi[idx] = g[idx] * scales[i].powf(-self.beta)
                        - 2.0 * self.alpha * self.beta * sample[idx] * shared;
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn output_size(&self) -> usize {
        self.channels * self.spatial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lrn_single_channel_closed_form() {
        let layer = LrnLayer::new("lrn", 1, 1, 1, 5, 2.0, 0.5, 1.0);
        let mut output = vec![0.0];
        layer.forward(&[2.0], &mut output, 1);
        // 2 / (2 + 0.5 * 4)
        assert!((output[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_lrn_gradient_matches_finite_difference() {
        let layer = LrnLayer::new("lrn", 4, 1, 2, 1, 1.0, 0.3, 0.75);
        let input = vec![0.5, -1.0, 1.5, 0.2, -0.3, 0.8, 1.1, -0.6];
        let weights = vec![0.3, -0.7, 1.1, 0.4, 0.9, -0.2, 0.5, 0.6];

        let objective = |x: &[f32]| -> f32 {
            let mut out = vec![0.0; 8];
            layer.forward(x, &mut out, 1);
            out.iter().zip(&weights).map(|(o, w)| o * w).sum()
        };

        let mut output = vec![0.0; 8];
        layer.forward(&input, &mut output, 1);
        let mut grad_input = vec![0.0; 8];
        layer.backward(&input, &output, &weights, &mut grad_input, 1);

        let h = 1e-3f32;
        for i in 0..8 {
            let mut plus = input.clone();
            let mut minus = input.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * h);
            assert!(
                (numeric - grad_input[i]).abs() < 1e-2,
                "index {i}: numeric {numeric} analytic {}",
                grad_input[i]
            );
        }
    }
}
