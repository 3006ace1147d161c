//! Max pooling (AlexNet uses overlapping 3×3 windows with stride 2)

use crate::layers::Layer;

/// Max pooling over square windows, no padding.
///
/// The backward pass re-derives the argmax of each window from the forward
/// input (first maximum wins) instead of caching indices.
pub struct MaxPool2DLayer {
    name: String,
    channels: usize,
    input_height: usize,
    input_width: usize,
    window: usize,
    stride: usize,
}

impl MaxPool2DLayer {
    /// # Panics
    ///
    /// Panics if the window is larger than the input.
    pub fn new(
        name: &str,
        channels: usize,
        input_height: usize,
        input_width: usize,
        window: usize,
        stride: usize,
    ) -> Self {
        assert!(
            window <= input_height && window <= input_width,
            "pooling window larger than input"
        );
        assert!(stride > 0, "stride must be positive");
        Self {
            name: name.to_string(),
            channels,
            input_height,
            input_width,
            window,
            stride,
        }
    }

    pub fn output_height(&self) -> usize {
        (self.input_height - self.window) / self.stride + 1
    }

    pub fn output_width(&self) -> usize {
        (self.input_width - self.window) / self.stride + 1
    }

    /// Flat index (within one channel plane) of the maximum of a window.
    fn argmax(&self, plane: &[f32], oy: usize, ox: usize) -> usize {
        let mut best = f32::NEG_INFINITY;
        let mut best_idx = 0usize;
        for dy in 0..self.window {
            for dx in 0..self.window {
                let idx = (oy * self.stride + dy) * self.input_width + ox * self.stride + dx;
                if plane[idx] > best {
                    best = plane[idx];
                    best_idx = idx;
                }
            }
        }
        best_idx
    }
}

impl Layer for MaxPool2DLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size(), "pool input length mismatch");
        assert_eq!(output.len(), batch_size * self.output_size(), "pool output length mismatch");

        let in_plane = self.input_height * self.input_width;
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_plane = out_h * out_w;

        for (plane, out) in input
            .chunks_exact(in_plane)
            .zip(output.chunks_exact_mut(out_plane))
        {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    out[oy * out_w + ox] = plane[self.argmax(plane, oy, ox)];
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
        let in_plane = self.input_height * self.input_width;
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_plane = out_h * out_w;

        grad_input.fill(0.0);
        for ((plane, grad_plane), g) in input
            .chunks_exact(in_plane)
            .zip(grad_input.chunks_exact_mut(in_plane))
            .zip(grad_output.chunks_exact(out_plane))
        {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    // Overlapping windows can route to the same input.
                    grad_plane[self.argmax(plane, oy, ox)] += g[oy * out_w + ox];
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height() * self.output_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_pool_dimensions() {
        let pool = MaxPool2DLayer::new("pool1", 96, 55, 55, 3, 2);
        assert_eq!(pool.output_height(), 27);
        assert_eq!(pool.output_width(), 27);
    }

    #[test]
    fn test_pool_forward_and_backward() {
        let pool = MaxPool2DLayer::new("pool", 1, 3, 3, 2, 1);
        let input = vec![
            1.0, 5.0, 2.0, //
            3.0, 4.0, 9.0, //
            0.0, 6.0, 7.0,
        ];
        let mut output = vec![0.0; 4];
        pool.forward(&input, &mut output, 1);
        assert_eq!(output, vec![5.0, 9.0, 6.0, 9.0]);

        let mut grad_input = vec![0.0; 9];
        pool.backward(&input, &output, &[1.0, 1.0, 1.0, 1.0], &mut grad_input, 1);
        assert_eq!(
            grad_input,
            vec![0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 1.0, 0.0]
        );
    }
}
