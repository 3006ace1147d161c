//! 2D Convolutional layer implementation
//!
//! Direct (loop) convolution with zero padding and stride. Weights are stored
//! `[out_channels][in_channels][kernel][kernel]`.

use crate::layers::{Layer, Parameter};
use crate::utils::SimpleRng;

/// 2D Convolutional layer with learnable filters.
///
/// # Example
///
/// ```
/// use alexnet_trainer::layers::{Conv2DLayer, Layer};
/// use alexnet_trainer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 3 input channels, 48 filters of 11x11, no padding, stride 4, 227x227 input
/// let layer = Conv2DLayer::new("conv1_1", 3, 48, 11, 0, 4, 227, 227, &mut rng);
/// assert_eq!(layer.output_height(), 55);
/// assert_eq!(layer.parameter_count(), 48 * 3 * 11 * 11 + 48);
/// ```
pub struct Conv2DLayer {
    name: String,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    weights: Parameter,
    biases: Parameter,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with Xavier initialization.
    ///
    /// Weights are sampled from `[-limit, limit]` where
    /// `limit = sqrt(6 / (fan_in + fan_out))`, `fan_in = in_channels × k²`,
    /// `fan_out = out_channels × k²`. Biases start at zero.
    ///
    /// # Panics
    ///
    /// Panics if the kernel does not fit the padded input.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(stride > 0, "stride must be positive");
        assert!(
            input_height as isize + 2 * padding >= kernel_size as isize
                && input_width as isize + 2 * padding >= kernel_size as isize,
            "kernel does not fit the padded input"
        );

        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let fan_out = (out_channels * kernel_size * kernel_size) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = out_channels * in_channels * kernel_size * kernel_size;
        let weights: Vec<f32> = (0..weight_count)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Self {
            name: name.to_string(),
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            weights: Parameter::new(
                format!("{name}/weights"),
                vec![out_channels, in_channels, kernel_size, kernel_size],
                weights,
                true,
            ),
            biases: Parameter::new(
                format!("{name}/biases"),
                vec![out_channels],
                vec![0.0; out_channels],
                false,
            ),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn weights(&self) -> &Parameter {
        &self.weights
    }

    /// Output height: `(input_height + 2*padding - kernel_size) / stride + 1`
    pub fn output_height(&self) -> usize {
        ((self.input_height as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    /// Output width: `(input_width + 2*padding - kernel_size) / stride + 1`
    pub fn output_width(&self) -> usize {
        ((self.input_width as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    /// Input coordinate touched by output position `o` and kernel offset `k`,
    /// or None when it falls in the zero padding.
    #[inline]
    fn input_coord(&self, o: usize, k: usize, extent: usize) -> Option<usize> {
        let i = o as isize * self.stride as isize + k as isize - self.padding;
        if i >= 0 && i < extent as isize {
            Some(i as usize)
        } else {
            None
        }
    }
}

impl Layer for Conv2DLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size(), "conv input length mismatch");
        assert_eq!(output.len(), batch_size * self.output_size(), "conv output length mismatch");

        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;
        let weights = self.weights.value();
        let biases = self.biases.value();

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let out_base = out_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut sum = biases[oc];

                        for ic in 0..self.in_channels {
                            let w_base = (oc * self.in_channels + ic) * k * k;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..k {
                                let Some(iy) = self.input_coord(oy, ky, self.input_height) else {
                                    continue;
                                };
                                for kx in 0..k {
                                    let Some(ix) = self.input_coord(ox, kx, self.input_width)
                                    else {
                                        continue;
                                    };
                                    sum += input[in_base_c + iy * self.input_width + ix]
                                        * weights[w_base + ky * k + kx];
                                }
                            }
                        }

                        output[out_base + oy * out_w + ox] = sum;
                    }
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
            batch_size * self.output_size(),
            "conv grad_output length mismatch"
        );
        let want_input_grad = !grad_input.is_empty();
        if want_input_grad {
            assert_eq!(
                grad_input.len(),
                batch_size * self.input_size(),
                "conv grad_input length mismatch"
            );
            grad_input.fill(0.0);
        }

        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;
        let weights = self.weights.value();

        let mut grad_w = self.weights.grad_mut();
        let mut grad_b = self.biases.grad_mut();

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let g_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let g_base = g_base_b + oc * out_spatial;
                let g_slice = &grad_output[g_base..g_base + out_spatial];

                grad_b[oc] += g_slice.iter().sum::<f32>();

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * k * k;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let g = g_slice[oy * out_w + ox];
                            if g == 0.0 {
                                continue;
                            }

                            for ky in 0..k {
                                let Some(iy) = self.input_coord(oy, ky, self.input_height) else {
                                    continue;
                                };
                                for kx in 0..k {
                                    let Some(ix) = self.input_coord(ox, kx, self.input_width)
                                    else {
                                        continue;
                                    };
                                    let in_idx = in_base_c + iy * self.input_width + ix;
                                    let w_idx = w_base + ky * k + kx;

                                    grad_w[w_idx] += g * input[in_idx];
                                    if want_input_grad {
                                        grad_input[in_idx] += g * weights[w_idx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weights, &self.biases]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weights, &mut self.biases]
    }
}
