//! Split-group convolution
//!
//! AlexNet splits several convolutions into two groups whose outputs are
//! concatenated on the channel axis. The first layer feeds the full input to
//! both groups; later layers give each group its own half of the input
//! channels.

use crate::layers::{Conv2DLayer, Layer, Parameter};
use crate::utils::SimpleRng;

/// How the input channels are distributed over the groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSplit {
    /// Every group sees all input channels.
    Shared,
    /// Input channels are divided evenly, group `g` gets the `g`-th slice.
    Partitioned,
}

/// Geometry shared by every group of a grouped convolution.
#[derive(Debug, Clone, Copy)]
pub struct ConvGeometry {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: isize,
    pub stride: usize,
    pub input_height: usize,
    pub input_width: usize,
}

pub struct GroupedConv2DLayer {
    name: String,
    split: InputSplit,
    geometry: ConvGeometry,
    groups: Vec<Conv2DLayer>,
}

impl GroupedConv2DLayer {
    /// Build `group_count` convolutions named `<name>_1`, `<name>_2`, …
    ///
    /// # Panics
    ///
    /// Panics if the channel counts are not divisible by `group_count`.
    pub fn new(
        name: &str,
        group_count: usize,
        split: InputSplit,
        geometry: ConvGeometry,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(group_count > 0, "group count must be positive");
        assert_eq!(
            geometry.out_channels % group_count,
            0,
            "output channels must divide evenly into groups"
        );
        let group_in = match split {
            InputSplit::Shared => geometry.in_channels,
            InputSplit::Partitioned => {
                assert_eq!(
                    geometry.in_channels % group_count,
                    0,
                    "input channels must divide evenly into groups"
                );
                geometry.in_channels / group_count
            }
        };
        let group_out = geometry.out_channels / group_count;

        let groups = (1..=group_count)
            .map(|g| {
                Conv2DLayer::new(
                    &format!("{name}_{g}"),
                    group_in,
                    group_out,
                    geometry.kernel_size,
                    geometry.padding,
                    geometry.stride,
                    geometry.input_height,
                    geometry.input_width,
                    rng,
                )
            })
            .collect();

        Self {
            name: name.to_string(),
            split,
            geometry,
            groups,
        }
    }

    pub fn groups(&self) -> &[Conv2DLayer] {
        &self.groups
    }

    pub fn output_height(&self) -> usize {
        self.groups[0].output_height()
    }

    pub fn output_width(&self) -> usize {
        self.groups[0].output_width()
    }

    fn in_spatial(&self) -> usize {
        self.geometry.input_height * self.geometry.input_width
    }

    fn out_spatial(&self) -> usize {
        self.output_height() * self.output_width()
    }

    /// First input channel read by group `g`.
    fn input_offset(&self, g: usize) -> usize {
        match self.split {
            InputSplit::Shared => 0,
            InputSplit::Partitioned => g * self.groups[g].in_channels(),
        }
    }
}

/// Copy channels `[start, start + count)` of every sample into a dense buffer.
fn gather_channels(
    src: &[f32],
    batch_size: usize,
    channels: usize,
    start: usize,
    count: usize,
    spatial: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(batch_size * count * spatial);
    for b in 0..batch_size {
        let base = (b * channels + start) * spatial;
        out.extend_from_slice(&src[base..base + count * spatial]);
    }
    out
}

/// Inverse of [`gather_channels`]; adds into `dst` when `accumulate` is set.
fn scatter_channels(
    dst: &mut [f32],
    src: &[f32],
    batch_size: usize,
    channels: usize,
    start: usize,
    spatial: usize,
    accumulate: bool,
) {
    let count = src.len() / (batch_size * spatial);
    for b in 0..batch_size {
        let base = (b * channels + start) * spatial;
        let block = &src[b * count * spatial..(b + 1) * count * spatial];
        let target = &mut dst[base..base + count * spatial];
        if accumulate {
            for (d, s) in target.iter_mut().zip(block) {
                *d += s;
            }
        } else {
            target.copy_from_slice(block);
        }
    }
}

impl Layer for GroupedConv2DLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let in_spatial = self.in_spatial();
        let out_spatial = self.out_spatial();

        for (g, conv) in self.groups.iter().enumerate() {
            let group_input = gather_channels(
                input,
                batch_size,
                self.geometry.in_channels,
                self.input_offset(g),
                conv.in_channels(),
                in_spatial,
            );
            let mut group_output = vec![0.0f32; batch_size * conv.output_size()];
            conv.forward(&group_input, &mut group_output, batch_size);
            scatter_channels(
                output,
                &group_output,
                batch_size,
                self.geometry.out_channels,
                g * conv.out_channels(),
                out_spatial,
                false,
            );
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
        let in_spatial = self.in_spatial();
        let out_spatial = self.out_spatial();
        let want_input_grad = !grad_input.is_empty();
        if want_input_grad {
            grad_input.fill(0.0);
        }

        for (g, conv) in self.groups.iter().enumerate() {
            let group_input = gather_channels(
                input,
                batch_size,
                self.geometry.in_channels,
                self.input_offset(g),
                conv.in_channels(),
                in_spatial,
            );
            let group_grad_output = gather_channels(
                grad_output,
                batch_size,
                self.geometry.out_channels,
                g * conv.out_channels(),
                conv.out_channels(),
                out_spatial,
            );
            let mut group_grad_input = if want_input_grad {
                vec![0.0f32; group_input.len()]
            } else {
                Vec::new()
            };
            conv.backward(
                &group_input,
                &[],
                &group_grad_output,
                &mut group_grad_input,
                batch_size,
            );
            if want_input_grad {
                scatter_channels(
                    grad_input,
                    &group_grad_input,
                    batch_size,
                    self.geometry.in_channels,
                    self.input_offset(g),
                    in_spatial,
                    true,
                );
            }
        }
    }

    fn input_size(&self) -> usize {
        self.geometry.in_channels * self.in_spatial()
    }

    fn output_size(&self) -> usize {
        self.geometry.out_channels * self.out_spatial()
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.groups.iter().flat_map(|c| c.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.groups.iter_mut().flat_map(|c| c.parameters_mut()).collect()
    }
}
