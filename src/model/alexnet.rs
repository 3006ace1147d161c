//! AlexNet
//!
//! ```text
//! conv1 (2 groups, shared input, 11x11/4) -> relu -> lrn -> pool 3/2
//! conv2 (2 groups, 5x5 pad 2)             -> relu -> lrn -> pool 3/2
//! conv3 (3x3 pad 1)                       -> relu
//! conv4 (2 groups, 3x3 pad 1)             -> relu
//! conv5 (2 groups, 3x3 pad 1)             -> relu -> pool 3/2
//! fc6 -> relu -> dropout -> fc7 -> relu -> dropout -> fc8 (logits)
//! ```

use crate::config::LrnConfig;
use crate::error::{Result, TrainError};
use crate::layers::{
    Conv2DLayer, ConvGeometry, DenseLayer, DropoutLayer, GroupedConv2DLayer, InputSplit, Layer,
    LrnLayer, MaxPool2DLayer, Parameter, ReluLayer,
};
use crate::model::{Classifier, FilterBank, ForwardPass};
use crate::utils::SimpleRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const POOL_WINDOW: usize = 3;
const POOL_STRIDE: usize = 2;

/// Layer widths of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlexNetConfig {
    pub input_channels: usize,
    /// Input images are square, `input_size × input_size`.
    pub input_size: usize,
    /// Groups of the split convolutions.
    pub groups: usize,
    pub conv1_channels: usize,
    pub conv1_kernel: usize,
    pub conv1_stride: usize,
    pub conv2_channels: usize,
    pub conv3_channels: usize,
    pub conv4_channels: usize,
    pub conv5_channels: usize,
    pub fc_units: usize,
    pub num_classes: usize,
}

impl Default for AlexNetConfig {
    fn default() -> Self {
        Self {
            input_channels: 3,
            input_size: 227,
            groups: 2,
            conv1_channels: 96,
            conv1_kernel: 11,
            conv1_stride: 4,
            conv2_channels: 256,
            conv3_channels: 384,
            conv4_channels: 384,
            conv5_channels: 256,
            fc_units: 4096,
            num_classes: 2,
        }
    }
}

fn conv_out(size: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = size + 2 * padding;
    if stride == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

impl AlexNetConfig {
    /// A narrow network on 67x67 inputs, small enough for unit tests.
    pub fn tiny() -> Self {
        Self {
            input_size: 67,
            conv1_channels: 4,
            conv2_channels: 8,
            conv3_channels: 8,
            conv4_channels: 8,
            conv5_channels: 8,
            fc_units: 16,
            ..Self::default()
        }
    }

    pub fn input_len(&self) -> usize {
        self.input_channels * self.input_size * self.input_size
    }

    /// Spatial side after conv1/pool1, pool2 and pool5.
    fn spatial_sizes(&self) -> Option<(usize, usize, usize, usize)> {
        let c1 = conv_out(self.input_size, self.conv1_kernel, self.conv1_stride, 0)?;
        let p1 = conv_out(c1, POOL_WINDOW, POOL_STRIDE, 0)?;
        let p2 = conv_out(p1, POOL_WINDOW, POOL_STRIDE, 0)?;
        let p5 = conv_out(p2, POOL_WINDOW, POOL_STRIDE, 0)?;
        Some((c1, p1, p2, p5))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.groups == 0 {
            return Err("groups must be positive".into());
        }
        if self.input_channels == 0 || self.fc_units == 0 {
            return Err("layer widths must be positive".into());
        }
        if self.num_classes < 2 {
            return Err("num_classes must be at least 2".into());
        }
        for (name, channels) in [
            ("conv1_channels", self.conv1_channels),
            ("conv2_channels", self.conv2_channels),
            ("conv3_channels", self.conv3_channels),
            ("conv4_channels", self.conv4_channels),
            ("conv5_channels", self.conv5_channels),
        ] {
            if channels == 0 || channels % self.groups != 0 {
                return Err(format!("{name} must be a positive multiple of groups"));
            }
        }
        if self.spatial_sizes().is_none() {
            return Err(format!(
                "input_size {} is too small for the conv/pool stack",
                self.input_size
            ));
        }
        Ok(())
    }
}

pub struct AlexNet {
    conv1: GroupedConv2DLayer,
    layers: Vec<Box<dyn Layer>>,
    num_classes: usize,
    input_len: usize,
    weight_decay: f32,
    /// Input and every layer output of the last forward pass.
    activations: Vec<Vec<f32>>,
    batch_size: usize,
}

impl AlexNet {
    /// Builds the network with Xavier-initialized weights.
    pub fn new(
        config: &AlexNetConfig,
        lrn: &LrnConfig,
        weight_decay: f32,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        config.validate().map_err(TrainError::Config)?;
        let (s1, p1, p2, p5) = config
            .spatial_sizes()
            .ok_or_else(|| TrainError::Config("input too small".into()))?;
        let g = config.groups;

        let conv1 = GroupedConv2DLayer::new(
            "conv1",
            g,
            InputSplit::Shared,
            ConvGeometry {
                in_channels: config.input_channels,
                out_channels: config.conv1_channels,
                kernel_size: config.conv1_kernel,
                padding: 0,
                stride: config.conv1_stride,
                input_height: config.input_size,
                input_width: config.input_size,
            },
            rng,
        );

        let grouped = |name: &str, in_c: usize, out_c: usize, k: usize, side: usize, rng: &mut SimpleRng| {
            GroupedConv2DLayer::new(
                name,
                g,
                InputSplit::Partitioned,
                ConvGeometry {
                    in_channels: in_c,
                    out_channels: out_c,
                    kernel_size: k,
                    padding: (k / 2) as isize,
                    stride: 1,
                    input_height: side,
                    input_width: side,
                },
                rng,
            )
        };
        let lrn_layer = |name: &str, channels: usize, side: usize| {
            LrnLayer::new(name, channels, side, side, lrn.depth_radius, lrn.bias, lrn.alpha, lrn.beta)
        };

        let c1 = config.conv1_channels;
        let c2 = config.conv2_channels;
        let c3 = config.conv3_channels;
        let c4 = config.conv4_channels;
        let c5 = config.conv5_channels;
        let flat = c5 * p5 * p5;
        let fc = config.fc_units;

        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(ReluLayer::new("relu1", c1 * s1 * s1)),
            Box::new(lrn_layer("norm1", c1, s1)),
            Box::new(MaxPool2DLayer::new("pool1", c1, s1, s1, POOL_WINDOW, POOL_STRIDE)),
            Box::new(grouped("conv2", c1, c2, 5, p1, rng)),
            Box::new(ReluLayer::new("relu2", c2 * p1 * p1)),
            Box::new(lrn_layer("norm2", c2, p1)),
            Box::new(MaxPool2DLayer::new("pool2", c2, p1, p1, POOL_WINDOW, POOL_STRIDE)),
            Box::new(Conv2DLayer::new("conv3", c2, c3, 3, 1, 1, p2, p2, rng)),
            Box::new(ReluLayer::new("relu3", c3 * p2 * p2)),
            Box::new(grouped("conv4", c3, c4, 3, p2, rng)),
            Box::new(ReluLayer::new("relu4", c4 * p2 * p2)),
            Box::new(grouped("conv5", c4, c5, 3, p2, rng)),
            Box::new(ReluLayer::new("relu5", c5 * p2 * p2)),
            Box::new(MaxPool2DLayer::new("pool5", c5, p2, p2, POOL_WINDOW, POOL_STRIDE)),
            Box::new(DenseLayer::new("fc6", flat, fc, rng)),
            Box::new(ReluLayer::new("relu6", fc)),
            Box::new(DropoutLayer::new("dropout6", fc, rng)),
            Box::new(DenseLayer::new("fc7", fc, fc, rng)),
            Box::new(ReluLayer::new("relu7", fc)),
            Box::new(DropoutLayer::new("dropout7", fc, rng)),
            Box::new(DenseLayer::new("fc8", fc, config.num_classes, rng)),
        ];

        let net = Self {
            conv1,
            layers,
            num_classes: config.num_classes,
            input_len: config.input_len(),
            weight_decay,
            activations: Vec::new(),
            batch_size: 0,
        };
        debug!(
            parameters = net.parameter_count(),
            layers = net.layers.len() + 1,
            "built alexnet"
        );
        Ok(net)
    }

    fn stack(&self) -> impl Iterator<Item = &dyn Layer> {
        std::iter::once(&self.conv1 as &dyn Layer).chain(self.layers.iter().map(|l| l.as_ref()))
    }

    fn regularization(&self) -> f32 {
        self.weight_decay
            * self
                .parameters()
                .iter()
                .filter(|p| p.applies_weight_decay())
                .map(|p| p.l2_loss())
                .sum::<f32>()
    }
}

impl Classifier for AlexNet {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn forward(&mut self, images: &[f32], batch_size: usize, keep_prob: f32) -> Result<ForwardPass> {
        if batch_size == 0 || images.len() != batch_size * self.input_len {
            return Err(TrainError::precondition(format!(
                "expected {} x {} input values, got {}",
                batch_size,
                self.input_len,
                images.len()
            )));
        }
        if !(keep_prob > 0.0 && keep_prob <= 1.0) {
            return Err(TrainError::precondition(format!(
                "keep_prob {keep_prob} outside (0, 1]"
            )));
        }
        for layer in self.layers.iter_mut() {
            layer.set_keep_prob(keep_prob);
        }

        let mut activations = Vec::with_capacity(self.layers.len() + 2);
        activations.push(images.to_vec());
        for layer in self.stack() {
            let mut output = vec![0.0f32; batch_size * layer.output_size()];
            if let Some(input) = activations.last() {
                layer.forward(input, &mut output, batch_size);
            }
            activations.push(output);
        }

        let logits = activations.last().cloned().unwrap_or_default();
        self.activations = activations;
        self.batch_size = batch_size;

        Ok(ForwardPass {
            logits,
            regularization: self.regularization(),
        })
    }

    fn backward(&mut self, grad_logits: &[f32], batch_size: usize) -> Result<()> {
        if self.activations.is_empty() || batch_size != self.batch_size {
            return Err(TrainError::precondition(
                "backward called without a matching forward pass",
            ));
        }
        if grad_logits.len() != batch_size * self.num_classes {
            return Err(TrainError::precondition(format!(
                "expected {} logit gradients, got {}",
                batch_size * self.num_classes,
                grad_logits.len()
            )));
        }

        let stack: Vec<&dyn Layer> = self.stack().collect();
        let mut grad = grad_logits.to_vec();
        for (i, layer) in stack.iter().enumerate().rev() {
            let mut grad_input = if i == 0 {
                Vec::new()
            } else {
                vec![0.0f32; batch_size * layer.input_size()]
            };
            layer.backward(
                &self.activations[i],
                &self.activations[i + 1],
                &grad,
                &mut grad_input,
                batch_size,
            );
            grad = grad_input;
        }

        if self.weight_decay > 0.0 {
            for p in self.parameters() {
                if p.applies_weight_decay() {
                    let mut grad = p.grad_mut();
                    for (g, w) in grad.iter_mut().zip(p.value()) {
                        *g += self.weight_decay * w;
                    }
                }
            }
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.stack().flat_map(|l| l.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.conv1.parameters_mut();
        for layer in self.layers.iter_mut() {
            params.extend(layer.parameters_mut());
        }
        params
    }

    fn first_layer_kernels(&self) -> Vec<FilterBank> {
        self.conv1
            .groups()
            .iter()
            .filter_map(|conv| FilterBank::from_parameter(conv.weights()))
            .collect()
    }
}
