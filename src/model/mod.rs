//! Classifier interface used by the training loop
//!
//! The loop only needs a forward pass that yields logits and the explicit
//! regularization term, a backward pass from the logit gradient, access to
//! the trainable parameters and the first convolution's filter banks.

pub mod alexnet;

pub use alexnet::{AlexNet, AlexNetConfig};

use crate::error::Result;
use crate::layers::Parameter;

/// Result of one forward pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// `batch_size × num_classes`, row-major.
    pub logits: Vec<f32>,
    /// Weight-decay penalty to add to the data loss.
    pub regularization: f32,
}

/// One group of first-layer filters, `[out, in, kh, kw]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    pub shape: [usize; 4],
    pub values: Vec<f32>,
}

impl FilterBank {
    pub fn from_parameter(parameter: &Parameter) -> Option<Self> {
        let shape: [usize; 4] = parameter.shape().try_into().ok()?;
        Some(Self {
            shape,
            values: parameter.value().to_vec(),
        })
    }
}

pub trait Classifier {
    fn num_classes(&self) -> usize;

    /// Scalars per input image (`channels × height × width`).
    fn input_len(&self) -> usize;

    /// Run the network on an NCHW batch. `keep_prob` is the dropout keep
    /// probability for this pass; `1.0` disables dropout.
    fn forward(&mut self, images: &[f32], batch_size: usize, keep_prob: f32) -> Result<ForwardPass>;

    /// Back-propagate `grad_logits` through the last forward pass, adding into
    /// every parameter's gradient, weight decay included.
    fn backward(&mut self, grad_logits: &[f32], batch_size: usize) -> Result<()>;

    fn parameters(&self) -> Vec<&Parameter>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Filter banks of the first convolution, in output-channel order.
    fn first_layer_kernels(&self) -> Vec<FilterBank>;

    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}
