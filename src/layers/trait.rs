//! Layer trait and trainable parameter storage
//!
//! Every layer of the classifier implements [`Layer`]. Layers with weights own
//! [`Parameter`]s: a named, shaped value buffer plus a gradient accumulator
//! that the backward pass adds into and the optimizer consumes.

use std::cell::{Ref, RefCell, RefMut};

/// A named trainable tensor with its gradient accumulator.
///
/// Gradients live behind a `RefCell` so that `Layer::backward` can take
/// `&self`, mirroring `forward`.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    shape: Vec<usize>,
    value: Vec<f32>,
    grad: RefCell<Vec<f32>>,
    decay: bool,
}

impl Parameter {
    /// Create a parameter. `decay` marks tensors that receive L2 weight decay
    /// (kernels and dense weights, not biases).
    ///
    /// # Panics
    ///
    /// Panics if `value.len()` does not match the product of `shape`.
    pub fn new(name: impl Into<String>, shape: Vec<usize>, value: Vec<f32>, decay: bool) -> Self {
        let expected: usize = shape.iter().product();
        assert_eq!(
            value.len(),
            expected,
            "parameter value length must match its shape"
        );
        let len = value.len();
        Self {
            name: name.into(),
            shape,
            value,
            grad: RefCell::new(vec![0.0; len]),
            decay,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn applies_weight_decay(&self) -> bool {
        self.decay
    }

    pub fn value(&self) -> &[f32] {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut [f32] {
        &mut self.value
    }

    pub fn grad(&self) -> Ref<'_, Vec<f32>> {
        self.grad.borrow()
    }

    pub fn grad_mut(&self) -> RefMut<'_, Vec<f32>> {
        self.grad.borrow_mut()
    }

    pub fn zero_grad(&self) {
        for g in self.grad.borrow_mut().iter_mut() {
            *g = 0.0;
        }
    }

    /// Split borrow used by optimizers: the values mutably, the gradient read-only.
    pub fn value_and_grad(&mut self) -> (&mut [f32], Ref<'_, Vec<f32>>) {
        (&mut self.value, self.grad.borrow())
    }

    /// Half the squared L2 norm of the value, `sum(w^2) / 2`.
    pub fn l2_loss(&self) -> f32 {
        0.5 * self.value.iter().map(|v| v * v).sum::<f32>()
    }
}

/// Core trait for the classifier's layers.
///
/// Data is flattened f32, batch-major, and channel-major inside a sample
/// (`[batch][channel][height][width]`).
pub trait Layer {
    /// Layer name, used as the prefix of its parameter names.
    fn name(&self) -> &str;

    /// Forward propagation.
    ///
    /// * `input` - `batch_size × input_size`
    /// * `output` - `batch_size × output_size`, overwritten
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Backward propagation.
    ///
    /// Overwrites `grad_input` with the gradient w.r.t. `input` and adds the
    /// parameter gradients into the layer's accumulators. `input` and `output`
    /// are the buffers of the matching forward pass. An empty `grad_input`
    /// means the caller does not need the input gradient (first layer).
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    /// Total number of trainable scalars.
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    /// Probability of keeping a unit in the next forward pass. Only dropout
    /// layers react to this.
    fn set_keep_prob(&mut self, _keep_prob: f32) {}
}
