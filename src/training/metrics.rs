//! Append-only metric history
//!
//! Samples are stored without x-coordinates. The plots rebuild the axis from
//! the sample index and the sampling stride: the `i`-th loss sample sits at
//! `1 + i * loss_sampling_step`, the `i`-th accuracy at `1 + i * acc_sampling_step`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    losses: Vec<f32>,
    train_acc: Vec<f32>,
    val_acc: Vec<f32>,
    loss_sampling_step: usize,
    acc_sampling_step: usize,
}

impl MetricHistory {
    pub fn new(loss_sampling_step: usize, acc_sampling_step: usize) -> Self {
        Self {
            losses: Vec::new(),
            train_acc: Vec::new(),
            val_acc: Vec::new(),
            loss_sampling_step,
            acc_sampling_step,
        }
    }

    pub fn record_loss(&mut self, loss: f32) {
        self.losses.push(loss);
    }

    /// Records one validation cadence; both series always grow together.
    pub fn record_accuracy(&mut self, val_acc: f32, train_acc: f32) {
        self.val_acc.push(val_acc);
        self.train_acc.push(train_acc);
    }

    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    pub fn train_acc(&self) -> &[f32] {
        &self.train_acc
    }

    pub fn val_acc(&self) -> &[f32] {
        &self.val_acc
    }

    pub fn loss_sampling_step(&self) -> usize {
        self.loss_sampling_step
    }

    pub fn acc_sampling_step(&self) -> usize {
        self.acc_sampling_step
    }

    /// Adopt new strides for subsequent samples (a resumed run may use
    /// different sampling steps; earlier points keep their index position).
    pub fn set_strides(&mut self, loss_sampling_step: usize, acc_sampling_step: usize) {
        self.loss_sampling_step = loss_sampling_step;
        self.acc_sampling_step = acc_sampling_step;
    }

    pub fn loss_axis(&self) -> Vec<f32> {
        axis(self.losses.len(), self.loss_sampling_step)
    }

    pub fn acc_axis(&self) -> Vec<f32> {
        axis(self.train_acc.len(), self.acc_sampling_step)
    }
}

fn axis(count: usize, stride: usize) -> Vec<f32> {
    (0..count).map(|i| (1 + i * stride) as f32).collect()
}
