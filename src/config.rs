//! Configuration structures for training
//!
//! A run is described by one JSON file deserialized into [`TrainingConfig`].
//! Every section has defaults matching the reference AlexNet run, so a file
//! only needs to list what it changes:
//!
//! ```json
//! {
//!   "hyperparameters": { "learning_rate": 0.01, "batch_size": 64 },
//!   "architecture": { "num_classes": 2 },
//!   "run": { "max_epoch": 90, "loss_sampling_step": 20, "acc_sampling_step": 1 }
//! }
//! ```

use crate::error::{Result, TrainError};
use crate::export::KernelGrid;
use crate::model::AlexNetConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Optimization hyperparameters. The learning rate here is the initial value;
/// the live rate is tracked by the training state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub learning_rate: f32,
    pub momentum: f32,
    /// Multiplier of the L2 penalty on kernels and dense weights.
    pub weight_decay: f32,
    /// Dropout keep probability during training.
    pub keep_prob: f32,
    pub batch_size: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.9,
            weight_decay: 0.0005,
            keep_prob: 0.8,
            batch_size: 128,
        }
    }
}

/// Local response normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrnConfig {
    pub depth_radius: usize,
    pub bias: f32,
    pub alpha: f32,
    pub beta: f32,
}

impl Default for LrnConfig {
    fn default() -> Self {
        Self {
            depth_radius: 5,
            bias: 2.0,
            alpha: 1e-4,
            beta: 0.75,
        }
    }
}

/// Accuracy-trend learning-rate decay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Mean improvement (accuracy points) below which the rate is decayed.
    pub threshold: f32,
    /// Divisor applied to the learning rate on decay.
    pub factor: f32,
    /// Smallest window of past accuracies the decision is made on. `0` lets
    /// an empty window trigger a decay.
    pub min_window: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            factor: 10.0,
            min_window: 1,
        }
    }
}

/// Epoch count and sampling strides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_epoch: usize,
    pub loss_sampling_step: usize,
    pub acc_sampling_step: usize,
    /// Epoch stride of the permanent `model_epoch<N>` checkpoints.
    pub checkpoint_every: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_epoch: 50,
            loss_sampling_step: 10,
            acc_sampling_step: 1,
            checkpoint_every: 10,
        }
    }
}

/// Where images come from and where artifacts go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of a `<class_name>/<image>` tree.
    pub data_dir: Option<PathBuf>,
    /// Directory receiving `model/`, `loss.txt`, plots and kernel snapshots.
    pub output_dir: PathBuf,
    /// Share of every class held out for validation.
    pub val_fraction: f32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            output_dir: PathBuf::from("."),
            val_fraction: 0.1,
        }
    }
}

/// Complete description of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub hyperparameters: Hyperparameters,
    pub lrn: LrnConfig,
    pub architecture: AlexNetConfig,
    pub decay: DecayConfig,
    pub run: RunConfig,
    pub kernel_grid: KernelGrid,
    pub data: DataConfig,
    /// Seed for weight init, dropout masks and shuffling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hyperparameters: Hyperparameters::default(),
            lrn: LrnConfig::default(),
            architecture: AlexNetConfig::default(),
            decay: DecayConfig::default(),
            run: RunConfig::default(),
            kernel_grid: KernelGrid::default(),
            data: DataConfig::default(),
            seed: 42,
        }
    }
}

/// Loads a training configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use alexnet_trainer::config::load_config;
///
/// let cfg = load_config("config/alexnet.json").unwrap();
/// assert_eq!(cfg.kernel_grid.rows * cfg.kernel_grid.cols, 96);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| TrainError::io(path, e))?;
    let config: TrainingConfig =
        serde_json::from_str(&contents).map_err(|e| TrainError::serialization(path, e))?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(message: impl Into<String>) -> TrainError {
    TrainError::Config(message.into())
}

/// Checks value ranges and cross-field consistency.
pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    let hp = &config.hyperparameters;
    if !(hp.learning_rate > 0.0 && hp.learning_rate.is_finite()) {
        return Err(invalid("learning_rate must be positive"));
    }
    if !(0.0..1.0).contains(&hp.momentum) {
        return Err(invalid("momentum must be in [0, 1)"));
    }
    if hp.weight_decay < 0.0 {
        return Err(invalid("weight_decay must be non-negative"));
    }
    if !(hp.keep_prob > 0.0 && hp.keep_prob <= 1.0) {
        return Err(invalid("keep_prob must be in (0, 1]"));
    }
    if hp.batch_size == 0 {
        return Err(invalid("batch_size must be positive"));
    }

    let lrn = &config.lrn;
    if lrn.bias <= 0.0 || lrn.alpha < 0.0 || lrn.beta < 0.0 {
        return Err(invalid("lrn bias must be positive, alpha and beta non-negative"));
    }

    config.architecture.validate().map_err(invalid)?;

    let decay = &config.decay;
    if decay.factor <= 1.0 {
        return Err(invalid("decay factor must be greater than 1"));
    }
    if decay.min_window > 9 {
        return Err(invalid("decay min_window cannot exceed the 9-entry window"));
    }

    let run = &config.run;
    if run.max_epoch == 0 {
        return Err(invalid("max_epoch must be at least 1"));
    }
    if run.loss_sampling_step == 0 || run.acc_sampling_step == 0 {
        return Err(invalid("sampling steps must be positive"));
    }
    if run.checkpoint_every == 0 {
        return Err(invalid("checkpoint_every must be positive"));
    }

    let grid = &config.kernel_grid;
    if grid.rows * grid.cols != config.architecture.conv1_channels {
        return Err(invalid(format!(
            "kernel grid {}x{} does not match {} first-layer channels",
            grid.rows, grid.cols, config.architecture.conv1_channels
        )));
    }

    if !(config.data.val_fraction > 0.0 && config.data.val_fraction < 1.0) {
        return Err(invalid("val_fraction must be in (0, 1)"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainingConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.hyperparameters.learning_rate, 0.01);
        assert_eq!(config.lrn.depth_radius, 5);
        assert_eq!(config.decay.threshold, 2.0);
        assert_eq!(config.run.checkpoint_every, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{ "hyperparameters": { "batch_size": 32 } }"#).unwrap();
        assert_eq!(config.hyperparameters.batch_size, 32);
        assert_eq!(config.hyperparameters.momentum, 0.9);
        assert_eq!(config.kernel_grid, KernelGrid::default());
    }

    #[test]
    fn test_grid_must_cover_first_layer() {
        let mut config = TrainingConfig::default();
        config.kernel_grid = KernelGrid { rows: 8, cols: 8 };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("kernel grid 8x8"));
    }

    #[test]
    fn test_rejects_bad_keep_prob() {
        let mut config = TrainingConfig::default();
        config.hyperparameters.keep_prob = 0.0;
        assert!(validate_config(&config).is_err());
    }
}
