//! AlexNet Trainer Library
//!
//! Trains an AlexNet-style image classifier with momentum SGD. The training
//! loop samples losses, validates on an epoch cadence, divides the learning
//! rate when training accuracy stalls, keeps rolling and permanent
//! checkpoints and exports loss/accuracy curves and first-layer kernel
//! snapshots.
//!
//! # Modules
//!
//! - `layers`: Layer trait and implementations (grouped Conv2D, LRN, pooling, ...)
//! - `model`: Classifier trait and the AlexNet network
//! - `optimizers`: Optimizer trait and momentum SGD
//! - `data`: Batch sources (in-memory, image folder)
//! - `training`: Training loop, decay policy, metrics and the loss log
//! - `checkpoint`: Checkpoint save/restore
//! - `export`: Plots, kernel snapshots and NPY output
//! - `config`: Training configuration
//! - `utils`: RNG and activation/loss helpers

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod layers;
pub mod layout;
pub mod model;
pub mod optimizers;
pub mod training;
pub mod utils;

pub use error::{ErrorKind, Result, TrainError};
