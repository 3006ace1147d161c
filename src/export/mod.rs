//! Diagnostic artifacts: training curves and first-layer kernel snapshots

pub mod canvas;
pub mod kernels;
pub mod npy;
pub mod plots;

pub use kernels::{KernelGrid, KernelSnapshot};
pub use plots::{export_accuracy_plot, export_loss_plot};
