//! Output locations of a run, relative to one root directory

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rolling checkpoint, overwritten every epoch.
    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    /// Permanent checkpoint for a 1-based epoch number.
    pub fn epoch_model_dir(&self, epoch_number: usize) -> PathBuf {
        self.root.join(format!("model_epoch{epoch_number}"))
    }

    pub fn loss_log(&self) -> PathBuf {
        self.root.join("loss.txt")
    }

    pub fn accuracy_plot(&self) -> PathBuf {
        self.root.join("acc.png")
    }

    pub fn loss_plot(&self) -> PathBuf {
        self.root.join("loss.png")
    }

    pub fn kernel_dir(&self) -> PathBuf {
        self.root.join("first_kernel_visualization")
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
