//! Append-only `loss.txt` training log
//!
//! Every entry starts with a newline, so the file reads as one record per
//! line after an initial blank line. Each append opens, writes and closes the
//! file.

use crate::error::{Result, TrainError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LossLog {
    path: PathBuf,
}

impl LossLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TrainError::io(&self.path, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| TrainError::io(&self.path, e))
    }

    /// `epoch` is 1-based here.
    pub fn epoch(&self, epoch: usize, batch_loss: f32, elapsed_secs: f64) -> Result<()> {
        self.append(&format_epoch_line(epoch, batch_loss, elapsed_secs))
    }

    pub fn accuracies(&self, val_acc: f32, train_acc: f32) -> Result<()> {
        self.append(&format!("\ntest accuracy: {val_acc:7}\ntrain accuracy: {train_acc:7}"))
    }

    pub fn learning_rate_reduced(&self) -> Result<()> {
        self.append("\n[learning rate reducing]")
    }
}

pub fn format_epoch_line(epoch: usize, batch_loss: f32, elapsed_secs: f64) -> String {
    format!("\nepoch: {epoch:7}  batch loss: {batch_loss:7.6}  time elapsed: {elapsed_secs:7.6}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_line_format() {
        assert_eq!(
            format_epoch_line(3, 0.5, 12.25),
            "\nepoch:       3  batch loss: 0.500000  time elapsed: 12.250000"
        );
    }

    #[test]
    fn test_appends_never_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let log = LossLog::new(dir.path().join("loss.txt"));
        log.epoch(1, 1.0, 0.5).unwrap();
        log.accuracies(40.0, 45.5).unwrap();
        log.learning_rate_reduced().unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "");
        assert!(lines[1].starts_with("epoch:       1"));
        assert_eq!(lines[2], "test accuracy:      40");
        assert_eq!(lines[3], "train accuracy:    45.5");
        assert_eq!(lines[4], "[learning rate reducing]");
    }
}
