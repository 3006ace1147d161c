//! Labeled image batches
//!
//! A [`BatchSource`] hands out fixed-size batches for training and
//! validation. Both streams wrap around forever; the training stream is
//! reshuffled every time it wraps.

pub mod folder;
pub mod memory;

pub use folder::ImageFolderSource;
pub use memory::InMemorySource;

use crate::error::{Result, TrainError};
use crate::utils::SimpleRng;

/// A batch of NCHW images with one-hot labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Vec<f32>,
    pub labels: Vec<f32>,
    pub batch_size: usize,
    pub num_classes: usize,
}

impl Batch {
    /// Builds a batch from class indices.
    pub fn from_classes(
        images: Vec<f32>,
        classes: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        let batch_size = classes.len();
        if batch_size == 0 || images.len() % batch_size != 0 {
            return Err(TrainError::precondition(format!(
                "{} image values cannot be split into {} samples",
                images.len(),
                batch_size
            )));
        }
        let mut labels = vec![0.0f32; batch_size * num_classes];
        for (row, &class) in classes.iter().enumerate() {
            if class >= num_classes {
                return Err(TrainError::precondition(format!(
                    "label {class} out of range for {num_classes} classes"
                )));
            }
            labels[row * num_classes + class] = 1.0;
        }
        Ok(Self {
            images,
            labels,
            batch_size,
            num_classes,
        })
    }

    pub fn sample_len(&self) -> usize {
        self.images.len() / self.batch_size
    }
}

pub trait BatchSource {
    /// Number of training examples.
    fn train_count(&self) -> usize;

    /// Number of validation examples.
    fn val_count(&self) -> usize;

    fn next_train(&mut self, batch_size: usize) -> Result<Batch>;

    fn next_val(&mut self, batch_size: usize) -> Result<Batch>;
}

/// Endless walk over `0..len`, reshuffling on every wrap when seeded.
#[derive(Debug, Clone)]
pub struct IndexCursor {
    order: Vec<usize>,
    position: usize,
    rng: Option<SimpleRng>,
}

impl IndexCursor {
    pub fn sequential(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
            position: 0,
            rng: None,
        }
    }

    pub fn shuffled(len: usize, mut rng: SimpleRng) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        rng.shuffle(&mut order);
        Self {
            order,
            position: 0,
            rng: Some(rng),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Next `count` indices, wrapping to the start when the walk is exhausted.
    pub fn take(&mut self, count: usize) -> Result<Vec<usize>> {
        if self.order.is_empty() {
            return Err(TrainError::precondition("cannot draw from an empty split"));
        }
        if count == 0 {
            return Err(TrainError::precondition("batch size must be positive"));
        }
        let mut picked = Vec::with_capacity(count);
        while picked.len() < count {
            if self.position == self.order.len() {
                self.position = 0;
                if let Some(rng) = self.rng.as_mut() {
                    rng.shuffle(&mut self.order);
                }
            }
            picked.push(self.order[self.position]);
            self.position += 1;
        }
        Ok(picked)
    }
}
