//! Batch source over images already held in memory

use crate::data::{Batch, BatchSource, IndexCursor};
use crate::error::{Result, TrainError};
use crate::utils::SimpleRng;

/// Flattened images plus class indices for one split.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub images: Vec<f32>,
    pub classes: Vec<usize>,
}

impl Split {
    pub fn new(images: Vec<f32>, classes: Vec<usize>) -> Self {
        Self { images, classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// # Example
///
/// ```
/// use alexnet_trainer::data::{BatchSource, InMemorySource, memory::Split};
///
/// let train = Split::new(vec![0.0, 1.0, 2.0, 3.0], vec![0, 1, 0, 1]);
/// let val = Split::new(vec![4.0, 5.0], vec![1, 0]);
/// let mut source = InMemorySource::new(1, 2, train, val, 7).unwrap();
/// assert_eq!(source.train_count(), 4);
/// let batch = source.next_val(2).unwrap();
/// assert_eq!(batch.images, vec![4.0, 5.0]);
/// ```
pub struct InMemorySource {
    sample_len: usize,
    num_classes: usize,
    train: Split,
    val: Split,
    train_cursor: IndexCursor,
    val_cursor: IndexCursor,
}

impl InMemorySource {
    pub fn new(
        sample_len: usize,
        num_classes: usize,
        train: Split,
        val: Split,
        seed: u64,
    ) -> Result<Self> {
        for (name, split) in [("train", &train), ("validation", &val)] {
            if split.images.len() != split.len() * sample_len {
                return Err(TrainError::precondition(format!(
                    "{name} split has {} values for {} samples of {sample_len}",
                    split.images.len(),
                    split.len()
                )));
            }
            if let Some(&bad) = split.classes.iter().find(|&&c| c >= num_classes) {
                return Err(TrainError::precondition(format!(
                    "{name} split has label {bad} for {num_classes} classes"
                )));
            }
        }
        Ok(Self {
            sample_len,
            num_classes,
            train_cursor: IndexCursor::shuffled(train.len(), SimpleRng::new(seed)),
            val_cursor: IndexCursor::sequential(val.len()),
            train,
            val,
        })
    }

    fn gather(&self, split: &Split, indices: &[usize]) -> Result<Batch> {
        let mut images = Vec::with_capacity(indices.len() * self.sample_len);
        let mut classes = Vec::with_capacity(indices.len());
        for &i in indices {
            images.extend_from_slice(&split.images[i * self.sample_len..(i + 1) * self.sample_len]);
            classes.push(split.classes[i]);
        }
        Batch::from_classes(images, &classes, self.num_classes)
    }
}

impl BatchSource for InMemorySource {
    fn train_count(&self) -> usize {
        self.train.len()
    }

    fn val_count(&self) -> usize {
        self.val.len()
    }

    fn next_train(&mut self, batch_size: usize) -> Result<Batch> {
        let indices = self.train_cursor.take(batch_size)?;
        self.gather(&self.train, &indices)
    }

    fn next_val(&mut self, batch_size: usize) -> Result<Batch> {
        let indices = self.val_cursor.take(batch_size)?;
        self.gather(&self.val, &indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mismatched_lengths() {
        let train = Split::new(vec![0.0; 3], vec![0, 1]);
        assert!(InMemorySource::new(2, 2, train, Split::default(), 1).is_err());
    }

    #[test]
    fn test_train_batches_keep_image_label_pairs() {
        // Image value encodes its class.
        let train = Split::new(vec![0.0, 1.0, 0.0, 1.0, 1.0], vec![0, 1, 0, 1, 1]);
        let mut source =
            InMemorySource::new(1, 2, train, Split::new(vec![0.0], vec![0]), 11).unwrap();
        for _ in 0..4 {
            let batch = source.next_train(3).unwrap();
            for (row, &v) in batch.images.iter().enumerate() {
                assert_eq!(batch.labels[row * 2 + v as usize], 1.0);
            }
        }
    }
}
