//! Batch source reading a `<root>/<class_name>/<image>` tree
//!
//! Class indices follow the sorted directory names. Each class is shuffled
//! once with the run seed and its first `val_fraction` share is held out for
//! validation. Images are decoded lazily per batch, resized to a square
//! input and scaled to [0, 1] in CHW order.

use crate::data::{Batch, BatchSource, IndexCursor};
use crate::error::{Result, TrainError};
use crate::utils::SimpleRng;
use image::imageops::FilterType;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ImageFolderSource {
    class_names: Vec<String>,
    image_size: u32,
    channels: usize,
    train: Vec<(PathBuf, usize)>,
    val: Vec<(PathBuf, usize)>,
    train_cursor: IndexCursor,
    val_cursor: IndexCursor,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| TrainError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()).map_err(|e| TrainError::io(dir, e)))
        .collect::<Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

impl ImageFolderSource {
    /// Scans `root` and splits every class into train and validation files.
    ///
    /// `channels` must be 1 (grayscale) or 3 (RGB).
    pub fn open(
        root: impl AsRef<Path>,
        image_size: usize,
        channels: usize,
        val_fraction: f32,
        seed: u64,
    ) -> Result<Self> {
        let root = root.as_ref();
        if channels != 1 && channels != 3 {
            return Err(TrainError::precondition(format!(
                "image folders supply 1 or 3 channels, not {channels}"
            )));
        }
        let image_size = u32::try_from(image_size)
            .map_err(|_| TrainError::precondition("image size out of range"))?;

        let mut rng = SimpleRng::new(seed);
        let mut class_names = Vec::new();
        let mut train = Vec::new();
        let mut val = Vec::new();

        for dir in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
            let mut files: Vec<PathBuf> = sorted_entries(&dir)?
                .into_iter()
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            if files.is_empty() {
                continue;
            }
            let class = class_names.len();
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            class_names.push(name);

            rng.shuffle(&mut files);
            let held_out = ((files.len() as f32 * val_fraction).round() as usize).min(files.len());
            for (i, file) in files.into_iter().enumerate() {
                if i < held_out {
                    val.push((file, class));
                } else {
                    train.push((file, class));
                }
            }
        }

        if class_names.len() < 2 {
            return Err(TrainError::precondition(format!(
                "{} must contain at least two class directories with images",
                root.display()
            )));
        }

        info!(
            root = %root.display(),
            classes = class_names.len(),
            train = train.len(),
            val = val.len(),
            "scanned image folder"
        );

        Ok(Self {
            image_size,
            channels,
            train_cursor: IndexCursor::shuffled(train.len(), rng.fork()),
            val_cursor: IndexCursor::sequential(val.len()),
            class_names,
            train,
            val,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Decodes one file into `out` as CHW values in [0, 1].
    fn decode_into(&self, path: &Path, out: &mut Vec<f32>) -> Result<()> {
        let img = image::open(path)
            .map_err(|e| TrainError::image(path, e))?
            .resize_exact(self.image_size, self.image_size, FilterType::Triangle);
        let plane = (self.image_size * self.image_size) as usize;
        let start = out.len();
        out.resize(start + self.channels * plane, 0.0);
        let sample = &mut out[start..];

        if self.channels == 3 {
            for (i, px) in img.to_rgb8().pixels().enumerate() {
                for c in 0..3 {
                    sample[c * plane + i] = px.0[c] as f32 / 255.0;
                }
            }
        } else {
            for (i, px) in img.to_luma8().pixels().enumerate() {
                sample[i] = px.0[0] as f32 / 255.0;
            }
        }
        Ok(())
    }

    fn load(&self, files: &[(PathBuf, usize)], indices: &[usize]) -> Result<Batch> {
        let plane = (self.image_size * self.image_size) as usize;
        let mut images = Vec::with_capacity(indices.len() * self.channels * plane);
        let mut classes = Vec::with_capacity(indices.len());
        for &i in indices {
            let (path, class) = &files[i];
            self.decode_into(path, &mut images)?;
            classes.push(*class);
        }
        Batch::from_classes(images, &classes, self.num_classes())
    }
}

impl BatchSource for ImageFolderSource {
    fn train_count(&self) -> usize {
        self.train.len()
    }

    fn val_count(&self) -> usize {
        self.val.len()
    }

    fn next_train(&mut self, batch_size: usize) -> Result<Batch> {
        let indices = self.train_cursor.take(batch_size)?;
        self.load(&self.train, &indices)
    }

    fn next_val(&mut self, batch_size: usize) -> Result<Batch> {
        let indices = self.val_cursor.take(batch_size)?;
        self.load(&self.val, &indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extensions() {
        assert!(is_image(Path::new("a/cat.PNG")));
        assert!(is_image(Path::new("a/cat.jpeg")));
        assert!(!is_image(Path::new("a/notes.txt")));
        assert!(!is_image(Path::new("a/noext")));
    }
}
