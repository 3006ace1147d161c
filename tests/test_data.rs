//! Tests for the batch sources

use alexnet_trainer::data::memory::Split;
use alexnet_trainer::data::{BatchSource, ImageFolderSource, InMemorySource};
use alexnet_trainer::{ErrorKind, TrainError};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

fn write_class(root: &Path, name: &str, color: Rgb<u8>, count: usize) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        RgbImage::from_pixel(5, 5, color)
            .save(dir.join(format!("img{i}.png")))
            .unwrap();
    }
}

/// `cat` images are solid red, `dog` images solid blue.
fn image_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_class(dir.path(), "cat", RED, 5);
    write_class(dir.path(), "dog", BLUE, 5);
    dir
}

mod in_memory_tests {
    use super::*;

    #[test]
    fn test_validation_walks_in_order_and_wraps() {
        let train = Split::new(vec![0.0; 4], vec![0, 1, 0, 1]);
        let val = Split::new(vec![10.0, 11.0, 12.0], vec![0, 1, 0]);
        let mut source = InMemorySource::new(1, 2, train, val, 5).unwrap();

        assert_eq!(source.next_val(2).unwrap().images, vec![10.0, 11.0]);
        assert_eq!(source.next_val(2).unwrap().images, vec![12.0, 10.0]);
    }

    #[test]
    fn test_training_pass_covers_every_sample() {
        let train = Split::new((0..6).map(|v| v as f32).collect(), vec![0, 1, 0, 1, 0, 1]);
        let mut source =
            InMemorySource::new(1, 2, train, Split::new(vec![0.0], vec![0]), 5).unwrap();

        let mut seen: Vec<f32> = (0..3)
            .flat_map(|_| source.next_train(2).unwrap().images)
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_label_out_of_range() {
        let train = Split::new(vec![0.0, 1.0], vec![0, 2]);
        let err = InMemorySource::new(1, 2, train, Split::default(), 1)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}

mod image_folder_tests {
    use super::*;

    #[test]
    fn test_scan_and_split() {
        let root = image_tree();
        let source = ImageFolderSource::open(root.path(), 8, 3, 0.2, 1).unwrap();
        assert_eq!(source.class_names(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(source.num_classes(), 2);
        assert_eq!(source.val_count(), 2);
        assert_eq!(source.train_count(), 8);
    }

    #[test]
    fn test_rgb_batches_are_chw_in_unit_range() {
        let root = image_tree();
        let mut source = ImageFolderSource::open(root.path(), 8, 3, 0.2, 1).unwrap();
        let batch = source.next_train(4).unwrap();
        assert_eq!(batch.images.len(), 4 * 3 * 64);

        for (sample, labels) in batch.images.chunks_exact(3 * 64).zip(batch.labels.chunks_exact(2)) {
            let red = &sample[..64];
            let blue = &sample[128..];
            if labels[0] == 1.0 {
                assert!(red.iter().all(|&v| (v - 1.0).abs() < 1e-2));
                assert!(blue.iter().all(|&v| v.abs() < 1e-2));
            } else {
                assert!(red.iter().all(|&v| v.abs() < 1e-2));
                assert!(blue.iter().all(|&v| (v - 1.0).abs() < 1e-2));
            }
        }
    }

    #[test]
    fn test_grayscale_batches() {
        let root = image_tree();
        let mut source = ImageFolderSource::open(root.path(), 6, 1, 0.2, 1).unwrap();
        let batch = source.next_val(2).unwrap();
        assert_eq!(batch.images.len(), 2 * 36);
        assert!(batch.images.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_ignores_non_images_and_empty_classes() {
        let root = image_tree();
        fs::write(root.path().join("cat/notes.txt"), "not an image").unwrap();
        fs::write(root.path().join("README"), "top-level file").unwrap();
        fs::create_dir(root.path().join("empty")).unwrap();

        let source = ImageFolderSource::open(root.path(), 8, 3, 0.2, 1).unwrap();
        assert_eq!(source.num_classes(), 2);
        assert_eq!(source.train_count() + source.val_count(), 10);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_class(dir.path(), "cat", RED, 3);
        let err = ImageFolderSource::open(dir.path(), 8, 3, 0.2, 1).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_unsupported_channel_count() {
        let root = image_tree();
        let err = ImageFolderSource::open(root.path(), 8, 2, 0.2, 1).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageFolderSource::open(dir.path().join("nope"), 8, 3, 0.2, 1)
            .err()
            .unwrap();
        assert!(matches!(err, TrainError::Io { .. }));
    }
}
