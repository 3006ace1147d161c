//! Tests for first-layer kernel snapshots

use alexnet_trainer::config::LrnConfig;
use alexnet_trainer::export::npy::read_npy;
use alexnet_trainer::export::{KernelGrid, KernelSnapshot};
use alexnet_trainer::model::{AlexNet, AlexNetConfig, Classifier, FilterBank};
use alexnet_trainer::utils::SimpleRng;
use alexnet_trainer::ErrorKind;
use image::GenericImageView;
use std::fs;

fn random_bank(out: usize, rng: &mut SimpleRng) -> FilterBank {
    let shape = [out, 3, 11, 11];
    let values = (0..shape.iter().product::<usize>())
        .map(|_| rng.gen_range_f32(-0.3, 0.3))
        .collect();
    FilterBank { shape, values }
}

fn reference_groups() -> Vec<FilterBank> {
    let mut rng = SimpleRng::new(17);
    vec![random_bank(48, &mut rng), random_bank(48, &mut rng)]
}

mod normalization_tests {
    use super::*;

    #[test]
    fn test_min_is_zero_and_max_is_one() {
        let snapshot = KernelSnapshot::from_groups(&reference_groups()).unwrap();
        assert_eq!(snapshot.shape(), [96, 11, 11, 3]);
        let min = snapshot.values().iter().copied().fold(f32::INFINITY, f32::min);
        let max = snapshot.values().iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(min, 0.0);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_kernels_are_zero() {
        let groups = vec![
            FilterBank {
                shape: [48, 3, 11, 11],
                values: vec![0.25; 48 * 3 * 121],
            },
            FilterBank {
                shape: [48, 3, 11, 11],
                values: vec![0.25; 48 * 3 * 121],
            },
        ];
        let snapshot = KernelSnapshot::from_groups(&groups).unwrap();
        assert!(snapshot.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_second_group_follows_first() {
        let groups = reference_groups();
        let snapshot = KernelSnapshot::from_groups(&groups).unwrap();
        let channel_len = 11 * 11 * 3;

        // the largest raw weight keeps its channel after concatenation
        let (argmax, _) = groups
            .iter()
            .flat_map(|g| g.values.iter())
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        let channel = argmax / channel_len;
        let tile = &snapshot.values()[channel * channel_len..(channel + 1) * channel_len];
        assert!(tile.iter().any(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_mismatched_groups_are_rejected() {
        let mut rng = SimpleRng::new(1);
        let mut other = random_bank(48, &mut rng);
        other.shape = [48 * 3, 1, 11, 11];
        let groups = vec![random_bank(48, &mut rng), other];
        let err = KernelSnapshot::from_groups(&groups).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(KernelSnapshot::from_groups(&[]).is_err());
    }
}

mod export_tests {
    use super::*;

    #[test]
    fn test_export_writes_png_and_npy() {
        let dir = tempfile::tempdir().unwrap();
        let viz = dir.path().join("first_kernel_visualization");
        let snapshot = KernelSnapshot::from_groups(&reference_groups()).unwrap();
        snapshot.export(&viz, 3, KernelGrid::default()).unwrap();

        let png = image::open(viz.join("result0003.png")).unwrap();
        assert_eq!(png.width(), 16 * 46 + 2);
        assert_eq!(png.height(), 28 + 6 * 46 + 2);

        let (shape, values) = read_npy(&viz.join("result0003.npy")).unwrap();
        assert_eq!(shape, vec![96, 11, 11, 3]);
        assert_eq!(values, snapshot.values());
    }

    #[test]
    fn test_same_epoch_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = KernelSnapshot::from_groups(&reference_groups()).unwrap();
        snapshot.export(dir.path(), 0, KernelGrid::default()).unwrap();
        snapshot.export(dir.path(), 0, KernelGrid::default()).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_grid_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let viz = dir.path().join("viz");
        let snapshot = KernelSnapshot::from_groups(&reference_groups()).unwrap();
        let err = snapshot
            .export(&viz, 0, KernelGrid { rows: 8, cols: 8 })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(!viz.exists());
    }

    #[test]
    fn test_network_kernels_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = SimpleRng::new(4);
        let net = AlexNet::new(&AlexNetConfig::tiny(), &LrnConfig::default(), 0.0, &mut rng).unwrap();
        let groups = net.first_layer_kernels();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].shape, [2, 3, 11, 11]);

        let snapshot = KernelSnapshot::from_groups(&groups).unwrap();
        snapshot.export(dir.path(), 0, KernelGrid { rows: 2, cols: 2 }).unwrap();
        assert!(dir.path().join("result0000.png").exists());
    }
}
