//! Tests for checkpoint save/restore
//!
//! This file covers:
//! - Round-trips of parameters, momentum, state and history
//! - Absent versus corrupt checkpoint directories
//! - Saves interrupted between the tensor and manifest renames
//! - Shape, digest and index validation on restore

use alexnet_trainer::checkpoint::{is_tensor_file, CheckpointManager, MANIFEST_FILE};
use alexnet_trainer::config::LrnConfig;
use alexnet_trainer::model::{AlexNet, AlexNetConfig, Classifier};
use alexnet_trainer::optimizers::{Momentum, Optimizer};
use alexnet_trainer::training::{MetricHistory, TrainingState};
use alexnet_trainer::utils::SimpleRng;
use alexnet_trainer::{ErrorKind, TrainError};
use std::fs;
use std::path::{Path, PathBuf};

fn tiny_net(seed: u64) -> AlexNet {
    let mut rng = SimpleRng::new(seed);
    AlexNet::new(&AlexNetConfig::tiny(), &LrnConfig::default(), 5e-4, &mut rng).unwrap()
}

/// A net, an optimizer with non-trivial slots, and matching state/history.
fn trained_fixture() -> (AlexNet, Momentum, TrainingState, MetricHistory) {
    let mut net = tiny_net(1);
    let mut optimizer = Momentum::new(0.9);
    for param in net.parameters_mut() {
        param.grad_mut().iter_mut().for_each(|g| *g = 0.5);
        optimizer.update(param, 0.01);
    }

    let mut state = TrainingState::new(0.01);
    state.last_completed_epoch = Some(7);
    state.learning_rate = 0.001;
    state.decay_count = 1;

    let mut history = MetricHistory::new(5, 1);
    history.record_loss(0.69);
    history.record_loss(0.51);
    history.record_accuracy(55.0, 60.0);

    (net, optimizer, state, history)
}

fn tensor_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| is_tensor_file(p.file_name().unwrap().to_str().unwrap()))
        .collect();
    files.sort();
    files
}

fn edit_manifest(dir: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = dir.join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    edit(&mut manifest);
    fs::write(&path, manifest.to_string()).unwrap();
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_save_then_restore_reproduces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("model");
        let (net, optimizer, state, history) = trained_fixture();
        CheckpointManager::save(&model_dir, &net, &optimizer, &state, &history).unwrap();

        let snapshot = CheckpointManager::restore_if_exists(&model_dir)
            .unwrap()
            .expect("checkpoint should exist");

        let mut restored_net = tiny_net(2);
        let mut restored_optimizer = Momentum::new(0.9);
        let (restored_state, restored_history) =
            snapshot.apply(&mut restored_net, &mut restored_optimizer).unwrap();

        for (a, b) in net.parameters().iter().zip(restored_net.parameters()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.value(), b.value());
        }
        assert_eq!(restored_optimizer.slots(), optimizer.slots());
        assert_eq!(restored_state, state);
        assert_eq!(restored_history, history);
    }

    #[test]
    fn test_save_overwrites_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (net, optimizer, mut state, history) = trained_fixture();
        CheckpointManager::save(dir.path(), &net, &optimizer, &state, &history).unwrap();
        state.last_completed_epoch = Some(8);
        CheckpointManager::save(dir.path(), &net, &optimizer, &state, &history).unwrap();

        let snapshot = CheckpointManager::restore_if_exists(dir.path()).unwrap().unwrap();
        assert_eq!(snapshot.state.last_completed_epoch, Some(8));
        assert!(!dir.path().join(format!("{MANIFEST_FILE}.tmp")).exists());
        assert_eq!(tensor_files(dir.path()).len(), 1);
    }
}

mod interrupted_save_tests {
    use super::*;

    /// Saves a different net into a scratch directory and copies its tensor
    /// file into `dir`, leaving the manifest of `dir` untouched.
    fn land_foreign_tensor_file(dir: &Path, state: &TrainingState) -> PathBuf {
        let scratch = tempfile::tempdir().unwrap();
        let other = tiny_net(9);
        let optimizer = Momentum::new(0.9);
        let mut later = state.clone();
        later.last_completed_epoch = Some(8);
        let history = MetricHistory::new(5, 1);
        CheckpointManager::save(scratch.path(), &other, &optimizer, &later, &history).unwrap();
        let source = tensor_files(scratch.path()).remove(0);
        let target = dir.join(source.file_name().unwrap());
        fs::copy(&source, &target).unwrap();
        target
    }

    #[test]
    fn test_tensor_rename_without_manifest_rename_keeps_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (net, optimizer, state, history) = trained_fixture();
        CheckpointManager::save(dir.path(), &net, &optimizer, &state, &history).unwrap();
        land_foreign_tensor_file(dir.path(), &state);
        assert_eq!(tensor_files(dir.path()).len(), 2);

        let snapshot = CheckpointManager::restore_if_exists(dir.path()).unwrap().unwrap();
        assert_eq!(snapshot.state.last_completed_epoch, Some(7));

        let mut restored_net = tiny_net(2);
        let mut restored_optimizer = Momentum::new(0.9);
        snapshot.apply(&mut restored_net, &mut restored_optimizer).unwrap();
        for (a, b) in net.parameters().iter().zip(restored_net.parameters()) {
            assert_eq!(a.value(), b.value());
        }
        assert_eq!(restored_optimizer.slots(), optimizer.slots());
    }

    #[test]
    fn test_next_save_removes_stale_tensor_files() {
        let dir = tempfile::tempdir().unwrap();
        let (net, optimizer, mut state, history) = trained_fixture();
        CheckpointManager::save(dir.path(), &net, &optimizer, &state, &history).unwrap();
        let first = tensor_files(dir.path());
        let stray = land_foreign_tensor_file(dir.path(), &state);

        let changed = tiny_net(4);
        state.last_completed_epoch = Some(9);
        CheckpointManager::save(dir.path(), &changed, &optimizer, &state, &history).unwrap();

        let remaining = tensor_files(dir.path());
        assert_eq!(remaining.len(), 1);
        assert!(!first.contains(&remaining[0]));
        assert!(!stray.exists());
        let snapshot = CheckpointManager::restore_if_exists(dir.path()).unwrap().unwrap();
        assert_eq!(snapshot.state.last_completed_epoch, Some(9));
    }

    #[test]
    fn test_unfinished_first_save_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (net, optimizer, state, history) = trained_fixture();
        CheckpointManager::save(dir.path(), &net, &optimizer, &state, &history).unwrap();
        fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();
        fs::write(dir.path().join(format!("{MANIFEST_FILE}.tmp")), "{").unwrap();

        assert!(CheckpointManager::restore_if_exists(dir.path()).unwrap().is_none());
    }
}

mod absent_tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let result = CheckpointManager::restore_if_exists(&dir.path().join("model")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_empty_directory_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::restore_if_exists(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_regular_file_in_place_of_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model");
        fs::write(&model, "not a directory").unwrap();

        let err = CheckpointManager::restore_if_exists(&model).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(err, TrainError::Io { .. }), "got {err}");
    }
}

mod corrupt_tests {
    use super::*;

    fn saved_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let (net, optimizer, state, history) = trained_fixture();
        CheckpointManager::save(dir.path(), &net, &optimizer, &state, &history).unwrap();
        dir
    }

    fn assert_corrupt(err: TrainError) {
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(err, TrainError::CorruptCheckpoint { .. }), "got {err}");
    }

    #[test]
    fn test_missing_manifest_with_other_files() {
        let dir = saved_dir();
        fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();
        fs::write(dir.path().join("notes.txt"), "hand-edited").unwrap();
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_unreadable_manifest() {
        let dir = saved_dir();
        fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_tampered_tensors() {
        let dir = saved_dir();
        let path = tensor_files(dir.path()).remove(0);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_unsupported_version() {
        let dir = saved_dir();
        edit_manifest(dir.path(), |m| m["version"] = serde_json::json!(99));
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_tensor_file_name_outside_directory() {
        let dir = saved_dir();
        edit_manifest(dir.path(), |m| {
            m["files"][0]["filename"] = serde_json::json!("../tensors-00.bin")
        });
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_tensor_offset_overflow() {
        let dir = saved_dir();
        edit_manifest(dir.path(), |m| {
            m["parameters"][0]["offset"] = serde_json::json!(usize::MAX)
        });
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_tensor_shape_overflow() {
        let dir = saved_dir();
        edit_manifest(dir.path(), |m| {
            m["momentum"][0]["shape"] = serde_json::json!([usize::MAX, 2])
        });
        assert_corrupt(CheckpointManager::restore_if_exists(dir.path()).unwrap_err());
    }

    #[test]
    fn test_shape_mismatch_on_apply() {
        let dir = saved_dir();
        let snapshot = CheckpointManager::restore_if_exists(dir.path()).unwrap().unwrap();

        let config = AlexNetConfig {
            fc_units: 32,
            ..AlexNetConfig::tiny()
        };
        let mut rng = SimpleRng::new(3);
        let mut wider = AlexNet::new(&config, &LrnConfig::default(), 5e-4, &mut rng).unwrap();
        let mut optimizer = Momentum::new(0.9);
        assert_corrupt(snapshot.apply(&mut wider, &mut optimizer).unwrap_err());
    }
}
