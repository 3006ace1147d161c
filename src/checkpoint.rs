//! Checkpoint persistence
//!
//! A checkpoint is a directory holding two files:
//!
//! - `tensors-<sha256>.bin`: every parameter and momentum accumulator as
//!   little-endian f32, back to back, named after the digest of its bytes
//! - `checkpoint.json`: the manifest with the tensor file name, its digest,
//!   the tensor index, the training state and the metric history
//!
//! Both files are written to a temporary name and renamed into place, the
//! manifest last. A new tensor file never replaces the one the current
//! manifest points at, so the manifest rename is the single commit point.
//! Tensor files the manifest no longer names are deleted after it lands.
//!
//! A directory without a manifest is treated as absent when it is empty or
//! only holds leftovers of an interrupted first save; any other
//! inconsistency is a corrupt checkpoint.

use crate::error::{Result, TrainError};
use crate::model::Classifier;
use crate::optimizers::Optimizer;
use crate::training::{MetricHistory, TrainingState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "checkpoint.json";
pub const TENSOR_PREFIX: &str = "tensors-";
pub const TENSOR_SUFFIX: &str = ".bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Position of one tensor inside the tensor file, in f32 elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TensorRecord {
    name: String,
    shape: Vec<usize>,
    offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    created_at: u64,
    files: Vec<FileRecord>,
    parameters: Vec<TensorRecord>,
    momentum: Vec<TensorRecord>,
    state: TrainingState,
    history: MetricHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Everything restored from a checkpoint directory.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source: PathBuf,
    pub parameters: BTreeMap<String, Tensor>,
    pub momentum: BTreeMap<String, Vec<f32>>,
    pub state: TrainingState,
    pub history: MetricHistory,
}

impl Snapshot {
    /// Loads parameters and momentum into `classifier`/`optimizer` and hands
    /// back the state and history.
    ///
    /// Every classifier parameter must be present with its exact shape.
    pub fn apply(
        self,
        classifier: &mut dyn Classifier,
        optimizer: &mut dyn Optimizer,
    ) -> Result<(TrainingState, MetricHistory)> {
        let source = self.source;
        let mut lengths = BTreeMap::new();
        for param in classifier.parameters_mut() {
            let tensor = self.parameters.get(param.name()).ok_or_else(|| {
                TrainError::corrupt(&source, format!("missing tensor {}", param.name()))
            })?;
            if tensor.shape != param.shape() {
                return Err(TrainError::corrupt(
                    &source,
                    format!(
                        "tensor {} has shape {:?}, expected {:?}",
                        param.name(),
                        tensor.shape,
                        param.shape()
                    ),
                ));
            }
            param.value_mut().copy_from_slice(&tensor.values);
            lengths.insert(param.name().to_string(), param.len());
        }

        let unused = self
            .parameters
            .keys()
            .filter(|name| !lengths.contains_key(*name))
            .count();
        if unused > 0 {
            warn!(
                unused,
                path = %source.display(),
                "checkpoint holds tensors the classifier does not use"
            );
        }

        for (name, slot) in &self.momentum {
            if lengths.get(name) != Some(&slot.len()) {
                return Err(TrainError::corrupt(
                    &source,
                    format!("momentum slot {name} does not match any parameter"),
                ));
            }
        }
        optimizer.load_slots(self.momentum);

        Ok((self.state, self.history))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| TrainError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| TrainError::io(path, e))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// File name of a tensor blob with the given hex digest.
pub fn tensor_file_name(sha256: &str) -> String {
    format!("{TENSOR_PREFIX}{sha256}{TENSOR_SUFFIX}")
}

/// True for names produced by [`tensor_file_name`].
pub fn is_tensor_file(name: &str) -> bool {
    name.strip_prefix(TENSOR_PREFIX)
        .and_then(|rest| rest.strip_suffix(TENSOR_SUFFIX))
        .is_some_and(|digest| !digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_save_leftover(name: &str) -> bool {
    is_tensor_file(name) || name.ends_with(".tmp")
}

/// Deletes every tensor file in `dir` except `keep`.
fn remove_stale_tensors(dir: &Path, keep: &str) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| TrainError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TrainError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == keep || !is_tensor_file(name) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!(file = name, "stale tensor file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = name, error = %e, "could not remove stale tensor file"),
        }
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Appends `values` to the blob and returns its index record.
fn push_tensor(
    blob: &mut Vec<u8>,
    offset: &mut usize,
    name: &str,
    shape: Vec<usize>,
    values: &[f32],
) -> TensorRecord {
    for v in values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    let record = TensorRecord {
        name: name.to_string(),
        shape,
        offset: *offset,
    };
    *offset += values.len();
    record
}

fn read_tensor(source: &Path, data: &[f32], record: &TensorRecord) -> Result<Vec<f32>> {
    let outside = || {
        TrainError::corrupt(source, format!("tensor {} lies outside the tensor file", record.name))
    };
    let len = record
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(outside)?;
    let end = record.offset.checked_add(len).ok_or_else(outside)?;
    data.get(record.offset..end)
        .map(|s| s.to_vec())
        .ok_or_else(outside)
}

pub struct CheckpointManager;

impl CheckpointManager {
    /// Writes a complete checkpoint into `dir`, creating it if needed.
    pub fn save(
        dir: &Path,
        classifier: &dyn Classifier,
        optimizer: &dyn Optimizer,
        state: &TrainingState,
        history: &MetricHistory,
    ) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| TrainError::io(dir, e))?;

        let mut blob = Vec::new();
        let mut offset = 0usize;
        let parameters: Vec<TensorRecord> = classifier
            .parameters()
            .into_iter()
            .map(|p| push_tensor(&mut blob, &mut offset, p.name(), p.shape().to_vec(), p.value()))
            .collect();
        let momentum: Vec<TensorRecord> = optimizer
            .slots()
            .iter()
            .map(|(name, slot)| push_tensor(&mut blob, &mut offset, name, vec![slot.len()], slot))
            .collect();

        let sha256 = sha256_hex(&blob);
        let tensor_name = tensor_file_name(&sha256);
        write_atomic(&dir.join(&tensor_name), &blob)?;

        let manifest = Manifest {
            version: FORMAT_VERSION,
            created_at: unix_now(),
            files: vec![FileRecord {
                filename: tensor_name.clone(),
                sha256,
                bytes: blob.len() as u64,
            }],
            parameters,
            momentum,
            state: state.clone(),
            history: history.clone(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| TrainError::serialization(&manifest_path, e))?;
        write_atomic(&manifest_path, &json)?;
        remove_stale_tensors(dir, &tensor_name)?;

        debug!(path = %dir.display(), bytes = blob.len(), "checkpoint saved");
        Ok(())
    }

    /// `Ok(None)` when `dir` holds no checkpoint, `Err` when it holds a
    /// broken one.
    pub fn restore_if_exists(dir: &Path) -> Result<Option<Snapshot>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let present = manifest_path
            .try_exists()
            .map_err(|e| TrainError::io(&manifest_path, e))?;
        if !present {
            let names: Vec<String> = match fs::read_dir(dir) {
                Ok(entries) => entries
                    .map(|entry| {
                        entry
                            .map(|e| e.file_name().to_string_lossy().into_owned())
                            .map_err(|e| TrainError::io(dir, e))
                    })
                    .collect::<Result<_>>()?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(TrainError::io(dir, e)),
            };
            if !names.iter().all(|n| is_save_leftover(n)) {
                return Err(TrainError::corrupt(dir, format!("{MANIFEST_FILE} is missing")));
            }
            if !names.is_empty() {
                warn!(
                    path = %dir.display(),
                    files = names.len(),
                    "ignoring leftovers of an unfinished checkpoint"
                );
            }
            return Ok(None);
        }

        let text =
            fs::read_to_string(&manifest_path).map_err(|e| TrainError::io(&manifest_path, e))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| TrainError::corrupt(&manifest_path, format!("unreadable manifest: {e}")))?;
        if manifest.version != FORMAT_VERSION {
            return Err(TrainError::corrupt(
                dir,
                format!("unsupported format version {}", manifest.version),
            ));
        }

        let record = manifest
            .files
            .iter()
            .find(|f| is_tensor_file(&f.filename))
            .ok_or_else(|| TrainError::corrupt(dir, "manifest does not list a tensor file"))?;
        let tensor_path = dir.join(&record.filename);
        let blob = fs::read(&tensor_path).map_err(|e| TrainError::io(&tensor_path, e))?;
        if blob.len() as u64 != record.bytes || sha256_hex(&blob) != record.sha256 {
            return Err(TrainError::corrupt(&tensor_path, "digest mismatch"));
        }
        if blob.len() % 4 != 0 {
            return Err(TrainError::corrupt(&tensor_path, "truncated f32 data"));
        }
        let data: Vec<f32> = blob
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let mut parameters = BTreeMap::new();
        for r in &manifest.parameters {
            let values = read_tensor(dir, &data, r)?;
            parameters.insert(
                r.name.clone(),
                Tensor {
                    shape: r.shape.clone(),
                    values,
                },
            );
        }
        let mut momentum = BTreeMap::new();
        for r in &manifest.momentum {
            momentum.insert(r.name.clone(), read_tensor(dir, &data, r)?);
        }

        info!(
            path = %dir.display(),
            epoch = ?manifest.state.last_completed_epoch,
            tensors = parameters.len(),
            "checkpoint restored"
        );
        Ok(Some(Snapshot {
            source: dir.to_path_buf(),
            parameters,
            momentum,
            state: manifest.state,
            history: manifest.history,
        }))
    }
}
