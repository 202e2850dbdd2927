//! Epoch checkpoints: `save_<epoch>/{model.bin, optim.bin, state.json}`.

use crate::schedule::PlateauScheduler;
use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use models::AdversarialClassifier;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MODEL_FILE: &str = "model";
const OPTIM_FILE: &str = "optim";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint state {path} is invalid: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("recorder failed for {path}: {msg}")]
    Recorder { path: PathBuf, msg: String },
    #[error("checkpoint architecture {found} does not match model architecture {expected}")]
    ArchMismatch { expected: String, found: String },
}

/// Everything in a checkpoint that is not a tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    /// First epoch to run when resuming.
    pub epoch: usize,
    pub arch: String,
    pub learning_rate: f64,
    pub scheduler: PlateauScheduler,
}

pub fn checkpoint_dir(result_path: &Path, epoch: usize) -> PathBuf {
    result_path.join(format!("save_{epoch}"))
}

fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

/// Write model, optimizer, and state for `epoch` under `result_path`.
pub fn save_checkpoint<B, M, O>(
    result_path: &Path,
    epoch: usize,
    model: &M,
    optim: &O,
    scheduler: &PlateauScheduler,
) -> Result<PathBuf, CheckpointError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + AdversarialClassifier<B>,
    O: Optimizer<M, B>,
{
    let dir = checkpoint_dir(result_path, epoch);
    fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
        path: dir.clone(),
        source,
    })?;
    let recorder = recorder();

    let model_path = dir.join(MODEL_FILE);
    model
        .clone()
        .save_file(model_path.clone(), &recorder)
        .map_err(|e| CheckpointError::Recorder {
            path: model_path,
            msg: format!("{e:?}"),
        })?;

    let optim_path = dir.join(OPTIM_FILE);
    Recorder::<B>::record(&recorder, optim.to_record(), optim_path.clone()).map_err(|e| {
        CheckpointError::Recorder {
            path: optim_path,
            msg: format!("{e:?}"),
        }
    })?;

    let state = CheckpointState {
        epoch: epoch + 1,
        arch: model.arch(),
        learning_rate: scheduler.lr(),
        scheduler: scheduler.clone(),
    };
    let state_path = dir.join(STATE_FILE);
    let json = serde_json::to_string_pretty(&state).map_err(|source| CheckpointError::State {
        path: state_path.clone(),
        source,
    })?;
    fs::write(&state_path, json).map_err(|source| CheckpointError::Io {
        path: state_path,
        source,
    })?;
    Ok(dir)
}

pub fn load_state(dir: &Path) -> Result<CheckpointState, CheckpointError> {
    let path = dir.join(STATE_FILE);
    let raw = fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CheckpointError::State { path, source })
}

/// Load the model weights of a checkpoint on any backend, checking the architecture tag.
pub fn load_model<B, M>(dir: &Path, model: M, device: &B::Device) -> Result<M, CheckpointError>
where
    B: Backend,
    M: Module<B> + AdversarialClassifier<B>,
{
    let state = load_state(dir)?;
    let expected = model.arch();
    if state.arch != expected {
        return Err(CheckpointError::ArchMismatch {
            expected,
            found: state.arch,
        });
    }
    let model_path = dir.join(MODEL_FILE);
    model
        .load_file(model_path.clone(), &recorder(), device)
        .map_err(|e| CheckpointError::Recorder {
            path: model_path,
            msg: format!("{e:?}"),
        })
}

/// Restore model and optimizer from `dir`, refusing checkpoints of another architecture.
pub fn load_checkpoint<B, M, O>(
    dir: &Path,
    model: M,
    optim: O,
    device: &B::Device,
) -> Result<(M, O, CheckpointState), CheckpointError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + AdversarialClassifier<B>,
    O: Optimizer<M, B>,
{
    let model = load_model::<B, M>(dir, model, device)?;
    let state = load_state(dir)?;
    let optim_path = dir.join(OPTIM_FILE);
    let record = Recorder::<B>::load(&recorder(), optim_path.clone(), device).map_err(|e| {
        CheckpointError::Recorder {
            path: optim_path,
            msg: format!("{e:?}"),
        }
    })?;
    let optim = optim.load_record(record);
    Ok((model, optim, state))
}
