//! Run configuration for `train`.

use anyhow::Context;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::SgdConfig;
use clap::Parser;
use cli_support::{BackendKind, RuntimeArgs};
use models::DannModelConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(
    name = "train",
    about = "Domain-adversarial training of a clip classifier (train/val/test loop)",
    args_override_self = true
)]
pub struct TrainArgs {
    /// Prefix applied to the video, annotation, result, and resume paths.
    #[arg(long)]
    pub root_path: Option<PathBuf>,
    /// Directory of clip frame folders laid out as `<label>/<key>/`.
    #[arg(long, default_value = "video_kinetics_jpg")]
    pub video_path: PathBuf,
    /// Dataset manifest (JSON) with labels and the subset database.
    #[arg(long, default_value = "kinetics.json")]
    pub annotation_path: PathBuf,
    /// Output directory for logs, matrices, and checkpoints.
    #[arg(long, default_value = "results")]
    pub result_path: PathBuf,
    /// Annotation CSV mapping sample locations to mean ids (enables per-animal normalization).
    #[arg(long)]
    pub annotation_file: Option<PathBuf>,
    /// Channel mean/std table keyed by mean id.
    #[arg(long)]
    pub mean_file: Option<PathBuf>,
    /// Number of classes.
    #[arg(long, default_value_t = 10)]
    pub n_classes: usize,
    /// Height and width of input frames.
    #[arg(long, default_value_t = 112)]
    pub sample_size: u32,
    /// Temporal duration of inputs in frames.
    #[arg(long, default_value_t = 16)]
    pub sample_duration: usize,
    /// Max pixel jitter of the training crop centre.
    #[arg(long, default_value_t = 0)]
    pub crop_jitter: u32,
    /// Pixel values are divided by this (1 keeps 0..255, 255 maps to 0..1).
    #[arg(long, default_value_t = 1.0)]
    pub norm_value: f32,
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
    /// Number of total epochs to run.
    #[arg(long, default_value_t = 200)]
    pub n_epochs: usize,
    /// First epoch (1-based). Overridden by the checkpoint when resuming.
    #[arg(long, default_value_t = 1)]
    pub begin_epoch: usize,
    /// Initial learning rate (divided by `lr_factor` on every plateau).
    #[arg(long, default_value_t = 0.1)]
    pub learning_rate: f64,
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,
    #[arg(long, default_value_t = 0.9)]
    pub dampening: f64,
    #[arg(long, default_value_t = 1e-3)]
    pub weight_decay: f32,
    /// Nesterov momentum (forces dampening to 0).
    #[arg(long, default_value_t = false)]
    pub nesterov: bool,
    /// Epochs without validation improvement before the LR is reduced.
    #[arg(long, default_value_t = 10)]
    pub lr_patience: usize,
    /// Multiplicative LR reduction on plateau.
    #[arg(long, default_value_t = 0.1)]
    pub lr_factor: f64,
    /// Save a checkpoint every this many epochs.
    #[arg(long, default_value_t = 10)]
    pub checkpoint: usize,
    /// Checkpoint directory (`save_<epoch>`) to resume from.
    #[arg(long)]
    pub resume_path: Option<PathBuf>,
    /// Skip training.
    #[arg(long, default_value_t = false)]
    pub no_train: bool,
    /// Skip validation.
    #[arg(long, default_value_t = false)]
    pub no_val: bool,
    /// Skip the per-epoch test pass.
    #[arg(long, default_value_t = false)]
    pub no_test: bool,
    #[arg(long, default_value_t = 1)]
    pub manual_seed: u64,
    /// Width of the shared feature vector.
    #[arg(long, default_value_t = 32)]
    pub features: usize,
    /// Hidden width of the label and domain heads.
    #[arg(long, default_value_t = 64)]
    pub hidden: usize,
    #[command(flatten)]
    pub runtime: RuntimeArgs,
    /// Architecture tag, filled in by `resolve`.
    #[arg(skip)]
    pub arch: String,
}

impl TrainArgs {
    /// Apply `root_path`, create the result directory, and derive the architecture tag.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        if let Some(root) = self.root_path.clone().filter(|p| !p.as_os_str().is_empty()) {
            self.video_path = root.join(&self.video_path);
            self.annotation_path = root.join(&self.annotation_path);
            self.result_path = root.join(&self.result_path);
            self.resume_path = self.resume_path.map(|p| root.join(p));
        }
        if self.nesterov {
            self.dampening = 0.0;
        }
        self.batch_size = self.batch_size.max(1);
        self.arch = self.model_config().arch();
        fs::create_dir_all(&self.result_path)
            .with_context(|| format!("creating result dir {}", self.result_path.display()))?;
        Ok(self)
    }

    pub fn backend(&self) -> BackendKind {
        self.runtime.backend
    }

    pub fn model_config(&self) -> DannModelConfig {
        DannModelConfig {
            n_classes: self.n_classes,
            in_channels: 3,
            features: self.features,
            hidden: self.hidden,
        }
    }

    /// Dampening actually handed to the optimizer.
    pub fn effective_dampening(&self) -> f64 {
        if self.nesterov {
            0.0
        } else {
            self.dampening
        }
    }

    pub fn sgd_config(&self) -> SgdConfig {
        let momentum = (self.momentum > 0.0).then(|| {
            MomentumConfig::new()
                .with_momentum(self.momentum)
                .with_dampening(self.effective_dampening())
                .with_nesterov(self.nesterov)
        });
        let weight_decay = (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay));
        SgdConfig::new()
            .with_momentum(momentum)
            .with_weight_decay(weight_decay)
    }

    /// Write the resolved options to `<result_path>/opts.json`.
    pub fn save_json(&self) -> anyhow::Result<PathBuf> {
        let path = self.result_path.join("opts.json");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Reject backends that were not compiled in.
pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; running on the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_prefixes_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let args = TrainArgs::parse_from([
            "train",
            "--root-path",
            tmp.path().to_str().unwrap(),
            "--result-path",
            "out",
            "--resume-path",
            "out/save_3",
        ])
        .resolve()
        .unwrap();
        assert_eq!(args.result_path, tmp.path().join("out"));
        assert_eq!(args.video_path, tmp.path().join("video_kinetics_jpg"));
        assert_eq!(args.resume_path, Some(tmp.path().join("out/save_3")));
        assert!(args.result_path.is_dir());
        assert_eq!(args.arch, "dann-conv-32");
    }

    #[test]
    fn nesterov_forces_zero_dampening() {
        let args = TrainArgs::parse_from(["train", "--nesterov"]);
        assert_eq!(args.effective_dampening(), 0.0);
        let args = TrainArgs::parse_from(["train", "--dampening", "0.5"]);
        assert_eq!(args.effective_dampening(), 0.5);
    }

    #[test]
    fn opts_json_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let args = TrainArgs::parse_from([
            "train",
            "--result-path",
            tmp.path().to_str().unwrap(),
            "--n-epochs",
            "3",
        ])
        .resolve()
        .unwrap();
        let path = args.save_json().unwrap();
        let loaded = TrainArgs::load_json(&path).unwrap();
        assert_eq!(loaded.n_epochs, 3);
        assert_eq!(loaded.arch, args.arch);
        assert_eq!(loaded.backend(), BackendKind::NdArray);
    }
}
