#![recursion_limit = "256"]
//! Domain-adversarial training harness for clip classifiers.

pub mod checkpoint;
pub mod epoch;
pub mod logger;
pub mod metrics;
pub mod options;
pub mod runner;
pub mod schedule;

pub use checkpoint::{
    checkpoint_dir, load_checkpoint, load_model, load_state, save_checkpoint, CheckpointError,
    CheckpointState,
};
pub use epoch::{evaluate, test_epoch, train_epoch, val_epoch, EpochPlan, EvalOutcome, TrainEpochStats};
pub use logger::{BatchRow, EpochRow, EvalRow, RunLogs, TableLogger};
pub use metrics::{AverageMeter, ConfidenceTable, ConfusionMatrix};
pub use models::{DannModel, DannModelConfig};
pub use options::{validate_backend_choice, TrainArgs};
pub use runner::{
    build_sources, check_label_range, fit, load_normalization, normalization_from_files,
    run_training, DataSources, EpochReport, FitReport,
};
pub use schedule::{alpha_ramp, PlateauScheduler};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
