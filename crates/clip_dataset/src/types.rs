//! Core types and error definitions for clip_dataset.

use data_contracts::{ChannelStats, ContractError};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, ClipDatasetError>;

#[derive(Debug, Error)]
pub enum ClipDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("clip {path} has no frames")]
    NoFrames { path: PathBuf },
    #[error("sample {key} has label {label} which is not in the manifest label list")]
    UnknownLabel { key: String, label: String },
    #[error("no channel statistics for sample {key} (mean id {mean_id:?})")]
    MissingStats { key: String, mean_id: Option<String> },
    #[error("clip buffer for {id} has {actual} values, expected {expected}")]
    ClipSize {
        id: String,
        actual: usize,
        expected: usize,
    },
    #[error("{0}")]
    Other(String),
}

/// Shape of one clip tensor: channels x frames x height x width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipShape {
    pub channels: usize,
    pub frames: usize,
    pub height: usize,
    pub width: usize,
}

impl ClipShape {
    pub fn new(channels: usize, frames: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            frames,
            height,
            width,
        }
    }

    pub fn numel(&self) -> usize {
        self.channels * self.frames * self.height * self.width
    }

    pub fn dims_with_batch(&self, batch: usize) -> [usize; 5] {
        [batch, self.channels, self.frames, self.height, self.width]
    }
}

/// One indexed clip: a directory of frames plus its class and normalization.
#[derive(Debug, Clone)]
pub struct ClipIndex {
    /// Manifest key (the sample location).
    pub key: String,
    pub label: usize,
    pub clip_dir: PathBuf,
    /// Frame images sorted by file name.
    pub frames: Vec<PathBuf>,
    pub stats: ChannelStats,
}

impl ClipIndex {
    /// File identifier used in per-sample reports.
    pub fn identifier(&self) -> String {
        self.clip_dir.display().to_string()
    }
}

/// A decoded clip in CTHW layout.
#[derive(Debug, Clone)]
pub struct ClipSample {
    pub id: String,
    pub label: usize,
    pub data: Vec<f32>,
}
