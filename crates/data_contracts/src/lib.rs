//! Shared data contracts for dataset manifests, annotation rows, and normalization stats.

pub mod annotation;
pub mod manifest;

pub use annotation::{
    load_annotation_records, load_mean_file, mean_id_lookup, AnnotationRecord, ChannelStats,
};
pub use manifest::{Annotations, DatasetManifest, ManifestBuilder, ManifestEntry, Subset};

use std::path::PathBuf;
use thiserror::Error;

pub type ContractResult<T> = Result<T, ContractError>;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed row {row} in {path}: {msg}")]
    MalformedRow {
        path: PathBuf,
        row: usize,
        msg: String,
    },
    #[error("sample {key} already assigned to {existing}, cannot add to {requested}")]
    DuplicateSample {
        key: String,
        existing: Subset,
        requested: Subset,
    },
    #[error("sample {key} has label {label} which is not in the manifest label list")]
    UnknownLabel { key: String, label: String },
}
