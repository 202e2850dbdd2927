//! Clip loading, splitting, and Burn-compatible batching for video classification.
//!
//! This crate provides:
//! - Indexing of manifest subsets into on-disk frame directories
//! - Temporal/spatial clip transforms with per-animal normalization
//! - Batch sources (`ClipLoader` for disk, `MemoryClips` for prebuilt buffers)
//! - Split-by-animal manifest generation

pub mod batch;
pub mod index;
pub mod splits;
pub mod transform;
pub mod types;

pub use batch::{ClipBatch, ClipLoader, ClipLoaderConfig, ClipSource, MemoryClips};
pub use index::{index_subset, list_frames, Normalization};
pub use splits::{
    lists_to_manifest, parse_list_line, split_by_animal, write_split, AnimalSplit, SplitConfig,
    DEFAULT_ANIMALS, DEFAULT_LABELS,
};
pub use transform::{load_clip, temporal_indices, ClipTransform};
pub use types::*;
