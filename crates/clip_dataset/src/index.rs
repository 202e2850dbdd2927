//! Indexing manifest subsets into frame directories.

use crate::types::{ClipDatasetError, ClipIndex, DatasetResult};
use data_contracts::{ChannelStats, DatasetManifest, Subset};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Per-sample normalization: sample location -> mean id -> channel stats.
///
/// An empty table normalizes every clip with zero mean and unit std.
#[derive(Debug, Clone, Default)]
pub struct Normalization {
    pub mean_ids: BTreeMap<String, String>,
    pub stats: BTreeMap<String, ChannelStats>,
}

impl Normalization {
    pub fn new(mean_ids: BTreeMap<String, String>, stats: BTreeMap<String, ChannelStats>) -> Self {
        Self { mean_ids, stats }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn stats_for(&self, key: &str) -> DatasetResult<ChannelStats> {
        if self.is_empty() {
            return Ok(ChannelStats::default());
        }
        let mean_id = self.mean_ids.get(key);
        mean_id
            .and_then(|id| self.stats.get(id))
            .copied()
            .ok_or_else(|| ClipDatasetError::MissingStats {
                key: key.to_string(),
                mean_id: mean_id.cloned(),
            })
    }
}

/// Frame images of one clip directory, sorted by file name.
pub fn list_frames(clip_dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(clip_dir).map_err(|source| ClipDatasetError::Io {
        path: clip_dir.to_path_buf(),
        source,
    })?;
    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ClipDatasetError::Io {
            path: clip_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_frame = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                FRAME_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// Index every manifest entry of `subset` under `video_root/<label>/<key>`.
///
/// Clips whose directory is missing or empty are skipped with a warning.
pub fn index_subset(
    manifest: &DatasetManifest,
    subset: Subset,
    video_root: &Path,
    normalization: &Normalization,
) -> DatasetResult<Vec<ClipIndex>> {
    let mut indices = Vec::new();
    let mut skipped = 0usize;
    for (key, entry) in manifest.entries(subset) {
        let label_name = &entry.annotations.label;
        let label = manifest
            .label_index(label_name)
            .ok_or_else(|| ClipDatasetError::UnknownLabel {
                key: key.clone(),
                label: label_name.clone(),
            })?;
        let clip_dir = video_root.join(label_name).join(key);
        if !clip_dir.is_dir() {
            warn!("skipping {key}: clip directory {} not found", clip_dir.display());
            skipped += 1;
            continue;
        }
        let frames = list_frames(&clip_dir)?;
        if frames.is_empty() {
            warn!("skipping {key}: no frames under {}", clip_dir.display());
            skipped += 1;
            continue;
        }
        let stats = normalization.stats_for(key)?;
        indices.push(ClipIndex {
            key: key.clone(),
            label,
            clip_dir,
            frames,
            stats,
        });
    }
    debug!(
        "indexed {} {subset} clips ({skipped} skipped) under {}",
        indices.len(),
        video_root.display()
    );
    Ok(indices)
}
