//! Split annotated clips by animal and emit sample lists plus a dataset manifest.

use crate::types::{ClipDatasetError, DatasetResult};
use data_contracts::{AnnotationRecord, DatasetManifest, ManifestBuilder, Subset};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_ANIMALS: [&str; 7] = [
    "MC16_2",
    "MC6_5",
    "MCxCVF1_12a_1",
    "MCxCVF1_12b_1",
    "TI2_4",
    "TI3_3",
    "CV10_3",
];

pub const DEFAULT_LABELS: [&str; 10] = ["c", "f", "p", "t", "b", "m", "s", "x", "o", "d"];

#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Candidate animals; those not picked for training are held out as test.
    pub animals: Vec<String>,
    /// Number of animals whose clips feed training/validation.
    pub n_training: usize,
    /// Probability that a training-animal clip lands in training rather than validation.
    pub split_ratio: f32,
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            animals: DEFAULT_ANIMALS.iter().map(|s| s.to_string()).collect(),
            n_training: 3,
            split_ratio: 0.8,
            seed: None,
        }
    }
}

/// Result of a split: chosen animals and `Label/Location` lines per subset.
#[derive(Debug, Clone, Default)]
pub struct AnimalSplit {
    pub training_animals: Vec<String>,
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

impl AnimalSplit {
    /// Directory name for this split: the training animals joined by `_`.
    pub fn dir_name(&self) -> String {
        self.training_animals.join("_")
    }

    pub fn to_manifest(&self, labels: &[String]) -> DatasetResult<DatasetManifest> {
        lists_to_manifest(
            labels,
            &[
                (Subset::Training, self.train.as_slice()),
                (Subset::Validation, self.val.as_slice()),
                (Subset::Test, self.test.as_slice()),
            ],
        )
    }
}

pub fn split_by_animal(
    records: &[AnnotationRecord],
    cfg: &SplitConfig,
) -> DatasetResult<AnimalSplit> {
    if cfg.n_training > cfg.animals.len() {
        return Err(ClipDatasetError::Other(format!(
            "cannot pick {} training animals from {} candidates",
            cfg.n_training,
            cfg.animals.len()
        )));
    }
    if !(0.0..=1.0).contains(&cfg.split_ratio) {
        return Err(ClipDatasetError::Other(format!(
            "split_ratio {} outside [0, 1]",
            cfg.split_ratio
        )));
    }
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    let mut candidates = cfg.animals.clone();
    candidates.shuffle(&mut rng);
    candidates.truncate(cfg.n_training);

    let mut split = AnimalSplit {
        training_animals: candidates,
        ..Default::default()
    };
    for record in records {
        let line = record.list_line();
        if !split.training_animals.iter().any(|a| a == record.animal()) {
            split.test.push(line);
        } else if rng.random::<f32>() < cfg.split_ratio {
            split.train.push(line);
        } else {
            split.val.push(line);
        }
    }
    Ok(split)
}

/// Parse a `Label/Location` list line into `(label, location)`.
pub fn parse_list_line(line: &str) -> Option<(&str, &str)> {
    let (label, location) = line.trim().split_once('/')?;
    if label.is_empty() || location.is_empty() {
        return None;
    }
    Some((label, location))
}

/// Build a manifest from per-subset sample lists; a location may appear in only one subset.
pub fn lists_to_manifest(
    labels: &[String],
    lists: &[(Subset, &[String])],
) -> DatasetResult<DatasetManifest> {
    let mut builder = ManifestBuilder::new(labels.to_vec());
    for (subset, lines) in lists {
        for line in lines.iter().filter(|l| !l.trim().is_empty()) {
            let (label, location) = parse_list_line(line).ok_or_else(|| {
                ClipDatasetError::Other(format!("malformed {subset} list line {line:?}"))
            })?;
            builder.insert(location, label, *subset)?;
        }
    }
    Ok(builder.finish()?)
}

fn write_list(path: &Path, lines: &[String]) -> DatasetResult<()> {
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).map_err(|source| ClipDatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the split under `master_dir/<training animals>`.
///
/// Returns `Ok(None)` when that directory already exists. When `data_folder` is given
/// it is symlinked into the new directory (unix only).
pub fn write_split(
    split: &AnimalSplit,
    master_dir: &Path,
    labels: &[String],
    manifest_name: &str,
    data_folder: Option<&Path>,
) -> DatasetResult<Option<PathBuf>> {
    let result_dir = master_dir.join(split.dir_name());
    if result_dir.is_dir() {
        info!("split directory {} exists; leaving it untouched", result_dir.display());
        return Ok(None);
    }
    fs::create_dir_all(&result_dir).map_err(|source| ClipDatasetError::Io {
        path: result_dir.clone(),
        source,
    })?;
    if let Some(data_folder) = data_folder {
        link_data_folder(data_folder, &result_dir)?;
    }

    write_list(&result_dir.join("train_list.csv"), &split.train)?;
    write_list(&result_dir.join("val_list.csv"), &split.val)?;
    write_list(&result_dir.join("test_list.csv"), &split.test)?;

    let manifest = split.to_manifest(labels)?;
    manifest.save(&result_dir.join(manifest_name))?;
    info!(
        "wrote split {} (train={}, val={}, test={})",
        result_dir.display(),
        split.train.len(),
        split.val.len(),
        split.test.len()
    );
    Ok(Some(result_dir))
}

#[cfg(unix)]
fn link_data_folder(data_folder: &Path, result_dir: &Path) -> DatasetResult<()> {
    let name = data_folder
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));
    let link = result_dir.join(name);
    std::os::unix::fs::symlink(data_folder, &link).map_err(|source| ClipDatasetError::Io {
        path: link,
        source,
    })
}

#[cfg(not(unix))]
fn link_data_folder(data_folder: &Path, _result_dir: &Path) -> DatasetResult<()> {
    tracing::warn!(
        "symlinking {} is only supported on unix; skipping",
        data_folder.display()
    );
    Ok(())
}
