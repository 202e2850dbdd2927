//! Batch sources for training and evaluation.

use crate::index::{index_subset, Normalization};
use crate::transform::{load_clip, ClipTransform};
use crate::types::{ClipDatasetError, ClipIndex, ClipSample, ClipShape, DatasetResult};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use data_contracts::{DatasetManifest, Subset};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;
use tracing::warn;

const EPOCH_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// One collated batch: clips `[N, C, T, H, W]`, class targets `[N]`, and per-sample identifiers.
#[derive(Debug, Clone)]
pub struct ClipBatch<B: Backend> {
    pub clips: Tensor<B, 5>,
    pub labels: Tensor<B, 1, Int>,
    /// Host copy of `labels`.
    pub label_ids: Vec<usize>,
    pub ids: Vec<String>,
}

impl<B: Backend> ClipBatch<B> {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Assemble a batch from decoded samples sharing one shape.
    pub fn from_samples(
        samples: Vec<ClipSample>,
        shape: ClipShape,
        device: &B::Device,
    ) -> DatasetResult<Self> {
        let n = samples.len();
        let mut buf = Vec::with_capacity(n * shape.numel());
        let mut label_ids = Vec::with_capacity(n);
        let mut ids = Vec::with_capacity(n);
        for sample in samples {
            if sample.data.len() != shape.numel() {
                return Err(ClipDatasetError::ClipSize {
                    id: sample.id,
                    actual: sample.data.len(),
                    expected: shape.numel(),
                });
            }
            buf.extend_from_slice(&sample.data);
            label_ids.push(sample.label);
            ids.push(sample.id);
        }
        let targets: Vec<i64> = label_ids.iter().map(|&l| l as i64).collect();
        let clips = Tensor::<B, 5>::from_data(TensorData::new(buf, shape.dims_with_batch(n)), device);
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [n]), device);
        Ok(Self {
            clips,
            labels,
            label_ids,
            ids,
        })
    }
}

/// A finite, restartable-per-epoch sequence of clip batches.
pub trait ClipSource {
    /// Batches yielded per epoch.
    fn num_batches(&self) -> usize;
    fn num_samples(&self) -> usize;
    /// Restart iteration; shuffling sources reorder deterministically per epoch.
    fn begin_epoch(&mut self, epoch: usize);
    /// Next batch of the current epoch, `Ok(None)` once exhausted.
    fn next_batch<B: Backend>(&mut self, device: &B::Device) -> DatasetResult<Option<ClipBatch<B>>>;
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed.wrapping_add((epoch as u64).wrapping_mul(EPOCH_SEED_STRIDE))
}

fn epoch_order(len: usize, shuffle: bool, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    order
}

fn batch_count(samples: usize, batch_size: usize, drop_last: bool) -> usize {
    let batch_size = batch_size.max(1);
    if drop_last {
        samples / batch_size
    } else {
        samples.div_ceil(batch_size)
    }
}

#[derive(Debug, Clone)]
pub struct ClipLoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
    /// Drop the final partial batch.
    pub drop_last: bool,
}

impl Default for ClipLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            shuffle: false,
            seed: 0,
            drop_last: false,
        }
    }
}

/// Loads clips from frame directories, decoding each batch in parallel.
pub struct ClipLoader {
    indices: Vec<ClipIndex>,
    order: Vec<usize>,
    cursor: usize,
    cfg: ClipLoaderConfig,
    transform: ClipTransform,
    epoch_seed: u64,
    permissive_errors: bool,
    skipped: usize,
}

impl ClipLoader {
    pub fn from_indices(
        indices: Vec<ClipIndex>,
        transform: ClipTransform,
        cfg: ClipLoaderConfig,
    ) -> Self {
        let permissive_errors = std::env::var("CLIP_DATASET_PERMISSIVE")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .map(|v| v == "1" || v == "true" || v == "on")
            .unwrap_or(false);
        let mut loader = Self {
            indices,
            order: Vec::new(),
            cursor: 0,
            cfg,
            transform,
            epoch_seed: 0,
            permissive_errors,
            skipped: 0,
        };
        loader.begin_epoch(0);
        loader
    }

    pub fn from_manifest(
        manifest: &DatasetManifest,
        subset: Subset,
        video_root: &Path,
        normalization: &Normalization,
        transform: ClipTransform,
        cfg: ClipLoaderConfig,
    ) -> DatasetResult<Self> {
        let indices = index_subset(manifest, subset, video_root, normalization)?;
        Ok(Self::from_indices(indices, transform, cfg))
    }

    /// Override the `CLIP_DATASET_PERMISSIVE` setting.
    pub fn with_permissive_errors(mut self, permissive: bool) -> Self {
        self.permissive_errors = permissive;
        self
    }

    pub fn transform(&self) -> &ClipTransform {
        &self.transform
    }

    /// Clips skipped so far because they failed to load (permissive mode only).
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl ClipSource for ClipLoader {
    fn num_batches(&self) -> usize {
        batch_count(self.indices.len(), self.cfg.batch_size, self.cfg.drop_last)
    }

    fn num_samples(&self) -> usize {
        self.indices.len()
    }

    fn begin_epoch(&mut self, epoch: usize) {
        self.epoch_seed = epoch_seed(self.cfg.seed, epoch);
        self.order = epoch_order(self.indices.len(), self.cfg.shuffle, self.epoch_seed);
        self.cursor = 0;
    }

    fn next_batch<B: Backend>(&mut self, device: &B::Device) -> DatasetResult<Option<ClipBatch<B>>> {
        let batch_size = self.cfg.batch_size.max(1);
        loop {
            let remaining = self.order.len().saturating_sub(self.cursor);
            if remaining == 0 || (self.cfg.drop_last && remaining < batch_size) {
                return Ok(None);
            }
            let start = self.cursor;
            let end = (start + batch_size).min(self.order.len());
            self.cursor = end;

            let epoch_seed = self.epoch_seed;
            let indices = &self.indices;
            let transform = &self.transform;
            let loaded: Vec<DatasetResult<ClipSample>> = self.order[start..end]
                .par_iter()
                .enumerate()
                .map(|(offset, &idx)| {
                    let position = (start + offset) as u64;
                    let mut rng = StdRng::seed_from_u64(
                        epoch_seed ^ position.wrapping_mul(EPOCH_SEED_STRIDE).rotate_left(17),
                    );
                    load_clip(&indices[idx], transform, &mut rng)
                })
                .collect();

            let mut samples = Vec::with_capacity(loaded.len());
            for res in loaded {
                match res {
                    Ok(sample) => samples.push(sample),
                    Err(e) if self.permissive_errors => {
                        warn!("skipping clip: {e}");
                        self.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            if samples.is_empty() {
                continue;
            }
            return ClipBatch::from_samples(samples, self.transform.shape(), device).map(Some);
        }
    }
}

/// In-memory clip source over prebuilt CTHW buffers.
#[derive(Debug, Clone)]
pub struct MemoryClips {
    shape: ClipShape,
    samples: Vec<ClipSample>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    shuffle_seed: Option<u64>,
}

impl MemoryClips {
    pub fn new(shape: ClipShape, batch_size: usize) -> Self {
        Self {
            shape,
            samples: Vec::new(),
            order: Vec::new(),
            cursor: 0,
            batch_size: batch_size.max(1),
            shuffle_seed: None,
        }
    }

    /// Shuffle each epoch with a seed derived from `seed` and the epoch number.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn shape(&self) -> ClipShape {
        self.shape
    }

    pub fn push(&mut self, id: impl Into<String>, label: usize, data: Vec<f32>) -> DatasetResult<()> {
        let id = id.into();
        if data.len() != self.shape.numel() {
            return Err(ClipDatasetError::ClipSize {
                id,
                actual: data.len(),
                expected: self.shape.numel(),
            });
        }
        self.samples.push(ClipSample { id, label, data });
        self.order.push(self.samples.len() - 1);
        Ok(())
    }
}

impl ClipSource for MemoryClips {
    fn num_batches(&self) -> usize {
        batch_count(self.samples.len(), self.batch_size, false)
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn begin_epoch(&mut self, epoch: usize) {
        let seed = self.shuffle_seed.map(|s| epoch_seed(s, epoch));
        self.order = epoch_order(self.samples.len(), seed.is_some(), seed.unwrap_or(0));
        self.cursor = 0;
    }

    fn next_batch<B: Backend>(&mut self, device: &B::Device) -> DatasetResult<Option<ClipBatch<B>>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let samples = self.order[self.cursor..end]
            .iter()
            .map(|&i| self.samples[i].clone())
            .collect();
        self.cursor = end;
        ClipBatch::from_samples(samples, self.shape, device).map(Some)
    }
}
