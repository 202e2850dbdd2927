//! Temporal and spatial clip transforms.

use crate::types::{ClipDatasetError, ClipIndex, ClipSample, ClipShape, DatasetResult};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct ClipTransform {
    /// Output frame side length in pixels (frames are square).
    pub sample_size: u32,
    /// Frames per clip; shorter clips are loop-padded.
    pub sample_duration: usize,
    /// Max pixel offset applied to the square crop centre.
    pub crop_jitter: u32,
    /// Pixel values are divided by this before normalization.
    pub norm_value: f32,
    pub flip_horizontal_prob: f32,
    pub flip_vertical_prob: f32,
    /// Random temporal offset instead of the centre window.
    pub random_temporal: bool,
}

impl ClipTransform {
    pub fn training(sample_size: u32, sample_duration: usize, crop_jitter: u32, norm_value: f32) -> Self {
        Self {
            sample_size,
            sample_duration,
            crop_jitter,
            norm_value,
            flip_horizontal_prob: 0.5,
            flip_vertical_prob: 0.5,
            random_temporal: true,
        }
    }

    pub fn evaluation(sample_size: u32, sample_duration: usize, norm_value: f32) -> Self {
        Self {
            sample_size,
            sample_duration,
            crop_jitter: 0,
            norm_value,
            flip_horizontal_prob: 0.0,
            flip_vertical_prob: 0.0,
            random_temporal: false,
        }
    }

    pub fn shape(&self) -> ClipShape {
        let side = self.sample_size as usize;
        ClipShape::new(3, self.sample_duration, side, side)
    }

    pub fn describe(&self) -> String {
        format!(
            "size={} duration={} jitter={} norm={} hflip_p={:.2} vflip_p={:.2} temporal={}",
            self.sample_size,
            self.sample_duration,
            self.crop_jitter,
            self.norm_value,
            self.flip_horizontal_prob,
            self.flip_vertical_prob,
            if self.random_temporal { "random" } else { "center" }
        )
    }
}

/// Frame indices for one clip window of `duration` frames.
///
/// `begin == None` selects the centre window. Windows running past the end are
/// truncated and then loop-padded back up to `duration`.
pub fn temporal_indices(n_frames: usize, duration: usize, begin: Option<usize>) -> Vec<usize> {
    if n_frames == 0 || duration == 0 {
        return Vec::new();
    }
    let begin = match begin {
        Some(b) => b.min(n_frames.saturating_sub(duration)),
        None => (n_frames / 2).saturating_sub(duration / 2),
    };
    let end = (begin + duration).min(n_frames);
    let window: Vec<usize> = (begin..end).collect();
    (0..duration).map(|i| window[i % window.len()]).collect()
}

fn crop_resize(img: &RgbImage, side_out: u32, dx: i64, dy: i64) -> RgbImage {
    let (w, h) = img.dimensions();
    let side = w.min(h);
    let max_x = (w - side) as i64;
    let max_y = (h - side) as i64;
    let x = (max_x / 2 + dx).clamp(0, max_x) as u32;
    let y = (max_y / 2 + dy).clamp(0, max_y) as u32;
    let cropped = imageops::crop_imm(img, x, y, side, side).to_image();
    if side == side_out {
        cropped
    } else {
        imageops::resize(&cropped, side_out, side_out, FilterType::Triangle)
    }
}

/// Decode and transform one clip into a CTHW buffer.
///
/// Random choices (temporal offset, crop jitter, flips) are drawn once per clip so
/// every frame of the clip receives the same geometry.
pub fn load_clip<R: Rng + ?Sized>(
    index: &ClipIndex,
    transform: &ClipTransform,
    rng: &mut R,
) -> DatasetResult<ClipSample> {
    let n_frames = index.frames.len();
    if n_frames == 0 {
        return Err(ClipDatasetError::NoFrames {
            path: index.clip_dir.clone(),
        });
    }
    let duration = transform.sample_duration;
    let begin = if transform.random_temporal {
        Some(rng.random_range(0..=n_frames.saturating_sub(duration)))
    } else {
        None
    };
    let picks = temporal_indices(n_frames, duration, begin);

    let jitter = transform.crop_jitter as i64;
    let (dx, dy) = if jitter > 0 {
        (
            rng.random_range(-jitter..=jitter),
            rng.random_range(-jitter..=jitter),
        )
    } else {
        (0, 0)
    };
    let flip_h =
        transform.flip_horizontal_prob > 0.0 && rng.random::<f32>() < transform.flip_horizontal_prob;
    let flip_v =
        transform.flip_vertical_prob > 0.0 && rng.random::<f32>() < transform.flip_vertical_prob;

    let side = transform.sample_size as usize;
    let plane = side * side;
    let channel_stride = duration * plane;
    let stats = index.stats;
    let mut data = vec![0.0f32; 3 * channel_stride];

    for (t, &frame_idx) in picks.iter().enumerate() {
        let path = &index.frames[frame_idx];
        let img = image::open(path)
            .map_err(|source| ClipDatasetError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let mut frame = crop_resize(&img, transform.sample_size, dx, dy);
        if flip_h {
            frame = imageops::flip_horizontal(&frame);
        }
        if flip_v {
            frame = imageops::flip_vertical(&frame);
        }
        for (x, y, pixel) in frame.enumerate_pixels() {
            let offset = t * plane + y as usize * side + x as usize;
            for c in 0..3 {
                let v = pixel[c] as f32 / transform.norm_value;
                data[c * channel_stride + offset] = (v - stats.mean[c]) / stats.std[c];
            }
        }
    }

    Ok(ClipSample {
        id: index.identifier(),
        label: index.label,
        data,
    })
}
