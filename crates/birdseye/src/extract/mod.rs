//! Blob candidate extraction.
//!
//! Feed-forward stages, each producing one image the next consumes:
//! rectify the camera image onto the ground plane, compute gradient
//! features and a blob-center likelihood map, then emit candidate blobs by
//! non-maximum suppression. The host side converts rectified coordinates
//! to field millimeters.

pub(crate) mod blobs;
pub(crate) mod features;
pub(crate) mod rectify;

use image::RgbaImage;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::perspective::Perspective;
use crate::pool::FramePool;

pub use blobs::{suppress_duplicates, RawBlob};
pub use rectify::rectify;

/// Extraction thresholds and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Minimum rotational gradient symmetry for a candidate, in [0, 1].
    pub min_circularity: f32,
    /// Lower clamp on the marker radius used for ring sampling (mm).
    pub min_blob_radius: f32,
    /// Upper clamp on the marker radius used for ring sampling (mm).
    pub max_blob_radius: f32,
    /// Hard cap on emitted candidates per frame.
    pub max_blobs: usize,
}

impl ExtractConfig {
    pub const DEFAULT_MIN_CIRCULARITY: f32 = 0.25;
    pub const DEFAULT_MIN_BLOB_RADIUS: f32 = 10.0;
    pub const DEFAULT_MAX_BLOB_RADIUS: f32 = 40.0;
    pub const DEFAULT_MAX_BLOBS: usize = 10_000;
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_circularity: Self::DEFAULT_MIN_CIRCULARITY,
            min_blob_radius: Self::DEFAULT_MIN_BLOB_RADIUS,
            max_blob_radius: Self::DEFAULT_MAX_BLOB_RADIUS,
            max_blobs: Self::DEFAULT_MAX_BLOBS,
        }
    }
}

/// Run the full extraction pipeline on one camera frame.
///
/// `side_blob_radius_mm` sets the expected marker radius; it is converted
/// to rectified pixels through the current field scale.
pub fn extract_blobs(
    rgba: &RgbaImage,
    perspective: &Perspective,
    max_bot_height: f32,
    side_blob_radius_mm: f32,
    config: &ExtractConfig,
    pool: &FramePool,
) -> Vec<RawBlob> {
    let flat = rectify::rectify(rgba, perspective, max_bot_height, pool);
    let blob_radius_px = blob_radius_px(perspective, side_blob_radius_mm, config);
    let maps = features::compute_features(&flat, blob_radius_px, pool);
    let mut found = blobs::find_blobs(&flat, &maps, blob_radius_px, config);

    for blob in &mut found {
        blob.field_pos = perspective.flat2field(blob.flat_pos);
    }

    // Hand the stage buffers back for the next frame.
    let (width, height) = flat.dimensions();
    pool.reclaim_rgba(width, height, flat.into_raw());
    pool.reclaim_f32(width, height, maps.grad_dot.into_raw());
    pool.reclaim_f32(width, height, maps.likelihood.into_raw());

    found
}

/// Expected side blob radius in rectified pixels.
pub fn blob_radius_px(
    perspective: &Perspective,
    side_blob_radius_mm: f32,
    config: &ExtractConfig,
) -> f32 {
    let radius_mm = side_blob_radius_mm.clamp(config.min_blob_radius, config.max_blob_radius);
    (radius_mm / perspective.field_scale).max(2.0)
}

/// Average RGBA color over a sampled circle.
pub(crate) fn ring_average(image: &RgbaImage, center: Vector2<f32>, radius: f32) -> Rgb {
    const SAMPLES: usize = 20;
    let mut sum = [0u32; 3];
    let mut count = 0u32;
    for k in 0..SAMPLES {
        let angle = k as f32 / SAMPLES as f32 * std::f32::consts::TAU;
        let x = center.x + radius * angle.cos();
        let y = center.y + radius * angle.sin();
        if let Some(pixel) = sample_nearest(image, x, y) {
            sum[0] += pixel[0] as u32;
            sum[1] += pixel[1] as u32;
            sum[2] += pixel[2] as u32;
            count += 1;
        }
    }
    average(sum, count)
}

/// Average RGBA color over a filled disc.
pub(crate) fn disc_average(image: &RgbaImage, center: Vector2<f32>, radius: f32) -> Rgb {
    let mut sum = [0u32; 3];
    let mut count = 0u32;
    let r = radius.ceil() as i32;
    for dy in -r..=r {
        for dx in -r..=r {
            if (dx * dx + dy * dy) as f32 > radius * radius {
                continue;
            }
            if let Some(pixel) = sample_nearest(image, center.x + dx as f32, center.y + dy as f32) {
                sum[0] += pixel[0] as u32;
                sum[1] += pixel[1] as u32;
                sum[2] += pixel[2] as u32;
                count += 1;
            }
        }
    }
    average(sum, count)
}

fn sample_nearest(image: &RgbaImage, x: f32, y: f32) -> Option<image::Rgba<u8>> {
    let (w, h) = image.dimensions();
    let xi = x.round();
    let yi = y.round();
    if xi < 0.0 || yi < 0.0 || xi >= w as f32 || yi >= h as f32 {
        return None;
    }
    Some(*image.get_pixel(xi as u32, yi as u32))
}

fn average(sum: [u32; 3], count: u32) -> Rgb {
    if count == 0 {
        return Rgb::new(0, 0, 0);
    }
    Rgb::new(
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    )
}
