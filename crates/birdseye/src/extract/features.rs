//! Gradient features and the blob-center likelihood map.
//!
//! For every rectified pixel a ring of samples at the expected blob radius
//! is inspected: the per-channel image gradient at each sample is projected
//! onto the inward radial direction. A circular marker centered on the
//! pixel drives all projections high at once, so their sum is a
//! center likelihood; the signed luma projection is kept separately as the
//! classic gradient-dot feature.

use image::{ImageBuffer, Luma, RgbaImage};
use nalgebra::Vector2;

use crate::pool::FramePool;

/// Number of ring samples per pixel.
const RING_SAMPLES: usize = 16;

pub type MapF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-channel central-difference gradients of the rectified image.
pub struct Gradients {
    pub width: u32,
    pub height: u32,
    /// Channel-major: `[r_dx, r_dy, g_dx, g_dy, b_dx, b_dy]`.
    pub planes: [Vec<f32>; 6],
}

impl Gradients {
    fn compute(flat: &RgbaImage) -> Self {
        let (width, height) = flat.dimensions();
        let n = width as usize * height as usize;
        let mut planes: [Vec<f32>; 6] = std::array::from_fn(|_| vec![0.0; n]);

        let stride = width as usize;
        for y in 1..height.saturating_sub(1) as usize {
            for x in 1..width.saturating_sub(1) as usize {
                let idx = y * stride + x;
                for channel in 0..3 {
                    let left = flat.get_pixel(x as u32 - 1, y as u32)[channel] as f32;
                    let right = flat.get_pixel(x as u32 + 1, y as u32)[channel] as f32;
                    let up = flat.get_pixel(x as u32, y as u32 - 1)[channel] as f32;
                    let down = flat.get_pixel(x as u32, y as u32 + 1)[channel] as f32;
                    planes[channel * 2][idx] = (right - left) / 2.0;
                    planes[channel * 2 + 1][idx] = (down - up) / 2.0;
                }
            }
        }

        Self {
            width,
            height,
            planes,
        }
    }

    fn sample(&self, plane: usize, pos: Vector2<f32>) -> f32 {
        if pos.x < 0.0
            || pos.y < 0.0
            || pos.x > (self.width - 1) as f32
            || pos.y > (self.height - 1) as f32
        {
            return 0.0;
        }
        let x0 = pos.x.floor() as usize;
        let y0 = pos.y.floor() as usize;
        let x1 = (x0 + 1).min(self.width as usize - 1);
        let y1 = (y0 + 1).min(self.height as usize - 1);
        let fx = pos.x - x0 as f32;
        let fy = pos.y - y0 as f32;
        let stride = self.width as usize;
        let p = &self.planes[plane];
        p[y0 * stride + x0] * (1.0 - fx) * (1.0 - fy)
            + p[y0 * stride + x1] * fx * (1.0 - fy)
            + p[y1 * stride + x0] * (1.0 - fx) * fy
            + p[y1 * stride + x1] * fx * fy
    }

    /// Inward radial edge energy at a ring sample: sum over channels of the
    /// absolute gradient projection onto the direction toward the center.
    pub fn radial_energy(&self, sample: Vector2<f32>, inward: Vector2<f32>) -> f32 {
        let mut energy = 0.0;
        for channel in 0..3 {
            let dx = self.sample(channel * 2, sample);
            let dy = self.sample(channel * 2 + 1, sample);
            energy += (dx * inward.x + dy * inward.y).abs();
        }
        energy
    }

    /// Signed luma gradient projection onto the inward direction.
    fn radial_luma(&self, sample: Vector2<f32>, inward: Vector2<f32>) -> f32 {
        let mut dx = 0.0;
        let mut dy = 0.0;
        for channel in 0..3 {
            dx += self.sample(channel * 2, sample);
            dy += self.sample(channel * 2 + 1, sample);
        }
        (dx * inward.x + dy * inward.y) / 3.0
    }
}

/// Stage output consumed by the blob emitter.
pub struct FeatureMaps {
    pub gradients: Gradients,
    /// Signed luma gradient-dot feature.
    pub grad_dot: MapF32,
    /// Smoothed blob-center likelihood.
    pub likelihood: MapF32,
}

/// Unit directions of the sampling ring, shared by all stages.
pub fn ring_directions() -> [Vector2<f32>; RING_SAMPLES] {
    std::array::from_fn(|k| {
        let angle = k as f32 / RING_SAMPLES as f32 * std::f32::consts::TAU;
        Vector2::new(angle.cos(), angle.sin())
    })
}

/// Compute gradient features and the center likelihood map.
pub fn compute_features(flat: &RgbaImage, blob_radius_px: f32, pool: &FramePool) -> FeatureMaps {
    let (width, height) = flat.dimensions();
    let gradients = Gradients::compute(flat);
    let directions = ring_directions();

    let mut grad_dot = MapF32::from_raw(width, height, pool.map_f32(width, height).into_inner())
        .expect("pool buffer matches image size");
    let mut likelihood = MapF32::from_raw(width, height, pool.map_f32(width, height).into_inner())
        .expect("pool buffer matches image size");

    for y in 0..height {
        for x in 0..width {
            let center = Vector2::new(x as f32, y as f32);
            let mut energy = 0.0;
            let mut luma = 0.0;
            for direction in &directions {
                let sample = center + direction * blob_radius_px;
                let inward = -direction;
                energy += gradients.radial_energy(sample, inward);
                luma += gradients.radial_luma(sample, inward);
            }
            grad_dot.put_pixel(x, y, Luma([luma]));
            likelihood.put_pixel(x, y, Luma([energy]));
        }
    }

    let likelihood = imageproc::filter::gaussian_blur_f32(&likelihood, LIKELIHOOD_SIGMA);
    FeatureMaps {
        gradients,
        grad_dot,
        likelihood,
    }
}

const LIKELIHOOD_SIGMA: f32 = 1.0;
