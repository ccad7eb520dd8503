//! Blob candidate emission.
//!
//! Non-maximum suppression over the center-likelihood map, followed by the
//! circularity gate and color sampling. Candidates are emitted in
//! deterministic row-major order and capped at the configured maximum.

use image::RgbaImage;
use nalgebra::Vector2;

use crate::color::Rgb;
use crate::extract::features::{ring_directions, FeatureMaps};
use crate::extract::{disc_average, ring_average, ExtractConfig};

/// One blob candidate, immutable for the rest of the frame.
#[derive(Debug, Clone)]
pub struct RawBlob {
    /// Field-plane position in mm, on the plane the rectified image was
    /// rendered at.
    pub field_pos: Vector2<f32>,
    /// Position in rectified pixels.
    pub flat_pos: Vector2<f32>,
    /// Background color sampled outside the marker.
    pub surround: Rgb,
    /// Marker color averaged over the center disc.
    pub center: Rgb,
    /// Rotational gradient symmetry in [0, 1].
    pub circularity: f32,
    /// Combined circularity and contrast score in [0, 1].
    pub score: f32,
}

/// Ratio between the color sampling radii and the expected blob radius.
const CENTER_DISC_RATIO: f32 = 0.6;
const SURROUND_RING_RATIO: f32 = 1.8;

/// Likelihood floor as a fraction of the map maximum; suppresses the flat
/// noise background without affecting real markers.
const MIN_LIKELIHOOD_FRACTION: f32 = 0.05;

/// Contrast (mean absolute channel difference) that saturates the score.
const FULL_CONTRAST: f32 = 96.0;

pub fn find_blobs(
    flat: &RgbaImage,
    maps: &FeatureMaps,
    blob_radius_px: f32,
    config: &ExtractConfig,
) -> Vec<RawBlob> {
    let (width, height) = flat.dimensions();
    let nms_radius = blob_radius_px.ceil().max(2.0) as i32;

    let max_likelihood = maps
        .likelihood
        .as_raw()
        .iter()
        .fold(0.0f32, |acc, &v| acc.max(v));
    if max_likelihood <= f32::EPSILON {
        return Vec::new();
    }
    let threshold = max_likelihood * MIN_LIKELIHOOD_FRACTION;

    let directions = ring_directions();
    let mut blobs = Vec::new();
    let mut saturated = false;

    'rows: for y in 0..height as i32 {
        for x in 0..width as i32 {
            let value = maps.likelihood.get_pixel(x as u32, y as u32)[0];
            if value < threshold {
                continue;
            }
            if !is_local_maximum(maps, x, y, nms_radius, value) {
                continue;
            }

            let center = Vector2::new(x as f32, y as f32);

            // Circularity: how evenly the ring carries radial edge energy.
            let mut energies = [0.0f32; 16];
            for (energy, direction) in energies.iter_mut().zip(&directions) {
                let sample = center + direction * blob_radius_px;
                *energy = maps.gradients.radial_energy(sample, -direction);
            }
            let max_energy = energies.iter().fold(0.0f32, |acc, &v| acc.max(v));
            if max_energy <= f32::EPSILON {
                continue;
            }
            let circularity =
                energies.iter().sum::<f32>() / (energies.len() as f32 * max_energy);
            if circularity < config.min_circularity {
                continue;
            }

            let center_color = disc_average(flat, center, blob_radius_px * CENTER_DISC_RATIO);
            let surround = ring_average(flat, center, blob_radius_px * SURROUND_RING_RATIO);
            let contrast = mean_channel_contrast(center_color, surround);
            let score = circularity * (contrast / FULL_CONTRAST).min(1.0);

            blobs.push(RawBlob {
                field_pos: Vector2::zeros(),
                flat_pos: center,
                surround,
                center: center_color,
                circularity,
                score,
            });
            if blobs.len() >= config.max_blobs {
                saturated = true;
                break 'rows;
            }
        }
    }

    if saturated {
        tracing::warn!(max_blobs = config.max_blobs, "max blob amount reached");
    }
    blobs
}

/// Field-space duplicate suppression over the emitted candidate list.
///
/// Drops every candidate with a strictly better-scoring candidate within
/// twice `radius`. This is a second, coarser pass on top of the pixel-grid
/// NMS above: two likelihood maxima further apart than the pixel NMS
/// window but closer than one physical marker cannot both be real.
/// Equal scores keep both candidates, so identical inputs survive intact.
pub fn suppress_duplicates(blobs: Vec<RawBlob>, radius: f32) -> Vec<RawBlob> {
    let keep: Vec<bool> = blobs
        .iter()
        .map(|candidate| {
            !blobs.iter().any(|other| {
                other.score > candidate.score
                    && (other.field_pos - candidate.field_pos).norm() < 2.0 * radius
            })
        })
        .collect();

    blobs
        .into_iter()
        .zip(keep)
        .filter_map(|(blob, keep)| keep.then_some(blob))
        .collect()
}

fn is_local_maximum(maps: &FeatureMaps, x: i32, y: i32, radius: i32, value: f32) -> bool {
    let (width, height) = maps.likelihood.dimensions();
    let r_sq = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx == 0 && dy == 0 {
                continue;
            }
            if dx * dx + dy * dy > r_sq {
                continue;
            }
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                continue;
            }
            let neighbor = maps.likelihood.get_pixel(nx as u32, ny as u32)[0];
            // Ties go to the earlier pixel in memory order.
            if neighbor > value || (neighbor == value && (ny, nx) < (y, x)) {
                return false;
            }
        }
    }
    true
}

fn mean_channel_contrast(a: Rgb, b: Rgb) -> f32 {
    let dr = (a.r as f32 - b.r as f32).abs();
    let dg = (a.g as f32 - b.g as f32).abs();
    let db = (a.b as f32 - b.b as f32).abs();
    (dr + dg + db) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::features::compute_features;
    use crate::pool::FramePool;
    use crate::test_utils::draw_disc;

    fn extract_from(flat: &RgbaImage, radius: f32, config: &ExtractConfig) -> Vec<RawBlob> {
        let maps = compute_features(flat, radius, &FramePool::default());
        find_blobs(flat, &maps, radius, config)
    }

    #[test]
    fn single_disc_yields_one_blob_with_its_colors() {
        let mut flat = RgbaImage::from_pixel(80, 80, image::Rgba([40, 130, 60, 255]));
        draw_disc(&mut flat, Vector2::new(40.0, 36.0), 5.0, [250, 70, 10]);

        let blobs = extract_from(&flat, 5.0, &ExtractConfig::default());
        assert_eq!(blobs.len(), 1, "expected one candidate: {blobs:?}");

        let blob = &blobs[0];
        assert!((blob.flat_pos - Vector2::new(40.0, 36.0)).norm() <= 2.0);
        assert!(blob.circularity > 0.5, "circularity {}", blob.circularity);
        assert!(blob.score > 0.3, "score {}", blob.score);
        // Disc color dominates the center sample, background the surround.
        assert!(blob.center.r > 180, "center {:?}", blob.center);
        assert!(blob.surround.g > 90, "surround {:?}", blob.surround);
    }

    #[test]
    fn straight_edge_fails_the_circularity_gate() {
        let mut flat = RgbaImage::from_pixel(80, 80, image::Rgba([40, 130, 60, 255]));
        for y in 0..80 {
            for x in 40..80 {
                flat.put_pixel(x, y, image::Rgba([250, 250, 250, 255]));
            }
        }

        let blobs = extract_from(
            &flat,
            5.0,
            &ExtractConfig {
                min_circularity: 0.6,
                ..ExtractConfig::default()
            },
        );
        assert!(blobs.is_empty(), "edge misread as blobs: {blobs:?}");
    }

    fn field_blob(x: f32, y: f32, score: f32) -> RawBlob {
        RawBlob {
            field_pos: Vector2::new(x, y),
            flat_pos: Vector2::zeros(),
            surround: Rgb::new(40, 130, 60),
            center: Rgb::new(250, 70, 10),
            circularity: 1.0,
            score,
        }
    }

    #[test]
    fn list_suppression_keeps_the_best_of_near_duplicates() {
        let blobs = vec![
            field_blob(0.0, 0.0, 0.9),
            field_blob(30.0, 0.0, 0.4),
            field_blob(200.0, 0.0, 0.2),
        ];
        let kept = suppress_duplicates(blobs, 21.5);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn list_suppression_keeps_ties_and_distant_candidates() {
        let blobs = vec![
            field_blob(0.0, 0.0, 0.5),
            field_blob(10.0, 0.0, 0.5),
            field_blob(100.0, 0.0, 0.1),
        ];
        let kept = suppress_duplicates(blobs, 21.5);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn emission_is_capped_at_max_blobs() {
        let mut flat = RgbaImage::from_pixel(120, 120, image::Rgba([40, 130, 60, 255]));
        for gy in 0..5 {
            for gx in 0..5 {
                draw_disc(
                    &mut flat,
                    Vector2::new(14.0 + gx as f32 * 22.0, 14.0 + gy as f32 * 22.0),
                    4.0,
                    [250, 70, 10],
                );
            }
        }

        let config = ExtractConfig {
            max_blobs: 3,
            ..ExtractConfig::default()
        };
        let blobs = extract_from(&flat, 4.0, &config);
        assert_eq!(blobs.len(), 3);
    }
}
