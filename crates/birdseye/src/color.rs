//! Reference colors and their per-frame re-estimation.
//!
//! Six RGB centroids (field, orange, yellow, blue, green, pink) classify
//! blobs; confirmed detections feed updated estimates back, pulled toward
//! fixed reference priors so a bad frame cannot run the colors away.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Squared Euclidean distance between integer RGB vectors.
pub(crate) fn rgb_dist_sq(a: Vector3<i32>, b: Vector3<i32>) -> i32 {
    let d = a - b;
    d.dot(&d)
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn vec(self) -> Vector3<i32> {
        Vector3::new(self.r as i32, self.g as i32, self.b as i32)
    }

    pub fn from_vec(v: Vector3<i32>) -> Self {
        Self {
            r: v.x.clamp(0, 255) as u8,
            g: v.y.clamp(0, 255) as u8,
            b: v.z.clamp(0, 255) as u8,
        }
    }

    pub fn dist_sq(self, other: Rgb) -> i32 {
        rgb_dist_sq(self.vec(), other.vec())
    }

    /// Hue on the wrapping 0..=255 scale.
    pub fn hue(self) -> u8 {
        let min = self.r.min(self.g).min(self.b) as i32;
        let max = self.r.max(self.g).max(self.b) as i32;
        if max == 0 || max == min {
            return 0;
        }
        let span = max - min;
        let hue = if max == self.r as i32 {
            43 * (self.g as i32 - self.b as i32) / span
        } else if max == self.g as i32 {
            85 + 43 * (self.b as i32 - self.r as i32) / span
        } else {
            171 + 43 * (self.r as i32 - self.g as i32) / span
        };
        hue.rem_euclid(256) as u8
    }

    /// Wrapping distance between two hues (0..=128).
    pub fn hue_distance(a: u8, b: u8) -> u8 {
        (a.wrapping_sub(b) as i8).unsigned_abs()
    }
}

/// The blob classes a color can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorClass {
    Field,
    Orange,
    Yellow,
    Blue,
    Green,
    Pink,
}

/// One full set of the six reference colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSet {
    pub field: Rgb,
    pub orange: Rgb,
    pub yellow: Rgb,
    pub blue: Rgb,
    pub green: Rgb,
    pub pink: Rgb,
}

impl Default for ColorSet {
    fn default() -> Self {
        Self {
            field: Rgb::new(32, 128, 64),
            orange: Rgb::new(255, 64, 0),
            yellow: Rgb::new(255, 255, 64),
            blue: Rgb::new(0, 255, 255),
            green: Rgb::new(64, 255, 64),
            pink: Rgb::new(255, 0, 255),
        }
    }
}

impl ColorSet {
    /// Nearest reference class by squared RGB distance.
    pub fn classify(&self, color: Rgb) -> ColorClass {
        [
            (ColorClass::Field, self.field),
            (ColorClass::Orange, self.orange),
            (ColorClass::Yellow, self.yellow),
            (ColorClass::Blue, self.blue),
            (ColorClass::Green, self.green),
            (ColorClass::Pink, self.pink),
        ]
        .into_iter()
        .min_by_key(|(_, reference)| color.dist_sq(*reference))
        .map(|(class, _)| class)
        .expect("non-empty class list")
    }

    /// How clearly `color` belongs to `own` rather than `other`, in [0, 1].
    pub fn separation(color: Rgb, own: Rgb, other: Rgb) -> f32 {
        let d_own = (color.dist_sq(own) as f32).sqrt();
        let d_other = (color.dist_sq(other) as f32).sqrt();
        if d_own + d_other < f32::EPSILON {
            return 0.0;
        }
        ((d_other - d_own) / (d_other + d_own)).clamp(0.0, 1.0)
    }
}

/// Confirmed color samples collected from one frame's detections.
#[derive(Debug, Default)]
pub struct FrameColorSamples {
    pub green_side: Vec<Vector3<i32>>,
    pub pink_side: Vec<Vector3<i32>>,
    pub bot_centers: Vec<Vector3<i32>>,
    pub ball_candidates: Vec<Vector3<i32>>,
}

/// Current color estimates plus the fixed priors and blend weights.
#[derive(Debug, Clone)]
pub struct ReferenceColors {
    pub current: ColorSet,
    pub reference: ColorSet,
    /// Pull toward the fixed reference prior.
    pub reference_force: f32,
    /// Pull toward the previous frame's estimate.
    pub history_force: f32,
}

impl ReferenceColors {
    pub fn new(
        initial: ColorSet,
        priors: ColorSet,
        reference_force: f32,
        history_force: f32,
    ) -> Self {
        Self {
            current: initial,
            reference: priors,
            reference_force,
            history_force,
        }
    }

    /// Three-way blend of prior, previous estimate and frame estimate.
    fn blend(&self, previous: Rgb, reference: Rgb, estimate: Vector3<f32>) -> Rgb {
        let frame_force = 1.0 - self.reference_force - self.history_force;
        let mixed = reference.vec().cast::<f32>() * self.reference_force
            + previous.vec().cast::<f32>() * self.history_force
            + estimate * frame_force;
        Rgb::from_vec(Vector3::new(
            mixed.x.round() as i32,
            mixed.y.round() as i32,
            mixed.z.round() as i32,
        ))
    }

    fn blend_mean(&self, previous: Rgb, reference: Rgb, samples: &[Vector3<i32>]) -> Rgb {
        if samples.is_empty() {
            return previous;
        }
        let sum: Vector3<i32> = samples.iter().sum();
        self.blend(previous, reference, sum.cast::<f32>() / samples.len() as f32)
    }

    /// End-of-frame update from confirmed detections.
    pub fn update(&mut self, samples: &FrameColorSamples) {
        let previous = self.current;

        self.current.green = self.blend_mean(previous.green, self.reference.green, &samples.green_side);
        self.current.pink = self.blend_mean(previous.pink, self.reference.pink, &samples.pink_side);

        // Center blobs split into the two team colors against pink.
        if let Some((c1, c2)) = two_means(
            previous.pink.vec(),
            &samples.bot_centers,
            previous.yellow.vec(),
            previous.blue.vec(),
        ) {
            let (to_yellow, to_blue) = assign_by_proximity(c1, c2, previous.yellow, previous.blue);
            self.current.yellow =
                self.blend(previous.yellow, self.reference.yellow, to_yellow.cast::<f32>());
            self.current.blue =
                self.blend(previous.blue, self.reference.blue, to_blue.cast::<f32>());
        }

        // Ball candidates split into ball orange and field background
        // against the previous blue.
        if let Some((c1, c2)) = two_means(
            previous.blue.vec(),
            &samples.ball_candidates,
            previous.orange.vec(),
            previous.field.vec(),
        ) {
            let (to_orange, to_field) = assign_by_proximity(c1, c2, previous.orange, previous.field);
            self.current.orange =
                self.blend(previous.orange, self.reference.orange, to_orange.cast::<f32>());
            self.current.field =
                self.blend(previous.field, self.reference.field, to_field.cast::<f32>());
        }
    }
}

fn assign_by_proximity(
    c1: Vector3<i32>,
    c2: Vector3<i32>,
    first: Rgb,
    second: Rgb,
) -> (Vector3<i32>, Vector3<i32>) {
    let straight = rgb_dist_sq(c1, first.vec()) + rgb_dist_sq(c2, second.vec());
    let crossed = rgb_dist_sq(c2, first.vec()) + rgb_dist_sq(c1, second.vec());
    if straight <= crossed {
        (c1, c2)
    } else {
        (c2, c1)
    }
}

/// Two-cluster Lloyd iteration over RGB samples.
///
/// Returns `None` (caller keeps its previous estimates) when the input is
/// degenerate: fewer than two samples, samples closer to each other than
/// any is to the `contrast` reference, identical seed assignments, an
/// emptied partition, or a final centroid separation below
/// `sqrt(out_group_diff) / 2`.
pub fn two_means(
    contrast: Vector3<i32>,
    values: &[Vector3<i32>],
    seed1: Vector3<i32>,
    seed2: Vector3<i32>,
) -> Option<(Vector3<i32>, Vector3<i32>)> {
    if values.len() < 2 {
        return None;
    }

    let mut in_group_diff = i32::MAX;
    let mut out_group_diff = i32::MAX;
    for (i, value) in values.iter().enumerate() {
        out_group_diff = out_group_diff.min(rgb_dist_sq(*value, contrast));
        for other in &values[i + 1..] {
            in_group_diff = in_group_diff.min(rgb_dist_sq(*other, *value));
        }
    }
    if in_group_diff > out_group_diff {
        return None;
    }

    let nearest = |seed: Vector3<i32>| {
        values
            .iter()
            .min_by_key(|value| rgb_dist_sq(**value, seed))
            .copied()
            .expect("non-empty values")
    };
    let mut c1 = nearest(seed1);
    let mut c2 = nearest(seed2);
    if c1 == c2 {
        return None;
    }

    loop {
        let mut sum1 = Vector3::zeros();
        let mut sum2 = Vector3::zeros();
        let mut n1 = 0;
        let mut n2 = 0;
        for value in values {
            if rgb_dist_sq(*value, c1) < rgb_dist_sq(*value, c2) {
                sum1 += value;
                n1 += 1;
            } else {
                sum2 += value;
                n2 += 1;
            }
        }

        if n1 == 0 || n2 == 0 {
            return None;
        }

        let next1 = sum1 / n1;
        let next2 = sum2 / n2;
        let stable = next1 == c1 && next2 == c2;
        c1 = next1;
        c2 = next2;
        if stable {
            break;
        }
    }

    let min_separation = (out_group_diff as f32).sqrt() / 2.0;
    if (rgb_dist_sq(c1, c2) as f32).sqrt() < min_separation {
        return None;
    }

    Some((c1, c2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(r: i32, g: i32, b: i32) -> Vector3<i32> {
        Vector3::new(r, g, b)
    }

    #[test]
    fn two_means_centroids_are_partition_means() {
        let values = vec![
            v(250, 250, 60),
            v(252, 248, 66),
            v(10, 240, 250),
            v(6, 250, 244),
        ];
        let (c1, c2) = two_means(
            v(255, 0, 255),
            &values,
            v(255, 255, 64),
            v(0, 255, 255),
        )
        .expect("two clear clusters");

        assert_eq!(c1, v(251, 249, 63));
        assert_eq!(c2, v(8, 245, 247));
    }

    #[test]
    fn two_means_rejects_single_cluster_near_contrast() {
        // All samples closer to each other than to the contrast: fine. All
        // samples closer to the contrast than to each other: reject.
        let values = vec![v(250, 0, 250), v(10, 10, 10)];
        assert!(two_means(v(253, 2, 252), &values, v(255, 0, 255), v(0, 0, 0)).is_none());
    }

    #[test]
    fn two_means_rejects_identical_seed_assignment() {
        let values = vec![v(100, 100, 100), v(101, 101, 101), v(250, 250, 250)];
        // Both seeds nearest to the same sample.
        assert!(two_means(v(0, 0, 0), &values, v(100, 100, 100), v(99, 99, 99)).is_none());
    }

    #[test]
    fn two_means_rejects_insufficient_separation() {
        let values = vec![v(100, 100, 100), v(104, 100, 100)];
        // out_group_diff is large, separation of the two clusters tiny.
        assert!(two_means(v(255, 255, 255), &values, v(100, 100, 100), v(104, 100, 100)).is_none());
    }

    #[test]
    fn blend_with_full_reference_force_returns_reference() {
        let mut colors = ReferenceColors::new(ColorSet::default(), ColorSet::default(), 1.0, 0.0);
        colors.current.orange = Rgb::new(1, 2, 3);
        let samples = FrameColorSamples {
            ball_candidates: vec![v(200, 90, 20), v(30, 120, 60)],
            ..FrameColorSamples::default()
        };
        colors.update(&samples);
        assert_eq!(colors.current.orange, ColorSet::default().orange);
        assert_eq!(colors.current.field, ColorSet::default().field);
    }

    #[test]
    fn update_moves_orange_toward_frame_estimate() {
        let mut colors = ReferenceColors::new(ColorSet::default(), ColorSet::default(), 0.0, 0.0);
        let samples = FrameColorSamples {
            ball_candidates: vec![v(240, 80, 10), v(240, 80, 10), v(30, 120, 60)],
            ..FrameColorSamples::default()
        };
        colors.update(&samples);
        assert_eq!(colors.current.orange, Rgb::new(240, 80, 10));
    }

    #[test]
    fn update_without_samples_keeps_previous_values() {
        let mut colors = ReferenceColors::new(ColorSet::default(), ColorSet::default(), 0.1, 0.7);
        let before = colors.current;
        colors.update(&FrameColorSamples::default());
        assert_eq!(colors.current, before);
    }

    #[test]
    fn hue_distance_wraps() {
        assert_eq!(Rgb::hue_distance(250, 5), 11);
        assert_eq!(Rgb::hue_distance(5, 250), 11);
        assert_eq!(Rgb::new(255, 0, 0).hue(), 0);
        assert!(Rgb::hue_distance(Rgb::new(255, 64, 0).hue(), Rgb::new(255, 80, 0).hue()) < 8);
    }

    #[test]
    fn classify_picks_nearest_reference() {
        let set = ColorSet::default();
        assert_eq!(set.classify(Rgb::new(250, 70, 10)), ColorClass::Orange);
        assert_eq!(set.classify(Rgb::new(70, 250, 80)), ColorClass::Green);
        assert_eq!(set.classify(Rgb::new(240, 20, 240)), ColorClass::Pink);
    }
}
