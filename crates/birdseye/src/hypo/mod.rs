//! Bot and ball hypothesis generation, scoring and pruning.
//!
//! Two generators propose bots: a predictive one seeded from tracked
//! objects and an exhaustive one enumerating side-blob quadruples around
//! every team-colored center blob. Both produce the same scored-bot view,
//! which is all the clipping and publishing stages ever look at.

pub(crate) mod ball;
pub(crate) mod detected;
pub(crate) mod tracked;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::color::{ColorSet, Rgb};
use crate::extract::RawBlob;

pub use ball::{ball_score, color_deviation_score, filter_balls, generate_balls, BallHypothesis};

/// Pattern angles of the four side blobs relative to the bot orientation,
/// in slot order (cyclically increasing).
pub const PATTERN_ANGLES: [f32; 4] = [
    1.002_183_9,
    2.572_980_2,
    -2.572_980_2,
    -1.002_183_9,
];

/// Green mask (slot 0 is the most significant bit) to bot id.
pub const PATTERN_LUT: [u8; 16] = [9, 15, 4, 7, 0, 3, 10, 14, 13, 11, 5, 6, 1, 2, 12, 8];

/// Bot id to green mask, the inverse of [`PATTERN_LUT`].
pub const PATTERNS: [u8; 16] = [
    0b0100, 0b1100, 0b1101, 0b0101, 0b0010, 0b1010, 0b1011, 0b0011, 0b1111, 0b0000, 0b0110,
    0b1001, 0b1110, 0b1000, 0b0111, 0b0001,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    Yellow,
    Blue,
}

/// The shared view of one bot hypothesis. The angular term of a complete,
/// perfectly aligned pattern reaches 4; the distance, color and
/// circularity signals add up to 1.5 on top.
#[derive(Debug, Clone)]
pub struct ScoredBot {
    pub team: Team,
    pub bot_id: u8,
    /// Center position on the blob plane (mm).
    pub pos: Vector2<f32>,
    pub orientation: f32,
    pub score: f32,
    pub center_blob: Option<usize>,
    /// Blob index per pattern slot; `None` marks a missing side blob.
    pub side_blobs: [Option<usize>; 4],
}

impl ScoredBot {
    pub fn confidence(&self) -> f32 {
        (self.score / 4.0).clamp(0.0, 1.0)
    }

    pub fn used_blobs(&self) -> impl Iterator<Item = usize> + '_ {
        self.center_blob
            .into_iter()
            .chain(self.side_blobs.iter().flatten().copied())
    }
}

/// Bot hypothesis variants. Lifetime is one frame.
#[derive(Debug, Clone)]
pub enum BotHypothesis {
    /// Seeded by a tracked object; identity comes from the track.
    Tracked { bot: ScoredBot, track_id: i32 },
    /// Assembled from scratch; identity decoded from the side colors.
    Detected { bot: ScoredBot, green_mask: u8 },
}

impl BotHypothesis {
    pub fn bot(&self) -> &ScoredBot {
        match self {
            BotHypothesis::Tracked { bot, .. } | BotHypothesis::Detected { bot, .. } => bot,
        }
    }

    fn bot_mut(&mut self) -> &mut ScoredBot {
        match self {
            BotHypothesis::Tracked { bot, .. } | BotHypothesis::Detected { bot, .. } => bot,
        }
    }

    /// Re-evaluate the score of the existing assignment, e.g. after the
    /// reference colors moved. The assignment itself is kept.
    pub fn rescore(&mut self, blobs: &[RawBlob], colors: &ColorSet, config: &HypothesisConfig) {
        let expected = match self {
            BotHypothesis::Tracked { bot, .. } => Some(PATTERNS[bot.bot_id as usize]),
            BotHypothesis::Detected { green_mask, .. } => Some(*green_mask),
        };
        let bot = self.bot_mut();
        let slots: [Option<&RawBlob>; 4] =
            std::array::from_fn(|slot| bot.side_blobs[slot].map(|index| &blobs[index]));
        let center_circularity = bot
            .center_blob
            .map(|index| blobs[index].circularity)
            .unwrap_or(0.0);
        let scored = score_sides(bot.pos, center_circularity, &slots, expected, colors, config);
        bot.score = scored.score;
        bot.orientation = scored.orientation;
    }
}

/// Geometry and threshold configuration of the hypothesis engine. All
/// distances in mm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisConfig {
    /// Center-to-side-blob distance of the pattern plate.
    pub side_blob_distance: f32,
    pub center_blob_radius: f32,
    pub side_blob_radius: f32,
    pub ball_radius: f32,
    /// Base search radius around predicted anchors.
    pub min_tracking_radius: f32,
    /// Kinematic bound used to grow the tracked search radius (mm/s^2).
    pub max_bot_acceleration: f32,
    /// Confidence floor for published bots and balls.
    pub min_confidence: f32,
    /// Color-deviation floor for published balls.
    pub min_score: f32,
    /// Margin kept to camera-induced extent edges.
    pub min_cam_edge_distance: f32,
    /// Score penalty per missing pattern slot.
    pub null_slot_penalty: f32,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            side_blob_distance: 65.0,
            center_blob_radius: 25.0,
            side_blob_radius: 20.0,
            ball_radius: 21.5,
            min_tracking_radius: 30.0,
            max_bot_acceleration: 6500.0,
            min_confidence: 0.2,
            min_score: 0.1,
            min_cam_edge_distance: 100.0,
            null_slot_penalty: 0.25,
        }
    }
}

pub(crate) struct SideScore {
    pub score: f32,
    pub orientation: f32,
    pub green_mask: u8,
}

/// Weights of the added distance, color and circularity signals relative
/// to the angular score, which contributes up to 1 per slot and stays
/// dominant.
const DISTANCE_SIGNAL_WEIGHT: f32 = 0.125;
const COLOR_SIGNAL_WEIGHT: f32 = 0.125;
const CIRCULARITY_SIGNAL_WEIGHT: f32 = 0.5;

/// Score a center-plus-four-sides assignment.
///
/// The mean orientation minimizing the summed angular residual is
/// `atan2(sum sin(theta_i - alpha_i), sum cos(theta_i - alpha_i))`. Each
/// present slot adds its residual cosine plus weighted distance-match and
/// color-match signals; the center blob circularity adds once on top, and
/// every missing slot costs a constant penalty.
///
/// `expected_mask` pins the green/pink color per slot (tracked bots know
/// their identity); without it each side blob picks its nearer marker
/// color and the resulting mask is reported.
pub(crate) fn score_sides(
    center: Vector2<f32>,
    center_circularity: f32,
    slots: &[Option<&RawBlob>; 4],
    expected_mask: Option<u8>,
    colors: &ColorSet,
    config: &HypothesisConfig,
) -> SideScore {
    let mut sin_sum = 0.0f32;
    let mut cos_sum = 0.0f32;
    for (slot, blob) in slots.iter().enumerate() {
        let Some(blob) = blob else { continue };
        let offset = blob.field_pos - center;
        let residual = offset.y.atan2(offset.x) - PATTERN_ANGLES[slot];
        sin_sum += residual.sin();
        cos_sum += residual.cos();
    }
    let orientation = if sin_sum == 0.0 && cos_sum == 0.0 {
        0.0
    } else {
        sin_sum.atan2(cos_sum)
    };

    let mut score = 0.0f32;
    let mut green_mask = 0u8;
    for (slot, blob) in slots.iter().enumerate() {
        let Some(blob) = blob else {
            score -= config.null_slot_penalty;
            continue;
        };

        let offset = blob.field_pos - center;
        let angle = offset.y.atan2(offset.x);
        let alignment = (angle - PATTERN_ANGLES[slot] - orientation).cos();

        let distance_error = (offset.norm() - config.side_blob_distance).abs();
        let distance_match =
            1.0 - (distance_error / (2.0 * config.side_blob_radius)).clamp(0.0, 1.0);

        let is_green = match expected_mask {
            Some(mask) => mask & (1 << (3 - slot)) != 0,
            None => {
                blob.center.dist_sq(colors.green) <= blob.center.dist_sq(colors.pink)
            }
        };
        let (own, other) = if is_green {
            (colors.green, colors.pink)
        } else {
            (colors.pink, colors.green)
        };
        if is_green {
            green_mask |= 1 << (3 - slot);
        }
        let color_match = ColorSet::separation(blob.center, own, other);

        score += alignment
            + DISTANCE_SIGNAL_WEIGHT * distance_match
            + COLOR_SIGNAL_WEIGHT * color_match;
    }

    score += CIRCULARITY_SIGNAL_WEIGHT * center_circularity;
    SideScore {
        score,
        orientation,
        green_mask,
    }
}

/// Marker color a side blob is compared against for a given slot of a
/// known pattern.
pub fn slot_color(colors: &ColorSet, mask: u8, slot: usize) -> Rgb {
    if mask & (1 << (3 - slot)) != 0 {
        colors.green
    } else {
        colors.pink
    }
}

/// Run both generators over one frame's blobs.
#[allow(clippy::too_many_arguments)]
pub fn generate_bots(
    blobs: &[RawBlob],
    classes: &[crate::color::ColorClass],
    tree: &crate::kdtree::KdTree<'_>,
    tracks: &[crate::tracker::TrackedObject],
    perspective: &crate::perspective::Perspective,
    max_bot_height: f32,
    t_capture: f64,
    colors: &ColorSet,
    config: &HypothesisConfig,
) -> Vec<BotHypothesis> {
    let max_robot_radius = perspective.field.max_robot_radius;
    let mut bots = Vec::new();

    for track in tracks {
        if track.id == crate::tracker::BALL_ID {
            continue;
        }
        if let Some(hypothesis) = tracked::enumerate_tracked(
            track,
            blobs,
            tree,
            perspective,
            max_bot_height,
            t_capture,
            colors,
            config,
        ) {
            bots.push(hypothesis);
        }
    }

    for (index, class) in classes.iter().enumerate() {
        let Some(team) = detected::center_team(*class) else {
            continue;
        };
        if let Some(hypothesis) = detected::enumerate_detected(
            index,
            team,
            blobs,
            classes,
            tree,
            max_robot_radius,
            colors,
            config,
        ) {
            bots.push(hypothesis);
        }
    }

    bots
}

/// Drop every hypothesis whose confidence is at or below the floor.
pub fn filter_confidence(bots: Vec<BotHypothesis>, min_confidence: f32) -> Vec<BotHypothesis> {
    bots.into_iter()
        .filter(|hypothesis| hypothesis.bot().confidence() > min_confidence)
        .collect()
}

/// Clipping resolution: a bot survives iff no strictly better-scored bot's
/// center lies within the robot radius. Acyclic by construction, so a
/// second pass removes nothing.
pub fn resolve_clipping(bots: Vec<BotHypothesis>, robot_radius: f32) -> Vec<BotHypothesis> {
    let keep: Vec<bool> = bots
        .iter()
        .map(|candidate| {
            !bots.iter().any(|other| {
                other.bot().score > candidate.bot().score
                    && (other.bot().pos - candidate.bot().pos).norm() < robot_radius
            })
        })
        .collect();

    bots.into_iter()
        .zip(keep)
        .filter_map(|(hypothesis, keep)| keep.then_some(hypothesis))
        .collect()
}
