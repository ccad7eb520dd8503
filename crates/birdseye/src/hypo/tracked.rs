//! Predictive bot enumeration seeded from tracked objects.
//!
//! The tracked pose is extrapolated linearly (with the time delta clamped
//! to bound runaway searches), projected onto the blob plane, and each of
//! the five pattern anchors collects nearby candidates from the spatial
//! index. The Cartesian product over the anchor slots, each admitting a
//! null for a missing blob, is scored against the known pattern; the best
//! assignment per track survives.

use nalgebra::Vector2;

use crate::color::ColorSet;
use crate::extract::RawBlob;
use crate::kdtree::KdTree;
use crate::perspective::Perspective;
use crate::tracker::{TrackedObject, BLUE_ID_OFFSET};

use super::{score_sides, BotHypothesis, HypothesisConfig, ScoredBot, Team, PATTERNS, PATTERN_ANGLES};

/// Upper bound on the prediction time delta (seconds).
const MAX_PREDICTION_DT: f64 = 0.05;

/// Candidates considered per anchor slot, nearest first.
const MAX_SLOT_CANDIDATES: usize = 4;

/// Build the best hypothesis for one tracked bot.
pub fn enumerate_tracked(
    track: &TrackedObject,
    blobs: &[RawBlob],
    tree: &KdTree<'_>,
    perspective: &Perspective,
    max_bot_height: f32,
    t_capture: f64,
    colors: &ColorSet,
    config: &HypothesisConfig,
) -> Option<BotHypothesis> {
    let team = if track.id >= BLUE_ID_OFFSET {
        Team::Blue
    } else {
        Team::Yellow
    };
    let bot_id = (track.id % BLUE_ID_OFFSET) as u8;
    let mask = PATTERNS[bot_id as usize];

    let dt = (t_capture - track.timestamp).clamp(0.0, MAX_PREDICTION_DT) as f32;
    let projected = perspective.project_to_height(track.pos, max_bot_height)?;
    let predicted = projected + track.vel.xy() * dt;
    let predicted_orientation = track.orientation + track.angular_vel * dt;
    let radius = config.max_bot_acceleration * dt * dt + config.min_tracking_radius;

    // Anchor 0 is the center; 1..=4 are the side slots.
    let mut anchors = [predicted; 5];
    for slot in 0..4 {
        let angle = predicted_orientation + PATTERN_ANGLES[slot];
        anchors[slot + 1] =
            predicted + Vector2::new(angle.cos(), angle.sin()) * config.side_blob_distance;
    }

    let slot_candidates: [Vec<Option<usize>>; 5] = std::array::from_fn(|slot| {
        let anchor = anchors[slot];
        let mut found: Vec<usize> = tree.range_search(anchor, radius);
        found.sort_by(|&a, &b| {
            let da = (blobs[a].field_pos - anchor).norm_squared();
            let db = (blobs[b].field_pos - anchor).norm_squared();
            da.partial_cmp(&db).unwrap().then(a.cmp(&b))
        });
        found.truncate(MAX_SLOT_CANDIDATES);
        // The null option models a missing blob.
        let mut options: Vec<Option<usize>> = found.into_iter().map(Some).collect();
        options.push(None);
        options
    });

    let mut best: Option<ScoredBot> = None;
    let mut assignment = [None; 5];
    enumerate_assignments(
        &slot_candidates,
        0,
        &mut assignment,
        &mut |assignment: &[Option<usize>; 5]| {
            let center_pos = assignment[0]
                .map(|index| blobs[index].field_pos)
                .unwrap_or(predicted);
            let center_circularity = assignment[0]
                .map(|index| blobs[index].circularity)
                .unwrap_or(0.0);
            let slots: [Option<&RawBlob>; 4] =
                std::array::from_fn(|slot| assignment[slot + 1].map(|index| &blobs[index]));

            let scored = score_sides(
                center_pos,
                center_circularity,
                &slots,
                Some(mask),
                colors,
                config,
            );
            if best.as_ref().is_some_and(|bot| bot.score >= scored.score) {
                return;
            }
            best = Some(ScoredBot {
                team,
                bot_id,
                pos: center_pos,
                orientation: scored.orientation,
                score: scored.score,
                center_blob: assignment[0],
                side_blobs: [
                    assignment[1],
                    assignment[2],
                    assignment[3],
                    assignment[4],
                ],
            });
        },
    );

    best.map(|bot| BotHypothesis::Tracked {
        bot,
        track_id: track.id,
    })
}

/// Depth-first walk of the slot candidate product, rejecting assignments
/// that reuse a blob.
fn enumerate_assignments(
    slot_candidates: &[Vec<Option<usize>>; 5],
    slot: usize,
    assignment: &mut [Option<usize>; 5],
    visit: &mut impl FnMut(&[Option<usize>; 5]),
) {
    if slot == 5 {
        visit(assignment);
        return;
    }
    for &candidate in &slot_candidates[slot] {
        if let Some(index) = candidate {
            if assignment[..slot].contains(&Some(index)) {
                continue;
            }
        }
        assignment[slot] = candidate;
        enumerate_assignments(slot_candidates, slot + 1, assignment, visit);
    }
    assignment[slot] = None;
}

/// Prediction used by the tracked generator.
pub fn predicted_position(
    track: &TrackedObject,
    perspective: &Perspective,
    max_bot_height: f32,
    t_capture: f64,
) -> Option<Vector2<f32>> {
    let dt = (t_capture - track.timestamp).clamp(0.0, MAX_PREDICTION_DT) as f32;
    perspective
        .project_to_height(track.pos, max_bot_height)
        .map(|projected| projected + track.vel.xy() * dt)
}
