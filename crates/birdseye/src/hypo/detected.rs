//! Untracked bot enumeration around team-colored center blobs.
//!
//! Green and pink candidates within the robot radius form the local pool;
//! a best-within-marker-diameter pass prunes near-duplicates, the
//! survivors are sorted by angle, and every strictly increasing quadruple
//! of the sorted ring is scored in all four cyclic slot rotations, so no
//! rotation of an assignment is silently collapsed. Only the best
//! assignment per center blob survives.

use crate::color::{ColorClass, ColorSet};
use crate::extract::RawBlob;
use crate::kdtree::KdTree;

use super::{score_sides, BotHypothesis, HypothesisConfig, ScoredBot, Team, PATTERN_LUT};

/// Build the best hypothesis for one center blob, if any side quadruple
/// scores at all.
pub fn enumerate_detected(
    center_index: usize,
    team: Team,
    blobs: &[RawBlob],
    classes: &[ColorClass],
    tree: &KdTree<'_>,
    max_robot_radius: f32,
    colors: &ColorSet,
    config: &HypothesisConfig,
) -> Option<BotHypothesis> {
    let center = &blobs[center_index];

    // Candidates on the center marker itself cannot be side blobs.
    let min_side_distance = config.center_blob_radius;
    let pool: Vec<usize> = tree
        .range_search(center.field_pos, max_robot_radius)
        .into_iter()
        .filter(|&index| {
            index != center_index
                && matches!(classes[index], ColorClass::Green | ColorClass::Pink)
                && (blobs[index].field_pos - center.field_pos).norm() > min_side_distance
        })
        .collect();

    // Within the local pool, a strictly better candidate inside one side
    // marker diameter shadows its neighbors.
    let suppression_radius = 2.0 * config.side_blob_radius;
    let mut candidates: Vec<(usize, f32)> = pool
        .iter()
        .filter(|&&index| {
            !pool.iter().any(|&other| {
                blobs[other].score > blobs[index].score
                    && (blobs[other].field_pos - blobs[index].field_pos).norm()
                        < suppression_radius
            })
        })
        .map(|&index| {
            let offset = blobs[index].field_pos - center.field_pos;
            (index, offset.y.atan2(offset.x))
        })
        .collect();
    if candidates.len() < 4 {
        return None;
    }
    // Angle order; index order breaks exact ties deterministically.
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));

    let mut best: Option<(f32, ScoredBot, u8)> = None;
    let n = candidates.len();
    for a in 0..n - 3 {
        for b in a + 1..n - 2 {
            for c in b + 1..n - 1 {
                for d in c + 1..n {
                    let ring = [candidates[a].0, candidates[b].0, candidates[c].0, candidates[d].0];
                    for rotation in 0..4 {
                        let mut side_blobs = [None; 4];
                        for (position, &blob_index) in ring.iter().enumerate() {
                            side_blobs[(position + rotation) % 4] = Some(blob_index);
                        }
                        let slots: [Option<&RawBlob>; 4] =
                            std::array::from_fn(|slot| side_blobs[slot].map(|i| &blobs[i]));
                        let scored = score_sides(
                            center.field_pos,
                            center.circularity,
                            &slots,
                            None,
                            colors,
                            config,
                        );
                        if best
                            .as_ref()
                            .is_some_and(|(score, _, _)| *score >= scored.score)
                        {
                            continue;
                        }
                        best = Some((
                            scored.score,
                            ScoredBot {
                                team,
                                bot_id: PATTERN_LUT[scored.green_mask as usize],
                                pos: center.field_pos,
                                orientation: scored.orientation,
                                score: scored.score,
                                center_blob: Some(center_index),
                                side_blobs,
                            },
                            scored.green_mask,
                        ));
                    }
                }
            }
        }
    }

    best.map(|(_, bot, green_mask)| BotHypothesis::Detected { bot, green_mask })
}

/// Center-blob team from its color class.
pub fn center_team(class: ColorClass) -> Option<Team> {
    match class {
        ColorClass::Yellow => Some(Team::Yellow),
        ColorClass::Blue => Some(Team::Blue),
        _ => None,
    }
}
