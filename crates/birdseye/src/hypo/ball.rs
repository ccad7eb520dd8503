//! Ball hypothesis generation and the final ball filter chain.
//!
//! Runs after bot clipping: every blob not consumed by a surviving bot and
//! not inside a surviving bot's footprint becomes a candidate. Scoring
//! combines the blob's own quality with how orange its center looks; the
//! final filters enforce the confidence floor, the margin to
//! camera-induced extent edges, and the color-deviation floor.

use std::collections::HashSet;

use nalgebra::Vector2;

use crate::color::{ColorSet, Rgb};
use crate::extract::RawBlob;
use crate::perspective::{Perspective, EDGE_X_MAX, EDGE_X_MIN, EDGE_Y_MAX, EDGE_Y_MIN};

use super::{BotHypothesis, HypothesisConfig};

/// One blob considered as the ball. Lifetime is one frame.
#[derive(Debug, Clone)]
pub struct BallHypothesis {
    pub blob: usize,
    /// Position on the blob plane (mm).
    pub pos: Vector2<f32>,
    pub score: f32,
}

/// Candidates from the blobs no surviving bot uses or covers.
pub fn generate_balls(
    blobs: &[RawBlob],
    surviving_bots: &[BotHypothesis],
    robot_radius: f32,
    colors: &ColorSet,
) -> Vec<BallHypothesis> {
    let used: HashSet<usize> = surviving_bots
        .iter()
        .flat_map(|hypothesis| hypothesis.bot().used_blobs())
        .collect();

    blobs
        .iter()
        .enumerate()
        .filter(|(index, blob)| {
            !used.contains(index)
                && !surviving_bots.iter().any(|hypothesis| {
                    (hypothesis.bot().pos - blob.field_pos).norm() < robot_radius
                })
        })
        .map(|(index, blob)| BallHypothesis {
            blob: index,
            pos: blob.field_pos,
            score: ball_score(blob, colors),
        })
        .collect()
}

/// Blob quality damped by the hue distance to the ball reference color.
pub fn ball_score(blob: &RawBlob, colors: &ColorSet) -> f32 {
    let hue_error = Rgb::hue_distance(blob.center.hue(), colors.orange.hue()) as f32;
    blob.score * (1.0 - hue_error / 128.0).clamp(0.0, 1.0)
}

/// How closely the candidate color sticks to the ball reference, in
/// [0, 1]; 1 is an exact match.
pub fn color_deviation_score(blob: &RawBlob, colors: &ColorSet) -> f32 {
    const MAX_RGB_DIST: f32 = 441.673; // 255 * sqrt(3)
    1.0 - (blob.center.dist_sq(colors.orange) as f32).sqrt() / MAX_RGB_DIST
}

/// Final ball filter chain.
pub fn filter_balls(
    balls: Vec<BallHypothesis>,
    blobs: &[RawBlob],
    perspective: &Perspective,
    config: &HypothesisConfig,
    colors: &ColorSet,
) -> Vec<BallHypothesis> {
    let cam_induced = perspective.cam_induced_edges();
    let extent = perspective.visible_extent;
    let margin = config.min_cam_edge_distance;

    balls
        .into_iter()
        .filter(|ball| {
            if ball.score <= config.min_confidence {
                return false;
            }

            // Axis-wise margin against camera-induced edges only; the
            // physical field boundary keeps its own margin via geometry.
            let near_edge = (cam_induced[EDGE_X_MIN]
                && ball.pos.x - extent[EDGE_X_MIN] < margin)
                || (cam_induced[EDGE_X_MAX] && extent[EDGE_X_MAX] - ball.pos.x < margin)
                || (cam_induced[EDGE_Y_MIN] && ball.pos.y - extent[EDGE_Y_MIN] < margin)
                || (cam_induced[EDGE_Y_MAX] && extent[EDGE_Y_MAX] - ball.pos.y < margin);
            if near_edge {
                return false;
            }

            color_deviation_score(&blobs[ball.blob], colors) > config.min_score
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraModel;
    use crate::hypo::{ScoredBot, Team, PATTERNS};
    use crate::net::proto::{SslGeometryData, SslGeometryFieldSize};
    use nalgebra::{UnitQuaternion, Vector3};

    fn blob(pos: Vector2<f32>, center: Rgb, score: f32) -> RawBlob {
        RawBlob {
            field_pos: pos,
            flat_pos: Vector2::zeros(),
            surround: Rgb::new(40, 130, 60),
            center,
            circularity: 1.0,
            score,
        }
    }

    fn surviving_bot(pos: Vector2<f32>) -> BotHypothesis {
        BotHypothesis::Detected {
            bot: ScoredBot {
                team: Team::Yellow,
                bot_id: 0,
                pos,
                orientation: 0.0,
                score: 3.9,
                center_blob: None,
                side_blobs: [None; 4],
            },
            green_mask: PATTERNS[0],
        }
    }

    /// Perspective with every edge camera-induced.
    fn narrow_perspective() -> Perspective {
        let model = CameraModel::new(
            900.0,
            Vector2::new(612.0, 512.0),
            0.0,
            UnitQuaternion::identity(),
            Vector3::new(0.0, 0.0, 2500.0),
            Vector2::new(1224, 1024),
        );
        let geometry = SslGeometryData {
            field: Some(SslGeometryFieldSize {
                field_length: 9000,
                field_width: 6000,
                goal_width: None,
                goal_depth: None,
                boundary_width: 300,
                ball_radius: Some(21.5),
                max_robot_radius: Some(90.0),
            }),
            calib: vec![model.to_calibration(0)],
        };
        let mut perspective = Perspective::new(0);
        perspective.geometry_check(Vector2::new(1224, 1024), &geometry, 1, 150.0);
        assert_eq!(perspective.cam_induced_edges(), [true; 4]);
        perspective
    }

    #[test]
    fn blob_near_surviving_bot_is_not_a_ball() {
        let colors = ColorSet::default();
        let bots = vec![surviving_bot(Vector2::new(0.0, 0.0))];
        let blobs = vec![
            blob(Vector2::new(60.0, 0.0), colors.orange, 0.9),
            blob(Vector2::new(200.0, 0.0), colors.orange, 0.9),
        ];

        let balls = generate_balls(&blobs, &bots, 90.0, &colors);
        assert_eq!(balls.len(), 1);
        assert_eq!(balls[0].blob, 1);
    }

    #[test]
    fn ball_near_cam_induced_edge_is_dropped() {
        let colors = ColorSet::default();
        let config = HypothesisConfig::default();
        let perspective = narrow_perspective();
        let x_min = perspective.visible_extent[EDGE_X_MIN];
        let epsilon = 1.0;

        let blobs = vec![
            blob(
                Vector2::new(x_min + config.min_cam_edge_distance - epsilon, 0.0),
                colors.orange,
                0.9,
            ),
            blob(
                Vector2::new(x_min + config.min_cam_edge_distance + epsilon, 0.0),
                colors.orange,
                0.9,
            ),
        ];
        let balls = generate_balls(&blobs, &[], 90.0, &colors);
        assert_eq!(balls.len(), 2);

        let kept = filter_balls(balls, &blobs, &perspective, &config, &colors);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].blob, 1);
    }

    #[test]
    fn off_color_candidate_fails_the_deviation_floor() {
        let colors = ColorSet::default();
        let config = HypothesisConfig {
            min_score: 0.8,
            ..HypothesisConfig::default()
        };
        let perspective = narrow_perspective();

        // A gray blob scores near zero on hue match as well, so give it a
        // strong blob score and judge only the deviation gate.
        let blobs = vec![blob(Vector2::new(0.0, 0.0), Rgb::new(200, 200, 200), 1.0)];
        let balls = vec![BallHypothesis {
            blob: 0,
            pos: Vector2::new(0.0, 0.0),
            score: 0.9,
        }];

        let kept = filter_balls(balls, &blobs, &perspective, &config, &colors);
        assert!(kept.is_empty());
    }

    #[test]
    fn orange_ball_passes_all_filters() {
        let colors = ColorSet::default();
        let config = HypothesisConfig::default();
        let perspective = narrow_perspective();

        let blobs = vec![blob(Vector2::new(0.0, 0.0), Rgb::new(250, 70, 8), 0.9)];
        let balls = generate_balls(&blobs, &[], 90.0, &colors);
        let kept = filter_balls(balls, &blobs, &perspective, &config, &colors);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].score > config.min_confidence);
    }
}
