mod common;

use std::sync::{Arc, Mutex};

use birdseye::color::{ColorClass, ColorSet, FrameColorSamples, ReferenceColors, Rgb};
use birdseye::config::VisionConfig;
use birdseye::controller::FrameController;
use birdseye::hypo::{self, HypothesisConfig, Team};
use birdseye::kdtree::KdTree;
use birdseye::net::socket::{GeometryState, TeamHeights};
use birdseye::tracker::Tracker;
use common::synthetic;
use nalgebra::{Vector2, Vector3};

const BOT_HEIGHT: f32 = 145.0;

fn heights() -> TeamHeights {
    TeamHeights {
        yellow: BOT_HEIGHT,
        blue: BOT_HEIGHT,
    }
}

fn classify(blobs: &[birdseye::extract::RawBlob], colors: &ColorSet) -> Vec<ColorClass> {
    blobs.iter().map(|b| colors.classify(b.center)).collect()
}

fn engine_bots(
    blobs: &[birdseye::extract::RawBlob],
    perspective: &birdseye::Perspective,
) -> Vec<hypo::BotHypothesis> {
    let colors = ColorSet::default();
    let config = HypothesisConfig::default();
    let classes = classify(blobs, &colors);
    let tree = KdTree::build(blobs);
    let bots = hypo::generate_bots(
        blobs,
        &classes,
        &tree,
        &[],
        perspective,
        BOT_HEIGHT,
        0.0,
        &colors,
        &config,
    );
    let bots = hypo::filter_confidence(bots, config.min_confidence);
    hypo::resolve_clipping(bots, perspective.field.max_robot_radius)
}

#[test]
fn identity_projection_round_trips_the_field_origin() {
    let model = birdseye::CameraModel::new(
        1000.0,
        Vector2::new(500.0, 500.0),
        0.0,
        nalgebra::UnitQuaternion::identity(),
        Vector3::new(0.0, 0.0, 3000.0),
        Vector2::new(1000, 1000),
    );

    let image = model.field2image(Vector3::new(0.0, 0.0, 0.0));
    assert!((image - Vector2::new(500.0, 500.0)).norm() < 1e-3);

    let field = model.image2field(Vector2::new(500.0, 500.0), 0.0).unwrap();
    assert!(field.norm() < 1e-3);
}

#[test]
fn over_horizon_ray_yields_the_sentinel() {
    let tilted = nalgebra::UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.4);
    let model = birdseye::CameraModel::new(
        1000.0,
        Vector2::new(500.0, 500.0),
        0.0,
        tilted,
        Vector3::new(0.0, 0.0, 3000.0),
        Vector2::new(1000, 1000),
    );
    assert!(model.image2field(Vector2::new(500.0, 999.0), 0.0).is_none());
}

#[test]
fn single_clean_bot_is_recognized_with_identity_zero() {
    let perspective = synthetic::perspective(BOT_HEIGHT);
    let colors = ColorSet::default();
    let blobs = synthetic::pattern_blobs(
        Vector2::new(120.0, -80.0),
        0.0,
        0,
        &colors,
        colors.yellow,
    );

    let bots = engine_bots(&blobs, &perspective);
    assert_eq!(bots.len(), 1);
    let bot = bots[0].bot();
    assert_eq!(bot.team, Team::Yellow);
    assert_eq!(bot.bot_id, 0);
    assert!(bot.score >= 0.95 * 4.0, "score {}", bot.score);
    assert!(
        bot.orientation.abs() <= 2.0f32.to_radians(),
        "orientation {}",
        bot.orientation
    );
}

#[test]
fn clipping_bots_keep_only_the_better_and_free_the_loser_blobs() {
    let perspective = synthetic::perspective(BOT_HEIGHT);
    let colors = ColorSet::default();

    // A full pattern and, 50 mm away, a second center with a degraded
    // pattern (one side blob pulled off its anchor).
    let mut blobs = synthetic::pattern_blobs(
        Vector2::new(0.0, 0.0),
        0.0,
        0,
        &colors,
        colors.yellow,
    );
    let mut weaker = synthetic::pattern_blobs(
        Vector2::new(50.0, 0.0),
        0.8,
        3,
        &colors,
        colors.yellow,
    );
    weaker[1].field_pos += Vector2::new(25.0, 0.0);
    let weaker_center = weaker[0].field_pos;
    blobs.append(&mut weaker);

    let bots = engine_bots(&blobs, &perspective);
    assert_eq!(bots.len(), 1, "one of the clipping bots must survive");
    let bot = bots[0].bot();
    assert_eq!(bot.bot_id, 0);
    assert!((bot.pos - Vector2::new(0.0, 0.0)).norm() < 1.0);
    assert!((bot.pos - weaker_center).norm() < 90.0, "bots did clip");

    // The loser's blobs are no longer referenced by any surviving bot.
    let used: Vec<usize> = bots.iter().flat_map(|b| b.bot().used_blobs()).collect();
    assert!(used.iter().all(|&index| index < 5));
}

#[test]
fn ball_next_to_a_bot_is_suppressed_farther_away_it_survives() {
    let perspective = synthetic::perspective(BOT_HEIGHT);
    let colors = ColorSet::default();
    let config = HypothesisConfig::default();

    let mut blobs = synthetic::pattern_blobs(
        Vector2::new(0.0, 0.0),
        0.0,
        0,
        &colors,
        colors.yellow,
    );
    blobs.push(synthetic::blob(Vector2::new(60.0, 0.0), colors.orange));
    blobs.push(synthetic::blob(Vector2::new(200.0, 0.0), colors.orange));
    let far_index = blobs.len() - 1;

    let bots = engine_bots(&blobs, &perspective);
    assert_eq!(bots.len(), 1);

    let balls = hypo::generate_balls(&blobs, &bots, perspective.field.max_robot_radius, &colors);
    let balls = hypo::filter_balls(balls, &blobs, &perspective, &config, &colors);
    assert_eq!(balls.len(), 1);
    assert_eq!(balls[0].blob, far_index);
}

#[test]
fn color_adaptation_converges_onto_the_reference_estimate_segment() {
    let prior = ColorSet::default();
    let mut colors = ReferenceColors::new(prior, prior, 0.1, 0.7);
    let observed = Vector3::new(240, 80, 10);
    let field_background = Vector3::new(30, 120, 60);

    for _ in 0..30 {
        let samples = FrameColorSamples {
            ball_candidates: vec![observed, observed, field_background, field_background],
            ..FrameColorSamples::default()
        };
        colors.update(&samples);
    }

    // Fixed point of the blend: (rf * prior + (1 - rf - hf) * estimate)
    // divided by (1 - hf); the 30-frame transient is long gone.
    let expected = (prior.orange.vec().cast::<f32>() * 0.1 + observed.cast::<f32>() * 0.2) / 0.3;
    let got = colors.current.orange;
    assert!((got.r as f32 - expected.x).abs() <= 3.0, "r {} vs {}", got.r, expected.x);
    assert!((got.g as f32 - expected.y).abs() <= 3.0, "g {} vs {}", got.g, expected.y);
    assert!((got.b as f32 - expected.z).abs() <= 3.0, "b {} vs {}", got.b, expected.z);

    // And the result lies between the prior and the frame estimate.
    for (component, (lo, hi)) in [
        (got.r as i32, (240, 255)),
        (got.g as i32, (64, 80)),
        (got.b as i32, (0, 10)),
    ] {
        assert!(component >= lo - 1 && component <= hi + 1, "{component} not in [{lo}, {hi}]");
    }
}

/// Full-pipeline run on a painted frame: one yellow bot and one ball.
#[test]
fn painted_frame_produces_bot_and_ball_detections() {
    let field_color = Rgb::new(40, 130, 60);
    let colors = ColorSet::default();

    let mut scene = synthetic::Scene::new(field_color);
    scene.bot(Vector2::new(0.0, 0.0), 0.0, 0, BOT_HEIGHT, &colors, colors.yellow);
    scene.disc(Vector2::new(250.0, -180.0), BOT_HEIGHT, 21.5, colors.orange);
    let frame = scene.into_frame();

    let mut config = VisionConfig::default();
    // Freeze the color estimates so a rerun is bit-identical.
    config.colors.reference_force = 1.0;
    config.colors.history_force = 0.0;

    let tracker = Arc::new(Tracker::new(BOT_HEIGHT, 21.5, 8000.0));
    let geometry = Arc::new(Mutex::new(GeometryState::default()));
    geometry.lock().unwrap().update(synthetic::geometry());
    let mut controller = FrameController::new(config, tracker, geometry);

    let first = controller
        .process_frame(&frame, heights())
        .expect("calibrated frame must publish")
        .detection
        .unwrap();

    assert_eq!(first.robots_yellow.len(), 1, "bot missing: {first:?}");
    let bot = &first.robots_yellow[0];
    assert_eq!(bot.robot_id, Some(0));
    assert!(bot.x.abs() < 30.0 && bot.y.abs() < 30.0, "bot at ({}, {})", bot.x, bot.y);
    assert!(
        bot.orientation.unwrap().abs() < 6.0f32.to_radians(),
        "orientation {:?}",
        bot.orientation
    );

    assert_eq!(first.balls.len(), 1, "ball missing: {first:?}");
    let ball = &first.balls[0];
    // The ball reprojects from the blob plane down to its own radius.
    assert!((ball.x - 261.0).abs() < 20.0, "ball x {}", ball.x);
    assert!((ball.y + 188.0).abs() < 20.0, "ball y {}", ball.y);

    // Determinism: the identical frame yields the identical detections
    // modulo frame number and timestamps.
    let second = controller
        .process_frame(&frame, heights())
        .expect("second run must publish")
        .detection
        .unwrap();
    assert_eq!(second.robots_yellow, first.robots_yellow);
    assert_eq!(second.robots_blue, first.robots_blue);
    assert_eq!(second.balls, first.balls);
    assert_eq!(second.frame_number, first.frame_number + 1);
}
