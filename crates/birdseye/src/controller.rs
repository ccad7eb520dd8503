//! Per-frame orchestration and the processing state machine.
//!
//! Each iteration is strictly sequential: rectify, extract, index,
//! hypothesize, prune, calibrate colors, rescore, filter, publish. The
//! controller owns everything that persists across frames (perspective,
//! reference colors, frame counter); per-frame data never outlives the
//! iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use nalgebra::{Vector2, Vector3};

use crate::color::{ColorClass, FrameColorSamples, ReferenceColors};
use crate::config::VisionConfig;
use crate::extract::{self, RawBlob};
use crate::frame::{RawFrame, PIXEL_SCALE};
use crate::hypo::{self, BallHypothesis, BotHypothesis, Team};
use crate::kdtree::KdTree;
use crate::mailbox::Mailbox;
use crate::net::proto::{
    SslDetectionBall, SslDetectionFrame, SslDetectionRobot, SslWrapperPacket,
};
use crate::net::socket::{GcSocket, GeometryState, TeamHeights, VisionSocket};
use crate::perspective::Perspective;
use crate::pool::FramePool;
use crate::source::{wall_time, CameraSource};
use crate::tracker::Tracker;

/// Frame number whose raw image is dumped when a sample path is set.
const SAMPLE_DUMP_FRAME: u32 = 100;

/// What the controller would do with the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No geometry from upstream yet.
    AwaitGeometry,
    /// Geometry known but no usable calibration for this camera.
    Calibrate,
    /// Fully calibrated; frames produce detections.
    Detect,
}

pub struct FrameController {
    config: VisionConfig,
    perspective: Perspective,
    colors: ReferenceColors,
    tracker: Arc<Tracker>,
    geometry: Arc<Mutex<GeometryState>>,
    pool: FramePool,
    pub preview: Arc<Mailbox<RawFrame>>,
    frame_number: u32,
}

impl FrameController {
    pub fn new(
        config: VisionConfig,
        tracker: Arc<Tracker>,
        geometry: Arc<Mutex<GeometryState>>,
    ) -> Self {
        let colors = ReferenceColors::new(
            config.colors.initial,
            config.colors.priors,
            config.colors.reference_force,
            config.colors.history_force,
        );
        let perspective = Perspective::new(config.camera.id);
        Self {
            config,
            perspective,
            colors,
            tracker,
            geometry,
            pool: FramePool::default(),
            preview: Arc::new(Mailbox::default()),
            frame_number: 0,
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.perspective.geometry_version > 0 {
            ControllerState::Detect
        } else if self.geometry.lock().expect("geometry mutex").version() > 0 {
            ControllerState::Calibrate
        } else {
            ControllerState::AwaitGeometry
        }
    }

    pub fn colors(&self) -> &ReferenceColors {
        &self.colors
    }

    /// Process one raw frame. Returns the publishable packet, or `None`
    /// while geometry or calibration is still pending.
    pub fn process_frame(
        &mut self,
        frame: &RawFrame,
        heights: TeamHeights,
    ) -> Option<SslWrapperPacket> {
        self.frame_number += 1;
        let t_capture = wall_time();
        let max_bot_height = heights.max();

        let (geometry, version) = self.geometry.lock().expect("geometry mutex").snapshot();
        if version == 0 {
            return None;
        }

        let rgba = frame.to_rgba();
        let working_size = Vector2::new(rgba.width(), rgba.height());
        self.perspective
            .geometry_check(working_size, &geometry, version, max_bot_height);

        if self.perspective.geometry_version == 0 {
            self.calibrate(working_size, &geometry);
            return None;
        }

        // Blob extraction and spatial indexing.
        let blobs = extract::extract_blobs(
            &rgba,
            &self.perspective,
            max_bot_height,
            self.config.detection.side_blob_radius,
            &self.config.extraction,
            &self.pool,
        );
        // Near-duplicate maxima that survive the pixel NMS cannot both be
        // real markers; keep the better one per ball-diameter neighborhood.
        let blobs = extract::suppress_duplicates(blobs, self.config.detection.ball_radius);
        let classes: Vec<ColorClass> = blobs
            .iter()
            .map(|blob| self.colors.current.classify(blob.center))
            .collect();
        let tree = KdTree::build(&blobs);
        let tracks = self.tracker.snapshot();

        // Bot hypotheses: predictive first, then exhaustive.
        let bots = hypo::generate_bots(
            &blobs,
            &classes,
            &tree,
            &tracks,
            &self.perspective,
            max_bot_height,
            t_capture,
            &self.colors.current,
            &self.config.detection,
        );
        let bots = hypo::filter_confidence(bots, self.config.detection.min_confidence);
        let mut bots = hypo::resolve_clipping(bots, self.perspective.field.max_robot_radius);

        let mut balls = hypo::ball::generate_balls(
            &blobs,
            &bots,
            self.perspective.field.max_robot_radius,
            &self.colors.current,
        );

        // Color calibration from the confirmed sets, then one rescore with
        // the updated references before the final filters.
        let samples = collect_color_samples(&blobs, &bots, &balls);
        self.colors.update(&samples);
        for bot in &mut bots {
            bot.rescore(&blobs, &self.colors.current, &self.config.detection);
        }
        let bots = hypo::filter_confidence(bots, self.config.detection.min_confidence);
        for ball in &mut balls {
            ball.score = hypo::ball::ball_score(&blobs[ball.blob], &self.colors.current);
        }
        let balls = hypo::ball::filter_balls(
            balls,
            &blobs,
            &self.perspective,
            &self.config.detection,
            &self.colors.current,
        );

        let mut detection = self.publish_detections(&bots, &balls, heights, max_bot_height);
        detection.frame_number = self.frame_number;
        detection.t_capture = t_capture;
        if frame.timestamp != 0.0 {
            detection.t_capture_camera = Some(frame.timestamp);
        }
        detection.camera_id = self.config.camera.id;
        detection.t_sent = wall_time();

        Some(SslWrapperPacket {
            detection: Some(detection),
            geometry: None,
        })
    }

    /// S1: no usable calibration for this camera yet. Unless configured to
    /// wait for an upstream one, bootstrap a nadir model over this
    /// camera's field cell and feed it back into the shared geometry.
    fn calibrate(&mut self, working_size: Vector2<u32>, geometry: &crate::net::proto::SslGeometryData) {
        if self.config.debug.wait_for_geometry {
            return;
        }
        let Some(field) = geometry.field.as_ref() else {
            return;
        };

        let model = crate::camera::CameraModel::bootstrap(
            working_size,
            self.config.camera.id,
            self.config.camera.amount,
            self.config.camera.height,
            field,
        );
        tracing::info!(
            camera_id = self.config.camera.id,
            focal_length = model.focal_length,
            "no calibration received, bootstrapping camera model"
        );
        self.geometry
            .lock()
            .expect("geometry mutex")
            .put_calibration(model.to_calibration(self.config.camera.id));
    }

    fn publish_detections(
        &self,
        bots: &[BotHypothesis],
        balls: &[BallHypothesis],
        heights: TeamHeights,
        max_bot_height: f32,
    ) -> SslDetectionFrame {
        let mut detection = SslDetectionFrame::default();

        for hypothesis in bots {
            let bot = hypothesis.bot();
            let height = match bot.team {
                Team::Yellow => heights.yellow,
                Team::Blue => heights.blue,
            };
            // Reproject from the blob plane down to the marker plate.
            let image_pos = self.perspective.field2image(Vector3::new(
                bot.pos.x,
                bot.pos.y,
                max_bot_height,
            ));
            let Some(ground) = self.perspective.image2field(image_pos, height) else {
                continue;
            };

            let robot = SslDetectionRobot {
                confidence: bot.confidence(),
                robot_id: Some(bot.bot_id as u32),
                x: ground.x,
                y: ground.y,
                orientation: Some(bot.orientation),
                pixel_x: image_pos.x * PIXEL_SCALE,
                pixel_y: image_pos.y * PIXEL_SCALE,
                height: Some(height),
            };
            match bot.team {
                Team::Yellow => detection.robots_yellow.push(robot),
                Team::Blue => detection.robots_blue.push(robot),
            }
        }

        for ball in balls {
            let image_pos = self.perspective.field2image(Vector3::new(
                ball.pos.x,
                ball.pos.y,
                max_bot_height,
            ));
            let Some(ground) = self
                .perspective
                .image2field(image_pos, self.config.detection.ball_radius)
            else {
                continue;
            };
            detection.balls.push(SslDetectionBall {
                confidence: ball.score.clamp(0.0, 1.0),
                area: None,
                x: ground.x,
                y: ground.y,
                z: Some(self.config.detection.ball_radius),
                pixel_x: image_pos.x * PIXEL_SCALE,
                pixel_y: image_pos.y * PIXEL_SCALE,
            });
        }

        detection
    }

    /// Main processing loop: camera-paced, one frame at a time.
    pub fn run(
        &mut self,
        source: &mut CameraSource,
        socket: &VisionSocket,
        gc: &GcSocket,
        shutdown: &Arc<AtomicBool>,
    ) {
        let expected_frametime = source.expected_frametime();

        while !shutdown.load(Ordering::Relaxed) {
            let Some(frame) = source.read_frame() else {
                tracing::info!("camera source ended");
                break;
            };
            let started = Instant::now();

            self.maybe_dump_sample(&frame);
            let heights = gc.heights();
            if let Some(wrapper) = self.process_frame(&frame, heights) {
                socket.send(&wrapper);
                if let Some(detection) = &wrapper.detection {
                    // Own frames feed the tracker directly; the receive
                    // thread skips them to avoid double ingestion.
                    self.tracker.ingest(detection);
                    tracing::debug!(
                        frame = detection.frame_number,
                        balls = detection.balls.len(),
                        bots = detection.robots_yellow.len() + detection.robots_blue.len(),
                        "frame published"
                    );
                }
            }
            self.preview.offer(frame);

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > expected_frametime {
                tracing::warn!(
                    elapsed_ms = elapsed * 1e3,
                    budget_ms = expected_frametime * 1e3,
                    "frame time overrun"
                );
            }
        }
    }

    fn maybe_dump_sample(&self, frame: &RawFrame) {
        let Some(path) = &self.config.debug.sample_dump else {
            return;
        };
        if self.frame_number + 1 != SAMPLE_DUMP_FRAME {
            return;
        }
        let rgba = frame.to_rgba();
        if let Err(error) = rgba.save(path) {
            tracing::warn!(%error, ?path, "sample dump failed");
        }
    }
}

/// Confirmed color samples: side and center blobs of surviving bots, and
/// the centers of all ball candidates.
fn collect_color_samples(
    blobs: &[RawBlob],
    bots: &[BotHypothesis],
    balls: &[BallHypothesis],
) -> FrameColorSamples {
    let mut samples = FrameColorSamples::default();

    for hypothesis in bots {
        let bot = hypothesis.bot();
        if let Some(center) = bot.center_blob {
            samples.bot_centers.push(blobs[center].center.vec());
        }
        let mask = match hypothesis {
            BotHypothesis::Tracked { .. } => hypo::PATTERNS[bot.bot_id as usize],
            BotHypothesis::Detected { green_mask, .. } => *green_mask,
        };
        for (slot, blob) in bot.side_blobs.iter().enumerate() {
            let Some(blob) = blob else { continue };
            let color = blobs[*blob].center.vec();
            if mask & (1 << (3 - slot)) != 0 {
                samples.green_side.push(color);
            } else {
                samples.pink_side.push(color);
            }
        }
    }

    for ball in balls {
        samples.ball_candidates.push(blobs[ball.blob].center.vec());
    }

    samples
}
