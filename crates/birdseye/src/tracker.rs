//! Previous-frame object tracking.
//!
//! Every published detection frame (our own and those of peer cameras)
//! updates a per-camera map of tracked objects with finite-difference
//! velocities. The processing thread takes a merged snapshot at frame
//! start; the receive threads replace entire per-camera entries under the
//! mutex, so no reference crosses a frame boundary.

use std::collections::HashMap;
use std::sync::Mutex;

use nalgebra::Vector3;

use crate::net::proto::{SslDetectionFrame, SslDetectionRobot};

/// Tracked object id: the ball.
pub const BALL_ID: i32 = -1;
/// Id offset of blue robots (yellow occupy 0..15).
pub const BLUE_ID_OFFSET: i32 = 16;

/// Pose and velocity of one object as of its last detection.
#[derive(Debug, Clone, Copy)]
pub struct TrackedObject {
    /// −1 ball, 0..15 yellow bots, 16..31 blue bots.
    pub id: i32,
    /// Capture timestamp of the frame this state is from (unix seconds).
    pub timestamp: f64,
    /// Position in field coordinates; z is the marker height (mm).
    pub pos: Vector3<f32>,
    pub orientation: f32,
    /// Finite-difference velocity (mm/s); zero on first observation.
    pub vel: Vector3<f32>,
    pub angular_vel: f32,
    pub confidence: f32,
}

pub struct Tracker {
    cameras: Mutex<HashMap<u32, Vec<TrackedObject>>>,
    default_bot_height: f32,
    ball_radius: f32,
    max_ball_velocity: f32,
}

impl Tracker {
    pub fn new(default_bot_height: f32, ball_radius: f32, max_ball_velocity: f32) -> Self {
        Self {
            cameras: Mutex::new(HashMap::new()),
            default_bot_height,
            ball_radius,
            max_ball_velocity,
        }
    }

    /// Merged view over all cameras, newest state per object id. The
    /// returned vector is detached; iterate it without holding any lock.
    pub fn snapshot(&self) -> Vec<TrackedObject> {
        let cameras = self.cameras.lock().expect("tracker mutex");
        let mut newest: HashMap<i32, TrackedObject> = HashMap::new();
        for object in cameras.values().flatten() {
            match newest.get(&object.id) {
                Some(existing) if existing.timestamp >= object.timestamp => {}
                _ => {
                    newest.insert(object.id, *object);
                }
            }
        }
        let mut merged: Vec<TrackedObject> = newest.into_values().collect();
        merged.sort_by_key(|object| object.id);
        merged
    }

    /// Update from one camera's detection frame, replacing that camera's
    /// previous entry atomically.
    pub fn ingest(&self, detection: &SslDetectionFrame) {
        let timestamp = detection.t_capture_camera.unwrap_or(detection.t_capture);

        let mut cameras = self.cameras.lock().expect("tracker mutex");
        let previous = cameras.remove(&detection.camera_id).unwrap_or_default();
        let mut objects = Vec::with_capacity(
            detection.balls.len() + detection.robots_yellow.len() + detection.robots_blue.len(),
        );

        for ball in &detection.balls {
            let pos = Vector3::new(ball.x, ball.y, ball.z.unwrap_or(self.ball_radius));
            // A pairing implying an implausible flight is a new ball, not
            // a jump of the old one.
            let paired = nearest_previous(&previous, BALL_ID, pos).filter(|old| {
                let dt = (timestamp - old.timestamp).max(0.0) as f32;
                (pos - old.pos).norm() <= self.max_ball_velocity * dt + self.ball_radius
            });
            objects.push(advance(
                BALL_ID,
                timestamp,
                pos,
                0.0,
                ball.confidence,
                paired,
            ));
        }
        self.track_bots(&detection.robots_yellow, timestamp, 0, &previous, &mut objects);
        self.track_bots(
            &detection.robots_blue,
            timestamp,
            BLUE_ID_OFFSET,
            &previous,
            &mut objects,
        );

        cameras.insert(detection.camera_id, objects);
    }

    fn track_bots(
        &self,
        bots: &[SslDetectionRobot],
        timestamp: f64,
        id_offset: i32,
        previous: &[TrackedObject],
        objects: &mut Vec<TrackedObject>,
    ) {
        for bot in bots {
            let Some(robot_id) = bot.robot_id else {
                continue;
            };
            let id = robot_id as i32 + id_offset;
            let pos = Vector3::new(bot.x, bot.y, bot.height.unwrap_or(self.default_bot_height));
            let paired = nearest_previous(previous, id, pos);
            objects.push(advance(
                id,
                timestamp,
                pos,
                bot.orientation.unwrap_or(0.0),
                bot.confidence,
                paired,
            ));
        }
    }
}

fn nearest_previous(
    previous: &[TrackedObject],
    id: i32,
    pos: Vector3<f32>,
) -> Option<&TrackedObject> {
    previous
        .iter()
        .filter(|object| object.id == id)
        .min_by(|a, b| {
            let da = (a.pos - pos).norm_squared();
            let db = (b.pos - pos).norm_squared();
            da.partial_cmp(&db).expect("finite distances")
        })
}

fn advance(
    id: i32,
    timestamp: f64,
    pos: Vector3<f32>,
    orientation: f32,
    confidence: f32,
    paired: Option<&TrackedObject>,
) -> TrackedObject {
    let (vel, angular_vel) = match paired {
        Some(old) if timestamp > old.timestamp => {
            let dt = (timestamp - old.timestamp) as f32;
            ((pos - old.pos) / dt, (orientation - old.orientation) / dt)
        }
        _ => (Vector3::zeros(), 0.0),
    };
    TrackedObject {
        id,
        timestamp,
        pos,
        orientation,
        vel,
        angular_vel,
        confidence,
    }
}
