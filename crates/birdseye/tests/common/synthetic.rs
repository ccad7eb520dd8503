//! Synthetic scenes for the end-to-end tests.

use birdseye::camera::CameraModel;
use birdseye::color::{ColorSet, Rgb};
use birdseye::extract::RawBlob;
use birdseye::frame::{PixelFormat, RawFrame};
use birdseye::hypo::{slot_color, HypothesisConfig, PATTERNS, PATTERN_ANGLES};
use birdseye::net::proto::{SslGeometryData, SslGeometryFieldSize};
use birdseye::perspective::Perspective;
use nalgebra::{UnitQuaternion, Vector2, Vector3};

/// Sensor resolution of the synthetic camera (working frames are half).
pub const SENSOR_W: u32 = 640;
pub const SENSOR_H: u32 = 480;

pub fn field_size() -> SslGeometryFieldSize {
    SslGeometryFieldSize {
        field_length: 4000,
        field_width: 3000,
        goal_width: Some(1000),
        goal_depth: Some(200),
        boundary_width: 300,
        ball_radius: Some(21.5),
        max_robot_radius: Some(90.0),
    }
}

/// Nadir camera over the field center, 3 m up.
pub fn camera_model() -> CameraModel {
    CameraModel::new(
        1800.0,
        Vector2::new(SENSOR_W as f32 / 2.0, SENSOR_H as f32 / 2.0),
        0.0,
        UnitQuaternion::identity(),
        Vector3::new(0.0, 0.0, 3000.0),
        Vector2::new(SENSOR_W, SENSOR_H),
    )
}

pub fn geometry() -> SslGeometryData {
    SslGeometryData {
        field: Some(field_size()),
        calib: vec![camera_model().to_calibration(0)],
    }
}

/// Perspective checked against the synthetic geometry at working size.
pub fn perspective(max_bot_height: f32) -> Perspective {
    let mut perspective = Perspective::new(0);
    perspective.geometry_check(
        Vector2::new(SENSOR_W / 2, SENSOR_H / 2),
        &geometry(),
        1,
        max_bot_height,
    );
    assert_eq!(perspective.geometry_version, 1, "synthetic geometry rejected");
    perspective
}

/// A scene painter producing full-resolution BGR frames.
pub struct Scene {
    model: CameraModel,
    pixels: Vec<[u8; 3]>, // rgb
}

impl Scene {
    pub fn new(field_color: Rgb) -> Self {
        Self {
            model: camera_model(),
            pixels: vec![[field_color.r, field_color.g, field_color.b];
                (SENSOR_W * SENSOR_H) as usize],
        }
    }

    /// Paint a marker disc of `radius_mm` at a field position and height.
    /// The scene model is in sensor resolution, so no pixel scaling here.
    pub fn disc(&mut self, pos: Vector2<f32>, height: f32, radius_mm: f32, color: Rgb) {
        let center = self.model.field2image(Vector3::new(pos.x, pos.y, height));
        let radius_px = radius_mm * self.model.focal_length / (self.model.pos.z - height);

        let r_outer = radius_px + 1.0;
        let x_min = (center.x - r_outer).floor().max(0.0) as u32;
        let x_max = (center.x + r_outer).ceil().min((SENSOR_W - 1) as f32) as u32;
        let y_min = (center.y - r_outer).floor().max(0.0) as u32;
        let y_max = (center.y + r_outer).ceil().min((SENSOR_H - 1) as f32) as u32;
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let d = (Vector2::new(x as f32, y as f32) - center).norm();
                let coverage = (radius_px + 0.5 - d).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                let pixel = &mut self.pixels[(y * SENSOR_W + x) as usize];
                for (channel, value) in [color.r, color.g, color.b].into_iter().enumerate() {
                    pixel[channel] = (value as f32 * coverage
                        + pixel[channel] as f32 * (1.0 - coverage))
                        .round() as u8;
                }
            }
        }
    }

    /// Paint the five markers of one bot.
    pub fn bot(
        &mut self,
        pos: Vector2<f32>,
        orientation: f32,
        bot_id: usize,
        height: f32,
        colors: &ColorSet,
        team_color: Rgb,
    ) {
        let config = HypothesisConfig::default();
        self.disc(pos, height, 20.0, team_color);
        for slot in 0..4 {
            let angle = orientation + PATTERN_ANGLES[slot];
            let side = pos + Vector2::new(angle.cos(), angle.sin()) * config.side_blob_distance;
            self.disc(
                side,
                height,
                config.side_blob_radius,
                slot_color(colors, PATTERNS[bot_id], slot),
            );
        }
    }

    pub fn into_frame(self) -> RawFrame {
        let mut data = Vec::with_capacity(self.pixels.len() * 3);
        for [r, g, b] in self.pixels {
            data.extend_from_slice(&[b, g, r]);
        }
        RawFrame {
            format: PixelFormat::Bgr8,
            width: SENSOR_W,
            height: SENSOR_H,
            timestamp: 0.0,
            data,
        }
    }
}

/// A blob candidate as the extractor would emit it, for engine-level tests.
pub fn blob(pos: Vector2<f32>, center: Rgb) -> RawBlob {
    RawBlob {
        field_pos: pos,
        flat_pos: Vector2::zeros(),
        surround: Rgb::new(40, 130, 60),
        center,
        circularity: 1.0,
        score: 1.0,
    }
}

/// The five blobs of a perfect pattern on the blob plane.
pub fn pattern_blobs(
    center: Vector2<f32>,
    orientation: f32,
    bot_id: usize,
    colors: &ColorSet,
    team_color: Rgb,
) -> Vec<RawBlob> {
    let config = HypothesisConfig::default();
    let mut blobs = vec![blob(center, team_color)];
    for slot in 0..4 {
        let angle = orientation + PATTERN_ANGLES[slot];
        blobs.push(blob(
            center + Vector2::new(angle.cos(), angle.sin()) * config.side_blob_distance,
            slot_color(colors, PATTERNS[bot_id], slot),
        ));
    }
    blobs
}
