//! Ground-plane view of one camera.
//!
//! `Perspective` combines the camera model with the field geometry and
//! maintains the derived rectified-view parameters: the visible field
//! extent, the mm-per-pixel scale and the integer size of the reprojected
//! (flat) image. Everything is recomputed when the geometry version or the
//! image size changes.

use nalgebra::{Vector2, Vector3};

use crate::camera::CameraModel;
use crate::net::proto::{SslGeometryData, SslGeometryFieldSize};

/// Field dimensions in millimeters, with fallbacks for optional values.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldDimensions {
    pub length: f32,
    pub width: f32,
    pub boundary: f32,
    pub ball_radius: f32,
    pub max_robot_radius: f32,
}

impl From<&SslGeometryFieldSize> for FieldDimensions {
    fn from(field: &SslGeometryFieldSize) -> Self {
        Self {
            length: field.field_length as f32,
            width: field.field_width as f32,
            boundary: field.boundary_width as f32,
            ball_radius: field.ball_radius.unwrap_or(21.5),
            max_robot_radius: field.max_robot_radius.unwrap_or(90.0),
        }
    }
}

/// Index order of [`Perspective::visible_extent`] and the edge filters.
pub const EDGE_X_MIN: usize = 0;
pub const EDGE_X_MAX: usize = 1;
pub const EDGE_Y_MIN: usize = 2;
pub const EDGE_Y_MAX: usize = 3;

#[derive(Debug, Clone)]
pub struct Perspective {
    pub camera_id: u32,
    pub model: CameraModel,
    pub field: FieldDimensions,
    /// Version of the geometry the derived values were computed from.
    /// Zero means no usable calibration has been seen yet.
    pub geometry_version: u32,
    /// Visible field extent (xmin, xmax, ymin, ymax) in mm, clamped to the
    /// field plus boundary.
    pub visible_extent: [f32; 4],
    /// Rectified resolution in mm per pixel.
    pub field_scale: f32,
    /// Integer size of the rectified image.
    pub reprojected_size: Vector2<u32>,
}

impl Perspective {
    pub fn new(camera_id: u32) -> Self {
        Self {
            camera_id,
            model: CameraModel::default(),
            field: FieldDimensions::default(),
            geometry_version: 0,
            visible_extent: [0.0; 4],
            field_scale: 1.0,
            reprojected_size: Vector2::new(0, 0),
        }
    }

    /// Adopt new geometry when the version or the image size changed.
    ///
    /// Blob heights live at `max_bot_height`, so the visible extent is the
    /// region where markers at that height can appear.
    pub fn geometry_check(
        &mut self,
        size: Vector2<u32>,
        geometry: &SslGeometryData,
        geometry_version: u32,
        max_bot_height: f32,
    ) {
        if geometry_version == self.geometry_version && self.model.size == size {
            return;
        }

        let Some(calib) = geometry
            .calib
            .iter()
            .find(|calib| calib.camera_id == self.camera_id)
        else {
            return;
        };
        let Some(field) = geometry.field.as_ref() else {
            return;
        };

        let mut model = CameraModel::from_calibration(calib);
        model.ensure_size(size);

        let mut extent: Option<[f32; 4]> = None;
        let mut update = |p: Option<Vector3<f32>>| {
            let Some(p) = p else { return };
            let e = extent.get_or_insert([p.x, p.x, p.y, p.y]);
            e[EDGE_X_MIN] = e[EDGE_X_MIN].min(p.x);
            e[EDGE_X_MAX] = e[EDGE_X_MAX].max(p.x);
            e[EDGE_Y_MIN] = e[EDGE_Y_MIN].min(p.y);
            e[EDGE_Y_MAX] = e[EDGE_Y_MAX].max(p.y);
        };

        let w = size.x as f32;
        let h = size.y as f32;
        for x in 0..size.x {
            update(model.image2field(Vector2::new(x as f32, 0.0), max_bot_height));
            update(model.image2field(Vector2::new(x as f32, h - 1.0), max_bot_height));
        }
        for y in 0..size.y {
            update(model.image2field(Vector2::new(0.0, y as f32), max_bot_height));
            update(model.image2field(Vector2::new(w - 1.0, y as f32), max_bot_height));
        }

        let Some(mut visible) = extent else {
            tracing::warn!(
                camera_id = self.camera_id,
                "calibration puts the whole image over the horizon"
            );
            return;
        };

        // Match the longest image axis with the longest extent axis. Taking
        // the larger of the two ratios bounds the rectified image by the
        // sensor resolution on both axes.
        let unclamped = Vector2::new(
            visible[EDGE_X_MAX] - visible[EDGE_X_MIN],
            visible[EDGE_Y_MAX] - visible[EDGE_Y_MIN],
        );
        let size_f = size.cast::<f32>();
        let field_scale = (unclamped.max() / size_f.max()).max(unclamped.min() / size_f.min());

        let field = FieldDimensions::from(field);
        let half_length = field.length / 2.0 + field.boundary;
        let half_width = field.width / 2.0 + field.boundary;
        visible[EDGE_X_MIN] = visible[EDGE_X_MIN].max(-half_length);
        visible[EDGE_X_MAX] = visible[EDGE_X_MAX].min(half_length);
        visible[EDGE_Y_MIN] = visible[EDGE_Y_MIN].max(-half_width);
        visible[EDGE_Y_MAX] = visible[EDGE_Y_MAX].min(half_width);

        let reprojected = Vector2::new(
            ((visible[EDGE_X_MAX] - visible[EDGE_X_MIN]) / field_scale).round() as u32,
            ((visible[EDGE_Y_MAX] - visible[EDGE_Y_MIN]) / field_scale).round() as u32,
        );

        self.model = model;
        self.field = field;
        self.geometry_version = geometry_version;
        self.visible_extent = visible;
        self.field_scale = field_scale;
        self.reprojected_size = reprojected;

        tracing::info!(
            camera_id = self.camera_id,
            extent = ?self.visible_extent,
            scale_mm_per_px = self.field_scale,
            size = ?(reprojected.x, reprojected.y),
            "visible field extent updated"
        );
    }

    /// Rectified pixel coordinates to field mm.
    pub fn flat2field(&self, pos: Vector2<f32>) -> Vector2<f32> {
        pos * self.field_scale
            + Vector2::new(self.visible_extent[EDGE_X_MIN], self.visible_extent[EDGE_Y_MIN])
    }

    /// Field mm to rectified pixel coordinates.
    pub fn field2flat(&self, pos: Vector2<f32>) -> Vector2<f32> {
        (pos - Vector2::new(self.visible_extent[EDGE_X_MIN], self.visible_extent[EDGE_Y_MIN]))
            / self.field_scale
    }

    pub fn image2field(&self, pos: Vector2<f32>, height: f32) -> Option<Vector3<f32>> {
        self.model.image2field(pos, height)
    }

    pub fn field2image(&self, pos: Vector3<f32>) -> Vector2<f32> {
        self.model.field2image(pos)
    }

    /// Move a field position observed at one height to its apparent
    /// position on the plane at `height`, along the camera ray.
    pub fn project_to_height(&self, pos: Vector3<f32>, height: f32) -> Option<Vector2<f32>> {
        let image = self.model.field2image(pos);
        self.model.image2field(image, height).map(|p| p.xy())
    }

    /// Which extent edges are bounded by the camera's view rather than the
    /// physical field-plus-boundary rectangle.
    pub fn cam_induced_edges(&self) -> [bool; 4] {
        let half_length = self.field.length / 2.0 + self.field.boundary;
        let half_width = self.field.width / 2.0 + self.field.boundary;
        [
            self.visible_extent[EDGE_X_MIN] > -half_length,
            self.visible_extent[EDGE_X_MAX] < half_length,
            self.visible_extent[EDGE_Y_MIN] > -half_width,
            self.visible_extent[EDGE_Y_MAX] < half_width,
        ]
    }
}
