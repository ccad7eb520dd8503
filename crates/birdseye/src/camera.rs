//! Pinhole camera model with a single radial distortion coefficient.
//!
//! The model maps between field coordinates (millimeters, field center
//! origin, z up) and image pixel coordinates. Orientation is stored as a
//! field-to-image quaternion relative to the straight-down view, so the
//! identity quaternion is a nadir camera with image x along field x. The
//! SSL wire calibration uses the z-toward-scene camera frame instead; the
//! half-turn between the two conventions is applied on import and export.
//! The inverse rotation is kept as a derived value and regenerated after
//! every mutation.

use nalgebra::{UnitQuaternion, Vector2, Vector3};

use crate::net::proto::{SslGeometryCameraCalibration, SslGeometryFieldSize};

/// Fixed iteration count for inverting the radial distortion in
/// [`CameraModel::field2image`]. Sufficient for the k2 magnitudes of
/// non-fisheye lenses; there is deliberately no convergence check.
const DISTORTION_INVERT_ITERATIONS: usize = 10;

/// Camera intrinsics, extrinsics and distortion for one camera.
#[derive(Debug, Clone)]
pub struct CameraModel {
    /// Focal length in pixels (isotropic).
    pub focal_length: f32,
    /// Principal point in pixels.
    pub principal_point: Vector2<f32>,
    /// Single radial distortion coefficient applied to normalized coords.
    pub distortion_k2: f32,
    /// Field-to-image orientation.
    pub f2i_orientation: UnitQuaternion<f32>,
    /// Camera position in field coordinates (mm).
    pub pos: Vector3<f32>,
    /// Image size in pixels.
    pub size: Vector2<u32>,

    i2f_orientation: UnitQuaternion<f32>,
}

impl Default for CameraModel {
    fn default() -> Self {
        let mut model = Self {
            focal_length: 1224.0,
            principal_point: Vector2::new(612.0, 512.0),
            distortion_k2: 0.0,
            f2i_orientation: UnitQuaternion::identity(),
            pos: Vector3::zeros(),
            size: Vector2::new(1224, 1024),
            i2f_orientation: UnitQuaternion::identity(),
        };
        model.update_derived();
        model
    }
}

impl CameraModel {
    /// Construct from an explicit calibration.
    pub fn new(
        focal_length: f32,
        principal_point: Vector2<f32>,
        distortion_k2: f32,
        f2i_orientation: UnitQuaternion<f32>,
        pos: Vector3<f32>,
        size: Vector2<u32>,
    ) -> Self {
        let mut model = Self {
            focal_length,
            principal_point,
            distortion_k2,
            f2i_orientation,
            pos,
            size,
            i2f_orientation: UnitQuaternion::identity(),
        };
        model.update_derived();
        model
    }

    /// Bootstrap a model without a received calibration: the camera is
    /// assumed to hang straight down over the center of its field cell and
    /// the focal length is chosen so the whole cell is visible.
    pub fn bootstrap(
        size: Vector2<u32>,
        camera_id: u32,
        camera_amount: u32,
        camera_height: f32,
        field: &SslGeometryFieldSize,
    ) -> Self {
        let (min, max) = visible_field_extent_estimation(camera_id, camera_amount, field, true);
        let sizef = size.cast::<f32>();
        let principal_point = sizef / 2.0;

        let mut pos = Vector3::new(
            (min.x + max.x) / 2.0,
            (min.y + max.y) / 2.0,
            DEFAULT_BOOTSTRAP_HEIGHT_MM,
        );
        if camera_height != 0.0 {
            pos.z = camera_height;
        }

        // Pair the longer image axis with the longer cell axis so the whole
        // cell fits regardless of sensor orientation.
        let ordered_size = Vector2::new(sizef.x.max(sizef.y), sizef.x.min(sizef.y));
        let extent = max - min;
        let ordered_extent = Vector2::new(extent.x.max(extent.y), extent.x.min(extent.y));
        let focal_length = ((ordered_size.x - principal_point.x.max(principal_point.y)) * pos.z
            / ordered_extent.x)
            .min((ordered_size.y - principal_point.x.min(principal_point.y)) * pos.z / ordered_extent.y);

        Self::new(
            focal_length,
            principal_point,
            0.0,
            UnitQuaternion::identity(),
            pos,
            size,
        )
    }

    /// Construct from a received SSL camera calibration message.
    pub fn from_calibration(calib: &SslGeometryCameraCalibration) -> Self {
        let wire = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            calib.q3, calib.q0, calib.q1, calib.q2,
        ));
        let pos = wire.inverse() * -Vector3::new(calib.tx, calib.ty, calib.tz);
        Self::new(
            calib.focal_length,
            Vector2::new(calib.principal_point_x, calib.principal_point_y),
            calib.distortion,
            nadir_flip().inverse() * wire,
            pos,
            Vector2::new(calib.pixel_image_width, calib.pixel_image_height),
        )
    }

    /// Export as an SSL camera calibration message.
    pub fn to_calibration(&self, camera_id: u32) -> SslGeometryCameraCalibration {
        let wire = nadir_flip() * self.f2i_orientation;
        let image_pos = wire * -self.pos;
        SslGeometryCameraCalibration {
            camera_id,
            focal_length: self.focal_length,
            principal_point_x: self.principal_point.x,
            principal_point_y: self.principal_point.y,
            distortion: self.distortion_k2,
            q0: wire.i,
            q1: wire.j,
            q2: wire.k,
            q3: wire.w,
            tx: image_pos.x,
            ty: image_pos.y,
            tz: image_pos.z,
            derived_camera_world_tx: Some(self.pos.x),
            derived_camera_world_ty: Some(self.pos.y),
            derived_camera_world_tz: Some(self.pos.z),
            pixel_image_width: self.size.x,
            pixel_image_height: self.size.y,
        }
    }

    /// Regenerate derived values. Must be called after mutating
    /// `f2i_orientation` or `pos` directly.
    pub fn update_derived(&mut self) {
        self.f2i_orientation.renormalize();
        self.i2f_orientation = self.f2i_orientation.inverse();
    }

    /// Rescale intrinsics for a new image size. The focal length and
    /// principal point scale with the width ratio; k2 operates on
    /// normalized coordinates and is size-independent.
    pub fn ensure_size(&mut self, new_size: Vector2<u32>) {
        if self.size == new_size {
            return;
        }

        let factor = new_size.x as f32 / self.size.x as f32;
        if (self.size.y as f32 * factor - new_size.y as f32).abs() > f32::EPSILON {
            tracing::warn!(
                old = ?self.size, new = ?new_size,
                "ensure_size with diverging aspect ratios"
            );
        }

        self.size = new_size;
        self.focal_length *= factor;
        self.principal_point *= factor;
    }

    /// Replace the focal length, rescaling k2 by the square of the focal
    /// ratio so the distortion keeps its pixel-space magnitude.
    pub fn update_focal_length(&mut self, new_focal_length: f32) {
        let factor = new_focal_length / self.focal_length;
        self.focal_length = new_focal_length;
        self.distortion_k2 *= factor * factor;
    }

    fn normalize_undistort(&self, p: Vector2<f32>) -> Vector2<f32> {
        let mut normalized = (p - self.principal_point) / self.focal_length;
        normalized *= 1.0 + self.distortion_k2 * normalized.dot(&normalized);
        normalized
    }

    /// Project a field point (mm) to image pixel coordinates.
    pub fn field2image(&self, p: Vector3<f32>) -> Vector2<f32> {
        let cam_ray = flip(self.f2i_orientation * (p - self.pos));
        let original = cam_ray.xy() / cam_ray.z;

        let mut normalized = original;
        for _ in 0..DISTORTION_INVERT_ITERATIONS {
            normalized = original / (1.0 + self.distortion_k2 * normalized.dot(&normalized));
        }

        self.focal_length * normalized + self.principal_point
    }

    /// Cast a pixel ray onto the horizontal plane `z = height` (mm).
    ///
    /// Returns `None` when the ray does not intersect the plane from above
    /// (pixel at or over the horizon).
    pub fn image2field(&self, p: Vector2<f32>, height: f32) -> Option<Vector3<f32>> {
        let normalized = self.normalize_undistort(p);
        let cam_ray = self.i2f_orientation * flip(Vector3::new(normalized.x, normalized.y, 1.0));

        if cam_ray.z >= 0.0 {
            return None;
        }

        let mut field = cam_ray * ((-self.pos.z + height) / cam_ray.z) + self.pos;
        field.z = height;
        Some(field)
    }
}

/// Default camera mounting height used by the bootstrap model when the
/// configuration does not pin one (mm).
const DEFAULT_BOOTSTRAP_HEIGHT_MM: f32 = 4000.0;

/// Half turn about the image x axis between the internal nadir-relative
/// orientation and the wire format's z-toward-scene camera frame.
fn nadir_flip() -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::PI)
}

/// Apply the nadir half turn to a vector (self-inverse).
#[inline]
fn flip(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x, -v.y, -v.z)
}

/// Split the field into one cell per camera and return the cell of
/// `camera_id` as `(min, max)` field coordinates, optionally grown by the
/// boundary on outer sides.
pub fn visible_field_extent_estimation(
    camera_id: u32,
    camera_amount: u32,
    field: &SslGeometryFieldSize,
    with_boundary: bool,
) -> (Vector2<f32>, Vector2<f32>) {
    let field_size = Vector2::new(field.field_length as f32, field.field_width as f32);

    let mut cells = Vector2::new(1u32, 1u32);
    let mut i = camera_amount.max(1);
    while i > 1 {
        if field_size.x / cells.x as f32 >= field_size.y / cells.y as f32 {
            cells.x *= 2;
        } else {
            cells.y *= 2;
        }
        i /= 2;
    }

    let mut cell = Vector2::new(0u32, 0u32);
    for _ in 0..(camera_id % camera_amount.max(1)) {
        cell.y += 1;
        if cell.y == cells.y {
            cell.y = 0;
            cell.x += 1;
        }
    }

    let extent = field_size.component_div(&cells.cast::<f32>());
    let mut min = extent.component_mul(&cell.cast::<f32>()) - field_size / 2.0;
    let mut max = min + extent;

    if with_boundary {
        let boundary = field.boundary_width as f32;
        if cell.x == 0 {
            min.x -= boundary;
        }
        if cell.y == 0 {
            min.y -= boundary;
        }
        if cell.x == cells.x - 1 {
            max.x += boundary;
        }
        if cell.y == cells.y - 1 {
            max.y += boundary;
        }
    }

    (min, max)
}
