//! Ground-plane rectification.
//!
//! For every rectified pixel the corresponding camera pixel is found by
//! projecting the field position (at the maximum tracked marker height)
//! back into the image, then sampled bilinearly. Pixels over the horizon
//! or outside the sensor stay black and never produce blob candidates.

use image::RgbaImage;
use nalgebra::{Vector2, Vector3};

use crate::perspective::Perspective;
use crate::pool::FramePool;

/// Render the top-down view of the visible field region.
pub fn rectify(
    rgba: &RgbaImage,
    perspective: &Perspective,
    max_bot_height: f32,
    pool: &FramePool,
) -> RgbaImage {
    let size = perspective.reprojected_size;
    let buffer = pool.rgba(size.x, size.y).into_inner();
    let mut flat = RgbaImage::from_raw(size.x, size.y, buffer)
        .expect("pool buffer matches reprojected size");

    for y in 0..size.y {
        for x in 0..size.x {
            let field = perspective.flat2field(Vector2::new(x as f32, y as f32));
            let image_pos =
                perspective.field2image(Vector3::new(field.x, field.y, max_bot_height));
            if let Some(color) = sample_bilinear(rgba, image_pos) {
                flat.put_pixel(x, y, color);
            }
        }
    }
    flat
}

fn sample_bilinear(image: &RgbaImage, pos: Vector2<f32>) -> Option<image::Rgba<u8>> {
    let (w, h) = image.dimensions();
    if !pos.x.is_finite() || !pos.y.is_finite() {
        return None;
    }
    if pos.x < 0.0 || pos.y < 0.0 || pos.x > (w - 1) as f32 || pos.y > (h - 1) as f32 {
        return None;
    }

    let x0 = pos.x.floor() as u32;
    let y0 = pos.y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = pos.x - x0 as f32;
    let fy = pos.y - y0 as f32;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let p00 = image.get_pixel(x0, y0)[c] as f32;
        let p10 = image.get_pixel(x1, y0)[c] as f32;
        let p01 = image.get_pixel(x0, y1)[c] as f32;
        let p11 = image.get_pixel(x1, y1)[c] as f32;
        let value = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    Some(image::Rgba(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraModel;
    use crate::net::proto::{SslGeometryData, SslGeometryFieldSize};
    use nalgebra::UnitQuaternion;

    fn overhead_perspective() -> Perspective {
        let model = CameraModel::new(
            500.0,
            Vector2::new(320.0, 240.0),
            0.0,
            UnitQuaternion::identity(),
            Vector3::new(0.0, 0.0, 3000.0),
            Vector2::new(640, 480),
        );
        let geometry = SslGeometryData {
            field: Some(SslGeometryFieldSize {
                field_length: 4000,
                field_width: 3000,
                goal_width: None,
                goal_depth: None,
                boundary_width: 300,
                ball_radius: Some(21.5),
                max_robot_radius: Some(90.0),
            }),
            calib: vec![model.to_calibration(0)],
        };
        // The calibration is in sensor resolution; the working image is the
        // half-resolution debayer output.
        let mut perspective = Perspective::new(0);
        perspective.geometry_check(Vector2::new(320, 240), &geometry, 1, 150.0);
        assert_eq!(perspective.geometry_version, 1);
        perspective
    }

    #[test]
    fn uniform_image_rectifies_to_uniform_interior() {
        let perspective = overhead_perspective();
        // Half-resolution working image, uniformly gray.
        let rgba = RgbaImage::from_pixel(320, 240, image::Rgba([90, 120, 90, 255]));
        let flat = rectify(&rgba, &perspective, 150.0, &FramePool::default());

        assert_eq!(
            flat.dimensions(),
            (perspective.reprojected_size.x, perspective.reprojected_size.y)
        );
        let center = flat.get_pixel(flat.width() / 2, flat.height() / 2);
        assert_eq!(center.0, [90, 120, 90, 255]);
    }

    #[test]
    fn field_marker_lands_at_its_rectified_position() {
        let perspective = overhead_perspective();
        let mut rgba = RgbaImage::from_pixel(320, 240, image::Rgba([0, 0, 0, 255]));

        // Paint a 3x3 patch where field position (400, 250) projects to,
        // so bilinear resampling cannot thin it out.
        let field = Vector3::new(400.0, 250.0, 150.0);
        let image_pos = perspective.field2image(field);
        for dy in -1..=1i32 {
            for dx in -1..=1i32 {
                rgba.put_pixel(
                    (image_pos.x.round() as i32 + dx) as u32,
                    (image_pos.y.round() as i32 + dy) as u32,
                    image::Rgba([255, 0, 0, 255]),
                );
            }
        }

        let flat = rectify(&rgba, &perspective, 150.0, &FramePool::default());
        let flat_pos = perspective.field2flat(Vector2::new(400.0, 250.0));
        let pixel = flat.get_pixel(flat_pos.x.round() as u32, flat_pos.y.round() as u32);
        assert!(pixel[0] > 100, "marker missing at {flat_pos:?}: {pixel:?}");
    }
}
