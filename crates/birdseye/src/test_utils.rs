//! Shared helpers for image-based unit tests.

use image::RgbaImage;
use nalgebra::Vector2;

/// Paint an anti-aliased filled disc onto an RGBA image.
pub(crate) fn draw_disc(image: &mut RgbaImage, center: Vector2<f32>, radius: f32, color: [u8; 3]) {
    let (width, height) = image.dimensions();
    let r_outer = radius + 1.0;
    let x_min = (center.x - r_outer).floor().max(0.0) as u32;
    let x_max = (center.x + r_outer).ceil().min((width - 1) as f32) as u32;
    let y_min = (center.y - r_outer).floor().max(0.0) as u32;
    let y_max = (center.y + r_outer).ceil().min((height - 1) as f32) as u32;

    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let d = (Vector2::new(x as f32, y as f32) - center).norm();
            // 1 inside, 0 outside, linear ramp across one pixel.
            let coverage = (radius + 0.5 - d).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let background = *image.get_pixel(x, y);
            let mut blended = [0u8; 4];
            for c in 0..3 {
                blended[c] = (color[c] as f32 * coverage
                    + background[c] as f32 * (1.0 - coverage))
                    .round() as u8;
            }
            blended[3] = 255;
            image.put_pixel(x, y, image::Rgba(blended));
        }
    }
}
