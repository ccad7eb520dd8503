//! Raw camera frames and their conversion to the internal RGBA working
//! format.
//!
//! All downstream processing runs at half the sensor resolution: RGGB
//! frames debayer one output pixel per 2x2 cell, and BGR frames are box
//! downsampled to match. Published pixel coordinates therefore always
//! multiply internal coordinates by [`PIXEL_SCALE`].

use image::RgbaImage;

/// Factor between internal (half-resolution) and published full-resolution
/// pixel coordinates.
pub const PIXEL_SCALE: f32 = 2.0;

/// Sensor pixel layouts the sources can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Bayer mosaic, R at even rows/columns.
    Rggb8,
    /// Packed 8-bit BGR.
    Bgr8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rggb8 => 1,
            PixelFormat::Bgr8 => 3,
        }
    }
}

/// One frame as delivered by a camera source. The buffer is owned by the
/// frame and dropped with it.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Driver capture timestamp (unix seconds); 0 when unavailable.
    pub timestamp: f64,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Convert to the half-resolution RGBA working image.
    pub fn to_rgba(&self) -> RgbaImage {
        match self.format {
            PixelFormat::Rggb8 => self.debayer_half(),
            PixelFormat::Bgr8 => self.bgr_half(),
        }
    }

    /// 2x2 Bayer cell -> one RGBA pixel; the two greens are averaged.
    fn debayer_half(&self) -> RgbaImage {
        let (w, h) = (self.width / 2, self.height / 2);
        let stride = self.width as usize;
        let mut out = RgbaImage::new(w, h);

        for y in 0..h as usize {
            for x in 0..w as usize {
                let base = 2 * y * stride + 2 * x;
                let r = self.data[base];
                let g1 = self.data[base + 1] as u16;
                let g2 = self.data[base + stride] as u16;
                let b = self.data[base + stride + 1];
                out.put_pixel(
                    x as u32,
                    y as u32,
                    image::Rgba([r, ((g1 + g2) / 2) as u8, b, 255]),
                );
            }
        }
        out
    }

    /// 2x2 box average per channel, keeping the half-resolution convention.
    fn bgr_half(&self) -> RgbaImage {
        let (w, h) = (self.width / 2, self.height / 2);
        let stride = self.width as usize * 3;
        let mut out = RgbaImage::new(w, h);

        for y in 0..h as usize {
            for x in 0..w as usize {
                let mut sum = [0u16; 3];
                for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    let base = (2 * y + dy) * stride + (2 * x + dx) * 3;
                    sum[0] += self.data[base + 2] as u16;
                    sum[1] += self.data[base + 1] as u16;
                    sum[2] += self.data[base] as u16;
                }
                out.put_pixel(
                    x as u32,
                    y as u32,
                    image::Rgba([
                        (sum[0] / 4) as u8,
                        (sum[1] / 4) as u8,
                        (sum[2] / 4) as u8,
                        255,
                    ]),
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debayer_halves_resolution_and_averages_green() {
        let mut data = vec![0u8; 4 * 4];
        // Top-left cell: R=200, G=100/60, B=40.
        data[0] = 200;
        data[1] = 100;
        data[4] = 60;
        data[5] = 40;
        let frame = RawFrame {
            format: PixelFormat::Rggb8,
            width: 4,
            height: 4,
            timestamp: 0.0,
            data,
        };

        let rgba = frame.to_rgba();
        assert_eq!(rgba.dimensions(), (2, 2));
        assert_eq!(rgba.get_pixel(0, 0).0, [200, 80, 40, 255]);
    }

    #[test]
    fn bgr_downsample_matches_half_resolution_convention() {
        // Four identical BGR pixels.
        let frame = RawFrame {
            format: PixelFormat::Bgr8,
            width: 2,
            height: 2,
            timestamp: 0.0,
            data: [10u8, 20, 30].repeat(4),
        };

        let rgba = frame.to_rgba();
        assert_eq!(rgba.dimensions(), (1, 1));
        assert_eq!(rgba.get_pixel(0, 0).0, [30, 20, 10, 255]);
    }
}
