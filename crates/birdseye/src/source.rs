//! Camera sources.
//!
//! Hardware drivers are external to this crate; the fixed set of built-in
//! sources covers offline processing (a directory of images played back in
//! name order) and pre-built frame sequences for tests and replays. The
//! capability surface is deliberately narrow: read a frame, report the
//! pixel format and the expected frame time, tell the time.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::frame::{PixelFormat, RawFrame};

/// Unix time in seconds, the timestamp base for all published frames.
pub fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("image directory {dir} cannot be read: {1}", dir = .0.display())]
    Directory(PathBuf, std::io::Error),
    #[error("no images found in {}", .0.display())]
    Empty(PathBuf),
    #[error("unknown camera source kind {0:?}")]
    UnknownKind(String),
}

/// Fixed set of camera sources, resolved once at startup.
pub enum CameraSource {
    Images(ImageSource),
    Frames(FrameSource),
}

impl CameraSource {
    /// Blocking read of the next frame; `None` ends the stream.
    pub fn read_frame(&mut self) -> Option<RawFrame> {
        match self {
            CameraSource::Images(source) => source.read_frame(),
            CameraSource::Frames(source) => source.read_frame(),
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            CameraSource::Images(_) => PixelFormat::Bgr8,
            CameraSource::Frames(source) => source.format,
        }
    }

    /// Expected time between frames in seconds.
    pub fn expected_frametime(&self) -> f64 {
        match self {
            CameraSource::Images(source) => 1.0 / source.fps,
            CameraSource::Frames(source) => 1.0 / source.fps,
        }
    }

    pub fn time(&self) -> f64 {
        wall_time()
    }
}

/// Plays the images of a directory in lexicographic order, then ends.
pub struct ImageSource {
    files: Vec<PathBuf>,
    next: usize,
    fps: f64,
    resampling_factor: u32,
}

impl ImageSource {
    pub fn open(dir: PathBuf, fps: f64, resampling_factor: u32) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(&dir).map_err(|e| SourceError::Directory(dir.clone(), e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("png" | "jpg" | "jpeg")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Empty(dir));
        }
        Ok(Self {
            files,
            next: 0,
            fps: if fps > 0.0 { fps } else { 30.0 },
            resampling_factor: resampling_factor.max(1),
        })
    }

    fn read_frame(&mut self) -> Option<RawFrame> {
        loop {
            let path = self.files.get(self.next)?;
            self.next += 1;

            match image::open(path) {
                Ok(decoded) => {
                    let mut rgb = decoded.into_rgb8();
                    if self.resampling_factor > 1 {
                        let (w, h) = rgb.dimensions();
                        rgb = image::imageops::resize(
                            &rgb,
                            (w / self.resampling_factor).max(1),
                            (h / self.resampling_factor).max(1),
                            image::imageops::FilterType::Triangle,
                        );
                    }
                    let (width, height) = rgb.dimensions();
                    let mut data = Vec::with_capacity(rgb.as_raw().len());
                    for pixel in rgb.pixels() {
                        data.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
                    }
                    return Some(RawFrame {
                        format: PixelFormat::Bgr8,
                        width,
                        height,
                        timestamp: 0.0,
                        data,
                    });
                }
                Err(error) => {
                    tracing::warn!(?path, %error, "skipping unreadable image");
                }
            }
        }
    }
}

/// Hands out pre-built frames in order; the workhorse of the test suite.
pub struct FrameSource {
    frames: std::vec::IntoIter<RawFrame>,
    format: PixelFormat,
    fps: f64,
}

impl FrameSource {
    pub fn new(frames: Vec<RawFrame>, fps: f64) -> Self {
        let format = frames
            .first()
            .map(|f| f.format)
            .unwrap_or(PixelFormat::Bgr8);
        Self {
            frames: frames.into_iter(),
            format,
            fps,
        }
    }

    fn read_frame(&mut self) -> Option<RawFrame> {
        self.frames.next()
    }
}
