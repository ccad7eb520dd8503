//! birdseye — one camera's vision processor for an SSL robot-soccer field.
//!
//! For every captured frame the pipeline:
//!
//! 1. **Rectify** – project the camera image onto the ground plane through
//!    a pinhole model with a single radial distortion coefficient.
//! 2. **Extract** – gradient features, a blob-center likelihood map, and
//!    non-maximum suppression yield color blob candidates.
//! 3. **Index** – a per-frame k-d tree answers the radius queries of the
//!    hypothesis generators.
//! 4. **Hypothesize** – tracked bots are re-acquired predictively; the
//!    remaining center blobs get exhaustive angle-sorted side quadruples;
//!    clipping resolution keeps the best non-overlapping set, and the
//!    leftover blobs compete as ball candidates.
//! 5. **Calibrate** – confirmed detections re-estimate the six reference
//!    colors, pulled back toward fixed priors.
//! 6. **Publish** – an SSL-Vision detection frame goes out over multicast
//!    and feeds the tracker for the next iteration.
//!
//! # Public API
//! [`FrameController`] drives the per-frame pipeline; [`VisionConfig`]
//! configures it. The geometry, networking and tracking pieces are public
//! for the binary and for integration tests.

pub mod camera;
pub mod color;
pub mod config;
pub mod controller;
pub mod extract;
pub mod frame;
pub mod hypo;
pub mod kdtree;
pub mod mailbox;
pub mod net;
pub mod perspective;
pub mod pool;
pub mod source;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use camera::CameraModel;
pub use color::{ColorSet, ReferenceColors, Rgb};
pub use config::VisionConfig;
pub use controller::{ControllerState, FrameController};
pub use frame::{PixelFormat, RawFrame, PIXEL_SCALE};
pub use net::{GcSocket, GeometryState, NetError, TeamHeights, VisionSocket};
pub use perspective::Perspective;
pub use source::{CameraSource, FrameSource, ImageSource, SourceError};
pub use tracker::{TrackedObject, Tracker};
