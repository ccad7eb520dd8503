//! Processor configuration.
//!
//! One serde tree, loaded from YAML by the binary. Every section has
//! defaults matching the standard SSL setup, so a minimal file only names
//! the camera id and the capture source.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::ColorSet;
use crate::extract::ExtractConfig;
use crate::hypo::HypothesisConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionConfig {
    pub camera: CameraSection,
    pub network: NetworkSection,
    pub detection: HypothesisConfig,
    pub extraction: ExtractConfig,
    pub colors: ColorSection,
    pub tracking: TrackingSection,
    pub heights: HeightSection,
    pub debug: DebugSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSection {
    pub id: u32,
    /// Cameras covering the field, for the bootstrap extent split.
    pub amount: u32,
    /// Fixed mounting height in mm; 0 lets the bootstrap estimate it.
    pub height: f32,
    /// Integer downscale applied to source images before processing.
    pub resampling_factor: u32,
    pub source: SourceSection,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            id: 0,
            amount: 1,
            height: 0.0,
            resampling_factor: 1,
            source: SourceSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    /// Source kind: `images` is the built-in directory playback.
    pub kind: String,
    pub path: PathBuf,
    pub fps: f64,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: "images".into(),
            path: PathBuf::from("frames"),
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    pub vision_ip: String,
    pub vision_port: u16,
    pub gc_ip: String,
    pub gc_port: u16,
    /// Skip joining the game-controller group entirely.
    pub gc_disabled: bool,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            vision_ip: "224.5.23.2".into(),
            vision_port: 10006,
            gc_ip: "224.5.23.1".into(),
            gc_port: 10003,
            gc_disabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorSection {
    /// Color estimates used until calibration has adapted them.
    pub initial: ColorSet,
    /// Fixed priors the calibration keeps pulling estimates back to.
    pub priors: ColorSet,
    pub reference_force: f32,
    pub history_force: f32,
}

impl Default for ColorSection {
    fn default() -> Self {
        Self {
            initial: ColorSet::default(),
            priors: ColorSet::default(),
            reference_force: 0.1,
            history_force: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingSection {
    /// Plausibility bound on ball velocity (mm/s); pairings implying more
    /// are treated as new observations.
    pub max_ball_velocity: f32,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            max_ball_velocity: 8000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeightSection {
    /// Marker plate height used when a team is unknown (mm).
    pub default_bot_height: f32,
    /// Team name to marker plate height, fed by the game controller.
    pub by_team: HashMap<String, f32>,
}

impl Default for HeightSection {
    fn default() -> Self {
        Self {
            default_bot_height: 145.0,
            by_team: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugSection {
    /// Block until geometry arrives instead of bootstrapping.
    pub wait_for_geometry: bool,
    /// Dump one raw frame to disk for offline calibration.
    pub sample_dump: Option<PathBuf>,
    /// Known-positions file consumed by offline evaluation tooling.
    pub ground_truth: Option<PathBuf>,
}

impl Default for DebugSection {
    fn default() -> Self {
        Self {
            wait_for_geometry: false,
            sample_dump: None,
            ground_truth: None,
        }
    }
}
