//! birdseye camera processor.
//!
//! Loads the YAML configuration, joins the vision and game-controller
//! multicast groups, and runs the per-frame detection loop until the
//! source ends or a termination signal arrives. Fatal setup errors exit
//! with status 1; a clean shutdown exits with 0.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use birdseye::config::VisionConfig;
use birdseye::controller::FrameController;
use birdseye::source::{CameraSource, ImageSource, SourceError};
use birdseye::tracker::Tracker;
use birdseye::{GcSocket, VisionSocket};

#[derive(Parser)]
#[command(name = "birdseye")]
#[command(about = "Single-camera SSL vision processor")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration.
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(&cli.config)
        .map_err(|e| format!("cannot read {}: {e}", cli.config.display()))?;
    let config: VisionConfig = serde_yaml::from_str(&text)?;

    if let Some(ground_truth) = &config.debug.ground_truth {
        tracing::info!(?ground_truth, "ground truth configured for offline evaluation");
    }

    let mut source = open_source(&config)?;

    let tracker = Arc::new(Tracker::new(
        config.heights.default_bot_height,
        config.detection.ball_radius,
        config.tracking.max_ball_velocity,
    ));
    let socket = VisionSocket::open(
        &config.network.vision_ip,
        config.network.vision_port,
        Arc::clone(&tracker),
        config.camera.id,
    )?;
    let gc = if config.network.gc_disabled {
        GcSocket::fixed(config.heights.default_bot_height)
    } else {
        GcSocket::open(
            &config.network.gc_ip,
            config.network.gc_port,
            config.heights.default_bot_height,
            config.heights.by_team.clone(),
        )?
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            tracing::info!("termination signal received");
            shutdown.store(true, Ordering::Relaxed);
        })?;
    }

    if config.debug.wait_for_geometry {
        tracing::info!("waiting for geometry before processing");
        while socket.geometry_version() == 0 && !shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    let mut controller =
        FrameController::new(config, Arc::clone(&tracker), Arc::clone(&socket.geometry));
    controller.run(&mut source, &socket, &gc, &shutdown);

    tracing::info!("shutting down");
    Ok(())
}

fn open_source(config: &VisionConfig) -> Result<CameraSource, SourceError> {
    let section = &config.camera.source;
    match section.kind.as_str() {
        "images" => Ok(CameraSource::Images(ImageSource::open(
            section.path.clone(),
            section.fps,
            config.camera.resampling_factor,
        )?)),
        other => Err(SourceError::UnknownKind(other.to_string())),
    }
}
