//! Multicast UDP sockets for SSL-Vision and the game controller.
//!
//! Each socket owns one receive thread. Receive loops poll with a short
//! read timeout and check the shutdown flag, so closing never blocks on a
//! silent network. Receive errors of the transient kind are logged and the
//! loop continues; only setup failures are fatal.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use prost::Message;

use crate::net::proto::{Referee, SslGeometryData, SslWrapperPacket};
use crate::tracker::Tracker;

const RECV_BUFFER_SIZE: usize = 65_535;
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid multicast target {0}")]
    InvalidTarget(String),
    #[error("multicast socket setup failed: {0}")]
    Setup(#[from] std::io::Error),
}

/// Latest field geometry received from the vision multicast group.
#[derive(Default)]
pub struct GeometryState {
    geometry: SslGeometryData,
    version: u32,
    received: bool,
}

impl GeometryState {
    /// Replace the geometry if it differs, bumping the version.
    pub fn update(&mut self, geometry: SslGeometryData) {
        if self.received && self.geometry == geometry {
            return;
        }
        self.geometry = geometry;
        self.received = true;
        self.version += 1;
        tracing::info!(version = self.version, "new geometry received");
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn snapshot(&self) -> (SslGeometryData, u32) {
        (self.geometry.clone(), self.version)
    }

    /// Insert or replace one camera's calibration in place.
    pub fn put_calibration(&mut self, calib: crate::net::proto::SslGeometryCameraCalibration) {
        self.geometry
            .calib
            .retain(|existing| existing.camera_id != calib.camera_id);
        self.geometry.calib.push(calib);
        self.version += 1;
    }
}

fn open_multicast(ip: &str, port: u16) -> Result<(UdpSocket, SocketAddrV4), NetError> {
    let group: Ipv4Addr = ip
        .parse()
        .map_err(|_| NetError::InvalidTarget(ip.to_string()))?;
    if !group.is_multicast() {
        return Err(NetError::InvalidTarget(ip.to_string()));
    }
    let target = SocketAddrV4::new(group, port);

    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
    Ok((socket, target))
}

/// Whether a receive error is the expected timeout/interrupt kind.
fn is_transient(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}

/// SSL-Vision multicast endpoint: publishes our detection frames, receives
/// geometry and peer detections.
pub struct VisionSocket {
    socket: UdpSocket,
    target: SocketAddrV4,
    pub geometry: Arc<Mutex<GeometryState>>,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl VisionSocket {
    pub fn open(ip: &str, port: u16, tracker: Arc<Tracker>, own_camera_id: u32) -> Result<Self, NetError> {
        let (socket, target) = open_multicast(ip, port)?;
        let geometry = Arc::new(Mutex::new(GeometryState::default()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let socket = socket.try_clone()?;
            let geometry = Arc::clone(&geometry);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("vision-recv".into())
                .spawn(move || {
                    receive_vision(socket, geometry, tracker, own_camera_id, shutdown)
                })?
        };

        Ok(Self {
            socket,
            target,
            geometry,
            shutdown,
            receiver: Some(receiver),
        })
    }

    /// Fire-and-forget publish; send failures are transient by contract.
    pub fn send(&self, wrapper: &SslWrapperPacket) {
        let bytes = wrapper.encode_to_vec();
        if let Err(error) = self.socket.send_to(&bytes, self.target) {
            tracing::warn!(%error, "detection frame send failed");
        }
    }

    pub fn geometry_version(&self) -> u32 {
        self.geometry.lock().expect("geometry mutex").version()
    }
}

impl Drop for VisionSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
    }
}

fn receive_vision(
    socket: UdpSocket,
    geometry: Arc<Mutex<GeometryState>>,
    tracker: Arc<Tracker>,
    own_camera_id: u32,
    shutdown: Arc<AtomicBool>,
) {
    tracing::info!("awaiting geometry");
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    while !shutdown.load(Ordering::Relaxed) {
        let length = match socket.recv(&mut buffer) {
            Ok(length) => length,
            Err(error) if is_transient(&error) => continue,
            Err(error) => {
                tracing::warn!(%error, "vision receive failed");
                continue;
            }
        };

        let wrapper = match SslWrapperPacket::decode(&buffer[..length]) {
            Ok(wrapper) => wrapper,
            Err(error) => {
                tracing::warn!(%error, "undecodable vision packet");
                continue;
            }
        };

        if let Some(detection) = &wrapper.detection {
            // Our own frames are ingested directly by the controller.
            if detection.camera_id != own_camera_id {
                tracker.ingest(detection);
            }
        }
        if let Some(new_geometry) = wrapper.geometry {
            geometry.lock().expect("geometry mutex").update(new_geometry);
        }
    }
}

/// Per-team marker plate heights, resolved from configured team names.
#[derive(Debug, Clone, Copy)]
pub struct TeamHeights {
    pub yellow: f32,
    pub blue: f32,
}

impl TeamHeights {
    pub fn max(&self) -> f32 {
        self.yellow.max(self.blue)
    }
}

/// Game-controller multicast endpoint, reduced to team-name tracking.
pub struct GcSocket {
    heights: Arc<Mutex<TeamHeights>>,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl GcSocket {
    pub fn open(
        ip: &str,
        port: u16,
        default_height: f32,
        height_by_team: std::collections::HashMap<String, f32>,
    ) -> Result<Self, NetError> {
        let (socket, _) = open_multicast(ip, port)?;
        let heights = Arc::new(Mutex::new(TeamHeights {
            yellow: default_height,
            blue: default_height,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let heights = Arc::clone(&heights);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("gc-recv".into())
                .spawn(move || {
                    receive_referee(socket, heights, default_height, height_by_team, shutdown)
                })?
        };

        Ok(Self {
            heights,
            shutdown,
            receiver: Some(receiver),
        })
    }

    /// Socket-less instance for setups without a game controller.
    pub fn fixed(default_height: f32) -> Self {
        Self {
            heights: Arc::new(Mutex::new(TeamHeights {
                yellow: default_height,
                blue: default_height,
            })),
            shutdown: Arc::new(AtomicBool::new(false)),
            receiver: None,
        }
    }

    pub fn heights(&self) -> TeamHeights {
        *self.heights.lock().expect("heights mutex")
    }
}

impl Drop for GcSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
    }
}

fn receive_referee(
    socket: UdpSocket,
    heights: Arc<Mutex<TeamHeights>>,
    default_height: f32,
    height_by_team: std::collections::HashMap<String, f32>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    while !shutdown.load(Ordering::Relaxed) {
        let length = match socket.recv(&mut buffer) {
            Ok(length) => length,
            Err(error) if is_transient(&error) => continue,
            Err(error) => {
                tracing::warn!(%error, "game controller receive failed");
                continue;
            }
        };

        let Ok(referee) = Referee::decode(&buffer[..length]) else {
            continue;
        };

        let lookup = |name: Option<&str>| {
            name.and_then(|name| height_by_team.get(name).copied())
                .unwrap_or(default_height)
        };
        let new_heights = TeamHeights {
            yellow: lookup(referee.yellow.as_ref().map(|team| team.name.as_str())),
            blue: lookup(referee.blue.as_ref().map(|team| team.name.as_str())),
        };
        *heights.lock().expect("heights mutex") = new_heights;
    }
}
