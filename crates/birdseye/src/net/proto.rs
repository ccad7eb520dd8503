//! SSL-Vision and game-controller wire messages.
//!
//! Hand-written prost structs covering the subset of the official
//! `messages_robocup_ssl_*.proto` and `ssl_gc_referee_message.proto`
//! definitions this processor produces and consumes. Field tags match the
//! upstream definitions, so frames interoperate with stock SSL-Vision
//! consumers; unknown incoming fields are skipped by prost.

/// One detected ball on the ground plane.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslDetectionBall {
    /// Detection confidence in [0, 1].
    #[prost(float, tag = "1")]
    pub confidence: f32,
    #[prost(uint32, optional, tag = "2")]
    pub area: Option<u32>,
    /// Field position in mm.
    #[prost(float, tag = "3")]
    pub x: f32,
    #[prost(float, tag = "4")]
    pub y: f32,
    #[prost(float, optional, tag = "5")]
    pub z: Option<f32>,
    /// Position in the original full-resolution camera image.
    #[prost(float, tag = "6")]
    pub pixel_x: f32,
    #[prost(float, tag = "7")]
    pub pixel_y: f32,
}

/// One detected robot.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslDetectionRobot {
    #[prost(float, tag = "1")]
    pub confidence: f32,
    /// Pattern id in [0, 15].
    #[prost(uint32, optional, tag = "2")]
    pub robot_id: Option<u32>,
    /// Field position in mm.
    #[prost(float, tag = "3")]
    pub x: f32,
    #[prost(float, tag = "4")]
    pub y: f32,
    /// Orientation in radians.
    #[prost(float, optional, tag = "5")]
    pub orientation: Option<f32>,
    /// Position in the original full-resolution camera image.
    #[prost(float, tag = "6")]
    pub pixel_x: f32,
    #[prost(float, tag = "7")]
    pub pixel_y: f32,
    /// Marker plate height in mm.
    #[prost(float, optional, tag = "8")]
    pub height: Option<f32>,
}

/// One camera's detections for one frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslDetectionFrame {
    #[prost(uint32, tag = "1")]
    pub frame_number: u32,
    /// Local capture timestamp (unix seconds).
    #[prost(double, tag = "2")]
    pub t_capture: f64,
    /// Local send timestamp (unix seconds).
    #[prost(double, tag = "3")]
    pub t_sent: f64,
    #[prost(uint32, tag = "4")]
    pub camera_id: u32,
    #[prost(message, repeated, tag = "5")]
    pub balls: Vec<SslDetectionBall>,
    #[prost(message, repeated, tag = "6")]
    pub robots_yellow: Vec<SslDetectionRobot>,
    #[prost(message, repeated, tag = "7")]
    pub robots_blue: Vec<SslDetectionRobot>,
    /// Camera-provided capture timestamp, when the driver exposes one.
    #[prost(double, optional, tag = "8")]
    pub t_capture_camera: Option<f64>,
}

/// Field dimensions (mm). Line/arc descriptions are skipped on decode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslGeometryFieldSize {
    #[prost(int32, tag = "1")]
    pub field_length: i32,
    #[prost(int32, tag = "2")]
    pub field_width: i32,
    #[prost(int32, optional, tag = "3")]
    pub goal_width: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub goal_depth: Option<i32>,
    #[prost(int32, tag = "5")]
    pub boundary_width: i32,
    #[prost(float, optional, tag = "14")]
    pub ball_radius: Option<f32>,
    #[prost(float, optional, tag = "15")]
    pub max_robot_radius: Option<f32>,
}

/// Intrinsic and extrinsic calibration of one camera.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslGeometryCameraCalibration {
    #[prost(uint32, tag = "1")]
    pub camera_id: u32,
    #[prost(float, tag = "2")]
    pub focal_length: f32,
    #[prost(float, tag = "3")]
    pub principal_point_x: f32,
    #[prost(float, tag = "4")]
    pub principal_point_y: f32,
    #[prost(float, tag = "5")]
    pub distortion: f32,
    #[prost(float, tag = "6")]
    pub q0: f32,
    #[prost(float, tag = "7")]
    pub q1: f32,
    #[prost(float, tag = "8")]
    pub q2: f32,
    #[prost(float, tag = "9")]
    pub q3: f32,
    #[prost(float, tag = "10")]
    pub tx: f32,
    #[prost(float, tag = "11")]
    pub ty: f32,
    #[prost(float, tag = "12")]
    pub tz: f32,
    #[prost(float, optional, tag = "13")]
    pub derived_camera_world_tx: Option<f32>,
    #[prost(float, optional, tag = "14")]
    pub derived_camera_world_ty: Option<f32>,
    #[prost(float, optional, tag = "15")]
    pub derived_camera_world_tz: Option<f32>,
    #[prost(uint32, tag = "16")]
    pub pixel_image_width: u32,
    #[prost(uint32, tag = "17")]
    pub pixel_image_height: u32,
}

/// Field geometry plus per-camera calibrations.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslGeometryData {
    #[prost(message, optional, tag = "1")]
    pub field: Option<SslGeometryFieldSize>,
    #[prost(message, repeated, tag = "2")]
    pub calib: Vec<SslGeometryCameraCalibration>,
}

/// Top-level SSL-Vision multicast packet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SslWrapperPacket {
    #[prost(message, optional, tag = "1")]
    pub detection: Option<SslDetectionFrame>,
    #[prost(message, optional, tag = "2")]
    pub geometry: Option<SslGeometryData>,
}

/// Per-team metadata from the game controller. Only the team name is
/// consumed (it selects the configured marker plate height).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RefereeTeamInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, optional, tag = "2")]
    pub score: Option<u32>,
}

/// Game-controller referee packet, reduced to the fields this processor
/// reads.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Referee {
    #[prost(uint64, optional, tag = "1")]
    pub packet_timestamp: Option<u64>,
    #[prost(message, optional, tag = "7")]
    pub yellow: Option<RefereeTeamInfo>,
    #[prost(message, optional, tag = "8")]
    pub blue: Option<RefereeTeamInfo>,
}
