//! Wire messages and the multicast receive/send machinery.

pub mod proto;
pub mod socket;

pub use socket::{GcSocket, GeometryState, NetError, TeamHeights, VisionSocket};
