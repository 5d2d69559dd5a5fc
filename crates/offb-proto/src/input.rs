use serde::{Deserialize, Serialize};

/// Desired position from the external setpoint source (local frame, meters / radians).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SetpointInput {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

/// Controller clock value, microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockSync {
    pub timestamp: u64,
}
