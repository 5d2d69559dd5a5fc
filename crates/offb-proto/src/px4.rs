use serde::{Deserialize, Serialize};

/// Base mode flag: custom mode enabled.
pub const MODE_FLAG_CUSTOM_MODE_ENABLED: f32 = 1.0;
/// PX4 custom main mode number for OFFBOARD.
pub const PX4_CUSTOM_MAIN_MODE_OFFBOARD: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffboardControlMode {
    pub timestamp: u64,
    pub position: bool,
    pub velocity: bool,
    pub acceleration: bool,
    pub attitude: bool,
    pub body_rate: bool,
}

impl OffboardControlMode {
    /// Heartbeat declaring position setpoints only.
    pub fn position_only(timestamp: u64) -> Self {
        Self {
            timestamp,
            position: true,
            velocity: false,
            acceleration: false,
            attitude: false,
            body_rate: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectorySetpoint {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

/// Vehicle command ids, PX4 / MAVLink numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum VehicleCommandKind {
    DoSetMode = 176,
    ArmDisarm = 400,
}

impl VehicleCommandKind {
    pub fn id(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub timestamp: u64,
    pub command: VehicleCommandKind,
    pub param1: f32,
    pub param2: f32,
    pub target_system: u8,
    pub target_component: u8,
    pub source_system: u8,
    pub source_component: u8,
    pub from_external: bool,
}

/// One record handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    ControlMode(OffboardControlMode),
    Setpoint(TrajectorySetpoint),
    Command(VehicleCommand),
}

impl Outbound {
    pub fn as_command(&self) -> Option<&VehicleCommand> {
        match self {
            Outbound::Command(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_setpoint(&self) -> Option<&TrajectorySetpoint> {
        match self {
            Outbound::Setpoint(s) => Some(s),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Outbound::ControlMode(m) => m.timestamp,
            Outbound::Setpoint(s) => s.timestamp,
            Outbound::Command(c) => c.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_is_position_only() {
        let hb = OffboardControlMode::position_only(42);
        assert_eq!(hb.timestamp, 42);
        assert!(hb.position);
        assert!(!hb.velocity && !hb.acceleration && !hb.attitude && !hb.body_rate);
    }

    #[test]
    fn command_ids_match_px4() {
        assert_eq!(VehicleCommandKind::ArmDisarm.id(), 400);
        assert_eq!(VehicleCommandKind::DoSetMode.id(), 176);
    }

    #[test]
    fn outbound_serializes_with_kind_tag() {
        let msg = Outbound::Setpoint(TrajectorySetpoint { timestamp: 7, x: 1.0, y: 2.0, z: -3.0, yaw: 0.5 });
        let s = serde_json::to_string(&msg).unwrap();
        assert!(s.contains("\"kind\":\"setpoint\""), "{}", s);
        assert_eq!(msg.timestamp(), 7);
    }
}
