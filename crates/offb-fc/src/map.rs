//! Offboard records to/from MAVLink common messages.

use mavlink::common::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType,
    PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use offb_proto::{ClockSync, OffboardControlMode, Outbound, TrajectorySetpoint, VehicleCommand, VehicleCommandKind};

/// Position + yaw only; velocity, acceleration and yaw rate ignored.
pub fn position_only_mask() -> PositionTargetTypemask {
    PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE
}

pub fn to_mavlink(msg: &Outbound, target_sys: u8, target_comp: u8) -> MavMessage {
    match msg {
        Outbound::ControlMode(m) => MavMessage::HEARTBEAT(heartbeat(m)),
        Outbound::Setpoint(sp) => {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(setpoint(sp, target_sys, target_comp))
        }
        Outbound::Command(c) => MavMessage::COMMAND_LONG(command(c)),
    }
}

// The control-mode flags have no MAVLink message of their own; PX4 infers them
// from the setpoint type mask. The companion heartbeat keeps the link alive.
fn heartbeat(_m: &OffboardControlMode) -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    }
}

fn setpoint(sp: &TrajectorySetpoint, target_sys: u8, target_comp: u8) -> SET_POSITION_TARGET_LOCAL_NED_DATA {
    SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms: (sp.timestamp / 1000) as u32,
        x: sp.x,
        y: sp.y,
        z: sp.z,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: sp.yaw,
        yaw_rate: 0.0,
        type_mask: position_only_mask(),
        target_system: target_sys,
        target_component: target_comp,
        coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
    }
}

fn command(c: &VehicleCommand) -> COMMAND_LONG_DATA {
    let command = match c.command {
        VehicleCommandKind::ArmDisarm => MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        VehicleCommandKind::DoSetMode => MavCmd::MAV_CMD_DO_SET_MODE,
    };
    COMMAND_LONG_DATA {
        target_system: c.target_system,
        target_component: c.target_component,
        command,
        confirmation: 0,
        param1: c.param1,
        param2: c.param2,
        param3: 0.0,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
    }
}

/// Controller clock in microseconds, from TIMESYNC (ns) or SYSTEM_TIME (boot ms).
pub fn clock_from(msg: &MavMessage) -> Option<ClockSync> {
    match msg {
        MavMessage::TIMESYNC(ts) => {
            let ns = if ts.tc1 != 0 { ts.tc1 } else { ts.ts1 };
            (ns > 0).then(|| ClockSync { timestamp: ns as u64 / 1000 })
        }
        MavMessage::SYSTEM_TIME(st) if st.time_boot_ms > 0 => {
            Some(ClockSync { timestamp: st.time_boot_ms as u64 * 1000 })
        }
        _ => None,
    }
}
