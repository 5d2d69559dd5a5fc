use offb_proto::{SetpointInput, TrajectorySetpoint};

/// Last received setpoint and controller clock.
///
/// The position is stored as one value so an update replaces x/y/z/yaw together.
/// `timestamp` moves independently and starts at 0 until the first clock sync.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetpointCache {
    position: SetpointInput,
    timestamp: u64,
}

impl SetpointCache {
    pub fn update_position(&mut self, sp: SetpointInput) {
        self.position = sp;
    }

    pub fn update_clock(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn position(&self) -> SetpointInput {
        self.position
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn to_setpoint(&self) -> TrajectorySetpoint {
        TrajectorySetpoint {
            timestamp: self.timestamp,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            yaw: self.position.yaw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_origin_with_zero_clock() {
        let c = SetpointCache::default();
        assert_eq!(c.to_setpoint(), TrajectorySetpoint::default());
    }

    #[test]
    fn clock_update_leaves_position_alone() {
        let mut c = SetpointCache::default();
        c.update_position(SetpointInput { x: 1.0, y: 2.0, z: -3.0, yaw: 0.5 });
        c.update_clock(1_234_567);
        let sp = c.to_setpoint();
        assert_eq!(sp.timestamp, 1_234_567);
        assert_eq!((sp.x, sp.y, sp.z, sp.yaw), (1.0, 2.0, -3.0, 0.5));
    }

    #[test]
    fn position_update_replaces_all_fields() {
        let mut c = SetpointCache::default();
        c.update_position(SetpointInput { x: 1.0, y: 1.0, z: 1.0, yaw: 1.0 });
        c.update_position(SetpointInput { x: 5.0, y: 6.0, z: 7.0, yaw: 0.0 });
        assert_eq!(c.position(), SetpointInput { x: 5.0, y: 6.0, z: 7.0, yaw: 0.0 });
    }

    #[test]
    fn nan_is_forwarded_verbatim() {
        let mut c = SetpointCache::default();
        c.update_position(SetpointInput { x: f32::NAN, y: 0.0, z: 0.0, yaw: 0.0 });
        assert!(c.to_setpoint().x.is_nan());
    }
}
