pub mod input;
pub mod px4;

pub use input::{ClockSync, SetpointInput};
pub use px4::{Outbound, OffboardControlMode, TrajectorySetpoint, VehicleCommand, VehicleCommandKind};
