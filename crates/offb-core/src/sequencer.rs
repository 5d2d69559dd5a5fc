use offb_proto::px4::{MODE_FLAG_CUSTOM_MODE_ENABLED, PX4_CUSTOM_MAIN_MODE_OFFBOARD};
use offb_proto::{
    ClockSync, OffboardControlMode, Outbound, SetpointInput, VehicleCommand, VehicleCommandKind,
};
use tracing::{debug, info, warn};

use crate::cache::SetpointCache;
use crate::publish::Publisher;
use crate::SequencerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Heartbeat + setpoint only, building the stream PX4 needs before it accepts offboard.
    Priming,
    /// The single tick that also sends set-mode then arm.
    Commit,
    /// Counter saturated; heartbeat + setpoint forever.
    Steady,
}

/// Offboard handshake driver. Owns the setpoint cache and the tick counter.
///
/// Each call to [`Sequencer::tick`] emits one heartbeat and one setpoint. When the
/// counter equals `warmup_ticks` the tick is preceded by the set-mode and arm
/// commands. The counter saturates at `warmup_ticks + 1` and never resets, so the
/// commit happens once per instance.
///
/// No acknowledgement is tracked: if the controller drops or rejects the commit
/// commands they are not re-sent.
pub struct Sequencer<P> {
    cfg: SequencerConfig,
    cache: SetpointCache,
    counter: u32,
    publisher: P,
}

impl<P: Publisher> Sequencer<P> {
    pub fn new(cfg: SequencerConfig, publisher: P) -> Self {
        Self { cfg, cache: SetpointCache::default(), counter: 0, publisher }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.cfg
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn cache(&self) -> &SetpointCache {
        &self.cache
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }

    /// Phase the next tick will run in.
    pub fn phase(&self) -> Phase {
        let commit = self.cfg.warmup_ticks;
        if self.counter < commit {
            Phase::Priming
        } else if self.counter == commit {
            Phase::Commit
        } else {
            Phase::Steady
        }
    }

    pub fn on_setpoint(&mut self, sp: SetpointInput) {
        self.cache.update_position(sp);
    }

    pub fn on_clock(&mut self, clock: ClockSync) {
        self.cache.update_clock(clock.timestamp);
    }

    /// Runs one period and returns the phase it ran in.
    pub fn tick(&mut self) -> Phase {
        let phase = self.phase();

        if phase == Phase::Commit {
            info!("offboard: warm-up done after {} ticks, switching mode and arming", self.counter);
            self.publish_vehicle_command(
                VehicleCommandKind::DoSetMode,
                MODE_FLAG_CUSTOM_MODE_ENABLED,
                PX4_CUSTOM_MAIN_MODE_OFFBOARD,
            );
            self.arm();
        }

        self.publish_offboard_control_mode();
        self.publish_trajectory_setpoint();

        if self.counter < self.cfg.counter_ceiling() {
            self.counter += 1;
        }
        debug!(counter = self.counter, ?phase, "tick");
        phase
    }

    pub fn arm(&mut self) {
        self.publish_vehicle_command(VehicleCommandKind::ArmDisarm, 1.0, 0.0);
        info!("arm command sent");
    }

    pub fn disarm(&mut self) {
        self.publish_vehicle_command(VehicleCommandKind::ArmDisarm, 0.0, 0.0);
        info!("disarm command sent");
    }

    fn publish_offboard_control_mode(&mut self) {
        let msg = OffboardControlMode::position_only(self.cache.timestamp());
        self.emit(Outbound::ControlMode(msg));
    }

    fn publish_trajectory_setpoint(&mut self) {
        let msg = self.cache.to_setpoint();
        self.emit(Outbound::Setpoint(msg));
    }

    fn publish_vehicle_command(&mut self, command: VehicleCommandKind, param1: f32, param2: f32) {
        let msg = VehicleCommand {
            timestamp: self.cache.timestamp(),
            command,
            param1,
            param2,
            target_system: self.cfg.target_sys,
            target_component: self.cfg.target_comp,
            source_system: self.cfg.sys_id,
            source_component: self.cfg.comp_id,
            from_external: true,
        };
        if self.emit(Outbound::Command(msg)) {
            info!("published vehicle command {:?} ({})", command, command.id());
        }
    }

    fn emit(&mut self, msg: Outbound) -> bool {
        match self.publisher.publish(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("publish failed: {:#}", e);
                false
            }
        }
    }
}
