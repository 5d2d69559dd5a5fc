pub mod cache;
pub mod driver;
pub mod publish;
pub mod sequencer;

use serde::Deserialize;
use std::time::Duration;

pub use cache::SetpointCache;
pub use driver::Inbound;
pub use publish::{PublishError, Publisher, RecordingPublisher};
pub use sequencer::{Phase, Sequencer};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Tick period. PX4 leaves offboard if the stream drops below 2 Hz.
    pub tick_ms: u64,

    /// Heartbeat+setpoint ticks sent before the mode switch and arm.
    /// The commit fires when the counter equals this value.
    pub warmup_ticks: u32,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (FC side)
    pub target_sys: u8,
    pub target_comp: u8,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            warmup_ticks: 10,
            sys_id: 1,
            comp_id: 1,
            target_sys: 1,
            target_comp: 1,
        }
    }
}

impl SequencerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Counter value at which it stops incrementing.
    pub fn counter_ceiling(&self) -> u32 {
        self.warmup_ticks.saturating_add(1)
    }
}
