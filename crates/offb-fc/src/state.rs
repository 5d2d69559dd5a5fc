use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct FcStatus {
    pub connected: bool,
    pub url: Option<String>,
    pub last_heartbeat: Option<Instant>,
    /// Latest controller clock seen, microseconds
    pub clock_us: Option<u64>,
    /// Latest COMMAND_ACK, formatted
    pub last_ack: Option<String>,
}

impl FcStatus {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }
}
