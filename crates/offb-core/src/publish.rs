use offb_proto::Outbound;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport closed")]
    Closed,
    #[error("transport: {0}")]
    Transport(String),
}

/// Fire-and-forget sink for outgoing records. No delivery confirmation.
pub trait Publisher {
    fn publish(&mut self, msg: Outbound) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for &mut P {
    fn publish(&mut self, msg: Outbound) -> Result<(), PublishError> {
        (**self).publish(msg)
    }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, msg: Outbound) -> Result<(), PublishError> {
        (**self).publish(msg)
    }
}

/// Keeps every published record in order. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Vec<Outbound>,
    reject_commands: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command records fail to publish (and are not recorded); other kinds go through.
    pub fn rejecting_commands() -> Self {
        Self { sent: Vec::new(), reject_commands: true }
    }

    pub fn sent(&self) -> &[Outbound] {
        &self.sent
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.sent)
    }

    pub fn commands(&self) -> impl Iterator<Item = &offb_proto::VehicleCommand> {
        self.sent.iter().filter_map(Outbound::as_command)
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, msg: Outbound) -> Result<(), PublishError> {
        if self.reject_commands && matches!(msg, Outbound::Command(_)) {
            return Err(PublishError::Transport("command rejected".into()));
        }
        self.sent.push(msg);
        Ok(())
    }
}
