use anyhow::{Context, Result};
use offb_core::Inbound;
use offb_proto::SetpointInput;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One JSON object per datagram: `{"x":0.0,"y":0.0,"z":-2.0,"yaw":0.0}`.
pub fn decode(buf: &[u8]) -> Result<SetpointInput> {
    serde_json::from_slice(buf).context("decode setpoint json")
}

/// Forwards every decoded datagram to the driver. Returns when the driver is gone.
pub async fn listen(addr: &str, tx: mpsc::Sender<Inbound>) -> Result<()> {
    let sock = UdpSocket::bind(addr).await.with_context(|| format!("bind setpoint socket {}", addr))?;
    info!("setpoints: listening on {}", addr);

    let mut buf = [0u8; 1024];
    loop {
        let (n, peer) = sock.recv_from(&mut buf).await.context("setpoint recv")?;
        let sp = match decode(&buf[..n]) {
            Ok(sp) => sp,
            Err(e) => {
                warn!("setpoints: dropping datagram from {}: {:#}", peer, e);
                continue;
            }
        };
        debug!(?sp, %peer, "setpoint");
        if tx.send(Inbound::Setpoint(sp)).await.is_err() {
            return Ok(());
        }
    }
}
