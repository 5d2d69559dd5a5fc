use anyhow::{Context, Result};
use mavlink::{
    common::MavMessage, error::MessageReadError, MavConnection, MavHeader, MavlinkVersion,
};
use offb_core::{Inbound, PublishError, Publisher, SequencerConfig};
use offb_proto::Outbound;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

use crate::map::{clock_from, to_mavlink};
use crate::state::FcStatus;
use crate::FcConfig;

/// Serial reads return after this long with no data so the reader can notice shutdown.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(50);
const WRITE_QUEUE: usize = 32;

type Conn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// One direction of the link.
///
/// Serial ports are opened here and split into two handles, so a read waiting for
/// data never holds anything the writer needs. Other URLs use a mavlink
/// connection; its udp and tcp backends lock reads and writes separately.
enum Wire {
    Serial(Box<dyn SerialPort>),
    Conn(Conn),
}

impl Wire {
    fn open_pair(fc: &FcConfig) -> Result<(Wire, Wire)> {
        if let Some((dev, baud)) = fc.serial_port() {
            let port = tokio_serial::new(dev, baud)
                .timeout(SERIAL_READ_TIMEOUT)
                .open()
                .with_context(|| format!("open fc serial device {}", dev))?;
            let rx = port.try_clone().context("clone fc serial handle")?;
            return Ok((Wire::Serial(port), Wire::Serial(rx)));
        }

        let conn: Conn = Arc::from(
            mavlink::connect::<MavMessage>(&fc.url)
                .with_context(|| format!("mavlink connect {}", fc.url))?,
        );
        Ok((Wire::Conn(conn.clone()), Wire::Conn(conn)))
    }

    fn send(&mut self, hdr: MavHeader, msg: &MavMessage) -> Result<()> {
        match self {
            Wire::Serial(port) => {
                mavlink::write_versioned_msg(port, MavlinkVersion::V2, hdr, msg)
                    .context("mavlink serial write")?;
            }
            Wire::Conn(conn) => {
                conn.send(&hdr, msg).context("mavlink send")?;
            }
        }
        Ok(())
    }

    /// `Ok(None)` when a serial read timed out.
    fn recv(&mut self) -> Result<Option<(MavHeader, MavMessage)>, MessageReadError> {
        let res: Result<(MavHeader, MavMessage), MessageReadError> = match self {
            Wire::Serial(port) => mavlink::read_versioned_msg(port, MavlinkVersion::V2),
            Wire::Conn(conn) => conn.recv(),
        };
        match res {
            Ok(frame) => Ok(Some(frame)),
            Err(MessageReadError::Io(e)) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Flight-controller link.
///
/// Publishing only queues the record; a dedicated writer thread owns the write
/// handle and does the I/O, so a tick never waits on the port.
pub struct FcLink {
    tx: Option<mpsc::Sender<Outbound>>,
    writer: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl FcLink {
    /// Opens the link and starts the writer thread. With an `inbox`, a reader
    /// thread also forwards controller clock values to it.
    pub fn open(
        fc: &FcConfig,
        seq: &SequencerConfig,
        status: Arc<Mutex<FcStatus>>,
        inbox: Option<mpsc::Sender<Inbound>>,
    ) -> Result<Self> {
        let (tx_wire, rx_wire) = Wire::open_pair(fc)?;
        info!("FC: link open on {}", fc.url);

        if let Ok(mut st) = status.lock() {
            st.url = Some(fc.url.clone());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(WRITE_QUEUE);

        let writer = FcWriter {
            wire: tx_wire,
            hdr: MavHeader { system_id: seq.sys_id, component_id: seq.comp_id, sequence: 0 },
            target_sys: seq.target_sys,
            target_comp: seq.target_comp,
        };
        let writer = std::thread::Builder::new()
            .name("fc-writer".into())
            .spawn(move || writer.run(rx))
            .context("spawn fc writer")?;

        if let Some(inbox) = inbox {
            let reader = FcReader { wire: rx_wire, status, stop: stop.clone() };
            // Detached: a udp/tcp recv can wait indefinitely on a silent peer.
            std::thread::Builder::new()
                .name("fc-reader".into())
                .spawn(move || reader.run(inbox))
                .context("spawn fc reader")?;
        }

        Ok(Self { tx: Some(tx), writer: Some(writer), stop })
    }

    /// Sends whatever is still queued, then releases the port. Blocking.
    pub fn close(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.tx.take();
        if let Some(h) = self.writer.take() {
            if h.join().is_err() {
                warn!("FC: writer thread panicked");
            }
        }
        info!("FC: link closed");
    }
}

impl Drop for FcLink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Publisher for FcLink {
    fn publish(&mut self, msg: Outbound) -> Result<(), PublishError> {
        let tx = self.tx.as_ref().ok_or(PublishError::Closed)?;
        tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::Transport("fc write queue full".into()),
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

struct FcWriter {
    wire: Wire,
    hdr: MavHeader,
    target_sys: u8,
    target_comp: u8,
}

impl FcWriter {
    fn run(mut self, mut rx: mpsc::Receiver<Outbound>) {
        while let Some(msg) = rx.blocking_recv() {
            let mav = to_mavlink(&msg, self.target_sys, self.target_comp);
            self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
            if let Err(e) = self.wire.send(self.hdr, &mav) {
                warn!("FC: send failed: {:#}", e);
            }
        }
        debug!("FC: writer stopped");
    }
}

struct FcReader {
    wire: Wire,
    status: Arc<Mutex<FcStatus>>,
    stop: Arc<AtomicBool>,
}

impl FcReader {
    /// Forwards controller clock values to the driver and records heartbeats and
    /// command acks. Returns once the link is closed or the driver is gone.
    fn run(mut self, inbox: mpsc::Sender<Inbound>) {
        while !self.stop.load(Ordering::Relaxed) && !inbox.is_closed() {
            let msg = match self.wire.recv() {
                Ok(Some((_hdr, msg))) => msg,
                Ok(None) => continue,
                Err(e) => {
                    debug!("FC recv: {}", e);
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };

            let clock = clock_from(&msg);
            {
                let Ok(mut st) = self.status.lock() else { break };
                st.connected = true;
                match &msg {
                    MavMessage::HEARTBEAT(_) => st.last_heartbeat = Some(Instant::now()),
                    MavMessage::COMMAND_ACK(ack) => {
                        // visibility only; commands are never re-sent
                        let s = format!("{:?} -> {:?}", ack.command, ack.result);
                        info!("FC: command ack {}", s);
                        st.last_ack = Some(s);
                    }
                    _ => {}
                }
                if let Some(clock) = clock {
                    st.clock_us = Some(clock.timestamp);
                }
            }

            if let Some(clock) = clock {
                if inbox.blocking_send(Inbound::Clock(clock)).is_err() {
                    break;
                }
            }
        }
        info!("FC: reader stopped");
    }
}

/// Waits up to `timeout` for one HEARTBEAT from the controller. Blocking, but
/// always returns by the deadline; the receive itself runs on a detached thread.
pub fn wait_heartbeat(fc: &FcConfig, timeout: Duration) -> Result<bool> {
    let (_, mut wire) = Wire::open_pair(fc)?;
    let (tx, rx) = std::sync::mpsc::channel();
    let deadline = Instant::now() + timeout;

    std::thread::Builder::new()
        .name("fc-hb-wait".into())
        .spawn(move || {
            while Instant::now() < deadline {
                match wire.recv() {
                    Ok(Some((hdr, MavMessage::HEARTBEAT(_)))) => {
                        let _ = tx.send(hdr);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("FC heartbeat wait recv failed: {}", e);
                        std::thread::sleep(Duration::from_millis(25));
                    }
                }
            }
        })
        .context("spawn fc heartbeat wait")?;

    match rx.recv_timeout(timeout) {
        Ok(hdr) => {
            info!("FC: heartbeat from sys={} comp={}", hdr.system_id, hdr.component_id);
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{MavAutopilot, MavModeFlag, MavState, MavType, HEARTBEAT_DATA, TIMESYNC_DATA};
    use offb_proto::{ClockSync, TrajectorySetpoint};
    use tokio::io::AsyncReadExt;
    use tokio_serial::SerialStream;

    fn free_udp_port() -> u16 {
        let s = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        s.local_addr().unwrap().port()
    }

    fn fc(url: String) -> FcConfig {
        FcConfig { url, heartbeat_timeout_ms: None }
    }

    fn setpoint() -> Outbound {
        Outbound::Setpoint(TrajectorySetpoint { timestamp: 2_000_000, x: 1.0, y: 2.0, z: -3.0, yaw: 0.5 })
    }

    fn fc_heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    fn fc_header() -> MavHeader {
        MavHeader { system_id: 1, component_id: 1, sequence: 0 }
    }

    #[tokio::test]
    async fn publish_on_quiet_serial_port_does_not_wait_for_reader() {
        let (mut master, slave) = SerialStream::pair().unwrap();
        let path = slave.name().unwrap();

        let status = Arc::new(Mutex::new(FcStatus::default()));
        let (inbox_tx, _inbox_rx) = mpsc::channel(4);
        let cfg = fc(format!("serial:{}:57600", path));
        let mut link = FcLink::open(&cfg, &SequencerConfig::default(), status, Some(inbox_tx)).unwrap();

        // reader is now parked on a port with nothing to read
        tokio::time::sleep(Duration::from_millis(150)).await;

        let start = Instant::now();
        for _ in 0..4 {
            link.publish(setpoint()).unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(50));

        let mut buf = Vec::new();
        let frame = tokio::time::timeout(Duration::from_secs(2), async {
            let mut chunk = [0u8; 256];
            loop {
                let n = master.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let mut cur = std::io::Cursor::new(buf.as_slice());
                if let Ok((_, msg)) = mavlink::read_v2_msg::<MavMessage, _>(&mut cur) {
                    return msg;
                }
            }
        })
        .await
        .expect("setpoint frame on the wire");

        let MavMessage::SET_POSITION_TARGET_LOCAL_NED(d) = frame else { panic!("wrong message") };
        assert_eq!((d.x, d.y, d.z, d.yaw), (1.0, 2.0, -3.0, 0.5));

        tokio::task::spawn_blocking(move || link.close()).await.unwrap();
        drop(slave);
    }

    #[tokio::test]
    async fn reader_forwards_timesync_clock_and_heartbeat() {
        let port = free_udp_port();
        let status = Arc::new(Mutex::new(FcStatus::default()));
        let (inbox_tx, mut inbox_rx) = mpsc::channel(4);
        let cfg = fc(format!("udpin:127.0.0.1:{}", port));
        let link = FcLink::open(&cfg, &SequencerConfig::default(), status.clone(), Some(inbox_tx)).unwrap();

        let autopilot = mavlink::connect::<MavMessage>(&format!("udpout:127.0.0.1:{}", port)).unwrap();
        autopilot.send(&fc_header(), &fc_heartbeat()).unwrap();
        let sync = MavMessage::TIMESYNC(TIMESYNC_DATA { tc1: 0, ts1: 3_000_000_000 });
        autopilot.send(&fc_header(), &sync).unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(2), inbox_rx.recv()).await.unwrap();
        assert_eq!(ev, Some(Inbound::Clock(ClockSync { timestamp: 3_000_000 })));

        let st = status.lock().unwrap().clone();
        assert!(st.connected);
        assert!(st.last_heartbeat.is_some());
        assert_eq!(st.clock_us, Some(3_000_000));
        assert_eq!(st.url.as_deref(), Some(cfg.url.as_str()));
        drop(st);

        tokio::task::spawn_blocking(move || link.close()).await.unwrap();
    }

    #[tokio::test]
    async fn published_command_reaches_udp_peer() {
        let port = free_udp_port();
        let gcs = mavlink::connect::<MavMessage>(&format!("udpin:127.0.0.1:{}", port)).unwrap();

        let status = Arc::new(Mutex::new(FcStatus::default()));
        let cfg = fc(format!("udpout:127.0.0.1:{}", port));
        let mut link = FcLink::open(&cfg, &SequencerConfig::default(), status, None).unwrap();
        link.publish(setpoint()).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            if let Ok(frame) = gcs.recv() {
                let _ = tx.send(frame);
            }
        });
        let (hdr, msg) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((hdr.system_id, hdr.component_id), (1, 1));
        assert!(matches!(msg, MavMessage::SET_POSITION_TARGET_LOCAL_NED(_)));

        tokio::task::spawn_blocking(move || link.close()).await.unwrap();
    }

    #[tokio::test]
    async fn publish_without_writer_queue_reports_closed() {
        let port = free_udp_port();
        let status = Arc::new(Mutex::new(FcStatus::default()));
        let cfg = fc(format!("udpout:127.0.0.1:{}", port));
        let mut link = FcLink::open(&cfg, &SequencerConfig::default(), status, None).unwrap();
        link.tx.take();
        assert!(matches!(link.publish(setpoint()), Err(PublishError::Closed)));
        tokio::task::spawn_blocking(move || link.close()).await.unwrap();
    }

    #[test]
    fn heartbeat_wait_gives_up_at_deadline() {
        let port = free_udp_port();
        let cfg = fc(format!("udpin:127.0.0.1:{}", port));
        let start = Instant::now();
        assert!(!wait_heartbeat(&cfg, Duration::from_millis(200)).unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
