mod setpoint_udp;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use offb_core::{driver, Inbound, RecordingPublisher, Sequencer, SequencerConfig};
use offb_fc::mav::{wait_heartbeat, FcLink};
use offb_fc::state::FcStatus;
use offb_fc::FcConfig;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Parser)]
#[command(name = "offboard", version, about = "PX4 offboard handshake and setpoint streamer")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config and wait for an FC heartbeat.
    Doctor,
    /// Stream heartbeat + setpoints, switch to offboard and arm after warm-up.
    Run,
    /// Send a single arm command.
    Arm,
    /// Send a single disarm command.
    Disarm,
    /// Run the sequencer without a link and print every record.
    DryRun {
        #[arg(long, default_value_t = 12)]
        ticks: u32,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    sequencer: SequencerConfig,
    fc: FcConfig,
    setpoints: SetpointsCfg,
}

#[derive(Debug, serde::Deserialize)]
struct SetpointsCfg {
    listen: String,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

fn check_config(cfg: &Config) -> Result<()> {
    let seq = &cfg.sequencer;
    anyhow::ensure!((10..=1000).contains(&seq.tick_ms), "sequencer.tick_ms should be 10..1000 (offboard needs >= 2 Hz)");
    anyhow::ensure!((1..=1000).contains(&seq.warmup_ticks), "sequencer.warmup_ticks should be 1..1000");
    anyhow::ensure!(!cfg.fc.url.is_empty(), "fc.url missing");
    cfg.setpoints
        .listen
        .parse::<std::net::SocketAddr>()
        .with_context(|| format!("setpoints.listen invalid: {}", cfg.setpoints.listen))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Run => run(&cfg).await?,
        Command::Arm => one_shot(&cfg, true).await?,
        Command::Disarm => one_shot(&cfg, false).await?,
        Command::DryRun { ticks } => dry_run(&cfg, ticks)?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    check_config(cfg)?;
    info!("doctor: config OK");

    let timeout = Duration::from_millis(cfg.fc.heartbeat_timeout_ms.unwrap_or(1500));
    let fc = cfg.fc.clone();
    let seen = tokio::task::spawn_blocking(move || wait_heartbeat(&fc, timeout))
        .await
        .context("heartbeat wait task")??;
    if seen {
        info!("doctor: FC heartbeat OK");
    } else {
        warn!("doctor: no FC heartbeat within {:?}", timeout);
    }

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    check_config(cfg)?;
    info!("run: starting");

    let fc_status = Arc::new(Mutex::new(FcStatus::default()));
    let (tx, rx) = mpsc::channel::<Inbound>(64);

    // FC link: writer thread plus a reader feeding clock sync into the driver.
    let link = FcLink::open(&cfg.fc, &cfg.sequencer, fc_status.clone(), Some(tx.clone()))
        .context("FC open")?;

    let listen = cfg.setpoints.listen.clone();
    let sp_tx = tx.clone();
    let listener = tokio::spawn(async move {
        if let Err(e) = setpoint_udp::listen(&listen, sp_tx).await {
            warn!("setpoints: listener stopped: {:#}", e);
        }
    });
    drop(tx);

    let (stop_tx, stop_rx) = watch::channel(false);
    let seq = Sequencer::new(cfg.sequencer.clone(), link);
    let driver = tokio::spawn(driver::run(seq, rx, stop_rx));

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("run: shutdown requested");

    // ticker first, then inputs, then the link
    let _ = stop_tx.send(true);
    let seq = driver.await.context("driver task")?;
    listener.abort();

    let last = seq.cache().to_setpoint();
    info!(
        "run: last setpoint x={} y={} z={} yaw={} ts={}",
        last.x, last.y, last.z, last.yaw, last.timestamp
    );
    let link = seq.into_publisher();
    tokio::task::spawn_blocking(move || link.close()).await.context("close FC link")?;

    if let Ok(st) = fc_status.lock() {
        info!(
            "run: FC url={:?} connected={} last_heartbeat_age={:?} clock_us={:?} last_ack={:?}",
            st.url,
            st.connected,
            st.hb_age(),
            st.clock_us,
            st.last_ack
        );
    }
    info!("run: stopped");
    Ok(())
}

/// Sends a single arm (`true`) or disarm (`false`) command and waits for it to be written.
async fn one_shot(cfg: &Config, arm: bool) -> Result<()> {
    let fc_status = Arc::new(Mutex::new(FcStatus::default()));
    let link = FcLink::open(&cfg.fc, &cfg.sequencer, fc_status, None).context("FC open")?;
    let mut seq = Sequencer::new(cfg.sequencer.clone(), link);
    if arm {
        seq.arm();
    } else {
        seq.disarm();
    }
    let link = seq.into_publisher();
    tokio::task::spawn_blocking(move || link.close()).await.context("close FC link")?;
    Ok(())
}

fn dry_run(cfg: &Config, ticks: u32) -> Result<()> {
    let mut seq = Sequencer::new(cfg.sequencer.clone(), RecordingPublisher::new());
    for i in 0..ticks {
        let phase = seq.tick();
        for msg in seq.publisher_mut().drain() {
            println!("tick={} phase={:?} {}", i, phase, serde_json::to_string(&msg)?);
        }
    }
    println!("counter={}", seq.counter());
    Ok(())
}
