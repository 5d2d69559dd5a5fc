//! Periodic task that owns a [`Sequencer`].
//!
//! Ticks and inbound events are handled by the same task, so a tick never sees a
//! half-applied update and the cache needs no lock.

use offb_proto::{ClockSync, SetpointInput};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::publish::Publisher;
use crate::sequencer::{Phase, Sequencer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inbound {
    Setpoint(SetpointInput),
    Clock(ClockSync),
    Arm,
    Disarm,
}

/// Runs until `shutdown` flips to true (or its sender is dropped), then returns the
/// sequencer. The ticker is stopped before anything owned by the sequencer is released.
///
/// Inbound events already queued when a tick is due are applied first.
pub async fn run<P: Publisher>(
    mut seq: Sequencer<P>,
    mut inbox: mpsc::Receiver<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) -> Sequencer<P> {
    if *shutdown.borrow_and_update() {
        info!("offboard: shutdown already requested, not starting ticker");
        return seq;
    }

    let period = seq.config().tick_period();
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut inbox_open = true;

    info!("offboard: ticker started ({:?} period, commit at tick {})", period, seq.config().warmup_ticks);

    loop {
        tokio::select! {
            biased;

            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            ev = inbox.recv(), if inbox_open => match ev {
                Some(ev) => apply(&mut seq, ev),
                None => {
                    debug!("offboard: inbound channel closed, ticking on last values");
                    inbox_open = false;
                }
            },

            _ = ticker.tick() => {
                let before = seq.phase();
                seq.tick();
                let now = seq.phase();
                if before != now && now == Phase::Steady {
                    info!("offboard: steady state, streaming setpoints");
                }
            }
        }
    }

    info!("offboard: ticker stopped after counter={}", seq.counter());
    seq
}

fn apply<P: Publisher>(seq: &mut Sequencer<P>, ev: Inbound) {
    match ev {
        Inbound::Setpoint(sp) => seq.on_setpoint(sp),
        Inbound::Clock(c) => seq.on_clock(c),
        Inbound::Arm => seq.arm(),
        Inbound::Disarm => seq.disarm(),
    }
}
