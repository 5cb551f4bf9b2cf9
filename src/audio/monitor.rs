//! Progress monitor: one background thread per playing session.
//!
//! The thread waits on three things at once: the progress ticker, the sink's
//! completion signal for its session, and its own stop channel. A completion
//! or a stop ends the loop, so no progress is ever sampled after either.

use std::sync::Weak;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use tracing::{debug, trace};

use crate::error::{PlayerError, Result};

use super::types::SinkEvent;

/// What the monitor drives. Implemented by the engine.
pub(super) trait MonitorTarget: Send + Sync {
    /// Sample and publish progress for `session`. Returns `false` once that
    /// session is gone, which ends the monitor.
    fn tick(&self, session: u64) -> bool;

    /// Handle a completion or mid-stream failure raised by the sink.
    fn complete(&self, event: SinkEvent);
}

/// Keeps a monitor alive. Dropping it stops the thread at its next wakeup.
pub(super) struct MonitorHandle {
    _stop: Sender<()>,
}

pub(super) fn spawn_monitor(
    target: Weak<dyn MonitorTarget>,
    session: u64,
    events: Receiver<SinkEvent>,
    interval: Duration,
) -> Result<MonitorHandle> {
    let (stop_tx, stop_rx) = bounded::<()>(1);

    thread::Builder::new()
        .name(format!("progress-{session}"))
        .spawn(move || run(target, session, events, stop_rx, interval))
        .map_err(|e| PlayerError::Output(format!("failed to spawn progress monitor: {e}")))?;

    Ok(MonitorHandle { _stop: stop_tx })
}

fn run(
    target: Weak<dyn MonitorTarget>,
    session: u64,
    events: Receiver<SinkEvent>,
    stop: Receiver<()>,
    interval: Duration,
) {
    let ticker = tick(interval);
    debug!(session, "progress monitor started");

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(events) -> event => {
                // A disconnect means the sink dropped the request without finishing it.
                if let Ok(event) = event {
                    if let Some(target) = target.upgrade() {
                        target.complete(event);
                    }
                }
                break;
            }
            recv(ticker) -> _ => {
                let Some(target) = target.upgrade() else {
                    break;
                };
                if !target.tick(session) {
                    break;
                }
                trace!(session, "progress tick");
            }
        }
    }

    debug!(session, "progress monitor stopped");
}
