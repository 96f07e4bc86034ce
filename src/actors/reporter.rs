//! ReporterActor - Publishes a digest of the down-host registry on a cadence
//!
//! ```text
//! interval tick → registry.digest() → MonitorEvent::Digest → [console, ...]
//!     ↑
//!     └─── stop signal ends the loop (optionally after one last digest)
//! ```
//!
//! The reporter only reads snapshots; it never changes the registry.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use super::context::RunContext;
use super::messages::MonitorEvent;

pub struct ReporterActor {
    ctx: RunContext,
    events: broadcast::Sender<MonitorEvent>,
}

impl ReporterActor {
    pub fn new(ctx: RunContext, events: broadcast::Sender<MonitorEvent>) -> Self {
        Self { ctx, events }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        let period = self.ctx.settings.report_interval;
        debug!("starting reporter with interval {period:?}");

        // first digest after one full interval
        match Instant::now().checked_add(period) {
            Some(first) => {
                let mut ticker = interval_at(first, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;

                        _ = self.ctx.stop.stopped() => break,

                        _ = ticker.tick() => self.publish_digest(),
                    }
                }
            }
            None => {
                warn!("report interval {period:?} is out of range, no periodic digests");
                self.ctx.stop.stopped().await;
            }
        }

        if self.ctx.settings.final_digest {
            self.publish_digest();
        }

        debug!("reporter stopped");
    }

    fn publish_digest(&self) {
        let digest = self.ctx.registry.digest();
        debug!("status report: {} hosts down", digest.entries.len());

        if self.events.send(MonitorEvent::Digest(digest)).is_err() {
            trace!("no receivers for status digest");
        }
    }
}
