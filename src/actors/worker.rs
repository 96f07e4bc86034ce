//! TemplateWorker - Probes one host template across every team
//!
//! One worker runs per inventory entry. A cycle walks the team range in
//! increasing order, renders the template for each team, probes it and
//! reports the result to the registry.
//!
//! ## Message Flow
//!
//! ```text
//! team 1..=N → render template → probe ports → registry.report → [PossibleReset | Recovered]
//!     ↑                                                                │
//!     └──────────── cycle pause ◄──────────────────────────────────────┘
//! ```
//!
//! The stop signal is checked before every team and during every pause. An
//! in-flight probe is never interrupted; it is bounded by its own deadline.
//!
//! A probe that fails, overruns its deadline or panics counts as a fault of
//! that host only. The worker backs off and keeps going.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::{Result, bail};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use crate::template::HostTemplate;

use super::context::RunContext;

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every team was probed
    Completed,
    /// The stop signal cut the cycle short
    Stopped,
}

pub struct TemplateWorker {
    template: HostTemplate,
    ports: Vec<u16>,
    ctx: RunContext,
    /// Upper bound for one probe call over all ports
    probe_deadline: Duration,
}

impl TemplateWorker {
    pub fn new(template: HostTemplate, ports: Vec<u16>, ctx: RunContext) -> Self {
        let probe_deadline = probe_deadline(ctx.settings.probe_timeout, ports.len());

        Self {
            template,
            ports,
            ctx,
            probe_deadline,
        }
    }

    pub fn template(&self) -> &HostTemplate {
        &self.template
    }

    /// Spawn the worker's loop as a task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run cycles until the stop signal is set
    #[instrument(skip(self), fields(template = %self.template))]
    pub async fn run(self) {
        debug!("starting worker for {} ports", self.ports.len());

        let mut cycles: u64 = 0;
        loop {
            if self.run_cycle().await == CycleOutcome::Stopped {
                break;
            }
            cycles += 1;
            trace!("cycle {cycles} completed");

            if self.ctx.stop.sleep(self.ctx.settings.cycle_pause).await {
                break;
            }
        }

        debug!("worker stopped after {cycles} cycles");
    }

    /// Probe every team once, in increasing order
    pub async fn run_cycle(&self) -> CycleOutcome {
        for team in self.ctx.teams.iter() {
            if self.ctx.stop.is_set() {
                trace!("stop requested, abandoning cycle before team {team}");
                return CycleOutcome::Stopped;
            }

            let host = self.template.render(team);
            if self.check_team(team, &host).await == CycleOutcome::Stopped {
                return CycleOutcome::Stopped;
            }
        }

        CycleOutcome::Completed
    }

    /// Probe one team's host and report the result.
    ///
    /// A failing probe counts as unreachable. After a back-off the same team
    /// is probed again, up to `fault_retries` times, before the cycle moves
    /// on.
    async fn check_team(&self, team: u32, host: &str) -> CycleOutcome {
        let settings = &self.ctx.settings;
        let mut failures: u32 = 0;

        loop {
            match self.probe(host).await {
                Ok(reachable) => {
                    trace!(team, host, reachable, "probed");
                    self.ctx.registry.report(team, host, reachable);
                    return CycleOutcome::Completed;
                }
                Err(e) => {
                    warn!(team, host, "error checking host: {e:#}");
                    self.ctx.registry.report(team, host, false);

                    if self.ctx.stop.sleep(settings.fault_backoff).await {
                        return CycleOutcome::Stopped;
                    }

                    failures += 1;
                    if failures > settings.fault_retries {
                        debug!(team, host, "giving up on host for this cycle");
                        return CycleOutcome::Completed;
                    }
                }
            }
        }
    }

    async fn probe(&self, host: &str) -> Result<bool> {
        let attempt = AssertUnwindSafe(self.ctx.probe.probe(host, &self.ports)).catch_unwind();

        match timeout(self.probe_deadline, attempt).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(payload)) => {
                bail!("probe of {host} panicked: {}", panic_message(payload.as_ref()))
            }
            Err(_) => bail!("probe of {host} exceeded {:?}", self.probe_deadline),
        }
    }
}

/// Upper bound for one probe call: one period per port plus one more for
/// name resolution and scheduling delays. Saturates at `Duration::MAX`.
fn probe_deadline(per_port: Duration, ports: usize) -> Duration {
    let periods = u32::try_from(ports).unwrap_or(u32::MAX).saturating_add(1);
    per_port.checked_mul(periods).unwrap_or(Duration::MAX)
}

/// Text of a panic payload
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
