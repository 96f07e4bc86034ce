//! MonitorSupervisor - Starts, watches and stops a monitoring run
//!
//! ## State Machine
//!
//! ```text
//! Idle ──run()──► Running ──interrupt / unit died──► Stopping ──all joined──► Stopped
//!   ▲                                                                          │
//!   └───────────────────────────── run() again ◄───────────────────────────────┘
//! ```
//!
//! While running, the supervisor wakes up every `health_poll_interval`,
//! checks whether a unit ended on its own and prints the down hosts, if
//! any. Shutdown sets the stop signal, publishes the final status and joins
//! every unit with its own timeout.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, bail};
use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{MonitorSettings, TeamRange};
use crate::inventory::Inventory;
use crate::probe::ReachabilityProbe;
use crate::registry::DownHostRegistry;

use super::context::RunContext;
use super::messages::{Anomaly, EVENT_CHANNEL_CAPACITY, MonitorEvent, StatusDigest, UnitId};
use super::reporter::ReporterActor;
use super::stop::StopSignal;
use super::worker::{TemplateWorker, panic_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Why a run left the `Running` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The operator asked to stop
    Interrupted,
    /// A unit ended without being asked to
    UnitFailed(UnitId),
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub reason: StopReason,
    /// Registry content when shutdown began
    pub final_status: StatusDigest,
    pub anomalies: Vec<Anomaly>,
}

type Units = Vec<(UnitId, JoinHandle<()>)>;

pub struct MonitorSupervisor {
    inventory: Inventory,
    ctx: RunContext,
    events: broadcast::Sender<MonitorEvent>,
    state: SupervisorState,
}

impl MonitorSupervisor {
    pub fn new(
        inventory: Inventory,
        teams: TeamRange,
        settings: MonitorSettings,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = DownHostRegistry::with_events(events.clone());

        Self {
            inventory,
            ctx: RunContext::new(teams, settings, probe, registry),
            events,
            state: SupervisorState::Idle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &DownHostRegistry {
        &self.ctx.registry
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.ctx.stop.clone()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until `interrupt` resolves or a unit dies, then shut down.
    ///
    /// Fails without starting anything if a run is already active or the
    /// inventory is empty.
    #[instrument(skip_all)]
    pub async fn run<F>(&mut self, interrupt: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        if matches!(
            self.state,
            SupervisorState::Running | SupervisorState::Stopping
        ) {
            bail!("monitoring run already active");
        }
        if self.inventory.is_empty() {
            bail!("no host templates to monitor");
        }

        let mut units = self.start();
        let (reason, mut anomalies) = self.watch(&mut units, interrupt).await;

        self.state = SupervisorState::Stopping;
        let final_status = self.shutdown(units, &mut anomalies).await;
        self.state = SupervisorState::Stopped;

        info!("all units stopped");
        Ok(ShutdownReport {
            reason,
            final_status,
            anomalies,
        })
    }

    /// Idle/Stopped → Running
    fn start(&mut self) -> Units {
        self.ctx.stop.reset();
        self.ctx.registry.clear();

        let mut units: Units = self
            .inventory
            .iter()
            .map(|(template, ports)| {
                let worker = TemplateWorker::new(template.clone(), ports.to_vec(), self.ctx.clone());
                (UnitId::Worker(template.to_string()), worker.spawn())
            })
            .collect();

        let reporter = ReporterActor::new(self.ctx.clone(), self.events.clone());
        units.push((UnitId::Reporter, reporter.spawn()));

        self.state = SupervisorState::Running;
        info!(
            "started {} monitoring workers + 1 reporter, status reports every {:?}",
            units.len() - 1,
            self.ctx.settings.report_interval
        );

        units
    }

    /// Poll until interrupted or a unit has ended
    async fn watch<F>(&self, units: &mut Units, interrupt: F) -> (StopReason, Vec<Anomaly>)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let mut ticker = interval(self.ctx.settings.health_poll_interval);

        loop {
            tokio::select! {
                _ = &mut interrupt => {
                    info!("monitoring stopped by user");
                    return (StopReason::Interrupted, Vec::new());
                }

                _ = ticker.tick() => {
                    let anomalies = self.collect_finished(units).await;
                    if let Some(first) = anomalies.first() {
                        let reason = StopReason::UnitFailed(first.unit().clone());
                        return (reason, anomalies);
                    }

                    let digest = self.ctx.registry.digest();
                    if !digest.all_up() {
                        self.publish(MonitorEvent::Interim(digest));
                    }
                }
            }
        }
    }

    /// Take every unit that has ended out of `units` and describe why
    async fn collect_finished(&self, units: &mut Units) -> Vec<Anomaly> {
        let (finished, running): (Units, Units) =
            units.drain(..).partition(|(_, handle)| handle.is_finished());
        *units = running;

        if finished.is_empty() {
            trace!("all {} units alive", units.len());
            return Vec::new();
        }

        warn!("{} units finished unexpectedly", finished.len());

        let mut anomalies = Vec::with_capacity(finished.len());
        for (unit, handle) in finished {
            let reason = match handle.await {
                Ok(()) => String::from("exited without a stop request"),
                Err(e) => describe_join_error(e),
            };
            error!("{unit} finished unexpectedly: {reason}");

            let anomaly = Anomaly::UnitFailed { unit, reason };
            self.publish(MonitorEvent::Anomaly(anomaly.clone()));
            anomalies.push(anomaly);
        }

        anomalies
    }

    /// Stopping: signal, report, then join every unit with its own timeout
    async fn shutdown(&self, units: Units, anomalies: &mut Vec<Anomaly>) -> StatusDigest {
        info!("stopping {} units", units.len());
        self.ctx.stop.set();

        let final_status = self.ctx.registry.digest();
        self.publish(MonitorEvent::FinalStatus(final_status.clone()));

        debug!("waiting for units to complete");
        let join_timeout = self.ctx.settings.join_timeout;
        let joins = units.into_iter().map(|(unit, mut handle)| async move {
            match timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(Anomaly::UnitFailed {
                    unit,
                    reason: describe_join_error(e),
                }),
                Err(_) => {
                    handle.abort();
                    Some(Anomaly::JoinTimedOut { unit })
                }
            }
        });

        for anomaly in join_all(joins).await.into_iter().flatten() {
            warn!("shutdown anomaly: {anomaly}");
            self.publish(MonitorEvent::Anomaly(anomaly.clone()));
            anomalies.push(anomaly);
        }

        final_status
    }

    fn publish(&self, event: MonitorEvent) {
        if self.events.send(event).is_err() {
            trace!("no receivers for monitor event");
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return String::from("task was cancelled");
    }
    match err.try_into_panic() {
        Ok(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}
