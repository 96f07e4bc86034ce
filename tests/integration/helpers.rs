//! Helper functions for integration tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use teamwatch::{
    actors::{context::RunContext, messages::MonitorEvent, stop::StopSignal},
    config::{MonitorSettings, TeamRange},
    inventory::Inventory,
    probe::ReachabilityProbe,
    registry::DownHostRegistry,
    template::HostTemplate,
};
use tokio::sync::broadcast;

pub const TOKEN: &str = "{team}";

/// What the scripted probe answers for one call
#[derive(Debug, Clone)]
pub enum Answer {
    Up,
    Down,
    /// Return an error
    Fault,
    /// Panic inside the probe
    Panic,
    /// Sleep before answering "up"
    Hang(Duration),
    /// Answer, then set the stop signal
    AnswerThenStop(bool, StopSignal),
}

/// Probe whose answers are scripted per host
///
/// Queued answers are used first; once a host's queue is empty, its sticky
/// answer applies, and hosts without either are up.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    queued: Mutex<HashMap<String, VecDeque<Answer>>>,
    sticky: Mutex<HashMap<String, Answer>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `answer` for every call on `host` once the queue is used up
    pub fn always(&self, host: &str, answer: Answer) -> &Self {
        self.sticky.lock().insert(host.to_string(), answer);
        self
    }

    /// Queue `answer` for the next call on `host`
    pub fn then(&self, host: &str, answer: Answer) -> &Self {
        self.queued
            .lock()
            .entry(host.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    /// Hosts probed so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, host: &str) -> usize {
        self.calls.lock().iter().filter(|h| *h == host).count()
    }

    fn next_answer(&self, host: &str) -> Answer {
        if let Some(answer) = self.queued.lock().get_mut(host).and_then(VecDeque::pop_front) {
            return answer;
        }
        self.sticky.lock().get(host).cloned().unwrap_or(Answer::Up)
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, host: &str, _ports: &[u16]) -> anyhow::Result<bool> {
        self.calls.lock().push(host.to_string());

        match self.next_answer(host) {
            Answer::Up => Ok(true),
            Answer::Down => Ok(false),
            Answer::Fault => bail!("scripted probe fault on {host}"),
            Answer::Panic => panic!("scripted probe panic on {host}"),
            Answer::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(true)
            }
            Answer::AnswerThenStop(reachable, stop) => {
                stop.set();
                Ok(reachable)
            }
        }
    }
}

pub fn template(raw: &str) -> HostTemplate {
    HostTemplate::parse(raw, TOKEN).unwrap()
}

pub fn inventory(entries: &[(&str, &[u16])]) -> Inventory {
    let mut inventory = Inventory::new();
    for (raw, ports) in entries {
        inventory.insert(template(raw), ports.to_vec()).unwrap();
    }
    inventory
}

/// Settings with short pauses so tests run fast
pub fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        probe_timeout: Duration::from_secs(1),
        cycle_pause: Duration::from_millis(10),
        fault_backoff: Duration::from_millis(10),
        fault_retries: 1,
        report_interval: Duration::from_secs(3600),
        health_poll_interval: Duration::from_millis(20),
        join_timeout: Duration::from_secs(1),
        final_digest: false,
    }
}

/// Run context over teams `start..=end` with an event-publishing registry
pub fn run_context(
    start: u32,
    end: u32,
    settings: MonitorSettings,
    probe: Arc<ScriptedProbe>,
) -> (RunContext, broadcast::Receiver<MonitorEvent>) {
    let (events, rx) = broadcast::channel(256);
    let ctx = RunContext::new(
        TeamRange::new(start, end).unwrap(),
        settings,
        probe,
        DownHostRegistry::with_events(events),
    );
    (ctx, rx)
}

/// Drain every event currently queued on `rx`
pub fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Transition lines (alerts) among `events`
pub fn alert_lines(events: &[MonitorEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                MonitorEvent::PossibleReset { .. } | MonitorEvent::Recovered { .. }
            )
        })
        .map(ToString::to_string)
        .collect()
}
