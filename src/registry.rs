//! Down-host registry: the single record of which hosts are currently down
//!
//! Workers report every probe result; the registry turns those results into
//! transitions. A host that goes down raises one `POSSIBLE BOX RESET` alert,
//! however many failed probes follow, and one `RECOVERED` alert once a probe
//! succeeds again. The reporter and the supervisor only ever read snapshots.
//!
//! ```text
//! reachable | present | effect
//! ----------+---------+---------------------------------
//!   false   |   no    | insert, PossibleReset
//!   false   |   yes   | nothing
//!   true    |   yes   | remove, Recovered
//!   true    |   no    | nothing
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

use crate::actors::messages::{MonitorEvent, StatusDigest};

/// A concrete host that failed its most recent probe
///
/// Ordered by team, then host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DownEntry {
    pub team: u32,
    pub host: String,
}

impl DownEntry {
    pub fn new(team: u32, host: impl Into<String>) -> Self {
        Self {
            team,
            host: host.into(),
        }
    }
}

/// Liveness change detected by [`DownHostRegistry::report`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    PossibleReset,
    Recovered,
}

/// Shared set of down hosts
///
/// Cloning is cheap and every clone sees the same set. Each operation holds
/// the lock for its whole effect, so snapshots never see half an update.
#[derive(Debug, Clone, Default)]
pub struct DownHostRegistry {
    entries: Arc<Mutex<BTreeSet<DownEntry>>>,
    events: Option<broadcast::Sender<MonitorEvent>>,
}

impl DownHostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that publishes its transitions on `events`
    pub fn with_events(events: broadcast::Sender<MonitorEvent>) -> Self {
        Self {
            entries: Arc::default(),
            events: Some(events),
        }
    }

    /// Record the outcome of a probe and return the transition it caused
    pub fn report(&self, team: u32, host: &str, reachable: bool) -> Option<Transition> {
        let entry = DownEntry::new(team, host);
        let mut entries = self.entries.lock();

        let transition = match (reachable, entries.contains(&entry)) {
            (false, false) => {
                warn!(team, host, "possible box reset");
                entries.insert(entry.clone());
                Transition::PossibleReset
            }
            (true, true) => {
                info!(team, host, "host recovered");
                entries.remove(&entry);
                Transition::Recovered
            }
            _ => return None,
        };

        // published under the lock so subscribers see transitions in order
        if let Some(events) = &self.events {
            let at = Local::now();
            let event = match transition {
                Transition::PossibleReset => MonitorEvent::PossibleReset { entry, at },
                Transition::Recovered => MonitorEvent::Recovered { entry, at },
            };
            if events.send(event).is_err() {
                trace!("no receivers for host event");
            }
        }

        Some(transition)
    }

    /// Current entries, ordered by team then host
    pub fn snapshot(&self) -> Vec<DownEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Timestamped snapshot
    pub fn digest(&self) -> StatusDigest {
        StatusDigest::new(self.snapshot())
    }

    pub fn contains(&self, team: u32, host: &str) -> bool {
        self.entries.lock().contains(&DownEntry::new(team, host))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every entry. Only called while no run is active.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
