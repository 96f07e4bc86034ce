//! Events published by the monitoring actors
//!
//! Everything an operator gets to see flows through one broadcast channel of
//! [`MonitorEvent`]s. The binary subscribes a console printer; tests
//! subscribe directly.
//!
//! The `Display` implementations produce the operator-facing text.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::registry::DownEntry;

/// Capacity of the monitor event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Timestamped copy of the down-host registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDigest {
    pub taken_at: DateTime<Local>,
    pub entries: Vec<DownEntry>,
}

impl StatusDigest {
    pub fn new(entries: Vec<DownEntry>) -> Self {
        Self {
            taken_at: Local::now(),
            entries,
        }
    }

    pub fn all_up(&self) -> bool {
        self.entries.is_empty()
    }

    fn write_entries(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for DownEntry { team, host } in &self.entries {
            writeln!(f, "  TEAM {team} - {host}")?;
        }
        Ok(())
    }
}

/// Which unit of a run an anomaly is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UnitId {
    /// Worker of a host template
    Worker(String),
    Reporter,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Worker(template) => write!(f, "worker '{template}'"),
            UnitId::Reporter => f.write_str("reporter"),
        }
    }
}

/// Event published on the monitor channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A host failed its probe after having been reachable (or unknown)
    PossibleReset { entry: DownEntry, at: DateTime<Local> },

    /// A host that was down answered again
    Recovered { entry: DownEntry, at: DateTime<Local> },

    /// Periodic digest of the reporter
    Digest(StatusDigest),

    /// Supervisor's status block while down hosts exist
    Interim(StatusDigest),

    /// Registry content when shutdown began
    FinalStatus(StatusDigest),

    /// Something went wrong with a unit of the run
    Anomaly(Anomaly),
}

/// Structural failure noticed by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "anomaly", rename_all = "snake_case")]
pub enum Anomaly {
    /// A unit ended without being asked to stop
    UnitFailed { unit: UnitId, reason: String },

    /// A unit did not finish within the join timeout
    JoinTimedOut { unit: UnitId },
}

impl Anomaly {
    pub fn unit(&self) -> &UnitId {
        match self {
            Anomaly::UnitFailed { unit, .. } | Anomaly::JoinTimedOut { unit } => unit,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::UnitFailed { unit, reason } => {
                write!(f, "{unit} finished unexpectedly: {reason}")
            }
            Anomaly::JoinTimedOut { unit } => write!(f, "{unit} did not stop in time"),
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::PossibleReset { entry, .. } => write!(
                f,
                "TEAM {} - HOST {} - POSSIBLE BOX RESET",
                entry.team, entry.host
            ),
            MonitorEvent::Recovered { entry, .. } => {
                write!(f, "TEAM {} - HOST {} - RECOVERED", entry.team, entry.host)
            }
            MonitorEvent::Digest(digest) => {
                let timestamp = digest.taken_at.format("%Y-%m-%d %H:%M:%S");
                if digest.all_up() {
                    return write!(f, "\n=== STATUS REPORT [{timestamp}]: All hosts are UP ===");
                }
                writeln!(
                    f,
                    "\n=== STATUS REPORT [{timestamp}]: {} hosts currently down ===",
                    digest.entries.len()
                )?;
                digest.write_entries(f)?;
                write!(f, "{}", "=".repeat(50))
            }
            MonitorEvent::Interim(digest) => {
                write!(f, "---------- HOSTS DOWN STATUS ----------")?;
                for DownEntry { team, host } in &digest.entries {
                    write!(f, "\n  TEAM {team} - {host}")?;
                }
                Ok(())
            }
            MonitorEvent::FinalStatus(digest) => {
                if digest.all_up() {
                    return write!(f, "\nFINAL STATUS: all hosts were up at shutdown");
                }
                writeln!(
                    f,
                    "\nFINAL STATUS: {} hosts were down at shutdown:",
                    digest.entries.len()
                )?;
                digest.write_entries(f)
            }
            MonitorEvent::Anomaly(anomaly) => write!(f, "Warning: {anomaly}"),
        }
    }
}
