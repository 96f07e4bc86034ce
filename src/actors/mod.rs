//! Actor-based monitoring engine
//!
//! Each unit of a monitoring run is an independent tokio task. Units share
//! the down-host registry and a stop signal; everything operators see is
//! published on one broadcast channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!                       ┌───────────────────┐
//!                       │ MonitorSupervisor │ (caller's task)
//!                       └─────────┬─────────┘
//!                                 │ spawns, polls, joins
//!              ┌──────────────────┼──────────────────┐
//!              │                  │                  │
//!     ┌────────▼───────┐ ┌────────▼───────┐ ┌────────▼───────┐
//!     │ TemplateWorker │ │ TemplateWorker │ │ ReporterActor  │
//!     │ 10.{team}.1.5  │ │ 10.{team}.1.7  │ │ (every 30s)    │
//!     └────────┬───────┘ └────────┬───────┘ └────────┬───────┘
//!              │ report           │ report           │ snapshot
//!              └────────┬─────────┘                  │
//!             ┌─────────▼──────────┐                 │
//!             │  DownHostRegistry  │◄────────────────┘
//!             └─────────┬──────────┘
//!                       │ transitions
//!             ┌─────────▼──────────┐
//!             │ broadcast channel  │ (MonitorEvent)
//!             └────────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **TemplateWorker**: probes one host template for every team, forever
//! - **ReporterActor**: publishes a digest of the registry on a cadence
//! - **MonitorSupervisor**: lifecycle, health polling and shutdown

pub mod context;
pub mod messages;
pub mod reporter;
pub mod stop;
pub mod supervisor;
pub mod worker;
