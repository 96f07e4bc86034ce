use std::sync::Arc;

use crate::config::{MonitorSettings, TeamRange};
use crate::probe::ReachabilityProbe;
use crate::registry::DownHostRegistry;

use super::stop::StopSignal;

/// State shared by every unit of one monitoring run
#[derive(Clone)]
pub struct RunContext {
    pub teams: TeamRange,
    pub settings: Arc<MonitorSettings>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub registry: DownHostRegistry,
    pub stop: StopSignal,
}

impl RunContext {
    pub fn new(
        teams: TeamRange,
        settings: MonitorSettings,
        probe: Arc<dyn ReachabilityProbe>,
        registry: DownHostRegistry,
    ) -> Self {
        Self {
            teams,
            settings: Arc::new(settings),
            probe,
            registry,
            stop: StopSignal::new(),
        }
    }
}
