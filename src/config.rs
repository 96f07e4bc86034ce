use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::error::ConfigError;
use crate::template::{HostTemplate, placeholder_token};

/// Raw configuration file (YAML)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub hosts: HostsConfig,

    pub scan: ScanConfig,

    #[serde(default)]
    pub port_checker: PortCheckerConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Seconds between two status digests
    #[serde(default = "default_report_interval")]
    pub report_interval: f64,

    /// Fine tuning of the monitoring loops (optional)
    #[serde(default)]
    pub monitor: MonitorTuning,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostsConfig {
    /// Subnet pattern of a team, e.g. `10.{team}.1.0/24`
    pub host_pattern: String,
    pub teams: TeamsConfig,
    /// Team whose subnet is scanned during discovery
    pub reference_team: u32,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_hosts_file")]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct TeamsConfig {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub discovery_ports: Vec<u16>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default = "default_ports_file")]
    pub file: PathBuf,
    /// Explicit path of the RustScan binary
    pub rustscan: Option<PathBuf>,
    #[serde(default = "default_scan_timeout")]
    pub timeout: f64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PortCheckerConfig {
    /// Connect timeout per port, in seconds
    #[serde(default = "default_probe_timeout")]
    pub timeout: f64,
}

impl Default for PortCheckerConfig {
    fn default() -> Self {
        Self {
            timeout: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExecutionConfig {
    /// Worker threads of the async runtime
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct MonitorTuning {
    pub cycle_pause: f64,
    pub fault_backoff: f64,
    pub fault_retries: u32,
    pub health_poll_interval: f64,
    pub join_timeout: f64,
    pub final_digest: bool,
}

impl Default for MonitorTuning {
    fn default() -> Self {
        Self {
            cycle_pause: 0.1,
            fault_backoff: 1.0,
            fault_retries: 1,
            health_poll_interval: 30.0,
            join_timeout: 5.0,
            final_digest: false,
        }
    }
}

fn default_report_interval() -> f64 {
    30.0
}

fn default_placeholder() -> String {
    String::from("team")
}

fn default_hosts_file() -> PathBuf {
    PathBuf::from("hosts.txt")
}

fn default_ports_file() -> PathBuf {
    PathBuf::from("ports.json")
}

fn default_scan_timeout() -> f64 {
    300.0
}

fn default_probe_timeout() -> f64 {
    3.0
}

fn default_max_workers() -> usize {
    4
}

/// Closed range of team numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamRange {
    start: u32,
    end: u32,
}

impl TeamRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvalidTeamRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, team: u32) -> bool {
        (self.start..=self.end).contains(&team)
    }

    /// Teams in increasing order
    pub fn iter(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Timeouts and cadences of a monitoring run
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Connect timeout per port
    pub probe_timeout: Duration,
    /// Pause between two cycles of a worker
    pub cycle_pause: Duration,
    /// Pause after a failed probe before trying again
    pub fault_backoff: Duration,
    /// How often a failing probe is retried at the same team before moving on
    pub fault_retries: u32,
    pub report_interval: Duration,
    pub health_poll_interval: Duration,
    pub join_timeout: Duration,
    /// Let the reporter publish one last digest when stopping
    pub final_digest: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            cycle_pause: Duration::from_millis(100),
            fault_backoff: Duration::from_secs(1),
            fault_retries: 1,
            report_interval: Duration::from_secs(30),
            health_poll_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
            final_digest: false,
        }
    }
}

/// Settings of the discovery phase
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub discovery_ports: Vec<u16>,
    pub ports: Vec<u16>,
    pub rustscan: Option<PathBuf>,
    pub timeout: Duration,
}

/// Validated configuration, passed down explicitly to every component
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub host_pattern: HostTemplate,
    pub teams: TeamRange,
    pub reference_team: u32,
    pub hosts_file: PathBuf,
    pub ports_file: PathBuf,
    pub discovery: DiscoverySettings,
    pub monitor: MonitorSettings,
    pub max_workers: usize,
}

impl ResolvedConfig {
    /// The placeholder token shared by the pattern and every host template
    pub fn token(&self) -> &str {
        self.host_pattern.token()
    }

    /// The reference team's subnet, scanned during discovery
    pub fn reference_subnet(&self) -> String {
        self.host_pattern.render(self.reference_team)
    }
}

impl Config {
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate the raw values and turn them into typed settings
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let teams = TeamRange::new(self.hosts.teams.start, self.hosts.teams.end)?;

        if !teams.contains(self.hosts.reference_team) {
            return Err(ConfigError::ReferenceTeamOutOfRange {
                team: self.hosts.reference_team,
                start: teams.start(),
                end: teams.end(),
            });
        }

        let token = placeholder_token(&self.hosts.placeholder);
        let host_pattern = HostTemplate::parse(self.hosts.host_pattern, &token)?;

        let tuning = &self.monitor;
        let monitor = MonitorSettings {
            probe_timeout: seconds("port_checker.timeout", self.port_checker.timeout)?,
            cycle_pause: seconds("monitor.cycle_pause", tuning.cycle_pause)?,
            fault_backoff: seconds("monitor.fault_backoff", tuning.fault_backoff)?,
            fault_retries: tuning.fault_retries,
            report_interval: seconds("report_interval", self.report_interval)?,
            health_poll_interval: seconds(
                "monitor.health_poll_interval",
                tuning.health_poll_interval,
            )?,
            join_timeout: seconds("monitor.join_timeout", tuning.join_timeout)?,
            final_digest: tuning.final_digest,
        };

        let discovery = DiscoverySettings {
            discovery_ports: self.scan.discovery_ports,
            ports: self.scan.ports,
            rustscan: self.scan.rustscan,
            timeout: seconds("scan.timeout", self.scan.timeout)?,
        };

        Ok(ResolvedConfig {
            host_pattern,
            teams,
            reference_team: self.hosts.reference_team,
            hosts_file: self.hosts.file,
            ports_file: self.scan.file,
            discovery,
            monitor,
            max_workers: self.execution.max_workers.max(1),
        })
    }
}

/// Upper bound for every configured duration (one year)
const MAX_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !(value > 0.0 && value <= MAX_SECONDS) {
        return Err(ConfigError::InvalidDuration { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { field, value })
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_yaml_str(&content, path).inspect(|config| trace!("loaded config: {config:?}"))
}

/// Read and validate a configuration file in one go
pub fn load_config(path: impl AsRef<Path>) -> Result<ResolvedConfig, ConfigError> {
    read_config_file(path)?.resolve()
}
