//! Discovery phase: find the reference team's hosts and their open ports
//!
//! Scanning itself is delegated to an external RustScan binary. Its
//! greppable output (`-g`) has one line per host:
//!
//! ```text
//! 10.1.1.5 -> [22,80]
//! ```
//!
//! Every scan is bounded by a timeout; failures and timeouts yield an empty
//! result instead of an error so a partial discovery still produces files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ResolvedConfig;
use crate::inventory::{Inventory, save_hosts_file};
use crate::template::HostTemplate;
use crate::util::rustscan_suffix;

static GREPPABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s*->\s*\[([^\]]*)\]\s*$").expect("greppable line regex is valid")
});

/// External host/port scanner
#[async_trait]
pub trait DiscoveryScanner: Send + Sync {
    /// Hosts of `subnet` answering on any of `ports`
    async fn scan_subnet(&self, subnet: &str, ports: &[u16]) -> Vec<String>;

    /// Open ports of every host (all of `ports`, or the scanner's top ports
    /// when `ports` is empty)
    async fn scan_hosts(&self, hosts: &[String], ports: &[u16]) -> BTreeMap<String, Vec<u16>>;
}

/// Parse one greppable output line into the host and its port list
pub fn parse_greppable_line(line: &str) -> Option<(String, Vec<u16>)> {
    let captures = GREPPABLE_LINE.captures(line)?;
    let host = captures[1].to_string();

    let ports = captures[2]
        .split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<u16>, _>>()
        .ok()?;

    Some((host, ports))
}

/// Wrapper around the RustScan binary
#[derive(Debug, Clone)]
pub struct RustScan {
    binary: PathBuf,
    timeout: Duration,
}

impl RustScan {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Use `explicit` if given, else the bundled `./scanning/rustscan-<os>`
    pub fn locate(explicit: Option<&Path>, timeout: Duration) -> Result<Self> {
        let binary = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(suffix) = rustscan_suffix() else {
                    bail!("platform not supported: {}", std::env::consts::OS);
                };
                PathBuf::from(format!("./scanning/rustscan-{suffix}"))
            }
        };

        if !binary.exists() {
            bail!("RustScan binary not found at {}", binary.display());
        }

        Ok(Self::new(binary, timeout))
    }

    fn port_args(ports: &[u16]) -> Vec<String> {
        if ports.is_empty() {
            return vec![String::from("--top")];
        }
        let joined = ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        vec![String::from("-p"), joined]
    }

    /// Run the scanner, returning its stdout on success
    async fn execute(&self, target: &str, ports: &[u16]) -> Option<String> {
        let mut args = vec![String::from("-a"), target.to_string(), String::from("-g")];
        args.extend(Self::port_args(ports));

        info!("running: {} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output();

        match timeout(self.timeout, output).await {
            Ok(Ok(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => {
                error!(
                    "scan of {target} failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Ok(Err(e)) => {
                error!("error running scan of {target}: {e}");
                None
            }
            Err(_) => {
                error!("scan of {target} timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

#[async_trait]
impl DiscoveryScanner for RustScan {
    async fn scan_subnet(&self, subnet: &str, ports: &[u16]) -> Vec<String> {
        let Some(stdout) = self.execute(subnet, ports).await else {
            return Vec::new();
        };

        stdout
            .lines()
            .filter_map(parse_greppable_line)
            .map(|(host, _)| host)
            .collect()
    }

    async fn scan_hosts(&self, hosts: &[String], ports: &[u16]) -> BTreeMap<String, Vec<u16>> {
        let mut results = BTreeMap::new();

        for host in hosts {
            let Some(stdout) = self.execute(host, ports).await else {
                continue;
            };

            for (found, mut open) in stdout.lines().filter_map(parse_greppable_line) {
                if open.is_empty() {
                    continue;
                }
                open.sort_unstable();
                results.insert(found, open);
            }
        }

        results
    }
}

/// What a discovery run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Hosts found in the reference subnet
    pub hosts: usize,
    /// Templates written to the ports file
    pub templates: usize,
}

/// Scan the reference team and write the hosts and ports files
#[instrument(skip_all)]
pub async fn discover_and_populate(
    config: &ResolvedConfig,
    scanner: &dyn DiscoveryScanner,
) -> Result<DiscoverySummary> {
    let subnet = config.reference_subnet();
    info!("using reference subnet {subnet} for discovery");

    let hosts = scanner
        .scan_subnet(&subnet, &config.discovery.discovery_ports)
        .await;
    info!("found {} responsive hosts", hosts.len());

    let mut templates: Vec<HostTemplate> = hosts
        .iter()
        .filter_map(|host| to_template(config, host))
        .collect();
    templates.sort();
    templates.dedup();

    save_hosts_file(&config.hosts_file, &templates)
        .with_context(|| format!("failed to write {}", config.hosts_file.display()))?;

    let open_ports = scanner.scan_hosts(&hosts, &config.discovery.ports).await;

    let mut inventory = Inventory::new();
    for (host, ports) in open_ports {
        let Some(template) = to_template(config, &host) else {
            continue;
        };
        if let Err(e) = inventory.insert(template, ports) {
            warn!("skipping {host}: {e}");
        }
    }

    inventory
        .save(&config.ports_file)
        .with_context(|| format!("failed to write {}", config.ports_file.display()))?;

    debug!("wrote {} templates", inventory.len());
    Ok(DiscoverySummary {
        hosts: hosts.len(),
        templates: inventory.len(),
    })
}

fn to_template(config: &ResolvedConfig, host: &str) -> Option<HostTemplate> {
    HostTemplate::from_concrete(&config.host_pattern, host, config.reference_team)
        .inspect_err(|e| warn!("skipping host: {e}"))
        .ok()
}
