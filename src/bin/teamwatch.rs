use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use teamwatch::{
    actors::{
        messages::MonitorEvent,
        supervisor::{MonitorSupervisor, StopReason},
    },
    config::{ResolvedConfig, load_config},
    discovery::{RustScan, discover_and_populate},
    inventory::Inventory,
    probe::TcpProbe,
    util::get_config_path,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Host discovery and team-wide box reset checker
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run discovery and scan
    #[arg(short, long)]
    discover_and_scan: bool,

    /// Run reset check on existing hosts
    #[arg(short, long)]
    reset_check: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    dotenv::dotenv().ok();

    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![("teamwatch", level)]);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let path = args.config.clone().unwrap_or_else(get_config_path);
    if !path.exists() {
        anyhow::bail!("config file '{}' not found", path.display());
    }
    let config = load_config(&path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.max_workers)
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(dispatch(args, config))
}

async fn dispatch(args: Args, config: ResolvedConfig) -> anyhow::Result<()> {
    if args.discover_and_scan {
        println!("Running discovery and scan...");
        match discover(&config).await {
            Ok(()) => println!("\nDiscovery and scan completed successfully!"),
            Err(e) => {
                error!("discovery failed: {e:#}");
                println!("\nDiscovery and scan failed!");
            }
        }
    }

    if args.reset_check {
        println!("Running reset check...");
        return reset_check(config).await;
    }

    if !args.discover_and_scan {
        Args::command().print_help()?;
        println!("\nExamples:");
        println!("  teamwatch --discover-and-scan");
        println!("  teamwatch --reset-check");
        println!("  teamwatch --config custom.yaml --discover-and-scan");
    }

    Ok(())
}

async fn discover(config: &ResolvedConfig) -> anyhow::Result<()> {
    let scanner = RustScan::locate(config.discovery.rustscan.as_deref(), config.discovery.timeout)?;
    let summary = discover_and_populate(config, &scanner).await?;
    info!(
        "discovered {} hosts, {} templates written to {}",
        summary.hosts,
        summary.templates,
        config.ports_file.display()
    );
    Ok(())
}

async fn reset_check(config: ResolvedConfig) -> anyhow::Result<()> {
    let inventory = Inventory::load_for_monitoring(&config.ports_file, config.token())?;
    println!(
        "Loaded ports for {} hosts from {}",
        inventory.len(),
        config.ports_file.display()
    );

    let probe = Arc::new(TcpProbe::new(config.monitor.probe_timeout));
    let mut supervisor =
        MonitorSupervisor::new(inventory, config.teams, config.monitor.clone(), probe);

    let printer = tokio::spawn(print_events(supervisor.subscribe()));

    println!("Monitoring active hosts... Press Ctrl+C to stop");
    let report = supervisor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    // the supervisor owns the last sender; dropping it ends the printer
    drop(supervisor);
    match tokio::time::timeout(Duration::from_secs(1), printer).await {
        Ok(Err(e)) => warn!("event printer failed: {e}"),
        Err(_) => debug!("event printer still draining, leaving it behind"),
        Ok(Ok(())) => {}
    }

    match report.reason {
        StopReason::Interrupted => println!("\nReset check stopped by user (Ctrl+C)"),
        StopReason::UnitFailed(unit) => println!("\nReset check stopped: {unit} failed"),
    }
    if !report.anomalies.is_empty() {
        println!("{} shutdown anomalies:", report.anomalies.len());
        for anomaly in &report.anomalies {
            println!("  {anomaly}");
        }
    }
    println!("All threads stopped. Exiting gracefully...");

    Ok(())
}

/// Write operator-facing events to stdout
async fn print_events(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{event}"),
            Err(RecvError::Lagged(skipped)) => warn!("console lagged, skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    }
    debug!("event printer stopped");
}
