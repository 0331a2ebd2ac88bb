//! CLI entry point for the netwatch presence monitor.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netwatch_store::Store;

use netwatch_monitor::config::MonitorConfig;
use netwatch_monitor::export::InfluxExporter;
use netwatch_monitor::resolve::ArpResolver;
use netwatch_monitor::scanner::NmapScanner;
use netwatch_monitor::scheduler::{run_cycle, run_daemon};

#[derive(Parser)]
#[command(name = "netwatch-monitor")]
#[command(about = "LAN presence monitor: tracks which devices are online over time")]
struct Cli {
    /// Network to sweep (CIDR notation, e.g., 192.168.0.0/24).
    #[arg(short, long)]
    network: Option<String>,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled cycles.
    #[arg(long)]
    daemon: bool,

    /// SQLite database path (default derived from the network).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Config file prefix (default: netwatch).
    #[arg(short, long, default_value = "netwatch")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut config = load_monitor_config(&cli.config)?;
    if let Some(network) = &cli.network {
        config.network = network.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }

    // Reject a bad CIDR up front rather than letting nmap guess.
    let target = config.target()?;
    tracing::info!(target = %target, "Monitoring network");

    // Verify nmap installation.
    let scanner = NmapScanner::new(&config.nmap_path);
    let version = scanner.verify_installation().await?;
    tracing::info!(nmap_version = %version.trim(), "Nmap verified");

    let store = Store::open(&config.database_path())?;
    let resolver = ArpResolver::new();

    let exporter = if config.influx.enabled {
        let exporter = InfluxExporter::new(&config.influx, &config.network);
        // Export is non-fatal end to end: a sink that is down at startup
        // must not stop presence tracking. Database creation is retried on
        // the first successful export.
        match exporter.ensure_database().await {
            Ok(()) => {
                tracing::info!(url = %config.influx.url, database = %config.influx.database, "Influx sink ready");
            }
            Err(e) => {
                tracing::warn!(url = %config.influx.url, error = %e, "Influx sink unavailable, will retry on export");
            }
        }
        Some(exporter)
    } else {
        None
    };

    if cli.once {
        run_cycle(&scanner, &resolver, &store, exporter.as_ref(), &config).await?;
    } else if cli.daemon {
        run_daemon(&scanner, &resolver, &store, exporter.as_ref(), &config).await?;
    } else {
        anyhow::bail!("Specify --once (single cycle) or --daemon (scheduled cycles)");
    }

    Ok(())
}

fn load_monitor_config(file_prefix: &str) -> anyhow::Result<MonitorConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NETWATCH_MONITOR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<MonitorConfig>("monitor") {
        Ok(c) => Ok(c),
        Err(_) => Ok(MonitorConfig::default()),
    }
}
