//! CLI entry point for the lanscope-discover scanner.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use lanscope_core::Category;

use lanscope_discover::config::DiscoverConfig;
use lanscope_discover::orchestrator::ScanOrchestrator;
use lanscope_discover::pipeline::{DiscoveryPipeline, ScanCycle};

#[derive(Parser)]
#[command(name = "lanscope-discover")]
#[command(about = "Discover and classify devices on the local network")]
struct Cli {
    /// Range to scan (CIDR notation, e.g., 192.168.1.0/24). Defaults to the
    /// subnet of the default route.
    #[arg(short, long)]
    target: Option<String>,

    /// Run a single discovery cycle, print the snapshot as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Rescan continuously until interrupted.
    #[arg(long)]
    daemon: bool,

    /// With --once, print only this category (e.g. "IP Cameras").
    #[arg(long)]
    category: Option<String>,

    /// Config file prefix (default: lanscope).
    #[arg(short, long, default_value = "lanscope")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut config = DiscoverConfig::load(&cli.config)?;
    if let Some(target) = cli.target.as_deref() {
        config = config.with_target(target)?;
    }
    let category = cli
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()?;

    let pipeline = DiscoveryPipeline::from_config(&config)?;

    if cli.once {
        let snapshot = pipeline.run().await?;
        let out = match category {
            Some(c) => serde_json::to_string_pretty(snapshot.category(c))?,
            None => snapshot.to_json_pretty()?,
        };
        println!("{out}");
    } else if cli.daemon {
        let orchestrator = ScanOrchestrator::new(Arc::new(pipeline), config.scan_interval());
        orchestrator.start();

        tokio::signal::ctrl_c().await?;
        tracing::info!("Interrupt received, stopping scan loop");
        orchestrator.stop();

        let status = orchestrator.status();
        tracing::info!(
            devices = status.device_count,
            cycles = status.cycles_completed,
            "Scanner stopped"
        );
    } else {
        anyhow::bail!("Specify --once (single scan) or --daemon (continuous scanning)");
    }

    Ok(())
}
