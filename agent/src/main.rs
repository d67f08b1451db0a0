use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use presence_common::{config::CONFIG_TEMPLATE, AppConfig, ConfigFile};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Switch a thermostat between schedule and away depending on which devices are on the network.
#[derive(Parser, Debug)]
#[command(name = "netatmo-presence")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the KEY=VALUE configuration file.
    #[arg(value_name = "CONFIG_FILE", required_unless_present = "print_config")]
    config_file: Option<PathBuf>,

    /// Print a configuration template and exit.
    #[arg(long = "config")]
    print_config: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{CONFIG_TEMPLATE}");
        return Ok(());
    }

    init_tracing(args.verbose);

    let path = args.config_file.context("no configuration file given")?;
    let file = ConfigFile::load(&path)?;
    for key in file.unknown_keys() {
        warn!(key, "ignoring unknown config key");
    }
    let config = AppConfig::from_file(&file)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    info!(
        path = %path.display(),
        clients = config.unifi.clients.len(),
        "configuration loaded"
    );

    let outcome = presence_agent::run(&config).await?;
    println!("{outcome}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,presence_agent={level},netatmo_presence={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
