use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use fling::config::{Config, Overrides, Settings};
use fling::lifecycle::{self, Coordinator};
use fling::logging::{init_logging, LogConfig, Verbosity};
use fling::precheck::{ensure_privileged, ServeTarget};

#[derive(Parser)]
#[command(name = "fling")]
#[command(version)]
#[command(about = "Share a single file over HTTP")]
#[command(
    long_about = "Serve one file over HTTP on all interfaces, temporarily open the port in firewalld, and remove the rule again on exit."
)]
struct Cli {
    /// Path to the file to share
    file: PathBuf,

    /// Port to serve on and open in the firewall (default: 8080)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// firewalld zone to open the port in (default: public)
    #[arg(short, long)]
    zone: Option<String>,

    /// Don't touch the firewall (no root needed)
    #[arg(long)]
    no_firewall: bool,

    /// Announce localhost instead of the outward-facing IP
    #[arg(long)]
    localhost: bool,

    /// Address to listen on (default: 0.0.0.0)
    #[arg(long)]
    bind: Option<IpAddr>,

    /// firewall-cmd compatible executable to run
    #[arg(long, value_name = "PATH")]
    firewall_cmd: Option<String>,

    /// Config file (default: ~/.config/fling/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write debug logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // One line with the whole cause chain, e.g.
    // "Error: Sharing a.txt failed: Error starting server on 0.0.0.0:8080: Address in use"
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let settings = Settings::resolve(
        &config,
        Overrides {
            port: cli.port,
            zone: cli.zone,
            no_firewall: cli.no_firewall,
            localhost: cli.localhost,
            bind: cli.bind,
            firewall_cmd: cli.firewall_cmd,
            log_file: cli.log_file,
        },
    )?;

    let _log_guard = init_logging(&LogConfig {
        verbosity: Verbosity::from_flags(cli.quiet, cli.verbose),
        log_file: settings.log_file.clone(),
    });
    tracing::debug!(?settings, "Settings resolved");

    if settings.firewall {
        ensure_privileged()?;
    }

    let target = ServeTarget::resolve(&cli.file)?;

    let coordinator = Coordinator::from_settings(target, &settings);
    lifecycle::run(coordinator)
        .await
        .with_context(|| format!("Sharing {} failed", cli.file.display()))?;

    tracing::info!("Shut down cleanly");
    Ok(())
}
