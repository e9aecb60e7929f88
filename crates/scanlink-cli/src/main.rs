//! Command-line driver for the scanlink DataWedge client.
//!
//! Runs every facade operation against the simulated DataWedge service and
//! prints the result as JSON on stdout. Logs go to stderr.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scanlink_core::config::env_vars;
use scanlink_datawedge::{ConfigureOptions, DataWedge, InitializeOptions};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::CliConfig;

/// scanlink - talk to DataWedge over broadcast intents.
#[derive(Parser, Debug)]
#[command(name = "scanlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Application package the profile is bound to.
    #[arg(short, long, global = true)]
    package: Option<String>,

    /// Simulate a device without DataWedge installed.
    #[arg(long, global = true)]
    absent: bool,

    /// Simulate a DataWedge release that does not echo command identifiers.
    #[arg(long, global = true)]
    untagged: bool,

    /// Deliver every simulated reply twice.
    #[arg(long, global = true)]
    duplicate: bool,

    /// Delay before simulated replies, in milliseconds.
    #[arg(long, global = true)]
    reply_delay_ms: Option<u64>,

    /// Lose simulated replies carrying this result key (repeatable).
    #[arg(long = "drop", global = true)]
    drop_results: Vec<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Query DataWedge status, scanner list and scanner status together.
    Availability {
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Check whether DataWedge is enabled.
    Ready {
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Check scanner status.
    Scanner {
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Show DataWedge version information.
    Version {
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Push the profile without waiting for DataWedge's answer.
    Init {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        intent_action: Option<String>,
    },
    /// Push a profile and wait for DataWedge to accept it.
    Configure {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        intent_action: Option<String>,
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Send a control command.
    Control {
        #[arg(value_enum)]
        action: ControlAction,
    },
    /// Push the profile, trigger simulated scans and print them.
    Scan {
        /// Barcode payloads to scan.
        #[arg(default_value = "0123456789012")]
        data: Vec<String>,
        #[arg(long, default_value = "LABEL-TYPE-EAN13")]
        label_type: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ControlAction {
    Enable,
    Disable,
    EnableScanner,
    DisableScanner,
    StartScanning,
    StopScanning,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = CliConfig::load(args.config.as_deref())?;
    apply_flags(&mut config, &args);
    debug!(config = ?config, "Loaded configuration");

    let sim = config.simulator.build();
    let (dw, task) = DataWedge::spawn(&config.package_name, config.engine.clone(), sim.clone())
        .context("Failed to start DataWedge client")?;
    sim.connect(dw.host().clone());

    let result = run(&dw, &sim, &config, args.command).await;

    dw.shutdown().await;
    let _ = task.await;
    result
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("scanlink={}", level))
            .add_directive(tracing::Level::WARN.into())
    });

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn apply_flags(config: &mut CliConfig, args: &Args) {
    if let Some(package) = &args.package {
        config.package_name = package.clone();
    }
    let sim = &mut config.simulator;
    if args.absent {
        sim.present = false;
    }
    if args.untagged {
        sim.echo_identifiers = false;
    }
    if args.duplicate {
        sim.duplicate = true;
    }
    if let Some(delay) = args.reply_delay_ms {
        sim.reply_delay_ms = delay;
    }
    sim.drop.extend(args.drop_results.iter().cloned());
}

async fn run(
    dw: &DataWedge,
    sim: &scanlink_datawedge::SimulatedDataWedge,
    config: &CliConfig,
    command: Command,
) -> Result<()> {
    match command {
        Command::Availability { timeout_ms } => print_json(&dw.get_availability(timeout_ms).await?),
        Command::Ready { timeout_ms } => print_json(&dw.is_ready(timeout_ms).await?),
        Command::Scanner { timeout_ms } => print_json(&dw.has_scanner(timeout_ms).await?),
        Command::Version { timeout_ms } => print_json(&dw.version_info(timeout_ms).await?),
        Command::Init {
            profile,
            intent_action,
        } => {
            let options = InitializeOptions {
                profile_name: profile.or_else(|| config.datawedge.profile_name.clone()),
                intent_action: intent_action.or_else(|| config.datawedge.intent_action.clone()),
                intent_category: config.datawedge.intent_category.clone(),
            };
            print_json(&dw.initialize(options).await?)
        }
        Command::Configure {
            profile,
            intent_action,
            timeout_ms,
        } => {
            let options = ConfigureOptions {
                profile_name: profile,
                intent_action,
                activities: None,
                timeout_ms,
            };
            print_json(&dw.configure(options).await?)
        }
        Command::Control { action } => {
            match action {
                ControlAction::Enable => dw.enable().await?,
                ControlAction::Disable => dw.disable().await?,
                ControlAction::EnableScanner => dw.enable_scanner().await?,
                ControlAction::DisableScanner => dw.disable_scanner().await?,
                ControlAction::StartScanning => dw.start_scanning().await?,
                ControlAction::StopScanning => dw.stop_scanning().await?,
            }
            info!(action = ?action, "Control command sent");
            print_json(&serde_json::json!({ "sent": format!("{:?}", action) }))
        }
        Command::Scan { data, label_type } => {
            let initialized = dw.initialize(config.datawedge.clone()).await?;
            info!(scan_action = %initialized.intent_action, "Listening for scans");

            let mut scans = dw.on_scan_result();
            for payload in &data {
                if !sim.trigger_scan(payload, &label_type).await {
                    anyhow::bail!("Simulated device is not configured for scanning");
                }
                let scan = tokio::time::timeout(Duration::from_secs(1), scans.recv())
                    .await
                    .context("Timed out waiting for scan")?
                    .context("Scan stream closed")?;
                println!("{}", serde_json::to_string(&scan)?);
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
