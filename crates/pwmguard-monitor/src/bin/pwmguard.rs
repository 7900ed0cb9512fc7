//! pwmguard CLI: run the PWM monitor harnesses

use clap::{Parser, Subcommand};
use env_logger::Env;
use pwmguard_monitor::{run_fault_injection, run_nominal, HarnessConfig, HarnessError};
use serde::Serialize;
use snafu::Snafu;
use std::path::PathBuf;

/// CLI errors for the pwmguard binary.
#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("{source}"), context(false))]
    Harness { source: HarnessError },
    #[snafu(display("JSON error: {source}"), context(false))]
    Json { source: serde_json::Error },
}

#[derive(Parser)]
#[command(name = "pwmguard")]
#[command(about = "Runtime verification and fault injection for a PWM H-bridge controller")]
#[command(version)]
struct Cli {
    /// JSON configuration file (missing fields take defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seed for the random stimulus
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the device with valid stimulus; fail on any violation
    Nominal,

    /// Inject every fault scenario; fail if one goes undetected
    Faults {
        /// Also run the static-enable timeout scenario (long)
        #[arg(long)]
        include_timeout: bool,
    },

    /// Nominal run followed by the fault-injection run
    All {
        /// Also run the static-enable timeout scenario (long)
        #[arg(long)]
        include_timeout: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Nominal => cmd_nominal(&config, cli.json),
        Commands::Faults { include_timeout } => cmd_faults(config, include_timeout, cli.json),
        Commands::All { include_timeout } => {
            cmd_nominal(&config, cli.json)?;
            cmd_faults(config, include_timeout, cli.json)
        }
    }
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    Ok(config)
}

fn cmd_nominal(config: &HarnessConfig, json: bool) -> Result<(), CliError> {
    let report = run_nominal(config)?;
    print_report(&report, json)
}

fn cmd_faults(mut config: HarnessConfig, include_timeout: bool, json: bool) -> Result<(), CliError> {
    config.include_timeout_scenario |= include_timeout;
    let report = run_fault_injection(&config)?;
    print_report(&report, json)
}

fn print_report<R: Serialize + std::fmt::Display>(report: &R, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}
