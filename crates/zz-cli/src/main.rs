//! ZZ→4ℓ differential cross-section unfolding CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zz_core::Channel;

mod condition;
mod run;
mod vars;

#[derive(Parser)]
#[command(name = "zzunfold")]
#[command(about = "ZZ->4l differential cross-section unfolding")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full unfolded measurement with all systematic variations
    Unfold {
        /// Recorded-data directory ({dir}/{channel}/{region}/*.json)
        #[arg(long)]
        data_dir: PathBuf,

        /// Simulation directory (same layout, plus gen and signal_{syst})
        #[arg(long)]
        mc_dir: PathBuf,

        /// Alternate-generator signal MC directory
        #[arg(long)]
        alt_mc_dir: Option<PathBuf>,

        /// Pileup weight table (JSON)
        #[arg(long)]
        pileup: PathBuf,

        /// Electron fake-factor table (JSON)
        #[arg(long)]
        electron_fake_factors: PathBuf,

        /// Muon fake-factor table (JSON)
        #[arg(long)]
        muon_fake_factors: PathBuf,

        /// Directory for persisted unfolded results
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Integrated luminosity in /pb
        #[arg(long, default_value = "35900")]
        lumi: f64,

        /// Number of unfolding iterations
        #[arg(long, default_value = "8")]
        iterations: usize,

        /// Variables to measure (defaults to the full catalog)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,

        /// Channels to include
        #[arg(long, value_delimiter = ',', value_parser = parse_channel,
              default_values = ["eeee", "eemm", "mmmm"])]
        channels: Vec<Channel>,

        /// Report absolute yields instead of unit-normalised shapes
        #[arg(long)]
        no_normalize: bool,

        /// Recompute everything, ignoring cached results
        #[arg(long)]
        force: bool,

        /// Output file for the report (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report response-matrix diagnostics (condition number, purity,
    /// stability) without unfolding
    Condition {
        /// Simulation directory
        #[arg(long)]
        mc_dir: PathBuf,

        /// Pileup weight table (JSON)
        #[arg(long)]
        pileup: PathBuf,

        /// Integrated luminosity in /pb
        #[arg(long, default_value = "35900")]
        lumi: f64,

        /// Variables to inspect (defaults to the full catalog)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,

        /// Channels to include
        #[arg(long, value_delimiter = ',', value_parser = parse_channel,
              default_values = ["eeee", "eemm", "mmmm"])]
        channels: Vec<Channel>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    Channel::parse(s).map_err(|e| e.to_string())
}

fn default_variables(requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        vars::VARIABLES.iter().map(|s| s.to_string()).collect()
    } else {
        requested
    }
}

fn write_report<T: serde::Serialize>(report: &T, output: Option<&PathBuf>) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Unfold {
            data_dir,
            mc_dir,
            alt_mc_dir,
            pileup,
            electron_fake_factors,
            muon_fake_factors,
            store_dir,
            lumi,
            iterations,
            variables,
            channels,
            no_normalize,
            force,
            output,
        } => {
            let cfg = run::UnfoldConfig {
                data_dir,
                mc_dir,
                alt_mc_dir,
                pileup_file: pileup,
                electron_fake_factors,
                muon_fake_factors,
                store_dir,
                int_lumi: lumi,
                n_iterations: iterations,
                variables: default_variables(variables),
                channels,
                normalize: !no_normalize,
                force,
            };
            let reports = run::run_unfold(&cfg)?;
            write_report(&reports, output.as_ref())
        }
        Commands::Condition { mc_dir, pileup, lumi, variables, channels, output } => {
            let reports = condition::run_condition(
                &mc_dir,
                &pileup,
                lumi,
                &default_variables(variables),
                &channels,
            )?;
            write_report(&reports, output.as_ref())
        }
    }
}
