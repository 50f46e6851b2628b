use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "meshtune - online pair/mesh load balancing for particle-mesh simulations: scenario runs, tuning reports, and mesh utilities.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the load balancer against a synthetic simulation scenario and
    /// print the final settings report.
    Tune(TuneArgs),
    /// Compute transform-friendly mesh dimensions for a box and spacing.
    Mesh(MeshArgs),
}

/// Arguments for the `tune` subcommand.
#[derive(Args, Debug)]
pub struct TuneArgs {
    /// Path to a scenario file in TOML format; built-in defaults otherwise.
    #[arg(short, long, value_name = "PATH")]
    pub scenario: Option<PathBuf>,

    /// Cap on the number of simulated steps.
    #[arg(long, value_name = "NUM", default_value_t = 5000)]
    pub steps: u64,

    /// Seed for the synthetic timing noise.
    #[arg(long, value_name = "NUM", default_value_t = 17)]
    pub seed: u64,

    /// Write every warm timing sample to a CSV file.
    #[arg(long, value_name = "PATH")]
    pub timings: Option<PathBuf>,
}

/// Arguments for the `mesh` subcommand.
#[derive(Args, Debug)]
pub struct MeshArgs {
    /// Box edge lengths in nm.
    #[arg(long, value_name = "NM", num_args = 3, required = true)]
    pub edges: Vec<f64>,

    /// Maximum allowed mesh spacing in nm.
    #[arg(long, value_name = "NM")]
    pub spacing: f64,
}
