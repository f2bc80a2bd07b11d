use clap::{Args, Parser, Subcommand};
use statdyn::engine::config::BoxPolicy;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Malcolm Ramsay",
    version,
    about = "sdrun - Dynamics analysis of molecular-dynamics trajectories: displacement statistics, relaxation times and per-particle mobility features.",
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

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze the dynamics of a trajectory and write curves, relaxation times and features.
    Dynamics(DynamicsArgs),
    /// Print the timesteps a simulation should dump for multi-origin log-spaced analysis.
    Steps(StepsArgs),
}

/// Arguments for the `dynamics` subcommand.
#[derive(Args, Debug)]
pub struct DynamicsArgs {
    // --- Core Arguments ---
    /// Path to the input trajectory in extended XYZ format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Directory the results are written to (created if missing).
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Path to the analysis configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    // --- Displacement Overrides ---
    /// Override the spatial dimensionality (2 or 3).
    #[arg(short, long, value_name = "INT")]
    pub dimensions: Option<u8>,

    /// Override how periodic boundaries are resolved (origin-box, averaged-box, image-flags).
    #[arg(long, value_name = "POLICY")]
    pub box_policy: Option<BoxPolicy>,

    /// Analyze only the first N particles, such as the centres of rigid bodies.
    #[arg(long, value_name = "N")]
    pub particles: Option<usize>,

    /// Override `displacement.remove-drift` from the config file.
    #[command(flatten)]
    pub drift: DriftRemoval,

    // --- Observable Overrides ---
    /// Override the displacement distance separating mobile from immobile particles.
    #[arg(short, long, value_name = "FLOAT")]
    pub mobility_threshold: Option<f64>,

    /// Override the value a decaying curve must cross to define a relaxation time.
    #[arg(short, long, value_name = "FLOAT")]
    pub relaxation_threshold: Option<f64>,

    // --- Sampling Overrides ---
    /// Override the maximum number of time origins averaged per lag.
    #[arg(long, value_name = "INT")]
    pub max_origins: Option<usize>,

    /// Override the lag at which per-particle features are extracted.
    #[arg(long, value_name = "TIMESTEPS", conflicts_with = "no_features")]
    pub reference_lag: Option<u64>,

    /// Skip per-particle feature extraction, even if it is defined in the config file.
    #[arg(long)]
    pub no_features: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S sampling.min-origins=4
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// A group to handle mutually exclusive boolean flags for centre-of-mass drift removal.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = false, multiple = false)]
pub struct DriftRemoval {
    /// Subtract the mean displacement of all particles before computing statistics.
    #[arg(long)]
    pub remove_drift: bool,
    /// Keep the mean displacement of all particles.
    #[arg(long)]
    pub keep_drift: bool,
}

/// Arguments for the `steps` subcommand.
#[derive(Args, Debug)]
pub struct StepsArgs {
    /// Total number of timesteps of the simulation.
    #[arg(short, long, required = true, value_name = "INT")]
    pub total_steps: u64,

    /// Number of linearly spaced steps within each decade.
    #[arg(long, default_value_t = 9, value_name = "INT")]
    pub num_linear: u64,

    /// Spacing between consecutive time origins.
    #[arg(long, default_value_t = 20_000, value_name = "INT")]
    pub gen_steps: u64,

    /// Maximum number of time origins.
    #[arg(long, default_value_t = 500, value_name = "INT")]
    pub max_gen: usize,

    /// Also print the indices of the origins needing each timestep.
    #[arg(long)]
    pub with_origins: bool,

    /// Write the steps to a file instead of standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
