use clap::{Args, Parser, Subcommand, ValueEnum};
use osrw::engine::config::SyncMode;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "OSRW Developers",
    version,
    about = "OSRW CLI - Orthogonal Space Random Walk free-energy sampling and histogram analysis.",
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

    /// Set the number of threads for free-energy integration.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run OSRW-biased dynamics on the harmonic model with one or more walkers.
    Walk(WalkArgs),
    /// Compute the free-energy profile stored in a histogram restart file.
    Profile(ProfileArgs),
}

/// How walkers exchange observations.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Blocking collective every count interval.
    Sync,
    /// Background receiver thread per walker.
    Async,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sync => SyncMode::Synchronous,
            ModeArg::Async => SyncMode::Asynchronous,
        }
    }
}

/// Arguments for the `walk` subcommand.
#[derive(Args, Debug)]
pub struct WalkArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Run Overrides ---
    /// Override the number of integration steps per walker.
    #[arg(short = 'n', long, value_name = "INT")]
    pub steps: Option<u64>,

    /// Override the number of cooperating walkers.
    #[arg(short, long, value_name = "INT")]
    pub walkers: Option<usize>,

    /// Override how walkers share their observations.
    #[arg(long, value_enum, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Override the seed of the lambda particle and coordinate noise.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Restart Files ---
    /// Histogram restart file, read at start-up and written by the root walker.
    #[arg(long = "histogram", value_name = "PATH")]
    pub histogram: Option<PathBuf>,

    /// Prefix of the per-walker lambda restart files (`<PREFIX>-<RANK>.lam`).
    #[arg(long, value_name = "PATH")]
    pub lambda_prefix: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S osrw.count-interval=5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `profile` subcommand.
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Path to the histogram restart file.
    #[arg(value_name = "HISTOGRAM")]
    pub histogram: PathBuf,

    /// Reweight at this temperature instead of the one stored in the file.
    #[arg(short, long, value_name = "KELVIN")]
    pub temperature: Option<f64>,

    /// Also write the per-bin table as CSV.
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,
}
