use clap::error::ErrorKind;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(
    name = "traffic-shaper",
    about = "Replay packet traces through leaky-bucket admission and tiered dispatch"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Log admission and dispatch decisions to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a scenario and print every decision
    Run(RunArgs),
    /// Print the parsed scenario
    ShowConfig(ConfigArgs),
    /// Print the validated controller configuration as JSON
    Export(ConfigArgs),
    /// Print the dispatch tiers in priority order
    ListTiers,
}

#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// Scenario file (.toml or .json)
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub format: FormatArg,
    /// Seed dispatch tie-breaks; omit to use the scenario's tie_break setting
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Summary,
    Json,
}

pub fn parse_args() -> Result<Args> {
    parse_args_from(std::env::args_os())
}

pub fn parse_args_from<I, T>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Args::try_parse_from(args).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => Error::Cli(err.to_string()),
    })
}

/// Installs the stderr log subscriber. `--verbose` forces debug level,
/// otherwise `RUST_LOG` applies with a `warn` default.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| Error::Output(format!("failed to install log subscriber: {}", err)))
}
