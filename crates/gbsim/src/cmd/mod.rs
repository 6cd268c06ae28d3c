use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use gbsim_protocol::BackendKind;
use gbsim_transport::FunctionFs;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod inspect;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the simulator on a FunctionFS gadget.
    Run(RunArgs),
    /// Print configured modules and CPort bindings.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, verbose: bool) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, verbose),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Side effects applied by protocol handlers.
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum BackendArg {
    /// Answer requests only.
    #[default]
    None,
    /// Keep channel and line state in memory.
    Simulated,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::None => BackendKind::None,
            BackendArg::Simulated => BackendKind::Simulated,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Module configuration file (JSON).
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,
    /// FunctionFS mount point holding ep0, ep1, ...
    #[arg(long, value_name = "DIR", default_value = FunctionFs::DEFAULT_PREFIX)]
    pub ffs_prefix: PathBuf,
    /// Handler backend.
    #[arg(long, value_enum, default_value = "none")]
    pub backend: BackendArg,
    /// Number of bulk in/out endpoint pairs carrying CPort traffic.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..))]
    pub data_endpoints: u8,
    /// Longest wait between stop checks (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub poll_interval: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Module configuration file (JSON).
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration(" ").is_err());
    }
}
