//! Command-line interface for hotswap.
use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log level names.
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let level = match value.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            other => return Err(format!("invalid log level '{other}'")),
        };
        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for hotswap.
#[derive(Parser)]
#[command(name = "hotswap", version, author)]
#[command(
    about = "Supervises a child executable and hot-swaps updated binaries from a staging directory",
    long_about = None
)]
pub struct Cli {
    /// Update check interval (e.g. "30s", "1m").
    #[arg(long, default_value = "1m", value_parser = parse_duration)]
    pub interval: Duration,

    /// Staging directory watched for new binaries.
    #[arg(long, default_value = "staging")]
    pub staging: PathBuf,

    /// Run as a platform service/daemon registered under this name.
    #[arg(long)]
    pub service: Option<String>,

    /// One-shot mode: switch the given binary from staging and exit.
    #[arg(long, value_name = "PATH")]
    pub update: Option<PathBuf>,

    /// Append the supervisor log to this file.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Append child stdout to this file.
    #[arg(long)]
    pub stdout: Option<PathBuf>,

    /// Append child stderr to this file.
    #[arg(long)]
    pub stderr: Option<PathBuf>,

    /// Copy the child to a temporary directory and supervise the copy.
    #[arg(long)]
    pub tmp: bool,

    /// Terminate the whole child process group, not just the child.
    #[arg(long)]
    pub tree: bool,

    /// Respawn the child whenever it exits, not only on update.
    #[arg(long)]
    pub restart: bool,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,

    /// Child executable followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_one_minute_and_staging_dir() {
        let cli = Cli::try_parse_from(["hotswap", "./child"]).expect("parse");
        assert_eq!(cli.interval, Duration::from_secs(60));
        assert_eq!(cli.staging, PathBuf::from("staging"));
        assert!(!cli.tmp && !cli.tree && !cli.restart);
        assert!(cli.service.is_none() && cli.update.is_none());
        assert_eq!(cli.command, ["./child"]);
    }

    #[test]
    fn interval_accepts_human_durations() {
        let cli = Cli::try_parse_from(["hotswap", "--interval", "90s", "./child"])
            .expect("parse");
        assert_eq!(cli.interval, Duration::from_secs(90));
    }

    #[test]
    fn child_args_pass_through_including_flags() {
        let cli = Cli::try_parse_from([
            "hotswap", "--restart", "./child", "--port", "8080", "-v",
        ])
        .expect("parse");
        assert!(cli.restart);
        assert_eq!(cli.command, ["./child", "--port", "8080", "-v"]);
    }

    #[test]
    fn update_mode_needs_no_child() {
        let cli = Cli::try_parse_from(["hotswap", "--update", "/opt/app/supervisor"])
            .expect("parse");
        assert_eq!(cli.update, Some(PathBuf::from("/opt/app/supervisor")));
        assert!(cli.command.is_empty());
    }

    #[test]
    fn log_level_rejects_garbage() {
        assert!("nope".parse::<LogLevelArg>().is_err());
        assert_eq!("WARN".parse::<LogLevelArg>().expect("parse").as_str(), "warn");
    }
}
