//! CLI interface for obi-taker
//!
//! Provides subcommands for:
//! - `run`: Start the polling loop (paper or live)
//! - `snapshot`: Fetch one snapshot and print its imbalance
//! - `config`: Print the effective configuration

mod run;
mod snapshot;

pub use run::RunArgs;
pub use snapshot::SnapshotArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "obi-taker")]
#[command(about = "Order-book imbalance market-taking bot for Binance spot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trading loop
    Run(RunArgs),
    /// Fetch one snapshot, no trading
    Snapshot(SnapshotArgs),
    /// Show effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "obi-taker",
            "-c",
            "custom.toml",
            "run",
            "--max-polls",
            "25",
            "--output",
            "out/run.csv",
        ]);
        assert_eq!(cli.config, "custom.toml");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.max_polls, Some(25));
                assert_eq!(args.output.as_deref(), Some(std::path::Path::new("out/run.csv")));
                assert!(!args.paper);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["obi-taker", "config"]);
        assert_eq!(cli.config, "config.toml");
        assert!(matches!(cli.command, Commands::Config));
    }
}
