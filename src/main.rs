use clap::Parser;
use obi_taker::cli::{Cli, Commands};
use obi_taker::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Missing file falls back to defaults; a malformed one is fatal
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(obi_taker::config::ConfigError::Read { .. }) => {
            eprintln!("Warning: could not read {}, using defaults", cli.config);
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };
    let config = config.with_env_overrides()?;

    let _telemetry = obi_taker::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(mode = ?config.execution.mode, "Starting trading loop");
            let summary = args.execute(config).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Snapshot(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
