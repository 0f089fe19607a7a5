//! Run command implementation

use crate::config::{Config, ExecutionMode};
use crate::data::CsvRecorder;
use crate::engine::{Controller, RunSummary};
use crate::exchange::{BinanceClient, Credentials};
use anyhow::Context;
use clap::Args;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop after this many polls (0 = until interrupted)
    #[arg(long)]
    pub max_polls: Option<u64>,

    /// Output CSV path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Force paper trading regardless of configuration
    #[arg(long)]
    pub paper: bool,
}

impl RunArgs {
    /// Fold command-line flags into the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(max_polls) = self.max_polls {
            config.resilience.max_polls = max_polls;
        }
        if let Some(output) = &self.output {
            config.data.output_path = output.clone();
        }
        if self.paper {
            config.execution.mode = ExecutionMode::Paper;
        }
    }

    pub async fn execute(&self, mut config: Config) -> anyhow::Result<RunSummary> {
        self.apply(&mut config);

        let credentials = Credentials::from_env();
        if config.execution.mode == ExecutionMode::Live && credentials.is_none() {
            anyhow::bail!(
                "live mode needs BINANCE_TESTNET_API_KEY and BINANCE_TESTNET_API_SECRET"
            );
        }

        let client = BinanceClient::new(&config.exchange, credentials)
            .context("failed to build exchange client")?;
        client
            .ping()
            .await
            .with_context(|| format!("exchange unreachable at {}", config.exchange.base_url))?;

        let recorder = CsvRecorder::open(&config.data.output_path).with_context(|| {
            format!(
                "failed to open output file {}",
                config.data.output_path.display()
            )
        })?;
        tracing::info!(
            output = %recorder.path().display(),
            mode = ?config.execution.mode,
            authenticated = client.has_credentials(),
            "Output recorder ready"
        );

        let signal = shutdown_signal().context("failed to install signal handlers")?;
        let shutdown_rx = forward_shutdown(signal);

        let mut controller = Controller::new(config, Arc::new(client), Box::new(recorder));
        Ok(controller.run(shutdown_rx).await)
    }
}

/// Resolves with the signal name on SIGINT or SIGTERM
///
/// Handlers are installed before this returns.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handler failed");
                std::future::pending::<&'static str>().await
            }
        }
    })
}

/// Raise the shutdown flag once `signal` resolves
fn forward_shutdown<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = &'static str> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let name = signal.await;
        tracing::info!(signal = name, "Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
    shutdown_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_forwarded_signal_raises_shutdown() {
        let (fire, fired) = tokio::sync::oneshot::channel::<()>();
        let mut rx = forward_shutdown(async move {
            let _ = fired.await;
            "test"
        });
        assert!(!*rx.borrow());

        fire.send(()).unwrap();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_raises_shutdown() {
        let mut rx = forward_shutdown(shutdown_signal().unwrap());

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.execution.mode = ExecutionMode::Live;
        let args = RunArgs {
            max_polls: Some(10),
            output: Some(PathBuf::from("tmp/out.csv")),
            paper: true,
        };
        args.apply(&mut config);
        assert_eq!(config.resilience.max_polls, 10);
        assert_eq!(config.data.output_path, PathBuf::from("tmp/out.csv"));
        assert_eq!(config.execution.mode, ExecutionMode::Paper);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = Config::default();
        config.resilience.max_polls = 7;
        let args = RunArgs {
            max_polls: None,
            output: None,
            paper: false,
        };
        args.apply(&mut config);
        assert_eq!(config.resilience.max_polls, 7);
        assert_eq!(config.execution.mode, ExecutionMode::Paper);
    }
}
