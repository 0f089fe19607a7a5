//! Snapshot command implementation

use crate::config::Config;
use crate::exchange::BinanceClient;
use crate::market::fetch_snapshot;
use crate::signal::raw_side;
use anyhow::Context;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Sum this many depth levels instead of using level-1 quantities
    #[arg(long)]
    pub depth: Option<usize>,
}

impl SnapshotArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(levels) = self.depth {
            config.exchange.use_depth = true;
            config.exchange.depth_levels = levels.max(1);
        }

        let client = BinanceClient::new(&config.exchange, None)
            .context("failed to build exchange client")?;
        let snapshot = fetch_snapshot(&client, &config.exchange, Utc::now())
            .await
            .context("failed to fetch snapshot")?;

        let side = raw_side(snapshot.imbalance, config.signal.threshold);
        println!("{} @ {}", config.exchange.symbol, snapshot.timestamp);
        println!("  Bid: {} x {}", snapshot.best_bid, snapshot.bid_qty);
        println!("  Ask: {} x {}", snapshot.best_ask, snapshot.ask_qty);
        println!("  Mid: {}  Spread: {}", snapshot.mid, snapshot.spread);
        println!(
            "  Imbalance: {:.6} (threshold {}) -> {}",
            snapshot.imbalance, config.signal.threshold, side
        );
        if let Err(problem) = snapshot.validate() {
            println!("  Book problem: {}", problem.as_str());
        }
        Ok(())
    }
}
