mod bars;
mod batch;
mod moneyflow;
mod universe;

use std::sync::Arc;

use serde_json::Value;

use barvault_core::adapters::SyntheticProvider;
use barvault_core::{CacheStore, FetchConfig, FetchOrchestrator, MarketDataProvider, StoreConfig};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a command produced: the dataset, the status line, and whether the
/// dataset was fully served (drives `--strict`).
pub struct CommandReport {
    pub status: String,
    pub success: bool,
    pub data: Value,
}

pub async fn run(cli: &Cli) -> Result<CommandReport, CliError> {
    let store_config = match &cli.home {
        Some(home) => StoreConfig::at_home(home.clone()),
        None => StoreConfig::default(),
    };
    let store = CacheStore::open(store_config)?;
    let provider: Arc<dyn MarketDataProvider> = Arc::new(SyntheticProvider);
    let orchestrator = FetchOrchestrator::new(store, provider, FetchConfig::default());

    match &cli.command {
        Command::Bars(args) => bars::run(args, &orchestrator, bars::SeriesKind::Equity).await,
        Command::Index(args) => bars::run(args, &orchestrator, bars::SeriesKind::Index).await,
        Command::Moneyflow(args) => moneyflow::run(args, &orchestrator).await,
        Command::Batch(args) => batch::run(args, orchestrator).await,
        Command::Universe => universe::run(&orchestrator).await,
    }
}
