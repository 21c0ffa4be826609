//! CLI argument definitions for barvault.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bars` | Read-through fetch of equity daily bars |
//! | `index` | Read-through fetch of index daily bars |
//! | `moneyflow` | Read-through fetch of money-flow rows for a window |
//! | `batch` | Bounded-concurrency backfill across instruments |
//! | `universe` | List the tradable instrument universe |
//!
//! Dates are `YYYYMMDD`. Every fetch command prints the dataset plus a status
//! line explaining how it was served; `--strict` turns non-served statuses
//! into a failing exit code for pipelines.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Read-through cache for daily market data.
///
/// Serves price bars, index values, and money-flow aggregates from a local
/// DuckDB cache, backfilling gaps from the remote source with conflict-safe
/// merging. Cached history is never silently rewritten.
#[derive(Debug, Parser)]
#[command(name = "barvault", author, version, about)]
pub struct Cli {
    /// Cache home directory (defaults to $BARVAULT_HOME, then ~/.barvault).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Fail (exit code 5) when the dataset was not fully served.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch equity daily bars for one instrument.
    ///
    /// # Examples
    ///
    ///   barvault bars 600000.SH --start 20240102 --end 20240131
    Bars(SeriesArgs),

    /// Fetch index daily bars for one instrument.
    ///
    /// Index series carry a fixed adjustment factor of 1.0.
    Index(SeriesArgs),

    /// Fetch money-flow rows for every instrument in a bounded window.
    Moneyflow(MoneyflowArgs),

    /// Backfill many instruments concurrently.
    ///
    /// # Examples
    ///
    ///   barvault batch 600000.SH 000001.SZ --start 20240102 --end 20240131
    ///   barvault batch --universe --start 20240102 --end 20240131
    Batch(BatchArgs),

    /// List the tradable instrument universe.
    Universe,
}

/// Arguments shared by the `bars` and `index` commands.
#[derive(Debug, Args)]
pub struct SeriesArgs {
    /// Instrument code, `CODE.VENUE` (e.g. 600000.SH).
    pub instrument: String,

    /// Inclusive window start, YYYYMMDD.
    #[arg(long)]
    pub start: Option<String>,

    /// Inclusive window end, YYYYMMDD.
    #[arg(long)]
    pub end: Option<String>,
}

/// Arguments for the `moneyflow` command. The upstream endpoint is
/// day-scoped, so both bounds are mandatory.
#[derive(Debug, Args)]
pub struct MoneyflowArgs {
    /// Inclusive window start, YYYYMMDD.
    #[arg(long)]
    pub start: String,

    /// Inclusive window end, YYYYMMDD.
    #[arg(long)]
    pub end: String,
}

/// Arguments for the `batch` command.
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Instrument codes to backfill. Omit with --universe to use the
    /// tradable universe instead.
    #[arg(num_args = 0..)]
    pub instruments: Vec<String>,

    /// Backfill the whole tradable universe.
    #[arg(long, default_value_t = false, conflicts_with = "instruments")]
    pub universe: bool,

    /// Inclusive window start, YYYYMMDD.
    #[arg(long)]
    pub start: Option<String>,

    /// Inclusive window end, YYYYMMDD.
    #[arg(long)]
    pub end: Option<String>,

    /// Maximum in-flight per-instrument fetches.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}
