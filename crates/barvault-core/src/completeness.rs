//! Completeness verification for queried row sets.
//!
//! A result set is complete for a window when it is non-empty, every required
//! column carries a value in every row, and no open trading day in the window
//! is missing. Rows are named-field structs decoded at the store boundary, so
//! "column missing" and "column null" collapse into the same per-field check;
//! the diagnostic still names the offending column and date.

use crate::domain::TradeDate;
use barvault_store::{BarRow, MoneyflowRow};

/// Required column set for price rows.
pub const PRICE_REQUIRED_COLUMNS: &[&str] =
    &["open", "high", "low", "close", "vol", "amount", "adj_factor"];

/// Required column set for money-flow rows.
pub const MONEYFLOW_REQUIRED_COLUMNS: &[&str] = &[
    "buy_sm_amount",
    "sell_sm_amount",
    "buy_md_amount",
    "sell_md_amount",
    "buy_lg_amount",
    "sell_lg_amount",
    "buy_elg_amount",
    "sell_elg_amount",
    "net_mf_amount",
];

/// Row shape the checker can scan column-wise.
pub trait SeriesRow {
    fn trade_date(&self) -> &str;
    fn column(&self, name: &str) -> Option<f64>;
    fn required_columns() -> &'static [&'static str];
}

impl SeriesRow for BarRow {
    fn trade_date(&self) -> &str {
        &self.trade_date
    }

    fn column(&self, name: &str) -> Option<f64> {
        match name {
            "open" => self.open,
            "high" => self.high,
            "low" => self.low,
            "close" => self.close,
            "vol" => self.vol,
            "amount" => self.amount,
            "adj_factor" => self.adj_factor,
            _ => None,
        }
    }

    fn required_columns() -> &'static [&'static str] {
        PRICE_REQUIRED_COLUMNS
    }
}

impl SeriesRow for MoneyflowRow {
    fn trade_date(&self) -> &str {
        &self.trade_date
    }

    fn column(&self, name: &str) -> Option<f64> {
        match name {
            "buy_sm_amount" => self.buy_sm_amount,
            "sell_sm_amount" => self.sell_sm_amount,
            "buy_md_amount" => self.buy_md_amount,
            "sell_md_amount" => self.sell_md_amount,
            "buy_lg_amount" => self.buy_lg_amount,
            "sell_lg_amount" => self.sell_lg_amount,
            "buy_elg_amount" => self.buy_elg_amount,
            "sell_elg_amount" => self.sell_elg_amount,
            "net_mf_amount" => self.net_mf_amount,
            _ => None,
        }
    }

    fn required_columns() -> &'static [&'static str] {
        MONEYFLOW_REQUIRED_COLUMNS
    }
}

/// Which completeness rule failed, with enough detail to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompleteness {
    /// The queried set held no rows at all.
    EmptyResultSet,
    /// A required column carried no value on the given date.
    NullColumn { column: &'static str, trade_date: String },
    /// Open trading days in the window with no row in the set.
    MissingTradingDays { missing: Vec<TradeDate> },
}

impl std::fmt::Display for Incompleteness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResultSet => f.write_str("empty result set"),
            Self::NullColumn { column, trade_date } => {
                write!(f, "column {column} is null on {trade_date}")
            }
            Self::MissingTradingDays { missing } => {
                write!(f, "{} trading day(s) missing", missing.len())
            }
        }
    }
}

/// Diagnostic verdict; the boolean is the load-bearing contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletenessReport {
    pub failure: Option<Incompleteness>,
}

impl CompletenessReport {
    pub fn complete() -> Self {
        Self { failure: None }
    }

    pub fn incomplete(failure: Incompleteness) -> Self {
        Self {
            failure: Some(failure),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Decides whether a queried row set fully covers a requested window.
pub struct CompletenessChecker;

impl CompletenessChecker {
    /// Structural and coverage checks. `trading_days` is `None` when the
    /// request had no bounds, in which case only the structural rules apply.
    pub fn check<R: SeriesRow>(
        rows: &[R],
        trading_days: Option<&[TradeDate]>,
    ) -> CompletenessReport {
        if rows.is_empty() {
            return CompletenessReport::incomplete(Incompleteness::EmptyResultSet);
        }

        for row in rows {
            for column in R::required_columns() {
                if row.column(column).is_none() {
                    return CompletenessReport::incomplete(Incompleteness::NullColumn {
                        column,
                        trade_date: row.trade_date().to_owned(),
                    });
                }
            }
        }

        if let Some(trading_days) = trading_days {
            let missing: Vec<TradeDate> = trading_days
                .iter()
                .filter(|day| {
                    let compact = day.compact();
                    !rows.iter().any(|row| row.trade_date() == compact)
                })
                .copied()
                .collect();
            if !missing.is_empty() {
                return CompletenessReport::incomplete(Incompleteness::MissingTradingDays {
                    missing,
                });
            }
        }

        CompletenessReport::complete()
    }
}
