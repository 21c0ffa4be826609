//! Per-instrument read-through protocol.
//!
//! Each call runs: query the cache, verify completeness against the trading
//! calendar, and on a gap backfill from the remote collaborator, merging
//! conflict-safely before returning. Every outcome is a `(rows, status)`
//! pair; only range-validation problems raise. Remote faults of any shape
//! (including deadline overruns) collapse into a remote-unavailable status
//! and the caller keeps whatever was cached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use barvault_store::{BarRow, CacheStore, MoneyflowRow};

use crate::calendar::{CalendarError, CalendarService};
use crate::completeness::{CompletenessChecker, Incompleteness};
use crate::conflict::ConflictResolver;
use crate::domain::{DateRange, InstrumentCode, TradeDate};
use crate::provider::{MarketDataProvider, ProviderError, ProviderFuture};
use crate::ValidationError;

/// Orchestrator knobs, caller-built and injected.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Exchange whose calendar is authoritative for completeness.
    pub exchange: String,
    /// Deadline applied to every individual remote call.
    pub remote_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            exchange: String::from("SSE"),
            remote_timeout: Duration::from_secs(10),
        }
    }
}

/// Terminal status of one read-through call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Cache fully covered the request; no remote call was made.
    CacheComplete,
    /// Remote rows were merged in. `failed_days` is non-zero only for the
    /// day-scoped money-flow variant, which tolerates per-day failures.
    Backfilled { inserted: usize, failed_days: usize },
    /// Stored and fetched values diverged; cached rows returned unchanged.
    Conflict { detail: String },
    /// The collaborator could not be reached; possibly-partial cached data.
    RemoteUnavailable { reason: String },
    /// Neither the cache nor the remote had rows for the request.
    Empty,
    /// The merged set still fails the column checks; backfill had nothing
    /// left to fetch for the offending rows.
    Incomplete { reason: String },
    /// Local persistence failed. Merge transactions roll back whole, so no
    /// partial writes remain behind this status.
    StorageFailed { reason: String },
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheComplete => f.write_str("served from cache: range complete"),
            Self::Backfilled {
                inserted,
                failed_days: 0,
            } => {
                write!(f, "backfilled from remote: {inserted} new row(s) merged")
            }
            Self::Backfilled {
                inserted,
                failed_days,
            } => write!(
                f,
                "backfilled from remote: {inserted} new row(s) merged, {failed_days} day fetch(es) failed"
            ),
            Self::Conflict { detail } => {
                write!(f, "conflict detected, cached rows retained: {detail}")
            }
            Self::RemoteUnavailable { reason } => {
                write!(f, "remote unavailable, serving cached rows only: {reason}")
            }
            Self::Empty => f.write_str("no data exists for the requested range"),
            Self::Incomplete { reason } => {
                write!(f, "cached rows remain incomplete after backfill: {reason}")
            }
            Self::StorageFailed { reason } => {
                write!(f, "local store failed, no rows were written: {reason}")
            }
        }
    }
}

impl FetchStatus {
    /// Whether the call produced a usable, fully-served dataset.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::CacheComplete | Self::Backfilled { .. })
    }
}

/// Dataset plus the status explaining why the dataset is what it is.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<R> {
    pub rows: Vec<R>,
    pub status: FetchStatus,
}

impl<R> FetchOutcome<R> {
    fn new(rows: Vec<R>, status: FetchStatus) -> Self {
        Self { rows, status }
    }

    /// Human-readable status line for the public return contract.
    pub fn message(&self) -> String {
        self.status.to_string()
    }
}

enum PriceKind {
    /// Equity bars: unadjusted bars joined with adjustment factors.
    Equity,
    /// Index bars: no factor endpoint exists, adj_factor pinned at 1.0.
    Index,
}

/// The read-through orchestrator. Sequential per call; batch fan-out lives
/// in [`crate::batch::BatchOrchestrator`].
#[derive(Clone)]
pub struct FetchOrchestrator {
    store: CacheStore,
    provider: Arc<dyn MarketDataProvider>,
    calendar: CalendarService,
    config: FetchConfig,
}

impl FetchOrchestrator {
    pub fn new(
        store: CacheStore,
        provider: Arc<dyn MarketDataProvider>,
        config: FetchConfig,
    ) -> Self {
        let calendar = CalendarService::new(Arc::clone(&provider), config.exchange.clone());
        Self {
            store,
            provider,
            calendar,
            config,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn calendar(&self) -> &CalendarService {
        &self.calendar
    }

    /// Read-through fetch of equity daily bars.
    pub async fn get_series(
        &self,
        instrument: &InstrumentCode,
        range: &DateRange,
    ) -> Result<FetchOutcome<BarRow>, ValidationError> {
        self.get_price_series(instrument, range, PriceKind::Equity)
            .await
    }

    /// Read-through fetch of index daily bars.
    pub async fn get_index_series(
        &self,
        instrument: &InstrumentCode,
        range: &DateRange,
    ) -> Result<FetchOutcome<BarRow>, ValidationError> {
        self.get_price_series(instrument, range, PriceKind::Index)
            .await
    }

    async fn get_price_series(
        &self,
        instrument: &InstrumentCode,
        range: &DateRange,
        kind: PriceKind,
    ) -> Result<FetchOutcome<BarRow>, ValidationError> {
        let start = range.start_compact();
        let end = range.end_compact();

        let cached = match self
            .store
            .query_bars(instrument.as_str(), start.as_deref(), end.as_deref())
        {
            Ok(rows) => rows,
            Err(error) => {
                warn!(instrument = %instrument, %error, "cache query failed");
                return Ok(FetchOutcome::new(
                    Vec::new(),
                    FetchStatus::StorageFailed {
                        reason: error.to_string(),
                    },
                ));
            }
        };

        let trading_days = match self.resolve_trading_days(range).await {
            Ok(days) => days,
            Err(CalendarBlocked::Validation(error)) => return Err(error),
            Err(CalendarBlocked::Remote(reason)) => {
                warn!(instrument = %instrument, %reason, "calendar unavailable, completeness unverifiable");
                return Ok(FetchOutcome::new(
                    cached,
                    FetchStatus::RemoteUnavailable { reason },
                ));
            }
        };

        let report = CompletenessChecker::check(&cached, trading_days.as_deref());
        if report.is_complete() {
            debug!(instrument = %instrument, rows = cached.len(), "cache complete, no remote call");
            return Ok(FetchOutcome::new(cached, FetchStatus::CacheComplete));
        }
        debug!(
            instrument = %instrument,
            cached = cached.len(),
            failure = ?report.failure,
            "cache incomplete, backfilling"
        );

        let candidates = match self
            .fetch_price_candidates(instrument, start.as_deref(), end.as_deref(), &kind)
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(instrument = %instrument, %error, "remote backfill failed");
                return Ok(FetchOutcome::new(
                    cached,
                    FetchStatus::RemoteUnavailable {
                        reason: error.to_string(),
                    },
                ));
            }
        };

        if candidates.is_empty() && cached.is_empty() {
            return Ok(FetchOutcome::new(Vec::new(), FetchStatus::Empty));
        }

        let plan = match ConflictResolver::plan(&cached, candidates) {
            Ok(plan) => plan,
            Err(conflict) => {
                warn!(instrument = %instrument, %conflict, "merge refused, history retained");
                return Ok(FetchOutcome::new(
                    cached,
                    FetchStatus::Conflict {
                        detail: conflict.to_string(),
                    },
                ));
            }
        };

        if let Err(error) = self.store.insert_bars(&plan.to_insert) {
            warn!(instrument = %instrument, %error, "merge transaction rolled back");
            return Ok(FetchOutcome::new(
                cached,
                FetchStatus::StorageFailed {
                    reason: error.to_string(),
                },
            ));
        }

        let inserted = plan.to_insert.len();
        let mut rows = cached;
        rows.extend(plan.to_insert);
        sort_and_dedup_bars(&mut rows);
        Ok(FetchOutcome::new(
            rows,
            FetchStatus::Backfilled {
                inserted,
                failed_days: 0,
            },
        ))
    }

    /// Read-through fetch of money-flow rows across all instruments for a
    /// bounded window. The upstream endpoint is day-scoped, so backfill is a
    /// batch of single-day fetches; per-day failures are counted, not fatal.
    pub async fn get_moneyflow(
        &self,
        range: &DateRange,
    ) -> Result<FetchOutcome<MoneyflowRow>, ValidationError> {
        let (Some(start), Some(end)) = (range.start(), range.end()) else {
            return Err(ValidationError::UnboundedMoneyflowRange);
        };
        let start_compact = start.compact();
        let end_compact = end.compact();

        let cached = match self
            .store
            .query_moneyflow(Some(&start_compact), Some(&end_compact))
        {
            Ok(rows) => rows,
            Err(error) => {
                warn!(%error, "money-flow cache query failed");
                return Ok(FetchOutcome::new(
                    Vec::new(),
                    FetchStatus::StorageFailed {
                        reason: error.to_string(),
                    },
                ));
            }
        };

        let trading_days = match self.calendar.trading_days(start, end).await {
            Ok(days) => days,
            Err(CalendarError::Validation(error)) => return Err(error),
            Err(CalendarError::RemoteUnavailable(reason)) => {
                warn!(%reason, "calendar unavailable, completeness unverifiable");
                return Ok(FetchOutcome::new(
                    cached,
                    FetchStatus::RemoteUnavailable { reason },
                ));
            }
        };

        if CompletenessChecker::check(&cached, Some(&trading_days)).is_complete() {
            debug!(rows = cached.len(), "money-flow cache complete");
            return Ok(FetchOutcome::new(cached, FetchStatus::CacheComplete));
        }

        let covered: HashSet<&str> = cached.iter().map(|row| row.trade_date.as_str()).collect();
        let missing: Vec<TradeDate> = trading_days
            .iter()
            .filter(|day| !covered.contains(day.compact().as_str()))
            .copied()
            .collect();

        let mut inserted_rows: Vec<MoneyflowRow> = Vec::new();
        let mut failed_days = 0usize;
        let mut conflict_days = 0usize;

        for day in &missing {
            let compact = day.compact();
            let fetched = match self.with_deadline(self.provider.moneyflow(&compact)).await {
                Ok(rows) => rows,
                Err(error) => {
                    warn!(day = %compact, %error, "money-flow day fetch failed");
                    failed_days += 1;
                    continue;
                }
            };

            let existing_for_day: Vec<MoneyflowRow> = cached
                .iter()
                .filter(|row| row.trade_date == compact)
                .cloned()
                .collect();
            let plan = match ConflictResolver::plan(&existing_for_day, fetched) {
                Ok(plan) => plan,
                Err(conflict) => {
                    warn!(day = %compact, %conflict, "money-flow merge refused for day");
                    conflict_days += 1;
                    continue;
                }
            };

            match self.store.insert_moneyflow(&plan.to_insert) {
                Ok(_) => inserted_rows.extend(plan.to_insert),
                Err(error) => {
                    warn!(day = %compact, %error, "money-flow insert rolled back");
                    failed_days += 1;
                }
            }
        }

        let attempted = missing.len();
        let mut status = if inserted_rows.is_empty()
            && attempted > 0
            && failed_days + conflict_days == attempted
        {
            if failed_days == 0 {
                FetchStatus::Conflict {
                    detail: format!("{conflict_days} of {attempted} day merge(s) refused"),
                }
            } else {
                FetchStatus::RemoteUnavailable {
                    reason: format!("{failed_days} of {attempted} day fetch(es) failed"),
                }
            }
        } else if cached.is_empty() && inserted_rows.is_empty() {
            FetchStatus::Empty
        } else {
            FetchStatus::Backfilled {
                inserted: inserted_rows.len(),
                failed_days: failed_days + conflict_days,
            }
        };

        let mut rows = cached;
        rows.extend(inserted_rows);
        sort_and_dedup_moneyflow(&mut rows);

        // Backfill only fetches absent days, so null-bearing cached rows
        // survive the merge; a set that still fails the column checks must
        // not claim success.
        if let FetchStatus::Backfilled { .. } = status {
            let recheck = CompletenessChecker::check(&rows, Some(&trading_days));
            if let Some(failure @ Incompleteness::NullColumn { .. }) = recheck.failure {
                warn!(%failure, "money-flow set still incomplete after backfill");
                status = FetchStatus::Incomplete {
                    reason: failure.to_string(),
                };
            }
        }
        Ok(FetchOutcome::new(rows, status))
    }

    /// Tradable universe: the provider's full listing minus special-treatment
    /// names and the excluded venue.
    pub async fn tradable_instruments(&self) -> Result<Vec<InstrumentCode>, ProviderError> {
        let listings = self.with_deadline(self.provider.instrument_list()).await?;
        Ok(crate::provider::tradable_universe(listings))
    }

    async fn resolve_trading_days(
        &self,
        range: &DateRange,
    ) -> Result<Option<Vec<TradeDate>>, CalendarBlocked> {
        let (Some(start), Some(end)) = (range.start(), range.end()) else {
            return Ok(None);
        };

        match self.calendar.trading_days(start, end).await {
            Ok(days) => Ok(Some(days)),
            Err(CalendarError::Validation(error)) => Err(CalendarBlocked::Validation(error)),
            Err(CalendarError::RemoteUnavailable(reason)) => Err(CalendarBlocked::Remote(reason)),
        }
    }

    async fn fetch_price_candidates(
        &self,
        instrument: &InstrumentCode,
        start: Option<&str>,
        end: Option<&str>,
        kind: &PriceKind,
    ) -> Result<Vec<BarRow>, ProviderError> {
        match kind {
            PriceKind::Equity => {
                let bars = self
                    .with_deadline(self.provider.daily_bars(instrument, start, end))
                    .await?;
                let factors = self
                    .with_deadline(self.provider.adjustment_factors(instrument, start, end))
                    .await?;
                let by_date: HashMap<String, f64> = factors
                    .into_iter()
                    .map(|factor| (factor.trade_date, factor.factor))
                    .collect();
                Ok(bars
                    .into_iter()
                    .map(|bar| {
                        let adj = by_date.get(&bar.trade_date).copied().unwrap_or(1.0);
                        provider_bar_to_row(bar, adj)
                    })
                    .collect())
            }
            PriceKind::Index => {
                let bars = self
                    .with_deadline(self.provider.index_bars(instrument, start, end))
                    .await?;
                Ok(bars
                    .into_iter()
                    .map(|bar| provider_bar_to_row(bar, 1.0))
                    .collect())
            }
        }
    }

    async fn with_deadline<T>(&self, future: ProviderFuture<'_, T>) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.config.remote_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::unavailable(format!(
                "remote call exceeded {}ms deadline",
                self.config.remote_timeout.as_millis()
            ))),
        }
    }
}

enum CalendarBlocked {
    Validation(ValidationError),
    Remote(String),
}

fn provider_bar_to_row(bar: crate::provider::ProviderBar, adj_factor: f64) -> BarRow {
    BarRow {
        trade_date: bar.trade_date,
        instrument_code: bar.instrument_code,
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        vol: bar.vol,
        amount: bar.amount,
        adj_factor: Some(adj_factor),
    }
}

/// Deterministic (instrument, date) order with primary-key dedup.
pub fn sort_and_dedup_bars(rows: &mut Vec<BarRow>) {
    rows.sort_by(|a, b| {
        (a.instrument_code.as_str(), a.trade_date.as_str())
            .cmp(&(b.instrument_code.as_str(), b.trade_date.as_str()))
    });
    rows.dedup_by(|a, b| a.instrument_code == b.instrument_code && a.trade_date == b.trade_date);
}

fn sort_and_dedup_moneyflow(rows: &mut Vec<MoneyflowRow>) {
    rows.sort_by(|a, b| {
        (a.trade_date.as_str(), a.instrument_code.as_str())
            .cmp(&(b.trade_date.as_str(), b.instrument_code.as_str()))
    });
    rows.dedup_by(|a, b| a.instrument_code == b.instrument_code && a.trade_date == b.trade_date);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(code: &str, date: &str) -> BarRow {
        BarRow {
            trade_date: date.to_string(),
            instrument_code: code.to_string(),
            open: Some(1.0),
            high: Some(1.0),
            low: Some(1.0),
            close: Some(1.0),
            vol: Some(1.0),
            amount: Some(1.0),
            adj_factor: Some(1.0),
        }
    }

    #[test]
    fn combined_rows_sort_by_instrument_then_date() {
        let mut rows = vec![
            bar("600000.SH", "20240103"),
            bar("000001.SZ", "20240104"),
            bar("600000.SH", "20240102"),
            bar("600000.SH", "20240102"),
        ];
        sort_and_dedup_bars(&mut rows);
        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|row| (row.instrument_code.as_str(), row.trade_date.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("000001.SZ", "20240104"),
                ("600000.SH", "20240102"),
                ("600000.SH", "20240103"),
            ]
        );
    }

    #[test]
    fn status_messages_are_distinguishable() {
        let statuses = [
            FetchStatus::CacheComplete,
            FetchStatus::Backfilled {
                inserted: 3,
                failed_days: 0,
            },
            FetchStatus::Conflict {
                detail: String::from("x"),
            },
            FetchStatus::RemoteUnavailable {
                reason: String::from("y"),
            },
            FetchStatus::Empty,
            FetchStatus::Incomplete {
                reason: String::from("w"),
            },
            FetchStatus::StorageFailed {
                reason: String::from("z"),
            },
        ];
        let messages: HashSet<String> =
            statuses.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), statuses.len());
    }
}
