//! End-to-end exercises of the read-through protocol against a scripted,
//! call-counting provider and a real on-disk store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use barvault_core::provider::{
    AdjFactor, CalendarDay, Listing, MarketDataProvider, ProviderBar, ProviderError,
    ProviderFuture,
};
use barvault_core::{
    BarRow, BatchConfig, BatchOrchestrator, CacheStore, DateRange, FetchConfig,
    FetchOrchestrator, FetchStatus, InstrumentCode, MoneyflowRow, StoreConfig, ValidationError,
};

#[derive(Default)]
struct CallLog {
    calendar: AtomicUsize,
    bars: AtomicUsize,
    factors: AtomicUsize,
    index: AtomicUsize,
    moneyflow: AtomicUsize,
}

#[derive(Default)]
struct ScriptedProvider {
    calls: CallLog,
    calendar: Vec<CalendarDay>,
    bars: Vec<ProviderBar>,
    factors: Vec<AdjFactor>,
    index_bars: Vec<ProviderBar>,
    moneyflow_days: HashMap<String, Vec<MoneyflowRow>>,
    failing_moneyflow_days: Vec<String>,
    fail_bars: bool,
}

impl ScriptedProvider {
    fn bars_calls(&self) -> usize {
        self.calls.bars.load(Ordering::SeqCst)
    }
}

fn in_window(date: &str, start: Option<&str>, end: Option<&str>) -> bool {
    start.map_or(true, |start| date >= start) && end.map_or(true, |end| date <= end)
}

impl MarketDataProvider for ScriptedProvider {
    fn trading_calendar<'a>(
        &'a self,
        _exchange: &'a str,
        start: &'a str,
        end: &'a str,
    ) -> ProviderFuture<'a, Vec<CalendarDay>> {
        self.calls.calendar.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(self
                .calendar
                .iter()
                .filter(|day| in_window(&day.date, Some(start), Some(end)))
                .cloned()
                .collect())
        })
    }

    fn daily_bars<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<ProviderBar>> {
        self.calls.bars.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.fail_bars {
                return Err(ProviderError::unavailable("bars endpoint down"));
            }
            Ok(self
                .bars
                .iter()
                .filter(|bar| bar.instrument_code == instrument.as_str())
                .filter(|bar| in_window(&bar.trade_date, start, end))
                .cloned()
                .collect())
        })
    }

    fn adjustment_factors<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<AdjFactor>> {
        self.calls.factors.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(self
                .factors
                .iter()
                .filter(|factor| factor.instrument_code == instrument.as_str())
                .filter(|factor| in_window(&factor.trade_date, start, end))
                .cloned()
                .collect())
        })
    }

    fn index_bars<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<ProviderBar>> {
        self.calls.index.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(self
                .index_bars
                .iter()
                .filter(|bar| bar.instrument_code == instrument.as_str())
                .filter(|bar| in_window(&bar.trade_date, start, end))
                .cloned()
                .collect())
        })
    }

    fn moneyflow<'a>(&'a self, date: &'a str) -> ProviderFuture<'a, Vec<MoneyflowRow>> {
        self.calls.moneyflow.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.failing_moneyflow_days.iter().any(|day| day == date) {
                return Err(ProviderError::unavailable("moneyflow endpoint down"));
            }
            Ok(self.moneyflow_days.get(date).cloned().unwrap_or_default())
        })
    }

    fn instrument_list<'a>(&'a self) -> ProviderFuture<'a, Vec<Listing>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

fn open_days(dates: &[&str]) -> Vec<CalendarDay> {
    dates
        .iter()
        .map(|date| CalendarDay {
            date: (*date).to_string(),
            is_open: Some(true),
        })
        .collect()
}

fn provider_bar(code: &str, date: &str, close: f64) -> ProviderBar {
    ProviderBar {
        trade_date: date.to_string(),
        instrument_code: code.to_string(),
        open: Some(close - 0.1),
        high: Some(close + 0.2),
        low: Some(close - 0.3),
        close: Some(close),
        vol: Some(1_000.0),
        amount: Some(close * 1_000.0),
    }
}

fn stored_bar(code: &str, date: &str, close: f64) -> BarRow {
    BarRow {
        trade_date: date.to_string(),
        instrument_code: code.to_string(),
        open: Some(close - 0.1),
        high: Some(close + 0.2),
        low: Some(close - 0.3),
        close: Some(close),
        vol: Some(1_000.0),
        amount: Some(close * 1_000.0),
        adj_factor: Some(1.0),
    }
}

fn flow_row(code: &str, date: &str, net: f64) -> MoneyflowRow {
    MoneyflowRow {
        trade_date: date.to_string(),
        instrument_code: code.to_string(),
        buy_sm_amount: Some(10.0),
        sell_sm_amount: Some(5.0),
        buy_md_amount: Some(20.0),
        sell_md_amount: Some(15.0),
        buy_lg_amount: Some(30.0),
        sell_lg_amount: Some(25.0),
        buy_elg_amount: Some(40.0),
        sell_elg_amount: Some(35.0),
        net_mf_amount: Some(net),
    }
}

struct Fixture {
    _home: TempDir,
    store: CacheStore,
    provider: Arc<ScriptedProvider>,
    orchestrator: FetchOrchestrator,
}

fn fixture(provider: ScriptedProvider) -> Fixture {
    let home = tempfile::tempdir().expect("tempdir");
    let store = CacheStore::open(StoreConfig::at_home(home.path())).expect("store opens");
    let provider = Arc::new(provider);
    let orchestrator = FetchOrchestrator::new(
        store.clone(),
        Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
        FetchConfig::default(),
    );
    Fixture {
        _home: home,
        store,
        provider,
        orchestrator,
    }
}

fn code(raw: &str) -> InstrumentCode {
    InstrumentCode::parse(raw).expect("parse")
}

fn range(start: &str, end: &str) -> DateRange {
    DateRange::parse(Some(start), Some(end)).expect("range")
}

#[tokio::test]
async fn backfill_then_serve_from_cache_without_remote_calls() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102", "20240103", "20240104"]),
        bars: vec![
            provider_bar("600000.SH", "20240102", 10.0),
            provider_bar("600000.SH", "20240103", 10.1),
            provider_bar("600000.SH", "20240104", 10.2),
        ],
        ..Default::default()
    });
    let instrument = code("600000.SH");
    let window = range("20240102", "20240104");

    let first = fx
        .orchestrator
        .get_series(&instrument, &window)
        .await
        .expect("fetch");
    assert_eq!(
        first.status,
        FetchStatus::Backfilled {
            inserted: 3,
            failed_days: 0
        }
    );
    assert_eq!(fx.provider.bars_calls(), 1);
    // Empty factor script: the join defaults every factor to 1.0.
    assert!(first.rows.iter().all(|row| row.adj_factor == Some(1.0)));

    let second = fx
        .orchestrator
        .get_series(&instrument, &window)
        .await
        .expect("fetch");
    assert_eq!(second.status, FetchStatus::CacheComplete);
    assert_eq!(fx.provider.bars_calls(), 1);
    assert_eq!(second.rows, first.rows);
}

#[tokio::test]
async fn conflicting_refetch_is_refused_and_store_untouched() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102", "20240103"]),
        bars: vec![
            // Diverges from the stored close on 20240102.
            provider_bar("600000.SH", "20240102", 11.0),
            provider_bar("600000.SH", "20240103", 10.1),
        ],
        ..Default::default()
    });
    fx.store
        .insert_bars(&[stored_bar("600000.SH", "20240102", 10.0)])
        .expect("seed");

    let outcome = fx
        .orchestrator
        .get_series(&code("600000.SH"), &range("20240102", "20240103"))
        .await
        .expect("fetch");

    assert!(matches!(outcome.status, FetchStatus::Conflict { .. }));
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].close, Some(10.0));

    // The clean 20240103 candidate was not salvaged either.
    let persisted = fx
        .store
        .query_bars("600000.SH", None, None)
        .expect("query");
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].close, Some(10.0));
}

#[tokio::test]
async fn sub_rounding_noise_is_not_a_conflict() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102", "20240103"]),
        bars: vec![
            provider_bar("600000.SH", "20240102", 10.000_000_04),
            provider_bar("600000.SH", "20240103", 10.1),
        ],
        ..Default::default()
    });
    fx.store
        .insert_bars(&[stored_bar("600000.SH", "20240102", 10.0)])
        .expect("seed");

    let outcome = fx
        .orchestrator
        .get_series(&code("600000.SH"), &range("20240102", "20240103"))
        .await
        .expect("fetch");

    assert_eq!(
        outcome.status,
        FetchStatus::Backfilled {
            inserted: 1,
            failed_days: 0
        }
    );
    assert_eq!(outcome.rows.len(), 2);
}

#[tokio::test]
async fn remote_failure_serves_cached_rows_with_unavailable_status() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102", "20240103"]),
        fail_bars: true,
        ..Default::default()
    });
    fx.store
        .insert_bars(&[stored_bar("600000.SH", "20240102", 10.0)])
        .expect("seed");

    let outcome = fx
        .orchestrator
        .get_series(&code("600000.SH"), &range("20240102", "20240103"))
        .await
        .expect("fetch");

    assert!(matches!(outcome.status, FetchStatus::RemoteUnavailable { .. }));
    assert_eq!(outcome.rows.len(), 1);
}

#[tokio::test]
async fn index_series_pins_unit_factor_and_skips_factor_endpoint() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102"]),
        index_bars: vec![provider_bar("000300.SH", "20240102", 3500.0)],
        // A scripted factor that must never be consulted.
        factors: vec![AdjFactor {
            trade_date: "20240102".to_string(),
            instrument_code: "000300.SH".to_string(),
            factor: 2.0,
        }],
        ..Default::default()
    });

    let outcome = fx
        .orchestrator
        .get_index_series(&code("000300.SH"), &range("20240102", "20240102"))
        .await
        .expect("fetch");

    assert!(outcome.status.is_success());
    assert_eq!(outcome.rows[0].adj_factor, Some(1.0));
    assert_eq!(fx.provider.calls.factors.load(Ordering::SeqCst), 0);
    assert_eq!(fx.provider.calls.index.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unbounded_moneyflow_request_raises_before_any_io() {
    let fx = fixture(ScriptedProvider::default());

    let error = fx
        .orchestrator
        .get_moneyflow(&DateRange::unbounded())
        .await
        .expect_err("must raise");

    assert!(matches!(error, ValidationError::UnboundedMoneyflowRange));
    assert_eq!(fx.provider.calls.calendar.load(Ordering::SeqCst), 0);
    assert_eq!(fx.provider.calls.moneyflow.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn moneyflow_backfill_tolerates_single_day_failures() {
    let mut moneyflow_days = HashMap::new();
    moneyflow_days.insert(
        "20240102".to_string(),
        vec![flow_row("600000.SH", "20240102", 20.0)],
    );
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102", "20240103"]),
        moneyflow_days,
        failing_moneyflow_days: vec!["20240103".to_string()],
        ..Default::default()
    });

    let outcome = fx
        .orchestrator
        .get_moneyflow(&range("20240102", "20240103"))
        .await
        .expect("fetch");

    assert_eq!(
        outcome.status,
        FetchStatus::Backfilled {
            inserted: 1,
            failed_days: 1
        }
    );
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(fx.provider.calls.moneyflow.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn null_bearing_cached_day_is_not_reported_as_served() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102"]),
        ..Default::default()
    });
    // The day is covered by a cached row, but a required column is null;
    // backfill only fetches absent days, so nothing can repair it.
    let mut seeded = flow_row("600000.SH", "20240102", 20.0);
    seeded.net_mf_amount = None;
    fx.store.insert_moneyflow(&[seeded]).expect("seed");

    let outcome = fx
        .orchestrator
        .get_moneyflow(&range("20240102", "20240102"))
        .await
        .expect("fetch");

    assert!(matches!(outcome.status, FetchStatus::Incomplete { .. }));
    assert!(!outcome.status.is_success());
    assert_eq!(outcome.rows.len(), 1);
    // No absent days existed, so the day endpoint was never called.
    assert_eq!(fx.provider.calls.moneyflow.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn storage_failure_during_merge_preserves_cached_rows() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102", "20240103"]),
        bars: vec![
            // Duplicate key in the candidate set violates the primary key at
            // insert time, after conflict planning has passed.
            provider_bar("600000.SH", "20240103", 10.1),
            provider_bar("600000.SH", "20240103", 10.1),
        ],
        ..Default::default()
    });
    fx.store
        .insert_bars(&[stored_bar("600000.SH", "20240102", 10.0)])
        .expect("seed");

    let outcome = fx
        .orchestrator
        .get_series(&code("600000.SH"), &range("20240102", "20240103"))
        .await
        .expect("fetch");

    assert!(matches!(outcome.status, FetchStatus::StorageFailed { .. }));
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].close, Some(10.0));

    // The failed merge transaction rolled back whole.
    let persisted = fx
        .store
        .query_bars("600000.SH", None, None)
        .expect("query");
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].trade_date, "20240102");
}

#[tokio::test]
async fn batch_isolates_failing_instruments() {
    let fx = fixture(ScriptedProvider {
        calendar: open_days(&["20240102"]),
        bars: vec![provider_bar("600000.SH", "20240102", 10.0)],
        ..Default::default()
    });
    // 000001.SZ has no scripted bars: its fetch yields no data and fails.
    let batch = BatchOrchestrator::new(
        Arc::new(fx.orchestrator.clone()),
        BatchConfig::default(),
    );

    let summary = batch
        .run(
            vec![code("600000.SH"), code("000001.SZ")],
            range("20240102", "20240102"),
            None,
        )
        .await;

    assert_eq!(summary.requested, 2);
    assert_eq!(summary.succeeded, vec![code("600000.SH")]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].instrument, code("000001.SZ"));
    assert_eq!(summary.rows.len(), 1);
}
