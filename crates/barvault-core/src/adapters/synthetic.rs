//! Deterministic in-process market data source.
//!
//! Every value is derived by hashing the instrument code and date, so repeated
//! calls return byte-identical rows. That makes the adapter safe under the
//! conflict-safe merge (re-fetch never diverges from stored history) and
//! usable for offline runs and tests alike. The calendar is a plain weekday
//! calendar: Monday through Friday open, weekends closed.

use time::{Date, Weekday};

use barvault_store::MoneyflowRow;

use crate::domain::{InstrumentCode, TradeDate};
use crate::provider::{
    AdjFactor, CalendarDay, Listing, MarketDataProvider, ProviderBar, ProviderError,
    ProviderFuture,
};

const DEFAULT_START: &str = "20240102";
const DEFAULT_END: &str = "20240131";

/// Listings served by the universe endpoint. Includes a special-treatment
/// name and an excluded-venue listing so the tradable filter has work to do.
const SAMPLE_LISTINGS: &[(&str, &str)] = &[
    ("600000.SH", "浦发银行"),
    ("600519.SH", "贵州茅台"),
    ("000001.SZ", "平安银行"),
    ("600100.SH", "*ST同方"),
    ("430047.BJ", "诺思兰德"),
];

/// Codes that carry bar and money-flow data.
const ACTIVE_CODES: &[&str] = &["600000.SH", "600519.SH", "000001.SZ"];

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticProvider;

fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn is_open(date: Date) -> bool {
    !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

fn parse_date(input: &str) -> Result<Date, ProviderError> {
    TradeDate::parse(input)
        .map(TradeDate::into_inner)
        .map_err(|error| ProviderError::invalid_request(error.to_string()))
}

fn window(start: Option<&str>, end: Option<&str>) -> Result<Vec<Date>, ProviderError> {
    let start = parse_date(start.unwrap_or(DEFAULT_START))?;
    let end = parse_date(end.unwrap_or(DEFAULT_END))?;
    if start > end {
        return Err(ProviderError::invalid_request(format!(
            "window {start} after {end}"
        )));
    }

    let mut days = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        days.push(cursor);
        cursor = match cursor.next_day() {
            Some(next) => next,
            None => break,
        };
    }
    Ok(days)
}

fn bar_for(code: &str, date: Date, salt: &str) -> ProviderBar {
    let compact = TradeDate::from_date(date).compact();
    let seed = fnv1a(&format!("{salt}:{code}:{compact}"));
    let base = 10.0 + (fnv1a(code) % 9_000) as f64 / 100.0;

    let open = round2(base + (seed % 200) as f64 / 100.0 - 1.0);
    let close = round2(open + ((seed >> 8) % 100) as f64 / 100.0 - 0.5);
    let high = round2(open.max(close) + ((seed >> 16) % 50) as f64 / 100.0);
    let low = round2(open.min(close) - ((seed >> 24) % 50) as f64 / 100.0);
    let vol = ((seed >> 32) % 1_000_000 + 10_000) as f64;
    let amount = round2(vol * close);

    ProviderBar {
        trade_date: compact,
        instrument_code: code.to_string(),
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(close),
        vol: Some(vol),
        amount: Some(amount),
    }
}

fn moneyflow_for(code: &str, compact: &str) -> MoneyflowRow {
    let seed = fnv1a(&format!("flow:{code}:{compact}"));
    let flow = |shift: u64| round2(((seed >> shift) % 100_000) as f64 / 10.0);

    let buy_sm = flow(0);
    let sell_sm = flow(6);
    let buy_md = flow(12);
    let sell_md = flow(18);
    let buy_lg = flow(24);
    let sell_lg = flow(30);
    let buy_elg = flow(36);
    let sell_elg = flow(42);
    let net = round2(buy_sm + buy_md + buy_lg + buy_elg - sell_sm - sell_md - sell_lg - sell_elg);

    MoneyflowRow {
        trade_date: compact.to_string(),
        instrument_code: code.to_string(),
        buy_sm_amount: Some(buy_sm),
        sell_sm_amount: Some(sell_sm),
        buy_md_amount: Some(buy_md),
        sell_md_amount: Some(sell_md),
        buy_lg_amount: Some(buy_lg),
        sell_lg_amount: Some(sell_lg),
        buy_elg_amount: Some(buy_elg),
        sell_elg_amount: Some(sell_elg),
        net_mf_amount: Some(net),
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn trading_calendar<'a>(
        &'a self,
        _exchange: &'a str,
        start: &'a str,
        end: &'a str,
    ) -> ProviderFuture<'a, Vec<CalendarDay>> {
        Box::pin(async move {
            let days = window(Some(start), Some(end))?;
            Ok(days
                .into_iter()
                .map(|date| CalendarDay {
                    date: TradeDate::from_date(date).compact(),
                    is_open: Some(is_open(date)),
                })
                .collect())
        })
    }

    fn daily_bars<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<ProviderBar>> {
        Box::pin(async move {
            let days = window(start, end)?;
            Ok(days
                .into_iter()
                .filter(|date| is_open(*date))
                .map(|date| bar_for(instrument.as_str(), date, "equity"))
                .collect())
        })
    }

    fn adjustment_factors<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<AdjFactor>> {
        Box::pin(async move {
            let days = window(start, end)?;
            // Constant per instrument so re-fetches merge cleanly.
            let factor = 1.0 + (fnv1a(instrument.as_str()) % 5) as f64 / 10.0;
            Ok(days
                .into_iter()
                .filter(|date| is_open(*date))
                .map(|date| AdjFactor {
                    trade_date: TradeDate::from_date(date).compact(),
                    instrument_code: instrument.as_str().to_string(),
                    factor,
                })
                .collect())
        })
    }

    fn index_bars<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<ProviderBar>> {
        Box::pin(async move {
            let days = window(start, end)?;
            Ok(days
                .into_iter()
                .filter(|date| is_open(*date))
                .map(|date| bar_for(instrument.as_str(), date, "index"))
                .collect())
        })
    }

    fn moneyflow<'a>(&'a self, date: &'a str) -> ProviderFuture<'a, Vec<MoneyflowRow>> {
        Box::pin(async move {
            let day = parse_date(date)?;
            if !is_open(day) {
                return Ok(Vec::new());
            }
            Ok(ACTIVE_CODES
                .iter()
                .map(|code| moneyflow_for(code, date))
                .collect())
        })
    }

    fn instrument_list<'a>(&'a self) -> ProviderFuture<'a, Vec<Listing>> {
        Box::pin(async {
            Ok(SAMPLE_LISTINGS
                .iter()
                .map(|(code, name)| Listing {
                    code: (*code).to_string(),
                    name: (*name).to_string(),
                })
                .collect())
        })
    }
}
