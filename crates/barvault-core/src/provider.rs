//! Remote collaborator contract.
//!
//! The core never talks to the wire directly; it consumes this trait and
//! treats every fault from it as a remote-unavailable outcome. Adapters
//! normalize transport errors into [`ProviderError`] before they reach the
//! orchestrators.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::domain::InstrumentCode;
use crate::MoneyflowRow;

/// Boxed future returned by provider methods.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Collaborator-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    Internal,
}

/// Structured provider error. Whatever the kind, the orchestrators recover
/// it into a remote-unavailable status; raw transport errors never propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::InvalidRequest => "provider.invalid_request",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// One calendar entry as the provider reports it. The open/closed marker is
/// optional on the wire; the calendar service rejects entries without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: String,
    pub is_open: Option<bool>,
}

/// Daily price record as fetched, without an adjustment factor; the
/// orchestrator joins factors in before merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBar {
    pub trade_date: String,
    pub instrument_code: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub vol: Option<f64>,
    pub amount: Option<f64>,
}

/// Adjustment factor for one (date, instrument).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjFactor {
    pub trade_date: String,
    pub instrument_code: String,
    pub factor: f64,
}

/// Instrument listing as reported by the provider's universe endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub code: String,
    pub name: String,
}

/// Remote data collaborator consumed by the orchestrators.
pub trait MarketDataProvider: Send + Sync {
    /// Trading calendar for an exchange and inclusive `YYYYMMDD` window.
    fn trading_calendar<'a>(
        &'a self,
        exchange: &'a str,
        start: &'a str,
        end: &'a str,
    ) -> ProviderFuture<'a, Vec<CalendarDay>>;

    /// Unadjusted daily bars for one instrument.
    fn daily_bars<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<ProviderBar>>;

    /// Adjustment factors for one instrument.
    fn adjustment_factors<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<AdjFactor>>;

    /// Daily bars for an index instrument (no adjustment factors exist).
    fn index_bars<'a>(
        &'a self,
        instrument: &'a InstrumentCode,
        start: Option<&'a str>,
        end: Option<&'a str>,
    ) -> ProviderFuture<'a, Vec<ProviderBar>>;

    /// Money-flow rows for every instrument on a single calendar day. The
    /// upstream endpoint is day-scoped; range backfill iterates days.
    fn moneyflow<'a>(&'a self, date: &'a str) -> ProviderFuture<'a, Vec<MoneyflowRow>>;

    /// Full instrument universe, unfiltered.
    fn instrument_list<'a>(&'a self) -> ProviderFuture<'a, Vec<Listing>>;
}

/// Special-treatment marker in listing display names.
const SPECIAL_TREATMENT_MARKER: &str = "ST";

/// Venue excluded from the tradable universe.
const EXCLUDED_VENUE: &str = "BJ";

/// Filter the raw universe down to tradable instruments: drops listings whose
/// display name flags special treatment, listings on the excluded venue, and
/// listings whose code fails validation.
pub fn tradable_universe(listings: Vec<Listing>) -> Vec<InstrumentCode> {
    listings
        .into_iter()
        .filter(|listing| !listing.name.contains(SPECIAL_TREATMENT_MARKER))
        .filter_map(|listing| InstrumentCode::parse(&listing.code).ok())
        .filter(|code| code.venue() != EXCLUDED_VENUE)
        .collect()
}
