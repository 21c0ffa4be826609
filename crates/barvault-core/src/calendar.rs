//! Trading-calendar resolution.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::domain::TradeDate;
use crate::provider::MarketDataProvider;
use crate::ValidationError;

/// Calendar resolution failures. The validation arm raises past the public
/// boundary; the remote arm is recovered into a status by callers.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("trading calendar unavailable: {0}")]
    RemoteUnavailable(String),
}

/// Resolves the ordered set of open trading dates for a window.
///
/// The calendar is derived, not stored: every call goes to the provider and
/// only dates marked open are retained.
#[derive(Clone)]
pub struct CalendarService {
    provider: Arc<dyn MarketDataProvider>,
    exchange: String,
}

impl CalendarService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, exchange: impl Into<String>) -> Self {
        Self {
            provider,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Ordered open trading dates in `[start, end]`, inclusive.
    ///
    /// Reversed windows are a validation error raised before any I/O; an
    /// entry without its open/closed marker is a validation error too, since
    /// completeness verification cannot trust a calendar with holes.
    pub async fn trading_days(
        &self,
        start: TradeDate,
        end: TradeDate,
    ) -> Result<Vec<TradeDate>, CalendarError> {
        if start > end {
            return Err(ValidationError::ReversedRange {
                start: start.compact(),
                end: end.compact(),
            }
            .into());
        }

        let start_compact = start.compact();
        let end_compact = end.compact();
        let raw = self
            .provider
            .trading_calendar(&self.exchange, &start_compact, &end_compact)
            .await
            .map_err(|error| CalendarError::RemoteUnavailable(error.to_string()))?;

        if raw.is_empty() {
            return Err(CalendarError::RemoteUnavailable(format!(
                "provider returned no calendar entries for {start_compact}..{end_compact}"
            )));
        }

        let mut days = Vec::new();
        for entry in raw {
            let is_open = entry
                .is_open
                .ok_or(ValidationError::MissingCalendarMarker {
                    date: entry.date.clone(),
                })?;
            if is_open {
                days.push(TradeDate::parse(&entry.date).map_err(CalendarError::Validation)?);
            }
        }

        days.sort_unstable();
        days.dedup();
        debug!(
            exchange = %self.exchange,
            start = %start_compact,
            end = %end_compact,
            open_days = days.len(),
            "resolved trading calendar"
        );
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        AdjFactor, CalendarDay, Listing, ProviderBar, ProviderError, ProviderFuture,
    };
    use crate::{InstrumentCode, MoneyflowRow};

    struct FixedCalendar {
        entries: Vec<CalendarDay>,
        fail: bool,
    }

    impl MarketDataProvider for FixedCalendar {
        fn trading_calendar<'a>(
            &'a self,
            _exchange: &'a str,
            _start: &'a str,
            _end: &'a str,
        ) -> ProviderFuture<'a, Vec<CalendarDay>> {
            Box::pin(async move {
                if self.fail {
                    Err(ProviderError::unavailable("calendar endpoint down"))
                } else {
                    Ok(self.entries.clone())
                }
            })
        }

        fn daily_bars<'a>(
            &'a self,
            _instrument: &'a InstrumentCode,
            _start: Option<&'a str>,
            _end: Option<&'a str>,
        ) -> ProviderFuture<'a, Vec<ProviderBar>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn adjustment_factors<'a>(
            &'a self,
            _instrument: &'a InstrumentCode,
            _start: Option<&'a str>,
            _end: Option<&'a str>,
        ) -> ProviderFuture<'a, Vec<AdjFactor>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn index_bars<'a>(
            &'a self,
            _instrument: &'a InstrumentCode,
            _start: Option<&'a str>,
            _end: Option<&'a str>,
        ) -> ProviderFuture<'a, Vec<ProviderBar>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn moneyflow<'a>(&'a self, _date: &'a str) -> ProviderFuture<'a, Vec<MoneyflowRow>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn instrument_list<'a>(&'a self) -> ProviderFuture<'a, Vec<Listing>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn day(date: &str, is_open: Option<bool>) -> CalendarDay {
        CalendarDay {
            date: date.to_string(),
            is_open,
        }
    }

    #[tokio::test]
    async fn keeps_only_open_days_sorted() {
        let provider = Arc::new(FixedCalendar {
            entries: vec![
                day("20240103", Some(true)),
                day("20240101", Some(false)),
                day("20240102", Some(true)),
            ],
            fail: false,
        });
        let service = CalendarService::new(provider, "SSE");

        let days = service
            .trading_days(
                TradeDate::parse("20240101").expect("parse"),
                TradeDate::parse("20240103").expect("parse"),
            )
            .await
            .expect("calendar");
        let compact: Vec<String> = days.iter().map(|d| d.compact()).collect();
        assert_eq!(compact, vec!["20240102", "20240103"]);
    }

    #[tokio::test]
    async fn missing_marker_is_a_validation_error() {
        let provider = Arc::new(FixedCalendar {
            entries: vec![day("20240102", None)],
            fail: false,
        });
        let service = CalendarService::new(provider, "SSE");

        let error = service
            .trading_days(
                TradeDate::parse("20240101").expect("parse"),
                TradeDate::parse("20240103").expect("parse"),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(
            error,
            CalendarError::Validation(ValidationError::MissingCalendarMarker { .. })
        ));
    }

    #[tokio::test]
    async fn provider_fault_maps_to_remote_unavailable() {
        let provider = Arc::new(FixedCalendar {
            entries: Vec::new(),
            fail: true,
        });
        let service = CalendarService::new(provider, "SSE");

        let error = service
            .trading_days(
                TradeDate::parse("20240101").expect("parse"),
                TradeDate::parse("20240103").expect("parse"),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(error, CalendarError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn reversed_window_raises_before_io() {
        let provider = Arc::new(FixedCalendar {
            entries: Vec::new(),
            fail: true,
        });
        let service = CalendarService::new(provider, "SSE");

        let error = service
            .trading_days(
                TradeDate::parse("20240110").expect("parse"),
                TradeDate::parse("20240101").expect("parse"),
            )
            .await
            .expect_err("must fail");
        // The failing provider was never reached.
        assert!(matches!(
            error,
            CalendarError::Validation(ValidationError::ReversedRange { .. })
        ));
    }
}
