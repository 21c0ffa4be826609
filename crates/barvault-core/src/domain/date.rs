use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::Date;

use crate::ValidationError;

const COMPACT: &[FormatItem<'_>] = format_description!("[year][month][day]");

/// Calendar date in the provider's canonical `YYYYMMDD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(Date);

impl TradeDate {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if input.len() != 8 || !input.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(ValidationError::BadTradeDate {
                value: input.to_owned(),
            });
        }

        let parsed = Date::parse(input, COMPACT).map_err(|_| ValidationError::BadTradeDate {
            value: input.to_owned(),
        })?;
        Ok(Self(parsed))
    }

    pub fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub fn into_inner(self) -> Date {
        self.0
    }

    /// Canonical `YYYYMMDD` rendering. Lexicographic order on this form is
    /// chronological, which the store's range predicates rely on.
    pub fn compact(self) -> String {
        self.0
            .format(COMPACT)
            .expect("trade date must be formattable as YYYYMMDD")
    }
}

impl Display for TradeDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.compact())
    }
}

impl Serialize for TradeDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.compact())
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

/// Requested date window with optional bounds.
///
/// A reversed window cannot be constructed; callers get the validation error
/// before any store or remote I/O happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Option<TradeDate>,
    end: Option<TradeDate>,
}

impl DateRange {
    pub fn new(start: Option<TradeDate>, end: Option<TradeDate>) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ValidationError::ReversedRange {
                    start: start.compact(),
                    end: end.compact(),
                });
            }
        }
        Ok(Self { start, end })
    }

    pub fn bounded(start: TradeDate, end: TradeDate) -> Result<Self, ValidationError> {
        Self::new(Some(start), Some(end))
    }

    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Parse optional `YYYYMMDD` bounds, then validate ordering.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ValidationError> {
        let start = start.map(TradeDate::parse).transpose()?;
        let end = end.map(TradeDate::parse).transpose()?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<TradeDate> {
        self.start
    }

    pub fn end(&self) -> Option<TradeDate> {
        self.end
    }

    pub fn start_compact(&self) -> Option<String> {
        self.start.map(TradeDate::compact)
    }

    pub fn end_compact(&self) -> Option<String> {
        self.end.map(TradeDate::compact)
    }

    /// Both bounds present: calendar coverage can be verified.
    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_date() {
        let date = TradeDate::parse("20240102").expect("must parse");
        assert_eq!(date.compact(), "20240102");
    }

    #[test]
    fn rejects_malformed_dates() {
        for input in ["2024-01-02", "202401", "2024010a", ""] {
            let err = TradeDate::parse(input).expect_err("must fail");
            assert!(matches!(err, ValidationError::BadTradeDate { .. }));
        }
    }

    #[test]
    fn rejects_impossible_dates() {
        let err = TradeDate::parse("20240230").expect_err("must fail");
        assert!(matches!(err, ValidationError::BadTradeDate { .. }));
    }

    #[test]
    fn compact_order_is_chronological() {
        let earlier = TradeDate::parse("20231229").expect("parse");
        let later = TradeDate::parse("20240102").expect("parse");
        assert!(earlier < later);
        assert!(earlier.compact() < later.compact());
    }

    #[test]
    fn reversed_range_is_rejected_on_construction() {
        let err = DateRange::parse(Some("20240110"), Some("20240101")).expect_err("must fail");
        assert!(matches!(err, ValidationError::ReversedRange { .. }));
    }

    #[test]
    fn half_open_ranges_are_allowed() {
        let range = DateRange::parse(Some("20240101"), None).expect("must build");
        assert!(!range.is_bounded());
        assert_eq!(range.start_compact().as_deref(), Some("20240101"));
        assert_eq!(range.end_compact(), None);
    }
}
