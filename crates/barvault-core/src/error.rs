use thiserror::Error;

/// Precondition violations raised past the public boundary.
///
/// Everything else (remote faults, conflicts, storage trouble) is converted
/// into a typed fetch status at the point of occurrence; only these raise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("date range start {start} is after end {end}")]
    ReversedRange { start: String, end: String },

    #[error("trade date must be YYYYMMDD: '{value}'")]
    BadTradeDate { value: String },

    #[error("instrument code must look like 'CODE.VENUE': '{value}'")]
    BadInstrumentCode { value: String },

    #[error("calendar entry for {date} is missing its open/closed marker")]
    MissingCalendarMarker { date: String },

    #[error("money-flow fetch requires explicit start and end dates")]
    UnboundedMoneyflowRange,
}
