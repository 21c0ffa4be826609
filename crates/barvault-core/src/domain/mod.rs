mod date;
mod instrument;

pub use date::{DateRange, TradeDate};
pub use instrument::InstrumentCode;
