//! Read-through caching core for daily market data.
//!
//! The orchestrators in [`fetch`] and [`batch`] implement the full protocol:
//! query the durable store, verify completeness against the trading calendar,
//! backfill gaps from a [`provider::MarketDataProvider`], and merge under the
//! conflict-safe policy in [`conflict`]. Callers always get a dataset plus a
//! status; only input validation raises.

pub mod adapters;
pub mod batch;
pub mod calendar;
pub mod completeness;
pub mod conflict;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod pacing;
pub mod provider;

pub use barvault_store::{BarRow, CacheStore, MoneyflowRow, StoreConfig, StoreError};

pub use batch::{BatchConfig, BatchFailure, BatchOrchestrator, BatchSummary};
pub use calendar::{CalendarError, CalendarService};
pub use completeness::{CompletenessChecker, CompletenessReport, Incompleteness};
pub use conflict::{ConflictResolver, DataConflict, FieldConflict, MergePlan};
pub use domain::{DateRange, InstrumentCode, TradeDate};
pub use error::ValidationError;
pub use fetch::{FetchConfig, FetchOrchestrator, FetchOutcome, FetchStatus};
pub use pacing::PacingGate;
pub use provider::{MarketDataProvider, ProviderError, ProviderErrorKind};
