//! Bounded-concurrency batch backfill.
//!
//! One submission loop paces dispatch through a [`PacingGate`], a semaphore
//! caps in-flight workers, and a join set collects results with task-identity
//! attribution. One instrument failing never aborts the batch; the summary
//! accounts for every requested instrument exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use barvault_store::BarRow;

use crate::domain::{DateRange, InstrumentCode};
use crate::fetch::{sort_and_dedup_bars, FetchOrchestrator, FetchOutcome};
use crate::pacing::PacingGate;
use crate::ValidationError;

/// Batch fan-out knobs.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum in-flight per-instrument fetches.
    pub concurrency: usize,
    /// Pacing window for submissions.
    pub pacing_window: Duration,
    /// Submissions allowed per pacing window.
    pub pacing_burst: u32,
    /// Sleep between retries when the pacing bucket is dry.
    pub pacing_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            pacing_window: Duration::from_secs(60),
            pacing_burst: 120,
            pacing_pause: Duration::from_millis(250),
        }
    }
}

/// One instrument that did not reach a served dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub instrument: InstrumentCode,
    pub reason: String,
}

/// Result of one batch run. `succeeded.len() + failed.len()` always equals
/// `requested`, including when the run was cancelled midway.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub requested: usize,
    pub succeeded: Vec<InstrumentCode>,
    pub failed: Vec<BatchFailure>,
    /// Combined rows from the successful instruments, in deterministic
    /// (instrument, date) order with primary-key dedup.
    pub rows: Vec<BarRow>,
}

impl BatchSummary {
    pub fn is_fully_successful(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fans per-instrument read-through fetches out over a bounded worker pool.
pub struct BatchOrchestrator {
    fetcher: Arc<FetchOrchestrator>,
    gate: PacingGate,
    concurrency: usize,
}

impl BatchOrchestrator {
    pub fn new(fetcher: Arc<FetchOrchestrator>, config: BatchConfig) -> Self {
        let gate = PacingGate::new(
            config.pacing_window,
            config.pacing_burst,
            config.pacing_pause,
        );
        Self {
            fetcher,
            gate,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Run the batch. When `cancel` flips to `true`, instruments not yet
    /// dispatched are recorded as failed with a cancellation reason; already
    /// dispatched workers run to completion so their accounting stays exact.
    pub async fn run(
        &self,
        instruments: Vec<InstrumentCode>,
        range: DateRange,
        cancel: Option<watch::Receiver<bool>>,
    ) -> BatchSummary {
        let requested = instruments.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut identities: HashMap<tokio::task::Id, InstrumentCode> = HashMap::new();

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut rows: Vec<BarRow> = Vec::new();

        let mut pending = instruments.into_iter();
        for instrument in pending.by_ref() {
            if is_cancelled(cancel.as_ref()) {
                warn!(instrument = %instrument, "batch cancelled before dispatch");
                failed.push(cancelled(instrument));
                break;
            }

            self.gate.acquire().await;
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                // Closed semaphore only happens on shutdown; treat as cancel.
                Err(_) => {
                    failed.push(cancelled(instrument));
                    break;
                }
            };

            debug!(instrument = %instrument, "dispatching batch fetch");
            let fetcher = Arc::clone(&self.fetcher);
            let worker_instrument = instrument.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let result = fetcher.get_series(&worker_instrument, &range).await;
                (worker_instrument, result)
            });
            identities.insert(handle.id(), instrument);
        }
        // Anything not dispatched after a cancel is still accounted for.
        for instrument in pending {
            failed.push(cancelled(instrument));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (instrument, result))) => {
                    identities.remove(&id);
                    record(instrument, result, &mut succeeded, &mut failed, &mut rows);
                }
                Err(join_error) => {
                    let instrument = identities.remove(&join_error.id());
                    match instrument {
                        Some(instrument) => {
                            warn!(instrument = %instrument, error = %join_error, "batch worker aborted");
                            failed.push(BatchFailure {
                                instrument,
                                reason: format!("worker aborted: {join_error}"),
                            });
                        }
                        // Unattributable aborts cannot happen with the id map
                        // populated at spawn; log and keep draining.
                        None => warn!(error = %join_error, "batch worker aborted without identity"),
                    }
                }
            }
        }

        sort_and_dedup_bars(&mut rows);
        info!(
            requested,
            succeeded = succeeded.len(),
            failed = failed.len(),
            rows = rows.len(),
            "batch run finished"
        );
        BatchSummary {
            requested,
            succeeded,
            failed,
            rows,
        }
    }
}

type TaskResult = (
    InstrumentCode,
    Result<FetchOutcome<BarRow>, ValidationError>,
);

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|receiver| *receiver.borrow())
}

fn cancelled(instrument: InstrumentCode) -> BatchFailure {
    BatchFailure {
        instrument,
        reason: String::from("cancelled"),
    }
}

fn record(
    instrument: InstrumentCode,
    result: Result<FetchOutcome<BarRow>, ValidationError>,
    succeeded: &mut Vec<InstrumentCode>,
    failed: &mut Vec<BatchFailure>,
    rows: &mut Vec<BarRow>,
) {
    match result {
        Ok(outcome) if outcome.status.is_success() => {
            succeeded.push(instrument);
            rows.extend(outcome.rows);
        }
        Ok(FetchOutcome { status, .. }) => {
            let reason = status.to_string();
            warn!(instrument = %instrument, %reason, "batch instrument failed");
            failed.push(BatchFailure { instrument, reason });
        }
        Err(error) => {
            let reason = error.to_string();
            warn!(instrument = %instrument, %reason, "batch instrument rejected");
            failed.push(BatchFailure { instrument, reason });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use barvault_store::{CacheStore, StoreConfig};

    fn orchestrator(home: &std::path::Path) -> Arc<FetchOrchestrator> {
        let store = CacheStore::open(StoreConfig::at_home(home)).expect("store opens");
        let provider = Arc::new(crate::adapters::SyntheticProvider::default());
        Arc::new(FetchOrchestrator::new(
            store,
            provider,
            FetchConfig::default(),
        ))
    }

    fn codes(raw: &[&str]) -> Vec<InstrumentCode> {
        raw.iter()
            .map(|code| InstrumentCode::parse(code).expect("parse"))
            .collect()
    }

    #[tokio::test]
    async fn pre_cancelled_batch_fails_every_instrument() {
        let home = tempfile::tempdir().expect("tempdir");
        let batch = BatchOrchestrator::new(orchestrator(home.path()), BatchConfig::default());
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");

        let summary = batch
            .run(
                codes(&["600000.SH", "000001.SZ"]),
                DateRange::parse(Some("20240102"), Some("20240105")).expect("range"),
                Some(rx),
            )
            .await;

        assert_eq!(summary.requested, 2);
        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.failed.len(), 2);
        assert!(summary
            .failed
            .iter()
            .all(|failure| failure.reason == "cancelled"));
    }

    #[tokio::test]
    async fn accounting_covers_every_requested_instrument() {
        let home = tempfile::tempdir().expect("tempdir");
        let batch = BatchOrchestrator::new(orchestrator(home.path()), BatchConfig::default());

        let instruments = codes(&["600000.SH", "000001.SZ", "600519.SH"]);
        let summary = batch
            .run(
                instruments,
                DateRange::parse(Some("20240102"), Some("20240105")).expect("range"),
                None,
            )
            .await;

        assert_eq!(summary.requested, 3);
        assert_eq!(summary.succeeded.len() + summary.failed.len(), 3);
        assert!(summary.is_fully_successful());
        // Combined rows come back keyed and ordered.
        let mut keys: Vec<(String, String)> = summary
            .rows
            .iter()
            .map(|row| (row.instrument_code.clone(), row.trade_date.clone()))
            .collect();
        let sorted = {
            let mut copy = keys.clone();
            copy.sort();
            copy.dedup();
            copy
        };
        assert_eq!(keys.len(), sorted.len());
        keys.sort();
        assert_eq!(keys, sorted);
    }
}
