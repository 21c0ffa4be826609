use std::sync::Arc;

use serde_json::json;

use barvault_core::{
    BatchConfig, BatchOrchestrator, DateRange, FetchOrchestrator, InstrumentCode,
};

use crate::cli::BatchArgs;
use crate::error::CliError;

use super::CommandReport;

pub async fn run(args: &BatchArgs, orchestrator: FetchOrchestrator) -> Result<CommandReport, CliError> {
    let range = DateRange::parse(args.start.as_deref(), args.end.as_deref())?;

    let instruments = if args.universe {
        orchestrator
            .tradable_instruments()
            .await
            .map_err(|error| CliError::Command(error.to_string()))?
    } else if args.instruments.is_empty() {
        return Err(CliError::Command(String::from(
            "no instruments given; pass codes or --universe",
        )));
    } else {
        args.instruments
            .iter()
            .map(|code| InstrumentCode::parse(code))
            .collect::<Result<Vec<_>, _>>()?
    };

    let config = BatchConfig {
        concurrency: args.concurrency,
        ..BatchConfig::default()
    };
    let batch = BatchOrchestrator::new(Arc::new(orchestrator), config);
    let summary = batch.run(instruments, range, None).await;

    let status = format!(
        "{} of {} instruments backfilled, {} failed",
        summary.succeeded.len(),
        summary.requested,
        summary.failed.len()
    );
    let success = summary.is_fully_successful();
    let data = json!({
        "requested": summary.requested,
        "succeeded": summary
            .succeeded
            .iter()
            .map(InstrumentCode::as_str)
            .collect::<Vec<_>>(),
        "failed": summary
            .failed
            .iter()
            .map(|failure| json!({
                "instrument": failure.instrument.as_str(),
                "reason": failure.reason,
            }))
            .collect::<Vec<_>>(),
        "rows": summary.rows,
    });

    Ok(CommandReport {
        status,
        success,
        data,
    })
}
