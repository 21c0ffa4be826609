use barvault_core::{DateRange, FetchOrchestrator, InstrumentCode};

use crate::cli::SeriesArgs;
use crate::error::CliError;

use super::CommandReport;

pub enum SeriesKind {
    Equity,
    Index,
}

pub async fn run(
    args: &SeriesArgs,
    orchestrator: &FetchOrchestrator,
    kind: SeriesKind,
) -> Result<CommandReport, CliError> {
    let instrument = InstrumentCode::parse(&args.instrument)?;
    let range = DateRange::parse(args.start.as_deref(), args.end.as_deref())?;

    let outcome = match kind {
        SeriesKind::Equity => orchestrator.get_series(&instrument, &range).await?,
        SeriesKind::Index => orchestrator.get_index_series(&instrument, &range).await?,
    };

    Ok(CommandReport {
        status: outcome.message(),
        success: outcome.status.is_success(),
        data: serde_json::to_value(&outcome.rows)?,
    })
}
