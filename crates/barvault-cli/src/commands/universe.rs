use barvault_core::{FetchOrchestrator, InstrumentCode};

use crate::error::CliError;

use super::CommandReport;

pub async fn run(orchestrator: &FetchOrchestrator) -> Result<CommandReport, CliError> {
    let universe = orchestrator
        .tradable_instruments()
        .await
        .map_err(|error| CliError::Command(error.to_string()))?;

    let codes: Vec<&str> = universe.iter().map(InstrumentCode::as_str).collect();
    Ok(CommandReport {
        status: format!("{} tradable instruments", codes.len()),
        success: true,
        data: serde_json::to_value(&codes)?,
    })
}
