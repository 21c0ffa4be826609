use barvault_core::{DateRange, FetchOrchestrator};

use crate::cli::MoneyflowArgs;
use crate::error::CliError;

use super::CommandReport;

pub async fn run(
    args: &MoneyflowArgs,
    orchestrator: &FetchOrchestrator,
) -> Result<CommandReport, CliError> {
    let range = DateRange::parse(Some(&args.start), Some(&args.end))?;
    let outcome = orchestrator.get_moneyflow(&range).await?;

    Ok(CommandReport {
        status: outcome.message(),
        success: outcome.status.is_success(),
        data: serde_json::to_value(&outcome.rows)?,
    })
}
