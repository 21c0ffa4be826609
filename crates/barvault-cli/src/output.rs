use std::io::Write;

use serde_json::json;

use crate::commands::CommandReport;
use crate::error::CliError;

/// Render a command report as one JSON document on stdout.
pub fn render(report: &CommandReport, pretty: bool) -> Result<(), CliError> {
    let document = json!({
        "status": report.status,
        "success": report.success,
        "data": report.data,
    });

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut handle, &document)?;
    } else {
        serde_json::to_writer(&mut handle, &document)?;
    }
    writeln!(handle)?;
    Ok(())
}
