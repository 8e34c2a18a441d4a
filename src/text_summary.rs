//! Text summary builder for CLI output.
//!
//! This module formats human-readable lines for a finished run.

use crate::model::{ArtifactKind, InvocationState, RunOutcome, RunReport};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a run report.
pub fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!(
        "Run {} {} in {}",
        report.identifier,
        report.outcome.label(),
        humantime::format_duration(round_to_millis(report.elapsed))
    ));
    lines.push(format!(
        "Tool: {} ({:?} install)",
        report.location.executable.display(),
        report.location.scope
    ));

    match (&report.exchange_file, &report.export_error) {
        (Some(path), _) => lines.push(format!("Parameters: {}", path.display())),
        (None, Some(err)) => lines.push(format!("Parameters: export failed: {err}")),
        (None, None) => {}
    }

    let invocation = match &report.invocation {
        InvocationState::Exited { code: Some(c) } if *c != 0 => {
            format!("{} (artifacts imported regardless)", report.invocation.describe())
        }
        other => other.describe(),
    };
    lines.push(format!("Generator: {invocation}"));

    lines.push(format!("Destination: {}", report.import.destination.display()));
    for asset in &report.import.imported {
        lines.push(format!("  imported {}", asset.asset_path));
    }
    for kind in &report.import.missing {
        lines.push(format!("  missing  {kind}"));
    }
    for failure in &report.import.failed {
        lines.push(format!("  failed   {}: {}", failure.artifact, failure.reason));
    }

    if let RunOutcome::FailedToInvoke { imported, .. } = &report.outcome {
        if !imported.is_empty() {
            lines.push(format!(
                "Note: {} of {} imported artifacts are left over from an earlier run",
                imported.len(),
                ArtifactKind::ALL.len()
            ));
        }
    }

    TextSummary { lines }
}

fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}
