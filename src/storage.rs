//! Run history on disk.

use crate::model::RunReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

/// Default history directory, e.g. `~/.local/share/gensys/runs`.
pub fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(base.join("gensys").join("runs"))
}

/// Save a report into the default history directory.
pub fn save_run(report: &RunReport) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, report)
}

pub fn save_run_in(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let name = format!(
        "run-{}-{}.json",
        report.timestamp_utc.replace(':', "-"),
        report.identifier
    );
    let path = dir.join(name);
    export_json(&path, report)?;
    Ok(path)
}

pub fn export_json(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Load saved reports from `dir`, newest first.
pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<RunReport>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();

    let mut runs = Vec::new();
    for p in paths {
        let text = std::fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        match serde_json::from_str::<RunReport>(&text) {
            Ok(r) => runs.push((parse_timestamp(&r.timestamp_utc), r)),
            Err(e) => log::debug!("Skipping unreadable report {}: {e}", p.display()),
        }
    }
    // Unparseable timestamps sort last.
    runs.sort_by(|(a, _), (b, _)| b.cmp(a));
    Ok(runs.into_iter().take(limit).map(|(_, r)| r).collect())
}

fn parse_timestamp(s: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok()
}
