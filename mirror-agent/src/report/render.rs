//! Structured (JSON) and narrative (Markdown) renderings of a run report.
//!
//! Both are written under `backups/summary/<date>/`. Writing is
//! best-effort: failures are logged and never change the run's outcome.

use super::RunReport;
use crate::utils::errors::Result;
use crate::utils::format::{format_bytes, format_duration};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory (under the backups root) holding run reports
pub const SUMMARY_DIR: &str = "summary";
pub const JSON_FILE: &str = "backup-summary.json";
pub const MARKDOWN_FILE: &str = "backup-summary.md";

pub fn to_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn to_markdown(report: &RunReport) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Backup Summary - {}", report.run_date.format("%Y-%m-%d"));
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Started:** {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md, "- **Finished:** {}", report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md, "- **Duration:** {}", format_duration(report.elapsed));
    let _ = writeln!(md, "- **Repositories:** {}", report.total());
    let _ = writeln!(md, "- **Successful:** {}", report.succeeded_count);
    let _ = writeln!(md, "- **Failed:** {}", report.failed_count);
    let _ = writeln!(md, "- **Success rate:** {:.1}%", report.success_rate());
    let _ = writeln!(md, "- **Archived total:** {}", format_bytes(report.total_archive_bytes()));
    let _ = writeln!(md);
    let _ = writeln!(md, "## Results");
    let _ = writeln!(md);

    if report.outcomes.is_empty() {
        let _ = writeln!(md, "_No repositories were processed._");
        return md;
    }

    let _ = writeln!(md, "| Status | Repository | Size | Archive | Duration | Error |");
    let _ = writeln!(md, "|--------|------------|------|---------|----------|-------|");
    for outcome in &report.outcomes {
        let marker = if outcome.succeeded { "✅" } else { "❌" };
        let archive = outcome
            .archive_size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        let error = match (&outcome.failure_reason, outcome.failed_stage) {
            (Some(reason), Some(stage)) => format!("{}: {}", stage, escape_cell(reason)),
            (Some(reason), None) => escape_cell(reason),
            _ => String::new(),
        };
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} |",
            marker,
            escape_cell(outcome.name()),
            format_bytes(outcome.uncompressed_size_bytes),
            archive,
            format_duration(outcome.elapsed),
            error,
        );
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn summary_dir(backups_root: &Path, report: &RunReport) -> PathBuf {
    backups_root
        .join(SUMMARY_DIR)
        .join(report.run_date.format("%Y-%m-%d").to_string())
}

/// Write both renderings. Returns the paths actually written.
pub fn persist(report: &RunReport, backups_root: &Path) -> Vec<PathBuf> {
    let dir = summary_dir(backups_root, report);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(dir = %dir.display(), error = %e, "Failed to create summary directory");
        return Vec::new();
    }

    let mut written = Vec::new();

    let json_path = dir.join(JSON_FILE);
    match to_json(report).and_then(|json| Ok(std::fs::write(&json_path, json)?)) {
        Ok(()) => written.push(json_path),
        Err(e) => warn!(path = %json_path.display(), error = %e, "Failed to write JSON summary"),
    }

    let md_path = dir.join(MARKDOWN_FILE);
    match std::fs::write(&md_path, to_markdown(report)) {
        Ok(()) => written.push(md_path),
        Err(e) => warn!(path = %md_path.display(), error = %e, "Failed to write Markdown summary"),
    }

    if !written.is_empty() {
        info!(dir = %dir.display(), files = written.len(), "Run summary saved");
    }
    written
}
