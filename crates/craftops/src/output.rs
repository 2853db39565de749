//! Plain-text rendering of command results.
//!
//! Every function returns the rendered text so commands can be tested
//! without capturing stdout.

use craftops_engine::{
    BackupRecord, HealthCheck, HealthStatus, InstalledMod, ModUpdateResult, ServerState,
};
use std::fmt::Write;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counts of health checks per status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HealthSummary {
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

impl HealthSummary {
    pub fn from_checks(checks: &[HealthCheck]) -> Self {
        checks.iter().fold(Self::default(), |mut summary, check| {
            match check.status {
                HealthStatus::Ok => summary.passed += 1,
                HealthStatus::Warn => summary.warnings += 1,
                HealthStatus::Error => summary.failed += 1,
            }
            summary
        })
    }
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{title}");
    let _ = writeln!(out, "{}", "-".repeat(title.chars().count()));
}

fn row_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// Renders rows as left-aligned columns sized to their widest cell.
fn table(out: &mut String, headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let _ = writeln!(out, "{}", row_line(headers.iter().copied(), &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));
    for row in rows {
        let _ = writeln!(out, "{}", row_line(row.iter().map(String::as_str), &widths));
    }
}

pub fn update_report(result: &ModUpdateResult) -> String {
    let mut out = String::new();
    section(&mut out, "Update Results");

    if result.is_empty() {
        out.push_str("No mods configured for updates\n");
        out.push_str("Add Modrinth project slugs or URLs to [mods] modrinth_sources\n");
        return out;
    }

    if !result.updated.is_empty() {
        let _ = writeln!(out, "Updated {} mods:", result.updated.len());
        for name in &result.updated {
            let _ = writeln!(out, "  + {name}");
        }
    }
    if !result.failed.is_empty() {
        let _ = writeln!(out, "Failed to update {} mods:", result.failed.len());
        for (name, reason) in &result.failed {
            let _ = writeln!(out, "  ! {name}: {reason}");
        }
    }
    if !result.skipped.is_empty() {
        let _ = writeln!(out, "Skipped {} mods (already installed):", result.skipped.len());
        for name in &result.skipped {
            let _ = writeln!(out, "  = {name}");
        }
    }

    let _ = writeln!(
        out,
        "\n{} updated, {} failed, {} skipped",
        result.updated.len(),
        result.failed.len(),
        result.skipped.len()
    );
    out
}

pub fn installed_mods(mods: &[InstalledMod]) -> String {
    let mut out = String::new();
    if mods.is_empty() {
        out.push_str("No mods installed\n");
        return out;
    }

    section(&mut out, "Installed Mods");
    let rows: Vec<Vec<String>> = mods
        .iter()
        .map(|m| {
            vec![
                m.name.clone(),
                craftops_engine::health::format_size(m.size),
                m.modified.format(DATE_FORMAT).to_string(),
            ]
        })
        .collect();
    table(&mut out, &["Name", "Size", "Modified"], &rows);
    let _ = writeln!(out, "\nTotal: {} mods", mods.len());
    out
}

pub fn backup_list(records: &[BackupRecord]) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("No backups found\n");
        return out;
    }

    section(&mut out, "Available Backups");
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.created_at.format(DATE_FORMAT).to_string(),
                r.size_formatted(),
            ]
        })
        .collect();
    table(&mut out, &["Name", "Date", "Size"], &rows);
    let _ = writeln!(out, "\nTotal: {} backups", records.len());
    out
}

pub fn server_status(state: &ServerState) -> String {
    let mut out = String::new();
    section(&mut out, "Server Status");
    let verdict = if state.running {
        "running"
    } else {
        "not running"
    };
    let _ = writeln!(out, "Session '{}' is {verdict}", state.session_name);
    let _ = writeln!(out, "Checked at {}", state.checked_at.format(DATE_FORMAT));
    out
}

pub fn health_report(checks: &[HealthCheck]) -> String {
    let mut out = String::new();
    section(&mut out, "Health Check Results");
    let rows: Vec<Vec<String>> = checks
        .iter()
        .map(|c| vec![c.name.clone(), c.status.to_string(), c.message.clone()])
        .collect();
    table(&mut out, &["Component", "Status", "Details"], &rows);

    let summary = HealthSummary::from_checks(checks);
    section(&mut out, "Summary");
    let _ = writeln!(
        out,
        "{} passed, {} warnings, {} failed",
        summary.passed, summary.warnings, summary.failed
    );
    if summary.failed > 0 {
        out.push_str("System is not ready: fix the failed checks above and run again\n");
    } else if summary.warnings > 0 {
        out.push_str("System is functional but has warnings\n");
    } else {
        out.push_str("System is ready\n");
    }
    out
}
