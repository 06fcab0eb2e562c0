//! Human-readable run reports.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::sync::diff::SyncDiff;
use crate::sync::runner::SyncReport;

const RULE: &str = "============================================================";

/// Render the diff section shared by sync and compare reports.
pub fn render_diff(out: &mut String, diff: &SyncDiff, desired_label: &str, actual_label: &str) {
    let _ = writeln!(out, "{desired_label:<30}{}", diff.desired.len());
    let _ = writeln!(out, "{actual_label:<30}{}", diff.actual.len());
    let _ = writeln!(out, "{:<30}{}", "Unchanged:", diff.unchanged.len());

    push_list(out, "TO ADD", '+', &diff.to_add);
    push_list(out, "TO REMOVE", '-', &diff.to_remove);

    if !diff.has_changes() {
        out.push_str("\nIn sync, nothing to do.\n");
    }
}

/// Render the report of a sync run.
pub fn render_sync_report(report: &SyncReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{RULE}");
    let mode = if report.dry_run { "dry run" } else { "apply" };
    let _ = writeln!(out, "SYNC REPORT ({mode})");
    let _ = writeln!(out, "{RULE}\n");

    render_diff(
        &mut out,
        &report.diff,
        "Active members:",
        "Forwarding rules:",
    );

    if !report.dry_run {
        let _ = writeln!(out, "\nCreated: {}", report.created.len());
        let _ = writeln!(out, "Deleted: {}", report.deleted.len());
        if !report.skipped_removals.is_empty() {
            let _ = writeln!(
                out,
                "Skipped removals: {} (re-run with --allow-delete to remove)",
                report.skipped_removals.len()
            );
        }
        if !report.failures.is_empty() {
            let _ = writeln!(out, "\nFAILED ({}):", report.failures.len());
            for failure in &report.failures {
                let _ = writeln!(
                    out,
                    "   ! {} {}: {}",
                    failure.action, failure.email, failure.error
                );
            }
        }
    } else if report.diff.has_changes() {
        out.push_str("\nNo changes made. Re-run with --apply to apply them.\n");
    }

    let _ = writeln!(out, "\n{RULE}");
    out
}

fn push_list(out: &mut String, title: &str, marker: char, emails: &BTreeSet<String>) {
    if emails.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title} ({}):", emails.len());
    for email in emails {
        let _ = writeln!(out, "   {marker} {email}");
    }
}
