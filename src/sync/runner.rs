//! Drives one sync run: fetch both sides, diff, then report or apply.

use crate::error::{Result, WebmailError};
use crate::membership::MemberDirectory;
use crate::sync::diff::{SyncDiff, diff};
use crate::sync::state::{SyncRun, SyncState};
use crate::webmail::{RuleController, rule_targets};

/// What a run is allowed to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Create/delete rules instead of only reporting.
    pub apply: bool,
    /// Delete rules for addresses no longer in the directory.
    pub allow_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Create,
    Delete,
}

impl std::fmt::Display for ItemAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A create or delete that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Address the rule was for.
    pub email: String,
    /// What was attempted.
    pub action: ItemAction,
    /// Error message from the controller.
    pub error: String,
}

/// Outcome of a sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Desired vs actual addresses.
    pub diff: SyncDiff,
    /// True when nothing was changed.
    pub dry_run: bool,
    /// Addresses whose rule was created.
    pub created: Vec<String>,
    /// Addresses whose rule was deleted.
    pub deleted: Vec<String>,
    /// Pending removals left alone because deletion was not allowed.
    pub skipped_removals: Vec<String>,
    /// Creates and deletes that failed.
    pub failures: Vec<ItemFailure>,
    /// State machine of this run.
    pub run: SyncRun,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Reconciles a member directory against a rule controller.
pub struct Synchronizer<'a, R: RuleController + ?Sized> {
    directory: &'a dyn MemberDirectory,
    controller: &'a mut R,
    options: SyncOptions,
}

impl<'a, R: RuleController + ?Sized> Synchronizer<'a, R> {
    pub fn new(
        directory: &'a dyn MemberDirectory,
        controller: &'a mut R,
        options: SyncOptions,
    ) -> Self {
        Self {
            directory,
            controller,
            options,
        }
    }

    /// Execute the run. Fetch failures abort it; per-item failures while
    /// applying are collected in the report.
    pub async fn run(self) -> Result<SyncReport> {
        let mut run = SyncRun::new();

        run.transition_to(SyncState::Fetching)?;
        let desired = self.directory.fetch_active_emails().await?;
        let rules = self.controller.list_rules().await?;
        let actual = rule_targets(&rules);
        tracing::info!(
            members = desired.len(),
            rules = actual.len(),
            "Fetched both sides"
        );

        run.transition_to(SyncState::Diffing)?;
        let diff = diff(desired, actual);
        tracing::info!("{}", diff.summary());

        let mut report = SyncReport {
            diff,
            dry_run: !self.options.apply,
            created: Vec::new(),
            deleted: Vec::new(),
            skipped_removals: Vec::new(),
            failures: Vec::new(),
            run: SyncRun::new(),
        };

        if !self.options.apply {
            run.transition_to(SyncState::DryRunReport)?;
            tracing::info!("Dry run, no changes made");
        } else {
            run.transition_to(SyncState::Applying)?;
            Self::apply(self.controller, self.options, &mut report).await;
            tracing::info!(
                created = report.created.len(),
                deleted = report.deleted.len(),
                skipped = report.skipped_removals.len(),
                failed = report.failures.len(),
                "Apply finished"
            );
        }

        run.transition_to(SyncState::Done)?;
        report.run = run;
        Ok(report)
    }

    /// Deletes go first so they free slots under the provider's rule cap.
    async fn apply(controller: &mut R, options: SyncOptions, report: &mut SyncReport) {
        let to_remove: Vec<String> = report.diff.to_remove.iter().cloned().collect();
        if options.allow_delete {
            for email in to_remove {
                match controller.delete_rule(&email).await {
                    Ok(()) => report.deleted.push(email),
                    Err(e) => {
                        tracing::error!(%email, error = %e, "Failed to delete rule");
                        report.failures.push(ItemFailure {
                            email,
                            action: ItemAction::Delete,
                            error: e.to_string(),
                        });
                    }
                }
            }
        } else if !to_remove.is_empty() {
            tracing::warn!(
                count = to_remove.len(),
                "Rules for former members kept, deletion not allowed"
            );
            report.skipped_removals = to_remove;
        }

        let mut to_add = report.diff.to_add.iter().cloned();
        while let Some(email) = to_add.next() {
            match controller.create_rule(&email).await {
                Ok(_) => report.created.push(email),
                Err(WebmailError::QuotaExceeded { limit }) => {
                    let error = WebmailError::QuotaExceeded { limit }.to_string();
                    let remaining: Vec<String> =
                        std::iter::once(email).chain(to_add.by_ref()).collect();
                    tracing::error!(
                        limit,
                        not_created = remaining.len(),
                        "Rule limit reached, remaining creates skipped"
                    );
                    report
                        .failures
                        .extend(remaining.into_iter().map(|email| ItemFailure {
                            email,
                            action: ItemAction::Create,
                            error: error.clone(),
                        }));
                }
                Err(e) => {
                    tracing::error!(%email, error = %e, "Failed to create rule");
                    report.failures.push(ItemFailure {
                        email,
                        action: ItemAction::Create,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}
