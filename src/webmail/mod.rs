//! Forwarding rules on the webmail side.
//!
//! The webmail has no API, so rules are managed through its settings UI by
//! [`WebmailSession`]. Every managed rule is named `<prefix><email>` and
//! redirects all mail to that address; rules without the prefix are left
//! alone.

mod rules;
pub mod selectors;
pub mod session;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::WebmailError;
use crate::membership::normalize_email;

pub use session::WebmailSession;

/// One managed redirect rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForwardingRule {
    /// Rule label as shown in the UI.
    pub name: String,
    /// Normalized redirect target.
    pub target: String,
}

impl ForwardingRule {
    /// The rule that forwards to `email` under `prefix`.
    pub fn for_target(prefix: &str, email: &str) -> Self {
        let target = normalize_email(email).unwrap_or_default();
        Self {
            name: format!("{prefix}{target}"),
            target,
        }
    }

    /// Parse a rule-list label. Only the first line is considered; labels
    /// without the prefix or without an address yield `None`.
    pub fn from_label(prefix: &str, label: &str) -> Option<Self> {
        let first_line = label.trim().lines().next()?.trim();
        let rest = first_line.strip_prefix(prefix)?;
        let target = normalize_email(rest)?;
        if !target.contains('@') || target.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            name: format!("{prefix}{target}"),
            target,
        })
    }
}

/// Parse a batch of labels into the set of managed rules.
pub fn collect_rules<I, S>(prefix: &str, labels: I) -> BTreeSet<ForwardingRule>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .filter_map(|label| ForwardingRule::from_label(prefix, label.as_ref()))
        .collect()
}

/// Redirect targets of a rule set.
pub fn rule_targets(rules: &BTreeSet<ForwardingRule>) -> BTreeSet<String> {
    rules.iter().map(|r| r.target.clone()).collect()
}

/// Whether a rule-list entry's text carries the label `name` on a line of its own.
pub fn entry_names_rule(entry_text: &str, name: &str) -> bool {
    entry_text
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case(name))
}

/// Create, delete and enumerate managed forwarding rules.
#[async_trait]
pub trait RuleController: Send {
    /// All rules carrying the managed prefix.
    async fn list_rules(&mut self) -> Result<BTreeSet<ForwardingRule>, WebmailError>;

    /// Create the rule forwarding to `email`.
    async fn create_rule(&mut self, email: &str) -> Result<ForwardingRule, WebmailError>;

    /// Delete the rule forwarding to `email`.
    async fn delete_rule(&mut self, email: &str) -> Result<(), WebmailError>;
}
