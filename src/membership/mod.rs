//! Membership directory: who should receive forwarded mail.
//!
//! The directory is the source of truth. A member counts as active when no
//! resignation date is recorded; only active members with a usable address
//! end up in the desired set.

pub mod easyverein;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MembershipError;

pub use easyverein::EasyVereinClient;

/// Source of the desired forwarding addresses.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Normalized, deduplicated addresses of all active members.
    async fn fetch_active_emails(&self) -> Result<BTreeSet<String>, MembershipError>;
}

/// Contact block of a member record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub private_email: Option<String>,
    #[serde(default)]
    pub company_email: Option<String>,
}

/// A member as returned by the membership API (only the fields we query).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub membership_number: Option<String>,
    #[serde(default)]
    pub resignation_date: Option<String>,
    #[serde(default)]
    pub contact_details: Option<ContactDetails>,
}

impl Member {
    /// Active means no resignation date is set.
    pub fn is_active(&self) -> bool {
        self.resignation_date
            .as_deref()
            .is_none_or(|d| d.trim().is_empty())
    }

    /// The preferred address, normalized: private first, company as fallback.
    pub fn email(&self) -> Option<String> {
        let contact = self.contact_details.as_ref()?;
        [&contact.private_email, &contact.company_email]
            .into_iter()
            .flatten()
            .find_map(|e| normalize_email(e))
    }

    /// Label for log lines.
    pub fn label(&self) -> String {
        match &self.membership_number {
            Some(n) => n.clone(),
            None => format!("#{}", self.id),
        }
    }
}

/// One row of the member detail export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub membership_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl MemberRecord {
    /// Build a record for an active member with a usable address.
    pub fn from_member(member: &Member) -> Option<Self> {
        if !member.is_active() {
            return None;
        }
        let email = member.email()?;
        let contact = member.contact_details.clone().unwrap_or_default();
        Some(Self {
            membership_number: member.membership_number.clone().unwrap_or_default(),
            first_name: contact.first_name.unwrap_or_default(),
            last_name: contact.family_name.unwrap_or_default(),
            email,
        })
    }
}

/// Trim and lowercase an address. Blank input yields `None`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Reduce member records to the desired address set.
pub fn active_emails<'a, I>(members: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Member>,
{
    let mut emails = BTreeSet::new();
    let mut kept = 0usize;
    let mut skipped = 0usize;

    for member in members {
        if !member.is_active() {
            tracing::debug!(member = %member.label(), "Skipping resigned member");
            skipped += 1;
            continue;
        }
        match member.email() {
            Some(email) => {
                tracing::debug!(member = %member.label(), %email, "Active member");
                emails.insert(email);
                kept += 1;
            }
            None => {
                tracing::warn!(member = %member.label(), "Active member has no email address");
                skipped += 1;
            }
        }
    }

    tracing::info!(
        kept,
        skipped,
        unique = emails.len(),
        "Processed member records"
    );
    emails
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn member(value: serde_json::Value) -> Member {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn resigned_member_is_inactive_even_with_email() {
        let m = member(json!({
            "id": 1,
            "resignationDate": "2024-12-31",
            "contactDetails": {"privateEmail": "gone@x.com"}
        }));
        assert!(!m.is_active());
        assert!(active_emails([&m]).is_empty());
        assert!(MemberRecord::from_member(&m).is_none());
    }

    #[test]
    fn private_email_wins_over_company() {
        let m = member(json!({
            "id": 2,
            "contactDetails": {"privateEmail": " Home@X.com ", "companyEmail": "work@x.com"}
        }));
        assert_eq!(m.email().as_deref(), Some("home@x.com"));
    }

    #[test]
    fn blank_private_email_falls_back_to_company() {
        let m = member(json!({
            "id": 3,
            "contactDetails": {"privateEmail": "   ", "companyEmail": "Work@X.com"}
        }));
        assert_eq!(m.email().as_deref(), Some("work@x.com"));
    }

    #[test]
    fn member_without_contact_details_has_no_email() {
        let m = member(json!({"id": 4, "contactDetails": null}));
        assert!(m.is_active());
        assert_eq!(m.email(), None);
    }

    #[test]
    fn duplicate_addresses_collapse_case_insensitively() {
        let a = member(json!({"id": 5, "contactDetails": {"privateEmail": "Same@X.com"}}));
        let b = member(json!({"id": 6, "contactDetails": {"companyEmail": "same@x.com "}}));
        let emails = active_emails([&a, &b]);
        assert_eq!(emails.len(), 1);
        assert!(emails.contains("same@x.com"));
    }

    #[test]
    fn membership_number_accepts_numbers() {
        let m = member(json!({"id": 7, "membershipNumber": 42}));
        assert_eq!(m.membership_number.as_deref(), Some("42"));
        assert_eq!(m.label(), "42");

        let m = member(json!({"id": 8}));
        assert_eq!(m.label(), "#8");
    }

    #[test]
    fn record_carries_names() {
        let m = member(json!({
            "id": 9,
            "membershipNumber": "M-9",
            "contactDetails": {
                "firstName": "Ada",
                "familyName": "Lovelace",
                "privateEmail": "ADA@x.com"
            }
        }));
        let record = MemberRecord::from_member(&m).unwrap();
        assert_eq!(
            record,
            MemberRecord {
                membership_number: "M-9".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@x.com".into(),
            }
        );
    }

    #[test]
    fn normalize_rejects_blank() {
        assert_eq!(normalize_email("  "), None);
        assert_eq!(normalize_email("\tA@B.de\n").as_deref(), Some("a@b.de"));
    }
}
