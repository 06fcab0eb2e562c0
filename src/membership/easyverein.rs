//! EasyVerein REST client.
//!
//! Pages through `/api/<version>/member`, following the `next` link of every
//! page. Authentication is a bearer token.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::MembershipConfig;
use crate::error::MembershipError;
use crate::membership::{Member, MemberDirectory, MemberRecord, active_emails};

/// Fields requested for every member.
const MEMBER_QUERY: &str = "{id,membershipNumber,resignationDate,contactDetails{firstName,familyName,privateEmail,companyEmail}}";

const PAGE_SIZE: &str = "100";

/// Pause between per-member group lookups, to stay below the API rate limit.
const DEFAULT_GROUP_LOOKUP_PAUSE: Duration = Duration::from_millis(300);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Client for the EasyVerein membership API.
pub struct EasyVereinClient {
    config: MembershipConfig,
    client: reqwest::Client,
    group_lookup_pause: Duration,
}

impl EasyVereinClient {
    pub fn new(config: MembershipConfig) -> Result<Self, MembershipError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("forward-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            client,
            group_lookup_pause: DEFAULT_GROUP_LOOKUP_PAUSE,
        })
    }

    /// Override the pause between group lookups.
    pub fn with_group_lookup_pause(mut self, pause: Duration) -> Self {
        self.group_lookup_pause = pause;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.config.api_url, self.config.api_version, path
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MembershipError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.config.api_key.expose_secret())
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(MembershipError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(MembershipError::InvalidResponse(format!(
                "HTTP {status} from {url}: {snippet}"
            )));
        }

        // Body read failures are transport errors; only parsing is InvalidResponse.
        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| MembershipError::InvalidResponse(e.to_string()))
    }

    /// Fetch every member record, all pages.
    async fn fetch_all_members(&self) -> Result<Vec<Member>, MembershipError> {
        let mut members = Vec::new();
        let mut url = self.endpoint("member");
        let mut query = vec![
            ("query", MEMBER_QUERY.to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        let mut page_no = 1u32;

        loop {
            let page: Page<Member> = self.get_json(&url, &query).await?;
            tracing::debug!(
                page = page_no,
                received = page.results.len(),
                total = ?page.count,
                "Fetched member page"
            );
            members.extend(page.results);

            match page.next {
                Some(next) if !next.is_empty() && next != url => {
                    // The next link already carries the query string.
                    url = next;
                    query.clear();
                    page_no += 1;
                }
                _ => break,
            }
        }

        tracing::debug!(count = members.len(), "Fetched all members");
        Ok(members)
    }

    async fn is_in_group(&self, member_id: u64, group_id: u64) -> Result<bool, MembershipError> {
        let url = self.endpoint(&format!("member/{member_id}/memberGroups"));
        let page: Page<serde_json::Value> = self
            .get_json(
                &url,
                &[
                    ("memberGroup", group_id.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(page.count.unwrap_or(0) > 0 || !page.results.is_empty())
    }

    /// Fetch members, narrowed to the configured group if there is one.
    ///
    /// Resigned members are passed through untouched; they are dropped later
    /// and do not need a group lookup.
    async fn fetch_scoped_members(&self) -> Result<Vec<Member>, MembershipError> {
        match (&self.config.group_id, &self.config.group_name) {
            (Some(id), Some(name)) => {
                tracing::info!(group_id = id, group = %name, "Fetching active members of group")
            }
            (Some(id), None) => tracing::info!(group_id = id, "Fetching active members of group"),
            _ => tracing::info!("Fetching active members"),
        }

        let members = self.fetch_all_members().await?;
        let Some(group_id) = self.config.group_id else {
            return Ok(members);
        };

        let total = members.len();
        tracing::info!(total, "Checking group membership (this can take a while)");

        let mut scoped = Vec::with_capacity(total);
        for (i, member) in members.into_iter().enumerate() {
            if (i + 1) % 20 == 0 {
                tracing::info!("Group check progress: {}/{}", i + 1, total);
            }
            if !member.is_active() {
                scoped.push(member);
                continue;
            }
            if self.is_in_group(member.id, group_id).await? {
                scoped.push(member);
            }
            if i + 1 < total && !self.group_lookup_pause.is_zero() {
                tokio::time::sleep(self.group_lookup_pause).await;
            }
        }

        tracing::info!(group_id, kept = scoped.len(), "Group filter applied");
        Ok(scoped)
    }

    /// Detail rows of all active members with an address, sorted by email.
    pub async fn fetch_member_records(&self) -> Result<Vec<MemberRecord>, MembershipError> {
        let members = self.fetch_scoped_members().await?;
        let mut records: Vec<MemberRecord> =
            members.iter().filter_map(MemberRecord::from_member).collect();
        records.sort_by(|a, b| a.email.cmp(&b.email));
        tracing::info!(count = records.len(), "Active members with email");
        Ok(records)
    }

    /// Fetch a single record and return the total member count.
    pub async fn check_connection(&self) -> Result<u64, MembershipError> {
        let page: Page<Member> = self
            .get_json(
                &self.endpoint("member"),
                &[
                    ("query", MEMBER_QUERY.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        let count = page.count.unwrap_or(page.results.len() as u64);
        tracing::info!(members = count, "Membership API reachable");
        Ok(count)
    }
}

#[async_trait]
impl MemberDirectory for EasyVereinClient {
    async fn fetch_active_emails(&self) -> Result<BTreeSet<String>, MembershipError> {
        let members = self.fetch_scoped_members().await?;
        Ok(active_emails(&members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_version_and_path() {
        let mut config = MembershipConfig::new("k");
        config.api_url = "http://127.0.0.1:9000".into();
        let client = EasyVereinClient::new(config).unwrap();
        assert_eq!(
            client.endpoint("member/7/memberGroups"),
            "http://127.0.0.1:9000/api/v2.0/member/7/memberGroups"
        );
    }

    #[test]
    fn page_tolerates_missing_fields() {
        let page: Page<Member> = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(page.count, None);
        assert!(page.next.is_none());
        assert!(page.results.is_empty());
    }
}
