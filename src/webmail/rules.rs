//! Rule management through the filter settings page.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::Locator;
use fantoccini::elements::Element;

use crate::error::WebmailError;
use crate::webmail::selectors::{self, Sel};
use crate::webmail::session::{SETTLE, WebmailSession, is_interactable};
use crate::webmail::{ForwardingRule, RuleController, collect_rules, entry_names_rule};

/// How long the action dropdown gets to offer the redirect option.
const REDIRECT_OPTION_WAIT: Duration = Duration::from_secs(5);

impl WebmailSession {
    async fn rule_labels(&self) -> Result<Vec<String>, WebmailError> {
        let mut labels = Vec::new();
        let prefixed = selectors::prefixed_label_xpath(&self.config.rule_prefix);
        for locator in [selectors::RULE_LIST_ITEMS.locator(), Locator::XPath(&prefixed)] {
            for element in self.client.find_all(locator).await? {
                // Entries can disappear while the list re-renders.
                if let Ok(text) = element.text().await {
                    labels.push(text);
                }
            }
        }
        Ok(labels)
    }

    /// First displayed entry found by `xpaths` whose text names the rule.
    async fn find_rule_entry(
        &self,
        name: &str,
        xpaths: &[String],
    ) -> Result<Option<Element>, WebmailError> {
        for xpath in xpaths {
            for element in self.client.find_all(Locator::XPath(xpath)).await? {
                if !element.is_displayed().await.unwrap_or(false) {
                    continue;
                }
                let text = element.text().await.unwrap_or_default();
                if entry_names_rule(&text, name) {
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    }

    async fn require(&self, step: &str, sels: &[Sel<'_>]) -> Result<Element, WebmailError> {
        self.poll_for(step, self.config.timeout, move || self.first_visible(sels))
            .await
    }

    /// Last empty redirect input in the rule dialog; the newest action sits at the end.
    async fn empty_redirect_input(&self) -> Result<Option<Element>, WebmailError> {
        let mut candidate = None;
        for sel in selectors::REDIRECT_INPUT {
            for element in self.client.find_all(sel.locator()).await? {
                if !is_interactable(&element).await {
                    continue;
                }
                let value = element.prop("value").await?.unwrap_or_default();
                if value.trim().is_empty() {
                    candidate = Some(element);
                }
            }
            if candidate.is_some() {
                break;
            }
        }
        Ok(candidate)
    }

    /// Open the action type dropdown, searching the actions fieldset first.
    async fn open_action_dropdown(&self) -> Result<(), WebmailError> {
        let toggle = match self.first_visible(selectors::ACTIONS_FIELDSET).await? {
            Some(fieldset) => {
                let mut last = None;
                for element in fieldset.find_all(selectors::DROPDOWN_TOGGLE.locator()).await? {
                    if is_interactable(&element).await {
                        last = Some(element);
                    }
                }
                last
            }
            None => None,
        };

        let toggle = match toggle {
            Some(t) => t,
            None => self
                .require("action dropdown", &[selectors::DROPDOWN_TOGGLE])
                .await?,
        };
        self.click(&toggle).await?;
        tokio::time::sleep(SETTLE).await;
        Ok(())
    }

    async fn wait_until_gone(&self, step: &str, sels: &[Sel<'_>]) -> Result<(), WebmailError> {
        self.poll_for(step, self.config.timeout, move || async move {
            Ok::<_, WebmailError>(self.first_visible(sels).await?.is_none().then_some(()))
        })
        .await
    }

    async fn wait_until_rule_gone(&self, name: &str) -> Result<(), WebmailError> {
        let exact = [selectors::rule_entry_xpath(name)];
        let exact = &exact;
        self.poll_for("rule removal", self.config.timeout, move || async move {
            let entry = self.find_rule_entry(name, exact).await?;
            Ok::<_, WebmailError>(entry.is_none().then_some(()))
        })
        .await
    }

    async fn add_rule_in_ui(&self, rule: &ForwardingRule) -> Result<(), WebmailError> {
        let limit = self.config.rule_limit;
        self.open_filter_settings().await?;
        let new_rule = self.require("new rule button", selectors::NEW_RULE_BUTTON).await?;
        self.click(&new_rule).await?;

        let name_input = self.require("rule name field", selectors::RULE_NAME_INPUT).await?;
        self.type_into(&name_input, &rule.name).await?;

        let add_action = self.require("add action link", selectors::ADD_ACTION_LINK).await?;
        self.click(&add_action).await?;
        tokio::time::sleep(SETTLE).await;

        self.open_action_dropdown().await?;
        let redirect = match self
            .poll_for("redirect option", REDIRECT_OPTION_WAIT, move || {
                self.first_visible(selectors::REDIRECT_OPTION)
            })
            .await
        {
            Ok(option) => option,
            Err(WebmailError::UiTimeout { .. }) => {
                tracing::warn!(limit, "Redirect action not offered, rule limit reached");
                return Err(WebmailError::QuotaExceeded { limit });
            }
            Err(e) => return Err(e),
        };
        self.click(&redirect).await?;
        tokio::time::sleep(SETTLE).await;

        let target_input = self
            .poll_for("redirect address field", self.config.timeout, move || {
                self.empty_redirect_input()
            })
            .await?;
        self.type_into(&target_input, &rule.target).await?;

        let save = self.require("save button", selectors::SAVE_BUTTON).await?;
        self.click(&save).await?;
        self.wait_until_gone("rule dialog to close", selectors::RULE_NAME_INPUT)
            .await
    }

    async fn remove_rule_in_ui(&self, rule: &ForwardingRule) -> Result<(), WebmailError> {
        self.open_filter_settings().await?;
        let candidates = selectors::rule_entry_xpaths(&rule.name);
        let Some(entry) = self.find_rule_entry(&rule.name, &candidates).await? else {
            return Err(WebmailError::RuleNotFound {
                name: rule.name.clone(),
            });
        };
        self.click(&entry).await?;
        tokio::time::sleep(SETTLE).await;

        let mut row_button = None;
        for button in entry.find_all(selectors::ROW_DELETE_BUTTON.locator()).await? {
            if is_interactable(&button).await {
                row_button = Some(button);
                break;
            }
        }
        let delete = match row_button {
            Some(b) => b,
            None => self
                .first_visible(selectors::DELETE_BUTTON)
                .await?
                .ok_or_else(|| WebmailError::ElementMissing {
                    what: format!("delete button for {}", rule.name),
                })?,
        };
        self.click(&delete).await?;
        tokio::time::sleep(SETTLE).await;

        if let Some(confirm) = self.first_visible(selectors::CONFIRM_BUTTON).await? {
            self.click(&confirm).await?;
        }
        self.wait_until_rule_gone(&rule.name).await
    }
}

#[async_trait]
impl RuleController for WebmailSession {
    async fn list_rules(&mut self) -> Result<BTreeSet<ForwardingRule>, WebmailError> {
        self.open_filter_settings().await?;
        let labels = self.rule_labels().await?;
        let rules = collect_rules(&self.config.rule_prefix, &labels);

        tracing::info!(
            labels = labels.len(),
            managed = rules.len(),
            prefix = %self.config.rule_prefix,
            "Listed forwarding rules"
        );
        self.known_rules = Some(rules.len());
        Ok(rules)
    }

    async fn create_rule(&mut self, email: &str) -> Result<ForwardingRule, WebmailError> {
        let limit = self.config.rule_limit;
        if self.known_rules.is_some_and(|n| n >= limit) {
            return Err(WebmailError::QuotaExceeded { limit });
        }

        let rule = ForwardingRule::for_target(&self.config.rule_prefix, email);
        tracing::debug!(rule = %rule.name, "Creating forwarding rule");
        self.add_rule_in_ui(&rule).await?;

        if let Some(n) = self.known_rules.as_mut() {
            *n += 1;
        }
        tracing::info!(rule = %rule.name, "Created forwarding rule");
        Ok(rule)
    }

    async fn delete_rule(&mut self, email: &str) -> Result<(), WebmailError> {
        let rule = ForwardingRule::for_target(&self.config.rule_prefix, email);
        tracing::debug!(rule = %rule.name, "Deleting forwarding rule");
        self.remove_rule_in_ui(&rule).await?;

        if let Some(n) = self.known_rules.as_mut() {
            *n = n.saturating_sub(1);
        }
        tracing::info!(rule = %rule.name, "Deleted forwarding rule");
        Ok(())
    }
}
