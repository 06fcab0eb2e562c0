//! WebDriver session against the webmail UI.
//!
//! One session is opened per run. [`WebmailSession::connect`] logs in and
//! [`WebmailSession::close`] ends the browser session; callers must close on
//! every exit path.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder};
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};

use crate::config::{Browser, WebmailConfig};
use crate::error::WebmailError;
use crate::webmail::selectors::{self, Sel};

/// Delay between polls of the page state.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Short settle time for menus and dialog animations.
pub(crate) const SETTLE: Duration = Duration::from_millis(700);

const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({block: 'center'});";
const SCRIPTED_CLICK: &str = "arguments[0].click();";
const SCRIPTED_INPUT: &str = "arguments[0].value = arguments[1]; \
    arguments[0].dispatchEvent(new Event('input', {bubbles: true})); \
    arguments[0].dispatchEvent(new Event('change', {bubbles: true}));";

/// A logged-in webmail browser session.
pub struct WebmailSession {
    pub(crate) client: Client,
    pub(crate) config: WebmailConfig,
    /// Managed rule count as of the last listing, adjusted on create/delete.
    pub(crate) known_rules: Option<usize>,
}

impl WebmailSession {
    /// Start a browser session and log in.
    ///
    /// The browser is shut down again if login fails.
    pub async fn connect(config: WebmailConfig) -> Result<Self, WebmailError> {
        tracing::info!(
            endpoint = %config.webdriver_url,
            browser = ?config.browser,
            headless = config.headless,
            "Starting browser session"
        );

        let client = ClientBuilder::native()
            .capabilities(capabilities(&config))
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| WebmailError::BrowserUnavailable {
                endpoint: config.webdriver_url.clone(),
                reason: e.to_string(),
            })?;

        let session = Self {
            client,
            config,
            known_rules: None,
        };

        if let Err(e) = session.login().await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Log in and out again.
    pub async fn check_login(config: WebmailConfig) -> Result<(), WebmailError> {
        let session = Self::connect(config).await?;
        session.close().await;
        Ok(())
    }

    /// End the browser session. Failures are logged, not returned.
    pub async fn close(self) {
        match self.client.close().await {
            Ok(()) => tracing::debug!("Browser session closed"),
            Err(e) => tracing::warn!(error = %e, "Failed to close browser session"),
        }
    }

    async fn login(&self) -> Result<(), WebmailError> {
        tracing::info!(url = %self.config.webmail_url, "Opening webmail");
        self.client.goto(&self.config.webmail_url).await?;

        let username = self.wait_for("login form", selectors::LOGIN_USERNAME).await?;
        self.type_into(&username, &self.config.email).await?;

        let password = self.wait_for("password field", selectors::LOGIN_PASSWORD).await?;
        self.type_into(&password, self.config.password.expose_secret())
            .await?;

        let submit = self.wait_for("login button", selectors::LOGIN_SUBMIT).await?;
        self.click(&submit).await?;
        tracing::debug!("Login submitted");

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if self.logged_in().await? {
                tracing::info!(account = %self.config.email, "Logged in to webmail");
                return Ok(());
            }
            if let Some(error) = self.first_visible(selectors::LOGIN_ERROR).await? {
                let reason = error.text().await.unwrap_or_default().trim().to_string();
                if !reason.is_empty() {
                    return Err(WebmailError::Auth { reason });
                }
            }
            if Instant::now() >= deadline {
                self.dump_debug("login").await;
                return Err(WebmailError::UiTimeout {
                    step: "login".into(),
                    timeout: self.config.timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn logged_in(&self) -> Result<bool, WebmailError> {
        if !self
            .client
            .find_all(selectors::MAILBOX_READY.locator())
            .await?
            .is_empty()
        {
            return Ok(true);
        }
        let url = self.client.current_url().await?;
        let form_gone = self
            .client
            .find_all(selectors::LOGIN_USERNAME.locator())
            .await?
            .is_empty();
        Ok(form_gone && url.as_str().to_lowercase().contains("appsuite"))
    }

    /// Open the mail filter settings with the rule list expanded.
    pub(crate) async fn open_filter_settings(&self) -> Result<(), WebmailError> {
        let url = filter_settings_url(&self.config.webmail_url);
        tracing::debug!(%url, "Opening filter settings");
        self.client.goto(&url).await?;

        self.poll_for("filter settings", self.config.timeout, move || {
            self.first_visible(selectors::NEW_RULE_BUTTON)
        })
        .await?;

        for summary in self
            .client
            .find_all(selectors::COLLAPSED_RULES_SECTION.locator())
            .await?
        {
            if summary.is_displayed().await.unwrap_or(false) {
                self.click(&summary).await?;
                tokio::time::sleep(SETTLE).await;
                tracing::debug!("Expanded rules section");
            }
        }
        Ok(())
    }

    /// Wait up to the configured timeout for `sel` to be present.
    pub(crate) async fn wait_for(&self, step: &str, sel: Sel<'_>) -> Result<Element, WebmailError> {
        let result = self
            .client
            .wait()
            .at_most(self.config.timeout)
            .every(POLL_INTERVAL)
            .for_element(sel.locator())
            .await;

        match result {
            Ok(element) => Ok(element),
            Err(CmdError::WaitTimeout) => {
                self.dump_debug(step).await;
                Err(WebmailError::UiTimeout {
                    step: step.to_string(),
                    timeout: self.config.timeout,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll `probe` until it yields a value or `within` elapses.
    pub(crate) async fn poll_for<T, F, Fut>(
        &self,
        step: &str,
        within: Duration,
        probe: F,
    ) -> Result<T, WebmailError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<T>, WebmailError>>,
    {
        let deadline = Instant::now() + within;
        loop {
            if let Some(found) = probe().await? {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                self.dump_debug(step).await;
                return Err(WebmailError::UiTimeout {
                    step: step.to_string(),
                    timeout: within,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// First displayed and enabled element matching any selector, in order.
    pub(crate) async fn first_visible(
        &self,
        sels: &[Sel<'_>],
    ) -> Result<Option<Element>, WebmailError> {
        for sel in sels {
            for element in self.client.find_all(sel.locator()).await? {
                if is_interactable(&element).await {
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    }

    /// Click with scroll-into-view, falling back to a scripted click.
    pub(crate) async fn click(&self, element: &Element) -> Result<(), WebmailError> {
        let handle = element_arg(element)?;
        if let Err(e) = self
            .client
            .execute(SCROLL_INTO_VIEW, vec![handle.clone()])
            .await
        {
            tracing::debug!(error = %e, "scrollIntoView failed");
        }
        if let Err(e) = element.click().await {
            tracing::debug!(error = %e, "Native click failed, using scripted click");
            self.client.execute(SCRIPTED_CLICK, vec![handle]).await?;
        }
        Ok(())
    }

    /// Replace the field's content, falling back to setting the value by script.
    pub(crate) async fn type_into(
        &self,
        element: &Element,
        text: &str,
    ) -> Result<(), WebmailError> {
        let handle = element_arg(element)?;
        if let Err(e) = self
            .client
            .execute(SCROLL_INTO_VIEW, vec![handle.clone()])
            .await
        {
            tracing::debug!(error = %e, "scrollIntoView failed");
        }

        let typed = async {
            element.clear().await?;
            element.send_keys(text).await
        }
        .await;

        if let Err(e) = typed {
            tracing::debug!(error = %e, "Typing failed, setting value by script");
            self.client
                .execute(SCRIPTED_INPUT, vec![handle, json!(text)])
                .await?;
        }
        Ok(())
    }

    /// Write a screenshot and the page source to the debug directory, if set.
    pub(crate) async fn dump_debug(&self, step: &str) {
        let Some(dir) = self.config.debug_dir.as_deref() else {
            return;
        };
        let stem = format!(
            "{}_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            debug_slug(step)
        );
        if let Err(e) = self.write_debug_files(dir, &stem).await {
            tracing::warn!(error = %e, dir = %dir.display(), "Could not write debug files");
        } else {
            tracing::info!(
                dir = %dir.display(),
                file = %stem,
                "Saved debug screenshot and page source"
            );
        }
    }

    async fn write_debug_files(&self, dir: &Path, stem: &str) -> Result<(), WebmailError> {
        let io = |e: std::io::Error| WebmailError::Driver(format!("debug dump: {e}"));
        tokio::fs::create_dir_all(dir).await.map_err(io)?;
        let png = self.client.screenshot().await?;
        tokio::fs::write(dir.join(format!("{stem}.png")), png)
            .await
            .map_err(io)?;
        let html = self.client.source().await?;
        tokio::fs::write(dir.join(format!("{stem}.html")), html)
            .await
            .map_err(io)?;
        Ok(())
    }
}

/// Whether the element is shown and accepts input. Stale elements count as not.
pub(crate) async fn is_interactable(element: &Element) -> bool {
    element.is_displayed().await.unwrap_or(false) && element.is_enabled().await.unwrap_or(false)
}

fn element_arg(element: &Element) -> Result<Value, WebmailError> {
    serde_json::to_value(element).map_err(|e| WebmailError::Driver(e.to_string()))
}

/// WebDriver capabilities for the configured browser.
pub fn capabilities(config: &WebmailConfig) -> Map<String, Value> {
    let mut caps = Map::new();
    match config.browser {
        Browser::Chrome => {
            let mut args = vec![
                "--window-size=1920,1080",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--lang=de-DE",
            ];
            if config.headless {
                args.insert(0, "--headless=new");
            }
            caps.insert("browserName".into(), json!("chrome"));
            caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
        }
        Browser::Firefox => {
            let mut args = vec!["--width=1920", "--height=1080"];
            if config.headless {
                args.insert(0, "-headless");
            }
            caps.insert("browserName".into(), json!("firefox"));
            caps.insert(
                "moz:firefoxOptions".into(),
                json!({
                    "args": args,
                    "prefs": { "intl.accept_languages": "de-DE" }
                }),
            );
        }
    }
    caps
}

/// Absolute URL of the filter settings page. `webmail_url` ends with `/`.
pub fn filter_settings_url(webmail_url: &str) -> String {
    format!("{webmail_url}{}", selectors::FILTER_SETTINGS_ROUTE)
}

fn debug_slug(step: &str) -> String {
    step.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_headless_capabilities() {
        let config = WebmailConfig::new("box@club.de", "pw");
        let caps = capabilities(&config);
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args[0], "--headless=new");
        assert!(args.iter().any(|a| a == "--lang=de-DE"));
    }

    #[test]
    fn visible_chrome_has_no_headless_flag() {
        let mut config = WebmailConfig::new("box@club.de", "pw");
        config.headless = false;
        let caps = capabilities(&config);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a.as_str().is_some_and(|s| s.contains("headless"))));
    }

    #[test]
    fn firefox_capabilities() {
        let mut config = WebmailConfig::new("box@club.de", "pw");
        config.browser = Browser::Firefox;
        let caps = capabilities(&config);
        assert_eq!(caps["browserName"], "firefox");
        assert_eq!(caps["moz:firefoxOptions"]["args"][0], "-headless");
        assert!(caps.get("goog:chromeOptions").is_none());
    }

    #[test]
    fn filter_url_appends_route() {
        assert_eq!(
            filter_settings_url("https://webmail.strato.de/"),
            concat!(
                "https://webmail.strato.de/appsuite/#!!&app=io.ox/settings",
                "&folder=virtual/settings/io.ox/mail/settings/filter"
            )
        );
    }

    #[test]
    fn slug_is_filename_safe() {
        assert_eq!(debug_slug("new rule: save"), "new_rule__save");
    }

    #[tokio::test]
    async fn unreachable_webdriver_is_browser_unavailable() {
        let mut config = WebmailConfig::new("box@club.de", "pw");
        // Port 9 (discard) is not a WebDriver endpoint.
        config.webdriver_url = "http://127.0.0.1:9".into();
        let err = WebmailSession::connect(config).await.err().unwrap();
        assert!(matches!(err, WebmailError::BrowserUnavailable { .. }));
    }
}
