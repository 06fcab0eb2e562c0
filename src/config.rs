//! Configuration types, built from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://easyverein.com";
pub const DEFAULT_API_VERSION: &str = "v2.0";
pub const DEFAULT_WEBMAIL_URL: &str = "https://webmail.strato.de/";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const DEFAULT_RULE_PREFIX: &str = "MC_";
/// Observed cap on filter rules per mailbox.
pub const DEFAULT_RULE_LIMIT: usize = 50;

/// Membership API configuration.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub api_version: String,
    /// Only members of this group are synced when set.
    pub group_id: Option<u64>,
    /// Group label, used for logging only.
    pub group_name: Option<String>,
}

impl MembershipConfig {
    /// Create a config with defaults for everything except the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: SecretString::from(api_key.into()),
            api_version: DEFAULT_API_VERSION.to_string(),
            group_id: None,
            group_name: None,
        }
    }
}

/// Browser driven through WebDriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Self::Chrome),
            "firefox" => Ok(Self::Firefox),
            other => Err(format!("unsupported browser '{other}' (use chrome or firefox)")),
        }
    }
}

/// Webmail (browser automation) configuration.
#[derive(Debug, Clone)]
pub struct WebmailConfig {
    pub email: String,
    pub password: SecretString,
    pub webmail_url: String,
    pub webdriver_url: String,
    pub browser: Browser,
    pub headless: bool,
    /// Upper bound for every wait-for-element step.
    pub timeout: Duration,
    pub rule_prefix: String,
    pub rule_limit: usize,
    /// Screenshots and page sources are dumped here on UI timeouts.
    pub debug_dir: Option<PathBuf>,
}

impl WebmailConfig {
    /// Create a config with defaults for everything except the account.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
            webmail_url: DEFAULT_WEBMAIL_URL.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            browser: Browser::Chrome,
            headless: true,
            timeout: Duration::from_secs(30),
            rule_prefix: DEFAULT_RULE_PREFIX.to_string(),
            rule_limit: DEFAULT_RULE_LIMIT,
            debug_dir: None,
        }
    }
}

/// Complete configuration for one invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub membership: MembershipConfig,
    /// `None` when no webmail credentials are configured.
    pub webmail: Option<WebmailConfig>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("EV_API_KEY").ok_or_else(|| ConfigError::MissingRequired {
            key: "EV_API_KEY".into(),
            hint: "Set it in the environment or in a .env file".into(),
        })?;

        let api_url = get("EV_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        validate_url("EV_API_URL", &api_url)?;

        let group_id = get("EV_GROUP_ID")
            .map(|v| parse_value::<u64>("EV_GROUP_ID", &v))
            .transpose()?;

        let membership = MembershipConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key),
            api_version: get("EV_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            group_id,
            group_name: get("EV_GROUP_NAME"),
        };

        let webmail = match (get("STRATO_EMAIL"), get("STRATO_PASSWORD")) {
            (Some(email), Some(password)) => {
                let mut webmail_url =
                    get("STRATO_WEBMAIL_URL").unwrap_or_else(|| DEFAULT_WEBMAIL_URL.to_string());
                validate_url("STRATO_WEBMAIL_URL", &webmail_url)?;
                if !webmail_url.ends_with('/') {
                    webmail_url.push('/');
                }

                let webdriver_url =
                    get("WEBDRIVER_URL").unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());
                validate_url("WEBDRIVER_URL", &webdriver_url)?;

                let browser = get("STRATO_BROWSER")
                    .map(|v| {
                        v.parse::<Browser>()
                            .map_err(|message| ConfigError::InvalidValue {
                                key: "STRATO_BROWSER".into(),
                                message,
                            })
                    })
                    .transpose()?
                    .unwrap_or(Browser::Chrome);

                let timeout_secs = get("STRATO_TIMEOUT")
                    .map(|v| parse_value::<u64>("STRATO_TIMEOUT", &v))
                    .transpose()?
                    .unwrap_or(30);

                let rule_limit = get("STRATO_RULE_LIMIT")
                    .map(|v| parse_value::<usize>("STRATO_RULE_LIMIT", &v))
                    .transpose()?
                    .unwrap_or(DEFAULT_RULE_LIMIT);

                Some(WebmailConfig {
                    email,
                    password: SecretString::from(password),
                    webmail_url,
                    webdriver_url,
                    browser,
                    headless: get("STRATO_HEADLESS").is_none_or(|v| parse_flag(&v)),
                    timeout: Duration::from_secs(timeout_secs),
                    rule_prefix: get("STRATO_RULE_PREFIX")
                        .unwrap_or_else(|| DEFAULT_RULE_PREFIX.to_string()),
                    rule_limit,
                    debug_dir: get("STRATO_DEBUG_DIR").map(PathBuf::from),
                })
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Only one of STRATO_EMAIL / STRATO_PASSWORD is set; webmail access disabled"
                );
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            membership,
            webmail,
        })
    }
}

/// Load a `.env` file into the process environment.
///
/// With an explicit path the file must exist. Without one, a `.env` in the
/// working directory or any parent is used when present.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|e| ConfigError::EnvFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(ConfigError::EnvFile {
                path: PathBuf::from(".env"),
                reason: e.to_string(),
            }),
        },
    }
}

/// Default tracing filter: `debug` when requested, else `LOG_LEVEL`, else `info`.
///
/// Read separately from [`AppConfig`] because logging starts before the
/// config is built. `RUST_LOG` still takes precedence at subscriber init.
pub fn log_filter<F>(debug: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if debug {
        return "debug".to_string();
    }
    lookup("LOG_LEVEL")
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Interpret `true` / `1` / `yes` (any case) as set.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{value}': {e}"),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "EV_API_KEY"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        assert!(config_from(&[("EV_API_KEY", "   ")]).is_err());
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = config_from(&[("EV_API_KEY", "secret")]).unwrap();
        assert_eq!(config.membership.api_key.expose_secret(), "secret");
        assert_eq!(config.membership.api_url, DEFAULT_API_URL);
        assert_eq!(config.membership.api_version, "v2.0");
        assert_eq!(config.membership.group_id, None);
        assert!(config.webmail.is_none());
    }

    #[test]
    fn webmail_requires_both_credentials() {
        let config = config_from(&[("EV_API_KEY", "k"), ("STRATO_EMAIL", "box@club.de")]).unwrap();
        assert!(config.webmail.is_none());
    }

    #[test]
    fn webmail_settings_are_parsed() {
        let config = config_from(&[
            ("EV_API_KEY", "k"),
            ("STRATO_EMAIL", "box@club.de"),
            ("STRATO_PASSWORD", "pw"),
            ("STRATO_WEBMAIL_URL", "https://mail.example.org"),
            ("STRATO_HEADLESS", "no"),
            ("STRATO_BROWSER", "Firefox"),
            ("STRATO_TIMEOUT", "12"),
            ("STRATO_RULE_PREFIX", "FWD_"),
            ("STRATO_RULE_LIMIT", "20"),
        ])
        .unwrap();
        let webmail = config.webmail.unwrap();
        assert_eq!(webmail.email, "box@club.de");
        assert_eq!(webmail.webmail_url, "https://mail.example.org/");
        assert!(!webmail.headless);
        assert_eq!(webmail.browser, Browser::Firefox);
        assert_eq!(webmail.timeout, Duration::from_secs(12));
        assert_eq!(webmail.rule_prefix, "FWD_");
        assert_eq!(webmail.rule_limit, 20);
        assert_eq!(webmail.webdriver_url, DEFAULT_WEBDRIVER_URL);
    }

    #[test]
    fn headless_defaults_to_true() {
        let config = config_from(&[
            ("EV_API_KEY", "k"),
            ("STRATO_EMAIL", "box@club.de"),
            ("STRATO_PASSWORD", "pw"),
        ])
        .unwrap();
        assert!(config.webmail.unwrap().headless);
    }

    #[test]
    fn invalid_group_id_is_reported() {
        let err = config_from(&[("EV_API_KEY", "k"), ("EV_GROUP_ID", "choir")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EV_GROUP_ID"));
    }

    #[test]
    fn invalid_browser_is_reported() {
        let err = config_from(&[
            ("EV_API_KEY", "k"),
            ("STRATO_EMAIL", "box@club.de"),
            ("STRATO_PASSWORD", "pw"),
            ("STRATO_BROWSER", "lynx"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "STRATO_BROWSER")
        );
    }

    #[test]
    fn api_url_trailing_slash_is_stripped() {
        let config =
            config_from(&[("EV_API_KEY", "k"), ("EV_API_URL", "http://127.0.0.1:9000/")]).unwrap();
        assert_eq!(config.membership.api_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(config_from(&[("EV_API_KEY", "k"), ("EV_API_URL", "not a url")]).is_err());
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("true"));
        assert!(parse_flag("YES"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn explicit_env_file_must_exist() {
        let err = load_env_file(Some(Path::new("/definitely/not/here/.env"))).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }

    #[test]
    fn log_filter_precedence() {
        fn level(v: &'static str) -> impl Fn(&str) -> Option<String> {
            move |key| (key == "LOG_LEVEL").then(|| v.to_string())
        }
        assert_eq!(log_filter(true, level("warn")), "debug");
        assert_eq!(log_filter(false, level(" WARN ")), "warn");
        assert_eq!(log_filter(false, level("")), "info");
        assert_eq!(log_filter(false, |_: &str| None), "info");
    }
}
