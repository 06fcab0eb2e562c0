//! UI selectors for the Open-Xchange webmail settings.
//!
//! The webmail is localized; text matches cover German and English labels.

use fantoccini::Locator;

/// A CSS or XPath selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sel<'a> {
    Css(&'a str),
    XPath(&'a str),
}

impl<'a> Sel<'a> {
    pub fn locator(&self) -> Locator<'a> {
        match *self {
            Self::Css(s) => Locator::Css(s),
            Self::XPath(s) => Locator::XPath(s),
        }
    }
}

/// Settings route for the mail filter page, relative to the webmail root.
pub const FILTER_SETTINGS_ROUTE: &str =
    "appsuite/#!!&app=io.ox/settings&folder=virtual/settings/io.ox/mail/settings/filter";

// ── Login ───────────────────────────────────────────────────────────

pub const LOGIN_USERNAME: Sel<'static> =
    Sel::Css(r#"#io-ox-login-username, input[name="username"], input[type="email"]"#);
pub const LOGIN_PASSWORD: Sel<'static> =
    Sel::Css(r#"#io-ox-login-password, input[name="password"], input[type="password"]"#);
pub const LOGIN_SUBMIT: Sel<'static> =
    Sel::Css(r#"#io-ox-login-button, button[type="submit"], input[type="submit"]"#);
pub const LOGIN_ERROR: &[Sel<'static>] =
    &[Sel::Css(".alert-danger, .error-message, .login-error")];
pub const MAILBOX_READY: Sel<'static> = Sel::Css(".folder-tree, .mail-item, .io-ox-mail");

// ── Filter settings ─────────────────────────────────────────────────

pub const COLLAPSED_RULES_SECTION: Sel<'static> = Sel::XPath(
    "//details[(@data-section-id='RULES' or @data-section='io.ox/mail/settings/rules') and not(@open)]/summary",
);

pub const RULE_LIST_ITEMS: Sel<'static> = Sel::Css(
    r#".rule-list li, .settings-list-view li, [data-type="rule"], .list-item, .listbox li"#,
);

pub const NEW_RULE_BUTTON: &[Sel<'static>] = &[
    Sel::XPath("//button[contains(text(), 'Neue Regel')]"),
    Sel::XPath("//a[contains(text(), 'Neue Regel')]"),
    Sel::Css(r#"[data-action="io.ox/mail/mailfilter/settings/filter/add"]"#),
    Sel::XPath("//button[contains(text(), 'Add new rule')]"),
];

pub const RULE_NAME_INPUT: &[Sel<'static>] = &[
    Sel::Css(r#"input[name="rulename"]"#),
    Sel::Css(r#"input[id*="rulename"]"#),
];

pub const ACTIONS_FIELDSET: &[Sel<'static>] = &[
    Sel::XPath("//legend[contains(@class, 'actions')]/parent::fieldset"),
    Sel::XPath("//legend[contains(text(), 'Aktion')]/parent::fieldset"),
    Sel::XPath("//legend[contains(text(), 'Action')]/parent::fieldset"),
];

pub const ADD_ACTION_LINK: &[Sel<'static>] = &[
    Sel::XPath("//a[contains(text(), 'Aktion hinzufügen')]"),
    Sel::XPath("//a[contains(text(), 'Add action')]"),
    Sel::XPath("//button[@data-action='add-action']"),
];

pub const DROPDOWN_TOGGLE: Sel<'static> = Sel::Css(".dropdown-toggle");

pub const REDIRECT_OPTION: &[Sel<'static>] = &[
    Sel::Css(r#"a[data-value="redirect"]"#),
    Sel::XPath("//a[contains(text(), 'Umleiten nach')]"),
    Sel::XPath("//a[contains(text(), 'Redirect to')]"),
];

pub const REDIRECT_INPUT: &[Sel<'static>] = &[
    Sel::Css(r#"input[id^="redirect"]"#),
    Sel::Css(r#"li.action input[type="text"]"#),
];

pub const SAVE_BUTTON: &[Sel<'static>] = &[
    Sel::XPath("//button[contains(text(), 'Speichern')]"),
    Sel::XPath("//button[contains(text(), 'Save')]"),
    Sel::Css(r#"button[data-action="save"]"#),
];

pub const ROW_DELETE_BUTTON: Sel<'static> = Sel::Css(
    r#"[data-action="delete"], button.remove, button[aria-label*="Löschen"], button[aria-label*="Delete"]"#,
);

pub const DELETE_BUTTON: &[Sel<'static>] = &[
    Sel::XPath("//button[contains(text(), 'Löschen')]"),
    Sel::XPath("//a[contains(text(), 'Löschen')]"),
    Sel::XPath("//button[contains(text(), 'Delete')]"),
    Sel::XPath("//button[@data-action='delete']"),
];

pub const CONFIRM_BUTTON: &[Sel<'static>] = &[Sel::XPath(
    "//div[contains(@class, 'modal')]//button[contains(text(), 'OK') or contains(text(), 'Ja') \
     or contains(text(), 'Bestätigen') or contains(text(), 'Löschen') or contains(text(), 'Delete')]",
)];

/// Quote `value` as an XPath 1.0 string literal.
///
/// XPath has no escape sequences, so a value containing both quote kinds is
/// built with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// XPath for the list entry whose label node reads exactly `name`.
pub fn rule_entry_xpath(name: &str) -> String {
    format!(
        "//*[normalize-space(text())={}]/ancestor-or-self::li[1]",
        xpath_literal(name)
    )
}

/// XPath candidates for the list entry of the rule called `name`, exact first.
///
/// The fallback matches entries whose text is `name` or starts with `name`
/// followed by a space, so `MC_a@x.co` never selects `MC_a@x.com`.
pub fn rule_entry_xpaths(name: &str) -> [String; 2] {
    let lit = xpath_literal(name);
    [
        rule_entry_xpath(name),
        format!(
            "//li[normalize-space(.)={lit} or starts-with(normalize-space(.), concat({lit}, ' '))]"
        ),
    ]
}

/// XPath for any element whose text starts with the rule prefix.
pub fn prefixed_label_xpath(prefix: &str) -> String {
    format!(
        "//*[starts-with(normalize-space(text()), {})]",
        xpath_literal(prefix)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_literal_uses_single_quotes() {
        assert_eq!(xpath_literal("MC_a@x.com"), "'MC_a@x.com'");
    }

    #[test]
    fn single_quote_switches_to_double() {
        assert_eq!(xpath_literal("o'neil@x.com"), "\"o'neil@x.com\"");
    }

    #[test]
    fn both_quotes_use_concat() {
        assert_eq!(
            xpath_literal(r#"a'b"c"#),
            r#"concat('a', "'", 'b"c')"#
        );
    }

    #[test]
    fn rule_entry_prefers_exact_match() {
        let [exact, loose] = rule_entry_xpaths("MC_a@x.com");
        assert_eq!(exact, rule_entry_xpath("MC_a@x.com"));
        assert!(exact.contains("normalize-space(text())='MC_a@x.com'"));
        assert!(loose.starts_with("//li["));
    }

    #[test]
    fn rule_entry_candidates_never_match_longer_names() {
        for xpath in rule_entry_xpaths("MC_a@x.co") {
            assert!(!xpath.contains("contains("), "substring match in {xpath}");
        }
        let [_, loose] = rule_entry_xpaths("MC_a@x.co");
        assert!(loose.contains("normalize-space(.)='MC_a@x.co'"));
        assert!(loose.contains("concat('MC_a@x.co', ' ')"));
    }

    #[test]
    fn sel_maps_to_locator_kind() {
        assert!(matches!(Sel::Css("a").locator(), Locator::Css("a")));
        assert!(matches!(Sel::XPath("//a").locator(), Locator::XPath("//a")));
    }
}
