//! Heuristics for sender domains that are too general to route automatically.
//!
//! A rule keyed on one of these domains would match far more mail than its
//! author intended: public webmail providers carry mail from everybody, and a
//! bare apex domain such as `example.com` usually covers every partner team
//! behind it.

use std::sync::LazyLock;

use regex::Regex;

/// Large public mailbox providers. Matching any of them by domain is never safe.
const PUBLIC_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.co.jp",
    "ymail.com",
    "hotmail.com",
    "hotmail.co.jp",
    "outlook.com",
    "outlook.jp",
    "live.com",
    "live.jp",
    "msn.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "gmx.com",
    "mail.com",
    "docomo.ne.jp",
    "ezweb.ne.jp",
    "au.com",
    "softbank.ne.jp",
    "i.softbank.jp",
];

static GENERIC_APEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^.]+\.(com|net|org)$").expect("valid apex pattern"));

static JP_SECOND_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^.]+\.(co|ne)\.jp$").expect("valid jp pattern"));

/// Lower-case a domain and strip a leading `@` and a leading `.`.
pub fn normalize_domain(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let without_at = lowered.strip_prefix('@').unwrap_or(&lowered);
    let without_dot = without_at.strip_prefix('.').unwrap_or(without_at);
    without_dot.to_string()
}

/// Returns true when a domain is likely to over-match.
///
/// Expects a normalized domain, but normalizes again so callers holding raw
/// user input get the same answer.
pub fn is_broad_domain(domain: &str) -> bool {
    let domain = normalize_domain(domain);
    if domain.is_empty() {
        return false;
    }

    PUBLIC_MAIL_DOMAINS.contains(&domain.as_str())
        || GENERIC_APEX.is_match(&domain)
        || JP_SECOND_LEVEL.is_match(&domain)
}
