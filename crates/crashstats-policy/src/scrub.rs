//! Free-text scrubbing: strip emails and URLs, keep the rest verbatim
use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:(?:https?|ftp)://|www\.)[^\s<>"']+"#).expect("URL pattern compiles")
});

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").expect("email pattern compiles"));

/// Remove every URL and email address from `text`
pub fn scrub_text(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, "");
    EMAIL_RE.replace_all(&without_urls, "").into_owned()
}
