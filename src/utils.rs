//! Shared text and URL helpers: static regex compilation, link absolutization,
//! and markup stripping for scraped or JATS-formatted text.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"&#(x[0-9a-fA-F]+|[0-9]+);"));

/// Resolves a possibly relative link against the page it was found on.
///
/// Absolute `http(s)` links are returned as-is; protocol-relative `//host/...`
/// links become `https://host/...`; anything else is joined with `base_url`.
#[must_use]
pub fn absolutize_url(value: &str, base_url: &Url) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value.to_string());
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base_url.join(value).ok().map(|url| url.to_string())
}

/// Percent-encodes an identifier for use as a URL path, keeping its `/` separators.
///
/// DOIs may contain `#`, `?` or spaces, which would otherwise truncate the path.
#[must_use]
pub fn encode_identifier_path(identifier: &str) -> String {
    identifier
        .trim()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Removes markup tags, decodes common HTML entities, and collapses whitespace.
#[must_use]
pub fn strip_markup(value: &str) -> String {
    let without_tags = TAG_RE.replace_all(value, " ");
    let decoded = unescape_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes named entities common in publisher metadata plus numeric references.
#[must_use]
pub fn unescape_entities(value: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(value, |caps: &regex::Captures<'_>| {
        let raw = &caps[1];
        let code = if let Some(hex) = raw.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            raw.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), |c| c.to_string())
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
