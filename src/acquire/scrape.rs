//! Landing-page scraping: locating the real document link inside HTML.
//!
//! Pages are scanned with regexes rather than a DOM; the patterns only need
//! to find a handful of well-known tags.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::utils::{absolutize_url, compile_static_regex, strip_markup, unescape_entities};

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
    )
});
static META_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?is)<meta\b([^>]*)>"));
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<a\b([^>]*)>(.*?)</a\s*>"));
static FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<(?:iframe|embed)\b([^>]*)>"));
static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<ul\b[^>]*>(.*?)</ul\s*>"));

/// Host fragment identifying the secondary mirror's external download links.
pub const SCIDB_DOWNLOAD_HOST: &str = "annas-archive";

/// Finds a scraper-recognized document link on a publisher landing page.
///
/// Order: `citation_pdf_url` meta tag, first anchor ending in `.pdf`, first
/// anchor whose text or href mentions download/pdf and whose href points at
/// `.pdf` or `content/pdf`.
#[must_use]
pub fn find_landing_pdf_link(html: &str, base_url: &Url) -> Option<String> {
    citation_pdf_url(html, base_url)
        .or_else(|| pdf_anchor(html, base_url))
        .or_else(|| download_anchor(html, base_url))
}

/// Finds the embedded document on a tertiary mirror page, falling back to
/// landing-page rules.
#[must_use]
pub fn find_scihub_pdf_link(html: &str, base_url: &Url) -> Option<String> {
    FRAME_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            attribute(attrs, "id")
                .filter(|id| id.eq_ignore_ascii_case("pdf"))
                .and_then(|_| attribute(attrs, "src"))
        })
        .find_map(|src| absolutize_url(&src, base_url))
        .or_else(|| find_landing_pdf_link(html, base_url))
}

/// Finds the external download link on a secondary mirror page, falling back
/// to landing-page rules.
#[must_use]
pub fn find_scidb_pdf_link(html: &str, base_url: &Url) -> Option<String> {
    anchors(html)
        .find(|anchor| anchor.href.contains(SCIDB_DOWNLOAD_HOST))
        .and_then(|anchor| absolutize_url(&anchor.href, base_url))
        .or_else(|| find_landing_pdf_link(html, base_url))
}

/// Lists mirror hosts linked from `<ul>` lists whose href contains `host_marker`.
#[must_use]
pub fn find_mirror_links(html: &str, host_marker: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for list in LIST_RE.captures_iter(html) {
        let Some(body) = list.get(1) else { continue };
        for anchor in anchors(body.as_str()) {
            let href = anchor.href.trim().trim_end_matches('/').to_string();
            let is_http = href.starts_with("https://") || href.starts_with("http://");
            if is_http && href.contains(host_marker) && !links.contains(&href) {
                links.push(href);
            }
        }
    }
    links
}

fn citation_pdf_url(html: &str, base_url: &Url) -> Option<String> {
    META_RE.captures_iter(html).find_map(|caps| {
        let attrs = caps.get(1)?.as_str();
        let name = attribute(attrs, "name").or_else(|| attribute(attrs, "property"))?;
        if !name.eq_ignore_ascii_case("citation_pdf_url") {
            return None;
        }
        absolutize_url(&attribute(attrs, "content")?, base_url)
    })
}

fn pdf_anchor(html: &str, base_url: &Url) -> Option<String> {
    anchors(html)
        .find(|anchor| path_part(&anchor.href).to_ascii_lowercase().ends_with(".pdf"))
        .and_then(|anchor| absolutize_url(&anchor.href, base_url))
}

fn download_anchor(html: &str, base_url: &Url) -> Option<String> {
    anchors(html)
        .find(|anchor| {
            let href = anchor.href.to_ascii_lowercase();
            let text = anchor.text.to_lowercase();
            let mentions = ["download", "pdf"]
                .iter()
                .any(|word| text.contains(word) || href.contains(word));
            mentions && (href.contains(".pdf") || href.contains("content/pdf"))
        })
        .and_then(|anchor| absolutize_url(&anchor.href, base_url))
}

struct Anchor {
    href: String,
    text: String,
}

fn anchors(html: &str) -> impl Iterator<Item = Anchor> + '_ {
    ANCHOR_RE.captures_iter(html).filter_map(|caps| {
        let href = attribute(caps.get(1)?.as_str(), "href")?;
        let text = caps.get(2).map(|m| strip_markup(m.as_str())).unwrap_or_default();
        Some(Anchor { href, text })
    })
}

/// Case-insensitive attribute lookup with entity decoding.
pub(crate) fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTR_RE.captures_iter(attrs).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        let value = unescape_entities(raw.trim());
        (!value.is_empty()).then_some(value)
    })
}

fn path_part(href: &str) -> &str {
    href.split(['?', '#']).next().unwrap_or(href)
}
