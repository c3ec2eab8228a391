//! Shared User-Agent strings for API and document HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/ferru97/PyPaperBot";

/// Browser-like User-Agent for landing pages and mirrors that reject tool agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default User-Agent for registry, open-access and abstract API calls.
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("paperbot/{version} (research-tool; +{PROJECT_UA_URL})")
}
