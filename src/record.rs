//! Bibliographic records and their acquisition state.
//!
//! A [`Record`] is created from a search-result candidate with only a title,
//! authors, year and links populated. The metadata resolver enriches it in
//! place, the citekey generator names it once, and the acquisition chain is the
//! only writer of its [`AcquisitionState`].

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::metadata::bibtex::BibEntry;
use crate::utils::compile_static_regex;

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"\b(?:1[5-9]|20)\d{2}\b"));

/// Acquisition outcome carried by a record.
///
/// Once downloaded, the state never regresses: later calls to
/// [`AcquisitionState::mark_downloaded`] are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionState {
    downloaded: bool,
    source: Option<String>,
    local_path: Option<PathBuf>,
}

impl AcquisitionState {
    /// Returns whether a validated document was saved for this record.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.downloaded
    }

    /// Name of the strategy that produced the document.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Location of the saved document.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Records a successful acquisition. Returns `false` when already downloaded.
    pub fn mark_downloaded(&mut self, source: impl Into<String>, path: impl Into<PathBuf>) -> bool {
        if self.downloaded {
            return false;
        }
        self.downloaded = true;
        self.source = Some(source.into());
        self.local_path = Some(path.into());
        true
    }
}

/// One publication flowing through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// Title as scraped, or as confirmed by the registry.
    pub title: Option<String>,
    /// Ordered author list, each `"Family, Given"` once resolved.
    pub authors: Vec<String>,
    /// Publication year as text.
    pub year: Option<String>,
    /// Persistent document identifier (DOI).
    pub identifier: Option<String>,
    /// Journal or publisher.
    pub journal: Option<String>,
    /// Canonical BibTeX entry.
    pub bibtex: Option<String>,
    /// Landing page the record was found on.
    pub origin_link: Option<String>,
    /// Direct document link offered by the search results.
    pub pdf_link: Option<String>,
    citekey: Option<String>,
    acquisition: AcquisitionState,
}

impl Record {
    /// Creates a record carrying only a title.
    #[must_use]
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Creates a record carrying only an identifier.
    #[must_use]
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(normalize_identifier(&identifier.into())),
            ..Self::default()
        }
    }

    /// Title, or an empty string.
    #[must_use]
    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// Authors joined with `"; "`.
    #[must_use]
    pub fn authors_joined(&self) -> String {
        self.authors.join("; ")
    }

    /// Replaces authors from a `"; "`-joined string.
    pub fn set_authors_joined(&mut self, joined: &str) {
        self.authors = split_authors(joined);
    }

    /// The assigned citekey, if any.
    #[must_use]
    pub fn citekey(&self) -> Option<&str> {
        self.citekey.as_deref()
    }

    /// Assigns the citekey. Returns `false` and leaves the key untouched when
    /// one was already assigned.
    pub fn assign_citekey(&mut self, key: impl Into<String>) -> bool {
        if self.citekey.is_some() {
            return false;
        }
        self.citekey = Some(key.into());
        true
    }

    /// Current acquisition state.
    #[must_use]
    pub fn acquisition(&self) -> &AcquisitionState {
        &self.acquisition
    }

    pub(crate) fn acquisition_mut(&mut self) -> &mut AcquisitionState {
        &mut self.acquisition
    }

    /// A record is eligible for acquisition when it has an identifier or an origin link.
    #[must_use]
    pub fn is_acquirable(&self) -> bool {
        self.identifier.as_deref().is_some_and(|id| !id.is_empty())
            || self.origin_link.as_deref().is_some_and(|link| !link.is_empty())
    }

    /// Sets the identifier in its canonical (trimmed, lowercased) form.
    pub fn set_identifier(&mut self, identifier: &str) {
        let normalized = normalize_identifier(identifier);
        self.identifier = (!normalized.is_empty()).then_some(normalized);
    }

    /// Attaches a BibTeX entry and copies year, journal and (if absent) authors from it.
    ///
    /// Empty text clears nothing and attaches nothing. An entry that cannot be
    /// parsed is kept verbatim without touching other fields.
    pub fn apply_bibtex(&mut self, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }
        self.bibtex = Some(raw.to_string());

        let Some(entry) = BibEntry::parse(raw) else {
            debug!(title = %self.title_str(), "attached BibTeX entry could not be parsed");
            return;
        };

        if let Some(year) = entry.field("year").and_then(extract_year) {
            self.year = Some(year);
        }
        if let Some(journal) = entry.field("journal").or_else(|| entry.field("publisher")) {
            let cleaned = journal.replace('\\', "");
            if !cleaned.trim().is_empty() {
                self.journal = Some(cleaned.trim().to_string());
            }
        }
        if self.authors.is_empty()
            && let Some(authors) = entry.field("author")
        {
            self.authors = split_bibtex_authors(authors);
        }
    }
}

/// Canonical identifier form: trimmed and lowercased.
#[must_use]
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn split_authors(joined: &str) -> Vec<String> {
    joined
        .split(';')
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn split_bibtex_authors(value: &str) -> Vec<String> {
    value
        .split(" and ")
        .map(|author| author.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|author| !author.is_empty())
        .collect()
}

fn extract_year(value: &str) -> Option<String> {
    YEAR_PATTERN.find(value).map(|m| m.as_str().to_string())
}

// ==================== Candidate Input ====================

/// A candidate record as produced by the search-result scraper.
///
/// `authors` may be a `;`-separated string or a list; `year` may be a number
/// or a string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_authors")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_year")]
    pub year: Option<String>,
    #[serde(default, alias = "link", alias = "scholar_link")]
    pub origin_link: Option<String>,
    #[serde(default, alias = "link_pdf")]
    pub pdf_link: Option<String>,
    #[serde(default, alias = "doi", alias = "DOI")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
}

impl From<CandidateRecord> for Record {
    fn from(candidate: CandidateRecord) -> Self {
        let mut record = Record {
            title: candidate.title.filter(|t| !t.trim().is_empty()),
            authors: candidate.authors,
            year: candidate.year,
            journal: candidate.journal,
            origin_link: candidate.origin_link.filter(|l| !l.trim().is_empty()),
            pdf_link: candidate.pdf_link.filter(|l| !l.trim().is_empty()),
            ..Record::default()
        };
        if let Some(identifier) = candidate.identifier {
            record.set_identifier(&identifier);
        }
        record
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthorsField {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_authors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<AuthorsField>::deserialize(deserializer)?;
    Ok(match value {
        Some(AuthorsField::Joined(joined)) => split_authors(&joined),
        Some(AuthorsField::List(list)) => list
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        None => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YearField {
    Number(i64),
    Text(String),
}

fn deserialize_year<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<YearField>::deserialize(deserializer)?;
    Ok(match value {
        Some(YearField::Number(year)) if year > 0 => Some(year.to_string()),
        Some(YearField::Text(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_state_never_regresses() {
        let mut state = AcquisitionState::default();
        assert!(!state.is_downloaded());
        assert!(state.mark_downloaded("Unpaywall", "/tmp/a.pdf"));
        assert!(!state.mark_downloaded("SciHub", "/tmp/b.pdf"));
        assert!(state.is_downloaded());
        assert_eq!(state.source(), Some("Unpaywall"));
        assert_eq!(state.local_path(), Some(Path::new("/tmp/a.pdf")));
    }

    #[test]
    fn test_citekey_assigned_once() {
        let mut record = Record::with_title("A");
        assert!(record.assign_citekey("Smith2020A"));
        assert!(!record.assign_citekey("Other"));
        assert_eq!(record.citekey(), Some("Smith2020A"));
    }

    #[test]
    fn test_is_acquirable_requires_identifier_or_origin_link() {
        let mut record = Record::with_title("Untitled");
        assert!(!record.is_acquirable());
        record.origin_link = Some("https://example.org/paper".to_string());
        assert!(record.is_acquirable());
        assert!(Record::with_identifier("10.1000/xyz").is_acquirable());
    }

    #[test]
    fn test_set_identifier_normalizes() {
        let mut record = Record::default();
        record.set_identifier("  10.1000/ABC.Def ");
        assert_eq!(record.identifier.as_deref(), Some("10.1000/abc.def"));
        record.set_identifier("   ");
        assert!(record.identifier.is_none());
    }

    #[test]
    fn test_apply_bibtex_fills_year_journal_and_missing_authors() {
        let mut record = Record::with_title("Deep Learning Survey");
        record.apply_bibtex(
            "@article{Smith_2020, title={Deep Learning Survey}, journal={J. Mach. \\& Learn.}, author={Smith, John and Doe, Jane}, year={2020}}",
        );
        assert_eq!(record.year.as_deref(), Some("2020"));
        assert_eq!(record.journal.as_deref(), Some("J. Mach. & Learn."));
        assert_eq!(record.authors, vec!["Smith, John", "Doe, Jane"]);
        assert!(record.bibtex.is_some());
    }

    #[test]
    fn test_apply_bibtex_keeps_authoritative_authors_and_falls_back_to_publisher() {
        let mut record = Record::with_title("T");
        record.authors = vec!["Jones, A".to_string()];
        record.apply_bibtex("@book{k, publisher={Springer}, author={Someone Else}, year={1999}}");
        assert_eq!(record.authors, vec!["Jones, A"]);
        assert_eq!(record.journal.as_deref(), Some("Springer"));
        assert_eq!(record.year.as_deref(), Some("1999"));
    }

    #[test]
    fn test_apply_bibtex_unparsable_keeps_text_only() {
        let mut record = Record::with_title("T");
        record.year = Some("2001".to_string());
        record.apply_bibtex("not bibtex at all");
        assert_eq!(record.bibtex.as_deref(), Some("not bibtex at all"));
        assert_eq!(record.year.as_deref(), Some("2001"));
    }

    #[test]
    fn test_candidate_deserializes_joined_authors_and_numeric_year() {
        let candidate: CandidateRecord = serde_json::from_str(
            r#"{"title":"Deep Learning Survey","authors":"Smith, J; Doe, K","year":2020,"link":"https://scholar.example/x"}"#,
        )
        .unwrap();
        let record = Record::from(candidate);
        assert_eq!(record.authors, vec!["Smith, J", "Doe, K"]);
        assert_eq!(record.year.as_deref(), Some("2020"));
        assert_eq!(record.origin_link.as_deref(), Some("https://scholar.example/x"));
        assert!(record.citekey().is_none());
    }

    #[test]
    fn test_candidate_deserializes_author_list_and_string_year() {
        let candidate: CandidateRecord = serde_json::from_str(
            r#"{"title":"T","authors":["Smith, J"," "],"year":"2019","doi":"10.1/ABC"}"#,
        )
        .unwrap();
        let record = Record::from(candidate);
        assert_eq!(record.authors, vec!["Smith, J"]);
        assert_eq!(record.year.as_deref(), Some("2019"));
        assert_eq!(record.identifier.as_deref(), Some("10.1/abc"));
    }

    #[test]
    fn test_candidate_allows_missing_fields() {
        let candidate: CandidateRecord = serde_json::from_str("{}").unwrap();
        let record = Record::from(candidate);
        assert!(record.title.is_none());
        assert!(record.authors.is_empty());
        assert!(record.year.is_none());
    }
}
