//! Acceptance checks for retrieved documents.
//!
//! Servers routinely answer document requests with empty bodies or HTML error
//! pages labelled as PDFs. [`DocumentValidator`] writes the bytes, then keeps
//! the file only if it exceeds the minimum size and does not look like HTML.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::DownloadError;

/// Bytes of the file head inspected for HTML markers.
const SNIFF_LEN: usize = 512;

/// Why a payload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The file is not larger than the configured minimum.
    TooSmall {
        bytes: u64,
        minimum: u64,
    },
    /// The body is an HTML page.
    Html,
    /// The body exceeded the network read cap.
    TooLarge {
        limit: u64,
    },
    /// The response was neither a document nor a scrapable page.
    UnexpectedContentType(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { bytes, minimum } => {
                write!(f, "{bytes} bytes is not above the {minimum}-byte minimum")
            }
            Self::Html => f.write_str("payload is an HTML page"),
            Self::TooLarge { limit } => write!(f, "payload exceeds {limit} bytes"),
            Self::UnexpectedContentType(ct) => write!(f, "unexpected content type '{ct}'"),
        }
    }
}

/// Result of committing a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The file is in place.
    Accepted {
        path: PathBuf,
        bytes: u64,
    },
    /// The file was removed.
    Rejected(RejectReason),
}

impl SaveOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Size and content gate applied before a record is marked downloaded.
#[derive(Debug, Clone, Copy)]
pub struct DocumentValidator {
    min_bytes: u64,
}

impl DocumentValidator {
    /// Creates a validator accepting files strictly larger than `min_bytes`.
    ///
    /// Thresholds below 10 bytes are raised to 10.
    #[must_use]
    pub fn new(min_bytes: u64) -> Self {
        Self {
            min_bytes: min_bytes.max(10),
        }
    }

    #[must_use]
    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    /// Writes `bytes` to `path` and validates the written file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the file cannot be written or inspected.
    #[tracing::instrument(skip(self, bytes), fields(path = %path.display(), len = bytes.len()))]
    pub async fn save(&self, path: &Path, bytes: &[u8]) -> Result<SaveOutcome, DownloadError> {
        if let Err(source) = tokio::fs::write(path, bytes).await {
            discard(path).await;
            return Err(DownloadError::io(path, source));
        }
        self.validate_file(path).await
    }

    /// Validates a file already on disk, deleting it on rejection.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the file cannot be inspected.
    pub async fn validate_file(&self, path: &Path) -> Result<SaveOutcome, DownloadError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(source) => return Err(DownloadError::io(path, source)),
        };
        let size = metadata.len();
        if size <= self.min_bytes {
            debug!(bytes = size, minimum = self.min_bytes, "rejecting undersized payload");
            discard(path).await;
            return Ok(SaveOutcome::Rejected(RejectReason::TooSmall {
                bytes: size,
                minimum: self.min_bytes,
            }));
        }

        let head = read_head(path).await.map_err(|e| DownloadError::io(path, e))?;
        if looks_like_html(&head) {
            debug!("rejecting HTML payload");
            discard(path).await;
            return Ok(SaveOutcome::Rejected(RejectReason::Html));
        }

        Ok(SaveOutcome::Accepted {
            path: path.to_path_buf(),
            bytes: size,
        })
    }
}

async fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// True when the first non-whitespace bytes open an HTML document.
#[must_use]
pub fn looks_like_html(head: &[u8]) -> bool {
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let trimmed = &head[start..];
    let prefix: Vec<u8> = trimmed
        .iter()
        .take(16)
        .map(u8::to_ascii_lowercase)
        .collect();
    prefix.starts_with(b"<!doctype html") || prefix.starts_with(b"<html")
}

async fn discard(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), %error, "could not remove rejected file");
    }
}
