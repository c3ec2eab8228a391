//! Document file naming and collision-free destination paths.

use std::path::{Path, PathBuf};

use crate::config::FilenamePolicy;
use crate::record::Record;

const FALLBACK_FILENAME: &str = "none.pdf";
const MAX_COLLISION_INDEX: usize = 10_000;

/// Builds the file name for a record's document.
///
/// With [`FilenamePolicy::Identifier`] and an identifier present, the
/// percent-encoded identifier is used. Otherwise the citekey (falling back to
/// the title) is sanitized. Always ends in `.pdf`.
#[must_use]
pub fn document_file_name(record: &Record, policy: FilenamePolicy) -> String {
    if policy == FilenamePolicy::Identifier
        && let Some(identifier) = record.identifier.as_deref().filter(|id| !id.is_empty())
    {
        return format!("{}.pdf", urlencoding::encode(identifier));
    }

    let stem = record
        .citekey()
        .or(record.title.as_deref())
        .map(sanitize_filename_component)
        .filter(|stem| !stem.trim().is_empty() && !stem.chars().all(|c| c == '.'));
    match stem {
        Some(stem) => format!("{stem}.pdf"),
        None => FALLBACK_FILENAME.to_string(),
    }
}

/// Replaces every character outside letters, digits, `_`, `-`, `.` and space with `_`.
#[must_use]
pub fn sanitize_filename_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Returns `dir/name`, or `dir/(n)name` for the first free `n` starting at 2.
#[must_use]
pub fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let base = dir.join(name);
    if !base.exists() {
        return base;
    }
    for n in 2..MAX_COLLISION_INDEX {
        let candidate = dir.join(format!("({n}){name}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("({timestamp}){name}"))
}
