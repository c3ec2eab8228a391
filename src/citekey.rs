//! Citation key generation with deterministic collision suffixes.
//!
//! A base key is `Surname` + `Year` + the first three title characters. Keys
//! shared by several records in a batch get `a`, `b`, ... appended in batch
//! order; unique base keys are used as-is.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::record::Record;

const UNKNOWN_SURNAME: &str = "Unknown";
const UNKNOWN_YEAR: &str = "0000";
const NO_TITLE: &str = "NoTitle";
const TITLE_FRAGMENT_LEN: usize = 3;

/// Computes the undisambiguated key for a record.
#[must_use]
pub fn base_key(record: &Record) -> String {
    format!(
        "{}{}{}",
        surname(record),
        year(record),
        title_fragment(record)
    )
}

fn surname(record: &Record) -> String {
    record
        .authors
        .first()
        .and_then(|first| first.split(',').next())
        .and_then(|family| family.split_whitespace().last())
        .map(|token| token.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| UNKNOWN_SURNAME.to_string())
}

fn year(record: &Record) -> String {
    record
        .year
        .as_deref()
        .map(str::trim)
        .filter(|y| !y.is_empty())
        .map_or_else(|| UNKNOWN_YEAR.to_string(), |y| y.chars().take(4).collect())
}

fn title_fragment(record: &Record) -> String {
    let source = [record.title.as_deref(), record.journal.as_deref()]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .unwrap_or(NO_TITLE);
    source
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(TITLE_FRAGMENT_LEN)
        .collect()
}

/// Suffix for the `index`-th occurrence: `a`..`z`, then `aa`, `ab`, ...
fn suffix(index: usize) -> String {
    let mut n = index;
    let mut letters = Vec::new();
    loop {
        letters.push(letter(n % 26));
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn letter(offset: usize) -> char {
    // offset < 26 by construction
    char::from_u32(u32::from(b'a') + u32::try_from(offset).unwrap_or(0)).unwrap_or('a')
}

/// Assigns a citekey to every record without one, in batch order.
///
/// Records that already carry a key keep it, and their keys are reserved.
/// The result is deterministic for a given batch order and all keys in the
/// batch are pairwise distinct.
#[tracing::instrument(skip_all, fields(records = records.len()))]
pub fn assign_citekeys(records: &mut [Record]) {
    let bases: Vec<Option<String>> = records
        .iter()
        .map(|r| r.citekey().is_none().then(|| base_key(r)))
        .collect();

    let mut tally: HashMap<&str, usize> = HashMap::new();
    for base in bases.iter().flatten() {
        *tally.entry(base.as_str()).or_insert(0) += 1;
    }

    // Keys that must not be produced by disambiguation: preassigned keys and
    // base keys that are used verbatim by a singleton.
    let mut used: HashSet<String> = records
        .iter()
        .filter_map(|r| r.citekey().map(ToString::to_string))
        .collect();
    for (base, count) in &tally {
        if *count == 1 {
            used.insert((*base).to_string());
        }
    }

    let mut next_suffix: HashMap<&str, usize> = HashMap::new();
    for (record, base) in records.iter_mut().zip(bases.iter()) {
        let Some(base) = base.as_deref() else {
            continue;
        };
        let key = if tally.get(base).copied().unwrap_or(0) > 1 {
            let counter = next_suffix.entry(base).or_insert(0);
            loop {
                let candidate = format!("{base}{}", suffix(*counter));
                *counter += 1;
                if used.insert(candidate.clone()) {
                    break candidate;
                }
            }
        } else {
            base.to_string()
        };
        debug!(citekey = %key, "assigned citekey");
        record.assign_citekey(key);
    }
}
