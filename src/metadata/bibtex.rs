//! Tolerant BibTeX entry parsing, re-keying and rendering.
//!
//! Registry entries arrive as a single line (`@article{Key_2020, title={...}, ...}`).
//! The parser keeps field order so a re-keyed entry renders with its fields in
//! the order the registry produced them.

const IGNORED_BLOCK_TYPES: [&str; 3] = ["comment", "preamble", "string"];

/// One `name = value` pair of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibField {
    /// Lowercased field name.
    pub name: String,
    /// Value with one layer of braces or quotes removed.
    pub value: String,
    /// True when the value was written without delimiters (numbers, macros).
    pub bare: bool,
}

/// A parsed BibTeX entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    /// Entry type, lowercased (`article`, `book`, ...).
    pub entry_type: String,
    /// Citation key after `@type{`.
    pub key: String,
    /// Fields in source order; first value wins for duplicate names.
    pub fields: Vec<BibField>,
}

impl BibEntry {
    /// Parses the first entry in `input`.
    ///
    /// Returns `None` when no well-formed entry is found.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let (start, end) = find_entry_span(input)?;
        parse_entry(&input[start..end])
    }

    /// Returns the value of `name` (case-insensitive).
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| field.value.as_str())
    }

    /// Returns true when the entry carries `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Replaces the citation key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Renders the entry with one field per line and a four-space indent.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("@{}{{{}", self.entry_type, self.key);
        for field in &self.fields {
            out.push_str(",\n    ");
            out.push_str(&field.name);
            out.push_str(" = ");
            if field.bare {
                out.push_str(&field.value);
            } else {
                out.push('{');
                out.push_str(&field.value);
                out.push('}');
            }
        }
        out.push_str("\n}\n");
        out
    }
}

/// Returns true when the raw entry text has an `abstract` field.
#[must_use]
pub fn has_abstract(raw: &str) -> bool {
    BibEntry::parse(raw).is_some_and(|entry| entry.has_field("abstract"))
}

/// Appends `abstract = {text}` as the last field of the entry in `raw`.
///
/// Text outside the entry is preserved. Braces inside `text` are dropped so the
/// entry stays balanced. Returns `None` when `raw` holds no well-formed entry
/// or the entry already has an abstract.
#[must_use]
pub fn insert_abstract(raw: &str, text: &str) -> Option<String> {
    let (start, end) = find_entry_span(raw)?;
    let entry = parse_entry(&raw[start..end])?;
    if entry.has_field("abstract") {
        return None;
    }

    let cleaned: String = text.chars().filter(|c| !matches!(c, '{' | '}')).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    // `end` is one past the closing brace of the entry.
    let close = end - 1;
    let body = raw[start..close].trim_end();
    let body = body.strip_suffix(',').unwrap_or(body);
    Some(format!(
        "{}{body}, abstract = {{{cleaned}}}\n}}{}",
        &raw[..start],
        &raw[end..]
    ))
}

/// Finds the byte span of the first `@type{...}` entry, closing brace included.
fn find_entry_span(input: &str) -> Option<(usize, usize)> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i].1 != '@' {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && chars[j].1.is_ascii_alphabetic() {
            j += 1;
        }
        while j < chars.len() && chars[j].1.is_whitespace() {
            j += 1;
        }
        if j >= chars.len() || chars[j].1 != '{' {
            i += 1;
            continue;
        }

        let mut depth = 0usize;
        let mut in_quotes = false;
        let mut escape = false;
        for &(byte_index, ch) in chars.iter().skip(j) {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' if depth == 1 => in_quotes = !in_quotes,
                _ if in_quotes => {}
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some((chars[i].0, byte_index + ch.len_utf8()));
                    }
                }
                _ => {}
            }
        }
        return None;
    }
    None
}

fn parse_entry(raw_entry: &str) -> Option<BibEntry> {
    let trimmed = raw_entry.trim();
    let after_at = trimmed.strip_prefix('@')?;
    let brace_pos = after_at.find('{')?;

    let entry_type = after_at[..brace_pos].trim().to_ascii_lowercase();
    if entry_type.is_empty() || IGNORED_BLOCK_TYPES.contains(&entry_type.as_str()) {
        return None;
    }

    let body = after_at[brace_pos + 1..].strip_suffix('}')?;
    let (key_raw, fields_raw) = body.split_once(',').unwrap_or((body, ""));
    let key = key_raw.trim();
    if key.is_empty() || key.contains('=') {
        return None;
    }

    let fields = parse_fields(fields_raw)?;
    Some(BibEntry {
        entry_type,
        key: key.to_string(),
        fields,
    })
}

fn parse_fields(input: &str) -> Option<Vec<BibField>> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }
        if ch == '\\' {
            current.push(ch);
            escape = true;
            continue;
        }
        if ch == '"' && depth == 0 {
            in_quotes = !in_quotes;
            current.push(ch);
            continue;
        }
        if !in_quotes {
            if ch == '{' {
                depth += 1;
            } else if ch == '}' {
                depth = depth.checked_sub(1)?;
            } else if ch == ',' && depth == 0 {
                let segment = current.trim();
                if !segment.is_empty() {
                    pairs.push(segment.to_string());
                }
                current.clear();
                continue;
            }
        }
        current.push(ch);
    }

    if in_quotes || depth != 0 {
        return None;
    }
    let tail = current.trim();
    if !tail.is_empty() {
        pairs.push(tail.to_string());
    }

    let mut fields: Vec<BibField> = Vec::new();
    for pair in pairs {
        let (name, value_raw) = pair.split_once('=')?;
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        let (value, bare) = strip_bibtex_value(value_raw)?;
        if fields.iter().any(|field| field.name == name) {
            continue;
        }
        fields.push(BibField { name, value, bare });
    }
    Some(fields)
}

fn strip_bibtex_value(value: &str) -> Option<(String, bool)> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() >= 2 && trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some((trimmed[1..trimmed.len() - 1].trim().to_string(), false));
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        return Some((inner.replace("\\\"", "\"").trim().to_string(), false));
    }
    Some((trimmed.to_string(), true))
}
