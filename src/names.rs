//! Author name normalization and matching.
//!
//! Names arrive as `"Surname, Given[, Given2...]"`, possibly carrying the
//! corresponding-author marker (`*`) and stray whitespace or separators.
//! Matching is a heuristic: same surname, and given names that are equal
//! after separator removal or differ by at most two characters with one
//! contained in the other. Initials such as `"Smith, J"` vs `"Smith, John"`
//! do not match; that false negative is accepted and left for manual review.

/// Corresponding-author marker appended to a name.
pub const MARKER: char = '*';

/// Maximum given-name key length difference still eligible for a substring match.
const MAX_GIVEN_LEN_DIFF: usize = 2;

/// Separator characters dropped from comparison keys (whitespace is dropped too).
fn is_key_separator(c: char) -> bool {
    c == '-' || c == '_' || c == ';' || c.is_whitespace()
}

/// Remove every marker character from a raw name.
pub fn strip_markers(raw: &str) -> String {
    raw.replace(MARKER, "")
}

/// True if the name already carries a trailing marker.
pub fn is_marked(raw: &str) -> bool {
    raw.trim_end().ends_with(MARKER)
}

/// Lowercase and drop hyphens, underscores, semicolons and whitespace.
fn compact_key(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| !is_key_separator(*c))
        .collect()
}

/// Build the given-name key from the segments after the surname.
///
/// Segments are joined with a single space first, so `["Yu", "Feng"]`,
/// `["Yu Feng"]` and `["Yu-Feng"]` all produce `"yufeng"`.
pub fn given_name_key<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    compact_key(&joined)
}

/// Split a raw name into trimmed comma segments with markers removed.
fn segments(raw: &str) -> Vec<String> {
    strip_markers(raw)
        .split(',')
        .map(|s| s.trim().to_string())
        .collect()
}

/// Structured view of a name that has a surname/given-name separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Lowercased surname
    pub surname: String,
    /// Given names, lowercased with separators removed
    pub given_key: String,
}

impl ParsedName {
    /// Parse a raw name. Returns `None` when there is no comma separator.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts = segments(raw);
        if parts.len() < 2 {
            return None;
        }
        Some(Self {
            surname: parts[0].to_lowercase(),
            given_key: given_name_key(&parts[1..]),
        })
    }
}

/// Convert a raw name into its canonical comparison key.
///
/// `"Zheng, Yu-Feng*"` becomes `"zheng_yufeng"`. A name without a comma
/// yields a degraded key (the whole name compacted) which only equals itself.
pub fn normalize(raw: &str) -> String {
    match ParsedName::parse(raw) {
        Some(name) => format!("{}_{}", name.surname, name.given_key),
        None => compact_key(&strip_markers(raw)),
    }
}

/// Decide whether two raw names denote the same author.
pub fn is_same_author(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    let (Some(left), Some(right)) = (ParsedName::parse(a), ParsedName::parse(b)) else {
        return false;
    };

    if left.surname != right.surname {
        return false;
    }

    if left.given_key == right.given_key {
        return true;
    }

    // Lengths in chars, not bytes.
    let len_diff = left
        .given_key
        .chars()
        .count()
        .abs_diff(right.given_key.chars().count());
    if len_diff > MAX_GIVEN_LEN_DIFF {
        return false;
    }

    left.given_key.contains(&right.given_key) || right.given_key.contains(&left.given_key)
}
