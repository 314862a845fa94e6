//! Title cleanup for search queries.
//!
//! The advanced-search syntax treats `AND`, `OR`, `NOT` and parentheses as
//! operators, so they are taken out of titles before a `TI=` query is built.

use crate::error::{Result, WosError};
use regex::Regex;
use tracing::debug;

const OPERATOR_WORDS: &[&str] = &["and", "or", "not"];

fn is_operator_word(word: &str) -> bool {
    OPERATOR_WORDS.iter().any(|op| word.eq_ignore_ascii_case(op))
}

/// Drop whitespace-delimited operator words. A word directly followed by a
/// period leaves the period on the previous word ("Salt and. Pepper" becomes
/// "Salt. Pepper"). Words such as "rock-and-roll" or "notation" are kept.
fn drop_operator_words(title: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    for word in title.split_whitespace() {
        if is_operator_word(word) {
            continue;
        }
        if let Some(stem) = word.strip_suffix('.') {
            if is_operator_word(stem) {
                if let Some(previous) = kept.last_mut() {
                    previous.push('.');
                    continue;
                }
            }
        }
        kept.push(word.to_string());
    }
    kept.join(" ")
}

/// Remove search-operator words and parenthesized text from a title.
///
/// Adjacent operator words ("Cats and or dogs") are all removed. Only the
/// innermost parentheses are removed; a nested outer pair survives without
/// its inner group.
pub fn clean_title(title: &str) -> Result<String> {
    let parens = Regex::new(r"\([^()]*\)").map_err(|e| WosError::Parse(e.to_string()))?;

    let without_ops = drop_operator_words(title);
    let without_parens = parens.replace_all(&without_ops, "");
    let cleaned = without_parens.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned != title {
        debug!(original = title, cleaned = %cleaned, "Cleaned title");
    }
    Ok(cleaned)
}
