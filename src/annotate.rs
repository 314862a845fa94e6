//! Corresponding-author annotation of author lists.

use crate::names::{is_marked, is_same_author, MARKER};
use crate::records::{join_authors, split_authors, PaperTable};
use tracing::{debug, info};

/// Mark every author that matches one of the corresponding authors.
///
/// Already-marked entries are left alone, so applying this twice gives the
/// same result as applying it once. The output has the same length and
/// order as `all_authors`.
pub fn mark_corresponding<S: AsRef<str>>(
    all_authors: &[S],
    corresponding: Option<&[S]>,
) -> Vec<String> {
    let Some(corresponding) = corresponding else {
        return all_authors.iter().map(|a| a.as_ref().to_string()).collect();
    };

    all_authors
        .iter()
        .map(|author| {
            let author = author.as_ref();
            if is_marked(author) {
                author.to_string()
            } else if corresponding
                .iter()
                .any(|c| is_same_author(author, c.as_ref()))
            {
                format!("{}{}", author, MARKER)
            } else {
                author.to_string()
            }
        })
        .collect()
}

/// Annotate a `"; "`-delimited author cell.
///
/// A missing or blank corresponding-author cell returns `all_field` untouched.
pub fn mark_author_field(all_field: &str, corresponding_field: Option<&str>) -> String {
    let Some(corresponding_field) = corresponding_field.filter(|c| !c.trim().is_empty()) else {
        return all_field.to_string();
    };

    let all = split_authors(all_field);
    let corresponding = split_authors(corresponding_field);
    join_authors(&mark_corresponding(
        all.as_slice(),
        Some(corresponding.as_slice()),
    ))
}

/// Annotate the author column of every row. Returns the number of rows changed.
pub fn mark_table(table: &mut PaperTable, authors_col: usize, corresponding_col: usize) -> usize {
    let mut changed = 0;
    for row in 0..table.len() {
        let before = table.get(row, authors_col);
        let corresponding = table.get(row, corresponding_col);
        let after = mark_author_field(before, Some(corresponding));
        if after != before {
            debug!(row = row + 1, authors = %after, "Marked corresponding authors");
            table.set(row, authors_col, after);
            changed += 1;
        }
    }
    info!(rows = table.len(), changed = changed, "Annotated author lists");
    changed
}
