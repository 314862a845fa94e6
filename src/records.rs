//! CSV-backed paper table.
//!
//! The table keeps every input column as-is so a scrape run can round-trip a
//! dataset through checkpoints without losing anything. Only the title,
//! author, corresponding-author and status columns have meaning here.

use crate::error::{Result, WosError};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Delimiter between authors inside an author-list cell.
pub const AUTHOR_DELIMITER: &str = "; ";

/// Position the corresponding-author column is inserted at when missing.
const CORRESPONDING_COLUMN_POSITION: usize = 2;

/// Names of the columns the pipeline reads and writes.
#[derive(Debug, Clone)]
pub struct ColumnNames {
    /// Paper title
    pub title: String,
    /// Full `"; "`-delimited author list
    pub authors: String,
    /// `"; "`-delimited corresponding authors
    pub corresponding: String,
    /// Transient per-row processing status
    pub status: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            title: "title".to_string(),
            authors: "authors".to_string(),
            corresponding: "corresponding_authors".to_string(),
            status: "status".to_string(),
        }
    }
}

/// Resolved column positions for a loaded table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnIndex {
    pub title: usize,
    pub authors: usize,
    pub corresponding: usize,
    pub status: usize,
}

/// In-memory table of paper records.
#[derive(Debug, Clone, Default)]
pub struct PaperTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl PaperTable {
    /// Build a table from headers and rows, padding short rows.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width.max(row.len()), String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Load a table from a CSV file with a header row.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(path = %path.display(), rows = table.len(), "Loaded paper table");
        Ok(table)
    }

    /// Read CSV from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(WosError::Validation("CSV has no header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        Ok(Self::new(headers, rows))
    }

    /// Save the table to a CSV file, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.write_to(file)?;
        debug!(path = %path.display(), rows = self.len(), "Saved paper table");
        Ok(())
    }

    /// Write CSV to any writer.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Position of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Position of a named column, or a validation error naming it.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| WosError::Validation(format!("Missing column '{}'", name)))
    }

    /// Return the column's position, inserting it filled with `default` if absent.
    ///
    /// The insertion position is clamped to the current width.
    pub fn ensure_column(&mut self, name: &str, position: usize, default: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        let idx = position.min(self.headers.len());
        self.headers.insert(idx, name.to_string());
        for row in &mut self.rows {
            row.insert(idx.min(row.len()), default.to_string());
        }
        idx
    }

    /// Remove a named column. Returns false if it was not present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.headers.remove(idx);
        for row in &mut self.rows {
            if idx < row.len() {
                row.remove(idx);
            }
        }
        true
    }

    /// Cell value, empty if out of range.
    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Set a cell value. Out-of-range rows are ignored; short rows are padded.
    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(r) = self.rows.get_mut(row) {
            if col >= r.len() {
                r.resize(col + 1, String::new());
            }
            r[col] = value.into();
        }
    }

    /// Fill every row of a column with the same value.
    pub fn fill_column(&mut self, col: usize, value: &str) {
        for row in 0..self.rows.len() {
            self.set(row, col, value);
        }
    }

    /// Resolve the pipeline columns for a scrape run.
    ///
    /// Title and author columns must exist. The corresponding-author column is
    /// inserted after the second column when missing; the status column is
    /// appended when missing.
    pub fn prepare_for_scrape(&mut self, names: &ColumnNames) -> Result<ColumnIndex> {
        self.require_column(&names.title)?;
        self.require_column(&names.authors)?;
        self.ensure_column(&names.corresponding, CORRESPONDING_COLUMN_POSITION, "");
        let end = self.headers.len();
        self.ensure_column(&names.status, end, "");

        // Indices may have shifted after insertions
        Ok(ColumnIndex {
            title: self.require_column(&names.title)?,
            authors: self.require_column(&names.authors)?,
            corresponding: self.require_column(&names.corresponding)?,
            status: self.require_column(&names.status)?,
        })
    }
}

/// Split a `;`-delimited author cell into trimmed names.
pub fn split_authors(field: &str) -> Vec<String> {
    field.split(';').map(|a| a.trim().to_string()).collect()
}

/// Join names back into an author cell.
pub fn join_authors<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(AUTHOR_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "id,title,authors\n\
        1,Effects of A and B,\"Li, Wei; Zheng, Yu-Feng\"\n\
        2,Second paper,\"Smith, John\"\n";

    #[test]
    fn test_from_reader() -> Result<()> {
        let table = PaperTable::from_reader(SAMPLE.as_bytes())?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.headers(), &["id", "title", "authors"]);
        assert_eq!(table.get(0, 2), "Li, Wei; Zheng, Yu-Feng");
        Ok(())
    }

    #[test]
    fn test_short_rows_are_padded() -> Result<()> {
        let table = PaperTable::from_reader("a,b,c\n1\n".as_bytes())?;
        assert_eq!(table.get(0, 2), "");
        Ok(())
    }

    #[test]
    fn test_prepare_inserts_columns() -> Result<()> {
        let mut table = PaperTable::from_reader(SAMPLE.as_bytes())?;
        let cols = table.prepare_for_scrape(&ColumnNames::default())?;
        assert_eq!(
            table.headers(),
            &["id", "title", "corresponding_authors", "authors", "status"]
        );
        assert_eq!(cols.title, 1);
        assert_eq!(cols.corresponding, 2);
        assert_eq!(cols.authors, 3);
        assert_eq!(cols.status, 4);
        assert_eq!(table.get(1, cols.authors), "Smith, John");
        Ok(())
    }

    #[test]
    fn test_prepare_requires_title() {
        let mut table = PaperTable::new(vec!["authors".to_string()], vec![]);
        let err = table.prepare_for_scrape(&ColumnNames::default());
        assert!(matches!(err, Err(WosError::Validation(_))));
    }

    #[test]
    fn test_drop_column() -> Result<()> {
        let mut table = PaperTable::from_reader(SAMPLE.as_bytes())?;
        assert!(table.drop_column("id"));
        assert!(!table.drop_column("id"));
        assert_eq!(table.get(0, 0), "Effects of A and B");
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let mut table = PaperTable::from_reader(SAMPLE.as_bytes())?;
        table.set(1, 0, "42");
        table.save(temp.path())?;

        let loaded = PaperTable::load(temp.path())?;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(1, 0), "42");
        assert_eq!(loaded.get(0, 2), "Li, Wei; Zheng, Yu-Feng");
        Ok(())
    }

    #[test]
    fn test_split_and_join_authors() {
        let names = split_authors("Li, Wei ;Zheng, Yu-Feng");
        assert_eq!(names, vec!["Li, Wei", "Zheng, Yu-Feng"]);
        assert_eq!(join_authors(&names), "Li, Wei; Zheng, Yu-Feng");
    }
}
