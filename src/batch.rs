//! Two-pass scrape driver.
//!
//! Pass 1 visits every row. Rows that fail are retried once in pass 2 with a
//! freshly opened session; a second failure is terminal. Each row's progress
//! lives in the status column:
//!
//! ```text
//! pending ──┬─> already-marked            (skip_marked mode only)
//!           ├─> skip                      (blank title)
//!           ├─> success
//!           └─> failed_round1 ──┬─> success
//!                               └─> failed
//! ```
//!
//! The table is written to the checkpoint path every `checkpoint_interval`
//! processed rows and at the end of each pass, so a crash loses at most that
//! many rows of work.

use crate::error::Result;
use crate::extractor::{CorrespondingAuthorLookup, PolitenessDelay, SessionFactory};
use crate::names::MARKER;
use crate::records::{join_authors, ColumnIndex, ColumnNames, PaperTable};
use crate::title::clean_title;
use chrono::{DateTime, Local, TimeDelta};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Which rows a scrape run visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Reprocess every row
    Complete,
    /// Skip rows that are already annotated or already have corresponding authors
    #[default]
    SkipMarked,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Complete => write!(f, "complete"),
            RunMode::SkipMarked => write!(f, "skip_marked"),
        }
    }
}

/// Per-row processing state stored in the status column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Pending,
    Success,
    FailedRound1,
    Failed,
    Skip,
    AlreadyMarked,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Success => "success",
            RowStatus::FailedRound1 => "failed_round1",
            RowStatus::Failed => "failed",
            RowStatus::Skip => "skip",
            RowStatus::AlreadyMarked => "already-marked",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a scrape run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: RunMode,
    /// Where progress is saved during the run
    pub checkpoint_path: PathBuf,
    /// Save after this many processed rows
    pub checkpoint_interval: usize,
    /// Pause between closing the pass-1 session and opening the pass-2 one
    pub restart_delay: PolitenessDelay,
    pub columns: ColumnNames,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            checkpoint_path: PathBuf::from("papers_progress.csv"),
            checkpoint_interval: 5,
            restart_delay: PolitenessDelay::new(Duration::from_secs(5), Duration::from_secs(10)),
            columns: ColumnNames::default(),
        }
    }
}

/// Outcome counters for a scrape run
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub already_marked: usize,
    /// 1-based row numbers that failed both passes
    pub failed_rows: Vec<usize>,
    pub started_at: DateTime<Local>,
    pub elapsed: TimeDelta,
}

impl BatchSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            success: 0,
            failed: 0,
            skipped: 0,
            already_marked: 0,
            failed_rows: Vec::new(),
            started_at: Local::now(),
            elapsed: TimeDelta::zero(),
        }
    }

    /// Elapsed time as `"{h}h {m}m {s}s"`
    pub fn elapsed_display(&self) -> String {
        let secs = self.elapsed.num_seconds().max(0);
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Drives both passes over a prepared table.
struct BatchRun<'a> {
    table: &'a mut PaperTable,
    cols: ColumnIndex,
    options: &'a BatchOptions,
    processed: usize,
}

impl<'a> BatchRun<'a> {
    fn set_status(&mut self, row: usize, status: RowStatus) {
        self.table.set(row, self.cols.status, status.as_str());
    }

    fn is_already_marked(&self, row: usize) -> bool {
        self.table.get(row, self.cols.authors).contains(MARKER)
            || !self.table.get(row, self.cols.corresponding).trim().is_empty()
    }

    /// Count a processed row and checkpoint when the interval is reached.
    fn tick(&mut self) -> Result<()> {
        self.processed += 1;
        let interval = self.options.checkpoint_interval.max(1);
        if self.processed % interval == 0 {
            self.checkpoint()?;
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<()> {
        self.table.save(&self.options.checkpoint_path)?;
        info!(
            path = %self.options.checkpoint_path.display(),
            processed = self.processed,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Look up one row and record the result. Returns true on success.
    async fn process_row<L: CorrespondingAuthorLookup>(
        &mut self,
        session: &mut L,
        row: usize,
    ) -> bool {
        let title = match clean_title(self.table.get(row, self.cols.title)) {
            Ok(title) => title,
            Err(e) => {
                warn!(row = row + 1, error = %e, "Title cleanup failed");
                return false;
            }
        };
        info!(row = row + 1, title = %title, "Processing paper");

        match session.lookup(&title).await {
            Ok(names) => {
                info!(row = row + 1, authors = %names.join("; "), "Corresponding authors found");
                self.table
                    .set(row, self.cols.corresponding, join_authors(&names));
                true
            }
            Err(e) => {
                warn!(row = row + 1, error = %e, "Lookup failed");
                false
            }
        }
    }

    async fn first_pass<L: CorrespondingAuthorLookup>(
        &mut self,
        session: &mut L,
        summary: &mut BatchSummary,
    ) -> Result<Vec<usize>> {
        let mut failed = Vec::new();

        for row in 0..self.table.len() {
            if self.options.mode == RunMode::SkipMarked && self.is_already_marked(row) {
                info!(row = row + 1, "Skipping, corresponding authors already present");
                self.set_status(row, RowStatus::AlreadyMarked);
                summary.already_marked += 1;
                self.tick()?;
                continue;
            }

            if self.table.get(row, self.cols.title).trim().is_empty() {
                info!(row = row + 1, "Skipping, empty title");
                self.set_status(row, RowStatus::Skip);
                summary.skipped += 1;
                continue;
            }

            if self.process_row(session, row).await {
                self.set_status(row, RowStatus::Success);
                summary.success += 1;
            } else {
                self.set_status(row, RowStatus::FailedRound1);
                failed.push(row);
            }
            self.tick()?;
        }

        self.checkpoint()?;
        Ok(failed)
    }

    async fn retry_pass<L: CorrespondingAuthorLookup>(
        &mut self,
        session: &mut L,
        rows: &[usize],
        summary: &mut BatchSummary,
    ) -> Result<()> {
        for &row in rows {
            if self.process_row(session, row).await {
                self.set_status(row, RowStatus::Success);
                summary.success += 1;
            } else {
                self.set_status(row, RowStatus::Failed);
                summary.failed += 1;
                summary.failed_rows.push(row + 1);
            }
            self.tick()?;
        }

        self.checkpoint()?;
        Ok(())
    }
}

/// Run both passes over `table`, opening sessions from `factory`.
///
/// The corresponding-author and status columns are added if missing and
/// every status is reset to `pending` first. Session-open failures and
/// checkpoint write failures abort the run; per-row lookup failures do not.
pub async fn run_batch<F: SessionFactory>(
    table: &mut PaperTable,
    factory: &F,
    options: &BatchOptions,
) -> Result<BatchSummary> {
    let cols = table.prepare_for_scrape(&options.columns)?;
    table.fill_column(cols.status, RowStatus::Pending.as_str());

    let mut summary = BatchSummary::new(table.len());
    info!(mode = %options.mode, papers = table.len(), "Starting scrape");

    let mut run = BatchRun {
        table,
        cols,
        options,
        processed: 0,
    };

    let mut session = factory.open().await?;
    let failed = run.first_pass(&mut session, &mut summary).await?;
    drop(session);

    if failed.is_empty() {
        info!("No failures in first pass, skipping retry pass");
    } else {
        info!(count = failed.len(), "Retrying failed papers with a new session");
        options.restart_delay.pause().await;
        let mut session = factory.open().await?;
        run.processed = 0;
        run.retry_pass(&mut session, &failed, &mut summary).await?;
    }

    summary.elapsed = Local::now() - summary.started_at;
    info!(
        total = summary.total,
        success = summary.success,
        failed = summary.failed,
        already_marked = summary.already_marked,
        skipped = summary.skipped,
        elapsed = %summary.elapsed_display(),
        "Scrape finished"
    );
    if !summary.failed_rows.is_empty() {
        warn!(rows = ?summary.failed_rows, "Papers that failed both passes");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WosError;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Scripted outcomes per title; an exhausted script fails.
    #[derive(Default)]
    struct Script {
        outcomes: HashMap<String, VecDeque<Option<Vec<String>>>>,
        lookups: Vec<(usize, String)>,
        sessions_opened: usize,
        /// Checkpoint file read at the start of every lookup
        watch_checkpoint: Option<PathBuf>,
        /// Status column as found on disk at each lookup; None if not written yet
        snapshots: Vec<Option<Vec<String>>>,
    }

    struct FakeFactory {
        script: Rc<RefCell<Script>>,
        fail_open_after: Option<usize>,
    }

    struct FakeSession {
        id: usize,
        script: Rc<RefCell<Script>>,
    }

    impl FakeFactory {
        fn new(script: Script) -> Self {
            Self {
                script: Rc::new(RefCell::new(script)),
                fail_open_after: None,
            }
        }
    }

    impl SessionFactory for FakeFactory {
        type Session = FakeSession;

        async fn open(&self) -> Result<FakeSession> {
            let mut script = self.script.borrow_mut();
            if self.fail_open_after == Some(script.sessions_opened) {
                return Err(WosError::Session("browser refused to start".to_string()));
            }
            script.sessions_opened += 1;
            Ok(FakeSession {
                id: script.sessions_opened,
                script: Rc::clone(&self.script),
            })
        }
    }

    impl CorrespondingAuthorLookup for FakeSession {
        async fn lookup(&mut self, title: &str) -> Result<Vec<String>> {
            let mut script = self.script.borrow_mut();
            script.lookups.push((self.id, title.to_string()));
            if let Some(path) = script.watch_checkpoint.clone() {
                let snapshot = if path.exists() {
                    let saved = PaperTable::load(&path)?;
                    let status = saved.require_column("status")?;
                    Some((0..saved.len()).map(|r| saved.get(r, status).to_string()).collect())
                } else {
                    None
                };
                script.snapshots.push(snapshot);
            }
            match script.outcomes.get_mut(title).and_then(|q| q.pop_front()) {
                Some(Some(names)) => Ok(names),
                _ => Err(WosError::NotFound("no search results".to_string())),
            }
        }
    }

    fn script(entries: &[(&str, Vec<Option<Vec<&str>>>)]) -> Script {
        let mut s = Script::default();
        for (title, outcomes) in entries {
            s.outcomes.insert(
                title.to_string(),
                outcomes
                    .iter()
                    .map(|o| {
                        o.as_ref()
                            .map(|v| v.iter().map(|n| n.to_string()).collect::<Vec<String>>())
                    })
                    .collect(),
            );
        }
        s
    }

    fn options(dir: &TempDir, mode: RunMode) -> BatchOptions {
        BatchOptions {
            mode,
            checkpoint_path: dir.path().join("progress.csv"),
            checkpoint_interval: 2,
            restart_delay: PolitenessDelay::none(),
            columns: ColumnNames::default(),
        }
    }

    fn table() -> Result<PaperTable> {
        let csv = "title,authors\n\
            Effects of A and B (pilot),\"Li, Wei; Zheng, Yu-Feng\"\n\
            Paper Two,\"Smith, John*; Doe, Jane\"\n\
            ,\"Nobody, Here\"\n\
            Paper Four,\"Wang, Fang\"\n";
        PaperTable::from_reader(csv.as_bytes())
    }

    #[tokio::test]
    async fn test_two_pass_run() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FakeFactory::new(script(&[
            ("Effects of A B", vec![Some(vec!["Zheng, Yu-Feng"])]),
            ("Paper Four", vec![None, Some(vec!["Wang, Fang", "Wang, Fang"])]),
        ]));
        let mut table = table()?;

        let summary = run_batch(&mut table, &factory, &options(&dir, RunMode::SkipMarked)).await?;

        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.already_marked, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert!(summary.failed_rows.is_empty());

        let cols = table.prepare_for_scrape(&ColumnNames::default())?;
        assert_eq!(table.get(0, cols.corresponding), "Zheng, Yu-Feng");
        assert_eq!(table.get(0, cols.status), "success");
        assert_eq!(table.get(1, cols.status), "already-marked");
        assert_eq!(table.get(2, cols.status), "skip");
        assert_eq!(table.get(3, cols.status), "success");

        let script = factory.script.borrow();
        assert_eq!(script.sessions_opened, 2);
        // Retry ran on the second session
        assert_eq!(
            script.lookups.last(),
            Some(&(2, "Paper Four".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_failure_reported_by_row_number() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FakeFactory::new(script(&[
            ("Effects of A B", vec![Some(vec!["Li, Wei"])]),
        ]));
        let mut table = table()?;

        let summary = run_batch(&mut table, &factory, &options(&dir, RunMode::SkipMarked)).await?;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_rows, vec![4]);
        let status = table.require_column("status")?;
        assert_eq!(table.get(3, status), "failed");

        // Checkpoint on disk reflects the final state
        let saved = PaperTable::load(&dir.path().join("progress.csv"))?;
        assert_eq!(saved.get(3, status), "failed");
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_written_every_interval() -> Result<()> {
        let dir = TempDir::new()?;
        let opts = options(&dir, RunMode::SkipMarked);
        let mut s = script(&[
            ("Effects of A B", vec![Some(vec!["Zheng, Yu-Feng"])]),
            ("Paper Four", vec![Some(vec!["Wang, Fang"])]),
        ]);
        s.watch_checkpoint = Some(opts.checkpoint_path.clone());
        let factory = FakeFactory::new(s);
        let mut table = table()?;

        run_batch(&mut table, &factory, &opts).await?;

        let script = factory.script.borrow();
        assert_eq!(script.snapshots.len(), 2);
        // Nothing on disk before the first row is processed
        assert_eq!(script.snapshots[0], None);
        // Rows 1-2 counted toward the interval of 2, so they are saved
        // before row 4 is looked up; row 3 (blank title) is not yet
        assert_eq!(
            script.snapshots[1].as_deref(),
            Some(&["success", "already-marked", "pending", "pending"].map(String::from)[..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_mode_reprocesses_marked_rows() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FakeFactory::new(script(&[
            ("Effects of A B", vec![Some(vec!["Li, Wei"])]),
            ("Paper Two", vec![Some(vec!["Doe, Jane"])]),
            ("Paper Four", vec![Some(vec!["Wang, Fang"])]),
        ]));
        let mut table = table()?;

        let summary = run_batch(&mut table, &factory, &options(&dir, RunMode::Complete)).await?;

        assert_eq!(summary.success, 3);
        assert_eq!(summary.already_marked, 0);
        assert_eq!(factory.script.borrow().sessions_opened, 1);
        let cols = table.prepare_for_scrape(&ColumnNames::default())?;
        assert_eq!(table.get(1, cols.corresponding), "Doe, Jane");
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_corresponding_column_is_skipped() -> Result<()> {
        let dir = TempDir::new()?;
        let csv = "title,authors,corresponding_authors,status\n\
            Paper One,\"Li, Wei\",\"Li, Wei\",failed\n";
        let mut table = PaperTable::from_reader(csv.as_bytes())?;
        let factory = FakeFactory::new(Script::default());

        let summary = run_batch(&mut table, &factory, &options(&dir, RunMode::SkipMarked)).await?;

        assert_eq!(summary.already_marked, 1);
        assert!(factory.script.borrow().lookups.is_empty());
        assert_eq!(table.get(0, 3), "already-marked");
        Ok(())
    }

    #[tokio::test]
    async fn test_session_open_failure_aborts() -> Result<()> {
        let dir = TempDir::new()?;
        let mut factory = FakeFactory::new(Script::default());
        factory.fail_open_after = Some(1);
        let mut table = table()?;

        let result = run_batch(&mut table, &factory, &options(&dir, RunMode::SkipMarked)).await;

        assert!(matches!(result, Err(WosError::Session(_))));
        // Pass-1 checkpoint survives the abort
        let saved = PaperTable::load(&dir.path().join("progress.csv"))?;
        let status = saved.require_column("status")?;
        assert_eq!(saved.get(0, status), "failed_round1");
        Ok(())
    }

    #[test]
    fn test_status_names() {
        assert_eq!(RowStatus::AlreadyMarked.to_string(), "already-marked");
        assert_eq!(RowStatus::FailedRound1.as_str(), "failed_round1");
        assert_eq!(RunMode::SkipMarked.to_string(), "skip_marked");
        assert_eq!(RunMode::default(), RunMode::SkipMarked);
    }
}
