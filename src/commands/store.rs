//! Flat-file persistence under the data directory:
//! `reports/<pr_key>/<YYYYMMDDHHMMSS>-<uuid>.json` and `feedback/<pr_key>.jsonl`.

use crate::error::PipelineError;
use crate::models::feedback::{FeedbackEntry, FeedbackOutcome};
use crate::models::pr::PrIdentifier;
use crate::models::report::{DebtReport, ReportSummary};
use chrono::{NaiveDateTime, TimeDelta, Utc};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("reports"),
        }
    }

    fn pr_dir(&self, pr: &PrIdentifier) -> PathBuf {
        self.root.join(pr.storage_key())
    }

    /// Writes the snapshot atomically and returns its path.
    pub fn save(&self, report: &DebtReport) -> Result<PathBuf, PipelineError> {
        let dir = self.pr_dir(&report.pr_identifier);
        fs::create_dir_all(&dir)?;

        let name = format!("{}-{}.json", report.generated_at.format(STAMP_FORMAT), report.id);
        let path = dir.join(name);

        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut staged, report)?;
        staged.flush()?;
        staged.persist(&path).map_err(|e| e.error)?;

        debug!("saved report {} to {}", report.id, path.display());
        Ok(path)
    }

    pub fn latest(&self, pr: &PrIdentifier) -> Result<Option<DebtReport>, PipelineError> {
        let mut reports = self.load_dir(&self.pr_dir(pr))?;
        reports.sort_by_key(|report| report.generated_at);
        Ok(reports.pop())
    }

    /// Summaries of every stored report, newest first. `repo` filters on `owner/repo`.
    pub fn list(&self, repo: Option<&str>) -> Result<Vec<ReportSummary>, PipelineError> {
        let mut summaries = Vec::new();
        for dir in self.pr_dirs()? {
            for report in self.load_dir(&dir)? {
                if repo.map_or(true, |r| report.pr_identifier.full_repo().eq_ignore_ascii_case(r)) {
                    summaries.push(report.summary());
                }
            }
        }
        summaries.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(summaries)
    }

    /// Delete snapshots older than `older_than_days`. Returns how many were removed.
    /// A cutoff before the earliest representable date removes nothing.
    pub fn prune(&self, older_than_days: u32) -> Result<usize, PipelineError> {
        let Some(cutoff) = TimeDelta::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .map(|cutoff| cutoff.naive_utc())
        else {
            debug!("prune cutoff of {older_than_days} day(s) is out of range, nothing to remove");
            return Ok(0);
        };
        let mut removed = 0;

        for dir in self.pr_dirs()? {
            for path in report_files(&dir)? {
                let Some(stamp) = file_stamp(&path) else {
                    continue;
                };
                if stamp < cutoff {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
            if fs::read_dir(&dir)?.next().is_none() {
                fs::remove_dir(&dir)?;
            }
        }

        Ok(removed)
    }

    fn pr_dirs(&self) -> Result<Vec<PathBuf>, PipelineError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Unreadable snapshots are skipped with a warning.
    fn load_dir(&self, dir: &Path) -> Result<Vec<DebtReport>, PipelineError> {
        let mut reports = Vec::new();
        for path in report_files(dir)? {
            match fs::read_to_string(&path)
                .map_err(PipelineError::from)
                .and_then(|raw| serde_json::from_str::<DebtReport>(&raw).map_err(PipelineError::from))
            {
                Ok(report) => reports.push(report),
                Err(e) => warn!("skipping unreadable report {}: {e}", path.display()),
            }
        }
        Ok(reports)
    }
}

fn report_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_stamp(path: &Path) -> Option<NaiveDateTime> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.get(..14)?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}

/// Append-only reviewer feedback, one JSONL log per pull request.
/// Each entry is one `O_APPEND` write of a complete line, so concurrent
/// writers never interleave within an entry.
pub struct FeedbackStore {
    root: PathBuf,
}

impl FeedbackStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("feedback"),
        }
    }

    fn log_path(&self, pr: &PrIdentifier) -> PathBuf {
        self.root.join(format!("{}.jsonl", pr.storage_key()))
    }

    /// Never fails the caller: storage problems come back as a warning.
    pub fn record(&self, entry: &FeedbackEntry) -> FeedbackOutcome {
        match self.append(entry) {
            Ok(()) => FeedbackOutcome::Recorded,
            Err(e) => {
                warn!("could not record feedback for {}: {e}", entry.pr_identifier);
                FeedbackOutcome::Warning {
                    message: format!("feedback was not saved: {e}"),
                }
            }
        }
    }

    fn append(&self, entry: &FeedbackEntry) -> Result<(), PipelineError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        fs::create_dir_all(&self.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(&entry.pr_identifier))?;
        let written = file.write(line.as_bytes())?;
        if written != line.len() {
            return Err(PipelineError::Storage(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short feedback write ({written} of {} bytes)", line.len()),
            )));
        }
        Ok(())
    }

    /// Entries recorded against `pr`, in insertion order. Reading starts only
    /// when the history is iterated and each iteration re-reads the log.
    pub fn history_for(&self, pr: &PrIdentifier) -> FeedbackHistory {
        FeedbackHistory {
            path: self.log_path(pr),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackHistory {
    path: PathBuf,
}

impl FeedbackHistory {
    pub fn iter(&self) -> FeedbackIter {
        let lines = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("could not open feedback log {}: {e}", self.path.display());
                None
            }
        };
        FeedbackIter {
            lines,
            path: self.path.clone(),
            line_no: 0,
        }
    }
}

impl IntoIterator for &FeedbackHistory {
    type Item = FeedbackEntry;
    type IntoIter = FeedbackIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct FeedbackIter {
    lines: Option<Lines<BufReader<File>>>,
    path: PathBuf,
    line_no: usize,
}

impl Iterator for FeedbackIter {
    type Item = FeedbackEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.as_mut()?.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!("stopped reading {}: {e}", self.path.display());
                    self.lines = None;
                    return None;
                }
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => return Some(entry),
                Err(e) => warn!("skipping malformed feedback at {}:{}: {e}", self.path.display(), self.line_no),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::{IssueReference, Verdict};
    use crate::models::issue::{Category, LineRange};
    use std::collections::BTreeMap;

    fn report(pr: &PrIdentifier, age_days: i64, total: f64) -> DebtReport {
        DebtReport {
            id: uuid::Uuid::new_v4(),
            schema_version: crate::models::report::REPORT_SCHEMA_VERSION,
            pr_identifier: pr.clone(),
            issues: Vec::new(),
            category_scores: Category::ALL.iter().map(|c| (*c, 0.0)).collect::<BTreeMap<_, _>>(),
            total_score: total,
            generated_at: Utc::now() - TimeDelta::days(age_days),
            diagnostics: Vec::new(),
            duration_ms: 0,
            warnings: Vec::new(),
        }
    }

    fn entry(pr: &PrIdentifier, line: u32, verdict: Verdict) -> FeedbackEntry {
        FeedbackEntry::new(
            pr.clone(),
            IssueReference {
                file_path: "a.py".to_string(),
                line_range: LineRange::single(line).unwrap(),
                category: Category::Style,
            },
            verdict,
        )
    }

    #[test]
    fn latest_report_is_the_newest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let pr = PrIdentifier::new("acme", "api", 1);

        store.save(&report(&pr, 3, 1.0)).unwrap();
        store.save(&report(&pr, 0, 2.0)).unwrap();
        store.save(&report(&pr, 1, 3.0)).unwrap();

        assert_eq!(store.latest(&pr).unwrap().unwrap().total_score, 2.0);
        assert!(store.latest(&PrIdentifier::new("acme", "api", 2)).unwrap().is_none());
    }

    #[test]
    fn lists_newest_first_with_repo_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        store.save(&report(&PrIdentifier::new("acme", "api", 1), 2, 1.0)).unwrap();
        store.save(&report(&PrIdentifier::new("acme", "api", 2), 1, 2.0)).unwrap();
        store.save(&report(&PrIdentifier::new("acme", "web", 3), 0, 3.0)).unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.iter().map(|s| s.total_score).collect::<Vec<_>>(), vec![3.0, 2.0, 1.0]);

        let api = store.list(Some("acme/api")).unwrap();
        assert_eq!(api.len(), 2);
        assert!(api.iter().all(|s| s.pr_identifier.repo == "api"));
    }

    #[test]
    fn prune_removes_only_old_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let old = PrIdentifier::new("acme", "api", 1);
        let fresh = PrIdentifier::new("acme", "api", 2);
        store.save(&report(&old, 40, 1.0)).unwrap();
        store.save(&report(&fresh, 40, 1.0)).unwrap();
        store.save(&report(&fresh, 1, 2.0)).unwrap();

        assert_eq!(store.prune(30).unwrap(), 2);
        assert!(store.latest(&old).unwrap().is_none());
        assert!(!dir.path().join("reports").join(old.storage_key()).exists());
        assert_eq!(store.latest(&fresh).unwrap().unwrap().total_score, 2.0);
    }

    #[test]
    fn prune_with_an_unrepresentable_cutoff_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let pr = PrIdentifier::new("acme", "api", 1);
        store.save(&report(&pr, 400, 1.0)).unwrap();

        assert_eq!(store.prune(200_000_000).unwrap(), 0);
        assert_eq!(store.prune(u32::MAX).unwrap(), 0);
        assert!(store.latest(&pr).unwrap().is_some());
    }

    #[test]
    fn skips_corrupt_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let pr = PrIdentifier::new("acme", "api", 1);
        store.save(&report(&pr, 0, 5.0)).unwrap();
        fs::write(store.pr_dir(&pr).join("20990101000000-broken.json"), "{").unwrap();

        assert_eq!(store.latest(&pr).unwrap().unwrap().total_score, 5.0);
    }

    #[test]
    fn feedback_history_is_ordered_and_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::new(dir.path());
        let pr = PrIdentifier::new("acme", "api", 9);

        let history = store.history_for(&pr);
        assert_eq!(history.iter().count(), 0);

        assert_eq!(store.record(&entry(&pr, 1, Verdict::Accepted)), FeedbackOutcome::Recorded);
        assert_eq!(store.record(&entry(&pr, 2, Verdict::Rejected)), FeedbackOutcome::Recorded);
        store.record(&entry(&PrIdentifier::new("acme", "api", 10), 3, Verdict::Edited));

        let lines: Vec<u32> = history.iter().map(|e| e.issue_reference.line_range.start()).collect();
        assert_eq!(lines, vec![1, 2]);
        let again: Vec<Verdict> = (&history).into_iter().map(|e| e.verdict).collect();
        assert_eq!(again, vec![Verdict::Accepted, Verdict::Rejected]);
    }

    #[test]
    fn malformed_feedback_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::new(dir.path());
        let pr = PrIdentifier::new("acme", "api", 9);
        store.record(&entry(&pr, 1, Verdict::Accepted));
        let path = store.log_path(&pr);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ truncated").unwrap();
        drop(file);
        store.record(&entry(&pr, 4, Verdict::Accepted));

        assert_eq!(store.history_for(&pr).iter().count(), 2);
    }

    #[test]
    fn concurrent_stores_append_whole_entries() {
        let dir = tempfile::tempdir().unwrap();
        let pr = PrIdentifier::new("acme", "api", 11);

        std::thread::scope(|scope| {
            for worker in 0..8u32 {
                let data_dir = dir.path();
                let pr = &pr;
                scope.spawn(move || {
                    for i in 0..25u32 {
                        // A fresh store per call, as `pipeline::submit_feedback` does.
                        let store = FeedbackStore::new(data_dir);
                        let outcome = store.record(&entry(pr, worker * 100 + i + 1, Verdict::Accepted));
                        assert_eq!(outcome, FeedbackOutcome::Recorded);
                    }
                });
            }
        });

        let raw = fs::read_to_string(FeedbackStore::new(dir.path()).log_path(&pr)).unwrap();
        assert_eq!(raw.lines().count(), 200);
        assert!(raw
            .lines()
            .all(|line| serde_json::from_str::<FeedbackEntry>(line).is_ok()));
        assert_eq!(FeedbackStore::new(dir.path()).history_for(&pr).iter().count(), 200);
    }

    #[test]
    fn storage_failure_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "not a directory").unwrap();
        let store = FeedbackStore::new(&blocker);

        let outcome = store.record(&entry(&PrIdentifier::new("acme", "api", 1), 1, Verdict::Accepted));
        assert!(matches!(outcome, FeedbackOutcome::Warning { .. }));
    }
}
