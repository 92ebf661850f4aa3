use crate::analysis::dedup::deduplicate;
use crate::analysis::llm::{CompletionClient, LlmAnalyzer, OpenAiClient};
use crate::analysis::scoring;
use crate::analysis::static_lint::StaticAnalyzer;
use crate::commands::github::GitHubClient;
use crate::commands::settings::load_pipeline_config;
use crate::commands::store::{FeedbackStore, ReportStore};
use crate::error::{AnalysisCondition, PipelineError};
use crate::models::config::PipelineConfig;
use crate::models::feedback::{FeedbackEntry, FeedbackOutcome};
use crate::models::issue::IssueRecord;
use crate::models::pr::{FileFilter, PrFile, PrIdentifier};
use crate::models::report::{AnalysisProgress, DebtReport, FileDiagnostics, REPORT_SCHEMA_VERSION};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

/// Adapters and aggregator built from one explicit configuration.
pub struct Pipeline {
    config: PipelineConfig,
    static_analyzer: StaticAnalyzer,
    llm: LlmAnalyzer,
}

struct FileAnalysis {
    issues: Vec<IssueRecord>,
    diagnostics: FileDiagnostics,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self {
            static_analyzer: StaticAnalyzer::new(&config),
            llm: LlmAnalyzer::new(&config, client),
            config,
        }
    }

    /// Uses the OpenAI-compatible client when `OPENAI_API_KEY` is set.
    pub fn from_env(config: PipelineConfig) -> Self {
        let client = if config.llm_enabled {
            let client = OpenAiClient::from_env(&config).map(|c| Arc::new(c) as Arc<dyn CompletionClient>);
            if client.is_none() {
                warn!("OPENAI_API_KEY is not set; running without LLM review");
            }
            client
        } else {
            None
        };
        Self::new(config, client)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn analyze(&self, pr: &PrIdentifier, files: Vec<PrFile>) -> DebtReport {
        self.analyze_with_progress(pr, files, |_| {}).await
    }

    pub async fn analyze_with_progress<F>(
        &self,
        pr: &PrIdentifier,
        files: Vec<PrFile>,
        mut emit_progress: F,
    ) -> DebtReport
    where
        F: FnMut(AnalysisProgress),
    {
        let start = std::time::Instant::now();
        let total = files.len();
        let context = format!("pull request {pr}");
        info!("analyzing {total} file(s) for {pr}");

        let mut analyses = Vec::with_capacity(total);
        let mut pending = stream::iter(files)
            .map(|file| {
                let context = context.as_str();
                async move { self.analyze_file(file, context).await }
            })
            .buffer_unordered(self.config.max_concurrent_files.max(1));

        while let Some(analysis) = pending.next().await {
            emit_progress(AnalysisProgress {
                current: analyses.len() + 1,
                total,
                current_file: analysis.diagnostics.file_path.clone(),
            });
            analyses.push(analysis);
        }

        self.aggregate(pr, analyses, start.elapsed().as_millis() as u64)
    }

    async fn analyze_file(&self, file: PrFile, context: &str) -> FileAnalysis {
        let (static_outcome, llm_outcome) = tokio::join!(
            self.static_analyzer.analyze(&file.file_path, &file.file_text),
            self.llm.analyze(&file, context),
        );

        let mut issues = static_outcome.issues;
        issues.extend(llm_outcome.issues);
        let mut conditions = static_outcome.conditions;
        conditions.extend(llm_outcome.conditions);

        FileAnalysis {
            diagnostics: FileDiagnostics {
                file_path: file.file_path,
                static_status: static_outcome.status,
                llm_status: llm_outcome.status,
                conditions,
                raw_issue_count: issues.len(),
            },
            issues,
        }
    }

    fn aggregate(&self, pr: &PrIdentifier, analyses: Vec<FileAnalysis>, duration_ms: u64) -> DebtReport {
        let mut diagnostics = Vec::with_capacity(analyses.len());
        let mut raw = Vec::new();
        for analysis in analyses {
            raw.extend(analysis.issues);
            diagnostics.push(analysis.diagnostics);
        }
        diagnostics.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        let issues = deduplicate(raw);
        let score = scoring::score(&issues, &self.config);

        let report = DebtReport {
            id: uuid::Uuid::new_v4(),
            schema_version: REPORT_SCHEMA_VERSION,
            pr_identifier: pr.clone(),
            issues,
            category_scores: score.category_scores,
            total_score: score.total_score,
            generated_at: Utc::now(),
            diagnostics,
            duration_ms,
            warnings: Vec::new(),
        };

        let degraded = report.diagnostics.iter().filter(|d| d.is_degraded()).count();
        info!(
            "{pr}: {} issue(s), total score {:.1}, {degraded} degraded file(s)",
            report.issues.len(),
            report.total_score
        );
        report
    }
}

/// Analyze the given files with the stored configuration and persist the report.
/// A report that cannot be saved is still returned, carrying a `StorageWarning`.
pub async fn analyze(data_dir: &Path, pr: &PrIdentifier, files: Vec<PrFile>) -> Result<DebtReport, PipelineError> {
    analyze_internal(data_dir, pr, files, |_| {}).await
}

pub async fn analyze_internal<F>(
    data_dir: &Path,
    pr: &PrIdentifier,
    files: Vec<PrFile>,
    emit_progress: F,
) -> Result<DebtReport, PipelineError>
where
    F: FnMut(AnalysisProgress),
{
    let config = load_pipeline_config(data_dir)?;
    let pipeline = Pipeline::from_env(config);
    Ok(run_and_persist(data_dir, &pipeline, pr, files, emit_progress).await)
}

pub async fn run_and_persist<F>(
    data_dir: &Path,
    pipeline: &Pipeline,
    pr: &PrIdentifier,
    files: Vec<PrFile>,
    emit_progress: F,
) -> DebtReport
where
    F: FnMut(AnalysisProgress),
{
    let mut report = pipeline.analyze_with_progress(pr, files, emit_progress).await;
    if let Err(e) = ReportStore::new(data_dir).save(&report) {
        warn!("could not save report for {pr}: {e}");
        report.warnings.push(AnalysisCondition::StorageWarning {
            reason: format!("report was not saved: {e}"),
        });
    }
    report
}

/// Fetch the pull request from GitHub, then analyze it.
pub async fn analyze_pull_request<F>(data_dir: &Path, pr: &PrIdentifier, emit_progress: F) -> Result<DebtReport, PipelineError>
where
    F: FnMut(AnalysisProgress),
{
    let config = load_pipeline_config(data_dir)?;
    let client = GitHubClient::from_env(&config)?;
    let files = client.fetch_pr_files(pr, &FileFilter::from_config(&config)).await?;
    let pipeline = Pipeline::from_env(config);
    Ok(run_and_persist(data_dir, &pipeline, pr, files, emit_progress).await)
}

/// Analyze a local branch between two revisions as if it were `pr`.
pub async fn analyze_local<F>(
    data_dir: &Path,
    repo_path: &Path,
    base: &str,
    head: &str,
    pr: &PrIdentifier,
    emit_progress: F,
) -> Result<DebtReport, PipelineError>
where
    F: FnMut(AnalysisProgress),
{
    let config = load_pipeline_config(data_dir)?;
    let files = crate::commands::git::local_pr_files(repo_path, base, head, &FileFilter::from_config(&config))?;
    let pipeline = Pipeline::from_env(config);
    Ok(run_and_persist(data_dir, &pipeline, pr, files, emit_progress).await)
}

/// Append reviewer feedback. Storage problems come back as a warning.
pub fn submit_feedback(data_dir: &Path, entry: &FeedbackEntry) -> FeedbackOutcome {
    FeedbackStore::new(data_dir).record(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::Category;
    use crate::models::report::AdapterStatus;

    #[tokio::test]
    async fn empty_file_list_gives_an_empty_zero_report() {
        let pipeline = Pipeline::new(PipelineConfig::offline(), None);
        let report = pipeline.analyze(&PrIdentifier::new("acme", "api", 1), Vec::new()).await;

        assert!(report.issues.is_empty());
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.category_scores.len(), Category::ALL.len());
        assert!(report.category_scores.values().all(|s| *s == 0.0));
        assert_eq!(report.total_score, 0.0);
    }

    #[tokio::test]
    async fn offline_run_reports_builtin_findings_and_disabled_llm() {
        let pipeline = Pipeline::new(PipelineConfig::offline(), None);
        let files = vec![
            PrFile::new("b.py", "token = \"abc\"\n", ""),
            PrFile::new("a.js", "// TODO tidy\n", ""),
        ];
        let mut seen = Vec::new();
        let report = pipeline
            .analyze_with_progress(&PrIdentifier::new("acme", "api", 1), files, |p| seen.push(p.current))
            .await;

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.issues[0].file_path, "a.js");
        assert_eq!(report.category_scores[&Category::Security], 7.0);
        assert_eq!(report.category_scores[&Category::Maintainability], 1.0);
        assert_eq!(report.total_score, 22.0);
        assert_eq!(report.diagnostics[0].file_path, "a.js");
        assert!(report.diagnostics.iter().all(|d| d.llm_status == AdapterStatus::Disabled));
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn unsaved_report_is_returned_with_a_storage_warning() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, "not a directory").unwrap();
        let pipeline = Pipeline::new(PipelineConfig::offline(), None);

        let report = run_and_persist(
            &blocker,
            &pipeline,
            &PrIdentifier::new("acme", "api", 1),
            vec![PrFile::new("a.py", "# TODO\n", "")],
            |_| {},
        )
        .await;

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            AnalysisCondition::StorageWarning { reason } if reason.contains("not saved")
        ));
    }

    #[tokio::test]
    async fn saved_report_carries_no_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig::offline(), None);
        let pr = PrIdentifier::new("acme", "api", 2);

        let report = run_and_persist(dir.path(), &pipeline, &pr, Vec::new(), |_| {}).await;

        assert!(report.warnings.is_empty());
        assert_eq!(ReportStore::new(dir.path()).latest(&pr).unwrap(), Some(report));
    }
}
