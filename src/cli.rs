use crate::commands::pipeline;
use crate::commands::settings::{load_settings_from_disk, resolve_data_dir, save_settings_to_disk};
use crate::commands::store::{FeedbackStore, ReportStore};
use crate::error::PipelineError;
use crate::models::feedback::{FeedbackEntry, FeedbackOutcome, IssueReference, Verdict};
use crate::models::issue::{Category, LineRange};
use crate::models::pr::PrIdentifier;
use crate::models::report::{AnalysisProgress, DebtReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reviewlens")]
#[command(author, version, about = "Merge linter and LLM review findings into a technical debt score for pull requests")]
pub struct Cli {
    /// Directory holding settings, reports and feedback (default: $REVIEWLENS_DATA_DIR or .reviewlens)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a pull request from GitHub and analyze it
    Analyze {
        /// owner/repo#N or a pull request URL
        pr: PrIdentifier,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyze the changes between two revisions of a local repository
    Local {
        /// Identifier the report is stored under
        #[arg(long)]
        pr: PrIdentifier,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        base: String,
        #[arg(long, default_value = "HEAD")]
        head: String,
        #[arg(long)]
        json: bool,
    },
    /// Record a reviewer verdict on an issue
    Feedback {
        #[arg(long)]
        pr: PrIdentifier,
        #[arg(long)]
        file: String,
        /// Line range, e.g. 10-12
        #[arg(long)]
        lines: LineRange,
        #[arg(long, value_parser = parse_category)]
        category: Category,
        #[arg(long, value_parser = parse_verdict)]
        verdict: Verdict,
        #[arg(long)]
        comment: Option<String>,
        /// Replacement message for an edited issue
        #[arg(long)]
        message: Option<String>,
    },
    /// Show the feedback recorded for a pull request
    History {
        pr: PrIdentifier,
        #[arg(long)]
        json: bool,
    },
    /// Show the newest stored report for a pull request
    Latest {
        pr: PrIdentifier,
        #[arg(long)]
        json: bool,
    },
    /// List stored reports, newest first
    Reports {
        /// Only reports for owner/repo
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete stored reports older than the given number of days
    Prune {
        #[arg(long)]
        days: u32,
    },
    /// Print the settings, optionally merging a JSON object into them first
    Settings {
        #[arg(long)]
        set: Option<String>,
    },
    /// Open the desktop dashboard
    #[cfg(feature = "desktop")]
    Dashboard,
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        format!("unknown category '{raw}', expected one of: {}", known.join(", "))
    })
}

fn parse_verdict(raw: &str) -> Result<Verdict, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "accepted" | "accept" => Ok(Verdict::Accepted),
        "rejected" | "reject" => Ok(Verdict::Rejected),
        "edited" | "edit" => Ok(Verdict::Edited),
        _ => Err(format!("unknown verdict '{raw}', expected accepted, rejected or edited")),
    }
}

pub async fn execute(cli: Cli) -> Result<(), PipelineError> {
    let data_dir = resolve_data_dir(cli.data_dir);

    match cli.command {
        Command::Analyze { pr, json } => {
            let report = pipeline::analyze_pull_request(&data_dir, &pr, log_progress).await?;
            print_report(&report, json)?;
        }
        Command::Local {
            pr,
            repo,
            base,
            head,
            json,
        } => {
            let report = pipeline::analyze_local(&data_dir, &repo, &base, &head, &pr, log_progress).await?;
            print_report(&report, json)?;
        }
        Command::Feedback {
            pr,
            file,
            lines,
            category,
            verdict,
            comment,
            message,
        } => {
            let reference = IssueReference {
                file_path: file,
                line_range: lines,
                category,
            };
            if let Ok(Some(report)) = ReportStore::new(&data_dir).latest(&pr) {
                if report.find_issue(&reference).is_none() {
                    log::warn!("no issue at {}:{} ({}) in the latest report for {pr}", reference.file_path, reference.line_range, reference.category);
                }
            }
            let entry = FeedbackEntry::new(pr, reference, verdict)
                .with_comment(comment)
                .with_edited_message(message);
            match pipeline::submit_feedback(&data_dir, &entry) {
                FeedbackOutcome::Recorded => println!("Recorded {:?} feedback {}", entry.verdict, entry.id),
                FeedbackOutcome::Warning { message } => println!("Warning: {message}"),
            }
        }
        Command::History { pr, json } => {
            let history = FeedbackStore::new(&data_dir).history_for(&pr);
            if json {
                let entries: Vec<FeedbackEntry> = history.iter().collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                let mut count = 0;
                for entry in &history {
                    count += 1;
                    println!(
                        "{}  {:<8} {}:{} [{}]{}",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        format!("{:?}", entry.verdict).to_lowercase(),
                        entry.issue_reference.file_path,
                        entry.issue_reference.line_range,
                        entry.issue_reference.category,
                        entry.reviewer_comment.map(|c| format!("  {c}")).unwrap_or_default()
                    );
                }
                if count == 0 {
                    println!("No feedback recorded for {pr}");
                }
            }
        }
        Command::Latest { pr, json } => match ReportStore::new(&data_dir).latest(&pr)? {
            Some(report) => print_report(&report, json)?,
            None => println!("No stored report for {pr}"),
        },
        Command::Reports { repo, json } => {
            let summaries = ReportStore::new(&data_dir).list(repo.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No stored reports");
            } else {
                for s in summaries {
                    println!(
                        "{}  {:<30} {:>4} issue(s)  score {:>7.1}{}",
                        s.generated_at.format("%Y-%m-%d %H:%M"),
                        s.pr_identifier.to_string(),
                        s.issue_count,
                        s.total_score,
                        if s.degraded { "  (degraded)" } else { "" }
                    );
                }
            }
        }
        Command::Prune { days } => {
            let removed = ReportStore::new(&data_dir).prune(days)?;
            println!("Removed {removed} report(s) older than {days} day(s)");
        }
        Command::Settings { set } => {
            let settings = match set {
                Some(raw) => {
                    let update: serde_json::Value = serde_json::from_str(&raw)?;
                    save_settings_to_disk(&data_dir, update)?
                }
                None => load_settings_from_disk(&data_dir)?,
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        #[cfg(feature = "desktop")]
        Command::Dashboard => {
            return Err(PipelineError::Settings(
                "the dashboard runs outside the async runtime; start it from main".to_string(),
            ));
        }
    }

    Ok(())
}

fn log_progress(progress: AnalysisProgress) {
    log::info!("[{}/{}] {}", progress.current, progress.total, progress.current_file);
}

fn print_report(report: &DebtReport, json: bool) -> Result<(), PipelineError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}  total debt score {:.1}", report.pr_identifier, report.total_score);
    for (category, score) in &report.category_scores {
        if *score > 0.0 {
            println!("  {category:<16} {score:>7.1}");
        }
    }

    println!();
    if report.issues.is_empty() {
        println!("No issues found.");
    }
    for issue in &report.issues {
        println!(
            "{}:{}  {} {} [{}{}] {}",
            issue.file_path,
            issue.line_range,
            issue.severity,
            issue.category,
            format!("{:?}", issue.source).to_lowercase(),
            if issue.corroborated { "+llm" } else { "" },
            issue.message
        );
        if let Some(fix) = &issue.suggested_fix {
            println!("    fix: {fix}");
        }
    }

    let degraded: Vec<_> = report.diagnostics.iter().filter(|d| d.is_degraded()).collect();
    if !degraded.is_empty() {
        println!();
        println!("Analysis degraded for {} file(s):", degraded.len());
        for diagnostics in degraded {
            for condition in &diagnostics.conditions {
                println!("  {}: {condition}", diagnostics.file_path);
            }
        }
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feedback_arguments() {
        let cli = Cli::try_parse_from([
            "reviewlens",
            "feedback",
            "--pr",
            "acme/api#3",
            "--file",
            "src/app.py",
            "--lines",
            "10-12",
            "--category",
            "bug_risk",
            "--verdict",
            "reject",
        ])
        .unwrap();

        match cli.command {
            Command::Feedback {
                pr,
                lines,
                category,
                verdict,
                ..
            } => {
                assert_eq!(pr, PrIdentifier::new("acme", "api", 3));
                assert_eq!(lines, LineRange::new(10, 12).unwrap());
                assert_eq!(category, Category::BugRisk);
                assert_eq!(verdict, Verdict::Rejected);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_identifiers_and_ranges() {
        assert!(Cli::try_parse_from(["reviewlens", "analyze", "acme-api-3"]).is_err());
        assert!(Cli::try_parse_from([
            "reviewlens", "feedback", "--pr", "a/b#1", "--file", "x", "--lines", "9-2",
            "--category", "style", "--verdict", "accepted",
        ])
        .is_err());
    }

    #[test]
    fn data_dir_is_global() {
        let cli = Cli::try_parse_from(["reviewlens", "prune", "--days", "30", "--data-dir", "/tmp/rl"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/rl")));
    }
}
