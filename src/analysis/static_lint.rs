//! Static analysis adapter: external linters plus the built-in pattern rules.

use crate::analysis::{detect_language, extension_of, linters, patterns};
use crate::error::AnalysisCondition;
use crate::models::config::{LinterConfig, PipelineConfig};
use crate::models::issue::IssueRecord;
use crate::models::report::AdapterStatus;
use log::{debug, warn};
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct StaticOutcome {
    pub issues: Vec<IssueRecord>,
    pub status: AdapterStatus,
    pub conditions: Vec<AnalysisCondition>,
}

#[derive(Debug, Clone)]
pub struct StaticAnalyzer {
    linters: Vec<LinterConfig>,
    timeout: Duration,
    builtin_rules: bool,
    max_line_length: usize,
}

impl StaticAnalyzer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            linters: config.linters.clone(),
            timeout: Duration::from_secs(config.linter_timeout_seconds),
            builtin_rules: config.builtin_rules,
            max_line_length: config.max_line_length,
        }
    }

    fn applicable(&self, file_path: &str) -> Vec<&LinterConfig> {
        let Some(ext) = extension_of(file_path) else {
            return Vec::new();
        };
        self.linters
            .iter()
            .filter(|linter| linter.enabled && linter.kind.extensions().contains(&ext.as_str()))
            .collect()
    }

    /// Run every applicable linter and the built-in rules over one file.
    /// A linter that cannot run contributes nothing and a `ToolUnavailable` condition.
    pub async fn analyze(&self, file_path: &str, file_text: &str) -> StaticOutcome {
        let applicable = self.applicable(file_path);
        let mut issues = Vec::new();
        let mut conditions = Vec::new();

        for linter in &applicable {
            match self.run_linter(linter, file_path, file_text).await {
                Ok(found) => {
                    debug!("{} reported {} finding(s) for {file_path}", linter.kind.name(), found.len());
                    issues.extend(found);
                }
                Err(reason) => {
                    warn!("{} unavailable for {file_path}: {reason}", linter.kind.name());
                    conditions.push(AnalysisCondition::ToolUnavailable {
                        tool: linter.kind.name().to_string(),
                        reason,
                    });
                }
            }
        }

        if self.builtin_rules {
            issues.extend(patterns::detect_patterns(
                file_path,
                file_text,
                detect_language(file_path),
                self.max_line_length,
            ));
        }

        let status = if !conditions.is_empty() {
            AdapterStatus::Unavailable
        } else if !applicable.is_empty() || self.builtin_rules {
            AdapterStatus::Ok
        } else if self.linters.iter().any(|l| l.enabled) {
            AdapterStatus::Skipped
        } else {
            AdapterStatus::Disabled
        };

        StaticOutcome {
            issues,
            status,
            conditions,
        }
    }

    async fn run_linter(
        &self,
        linter: &LinterConfig,
        file_path: &str,
        file_text: &str,
    ) -> Result<Vec<IssueRecord>, String> {
        let program = which::which(&linter.program)
            .map_err(|_| format!("'{}' not found on PATH", linter.program))?;

        // Linters pick their rules from the extension, so the copy keeps it.
        let suffix = extension_of(file_path)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut copy = tempfile::Builder::new()
            .prefix("reviewlens-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| format!("could not create temporary copy: {e}"))?;
        copy.write_all(file_text.as_bytes())
            .and_then(|_| copy.flush())
            .map_err(|e| format!("could not write temporary copy: {e}"))?;

        debug!("running {} {:?} on {file_path}", program.display(), linter.kind.args());
        let child = Command::new(&program)
            .args(linter.kind.args())
            .arg(copy.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("failed to start: {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            if output.status.success() {
                return Ok(Vec::new());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().next().unwrap_or("").trim();
            return Err(format!("exited with {} and no output: {first_line}", output.status));
        }

        linters::parse_output(linter.kind, &stdout, file_path)
    }
}
