use crate::error::AnalysisCondition;
use crate::models::feedback::IssueReference;
use crate::models::issue::{Category, IssueRecord};
use crate::models::pr::PrIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Outcome of one adapter for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    Ok,
    /// Tool or provider could not be reached.
    Unavailable,
    /// Provider answered but the reply failed validation.
    Malformed,
    /// Turned off by configuration.
    Disabled,
    /// Not applicable to this file (no linter for the extension, input too large).
    Skipped,
}

impl AdapterStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AdapterStatus::Unavailable | AdapterStatus::Malformed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiagnostics {
    pub file_path: String,
    pub static_status: AdapterStatus,
    pub llm_status: AdapterStatus,
    #[serde(default)]
    pub conditions: Vec<AnalysisCondition>,
    /// Findings collected for the file before deduplication.
    #[serde(default)]
    pub raw_issue_count: usize,
}

impl FileDiagnostics {
    pub fn is_degraded(&self) -> bool {
        self.static_status.is_degraded() || self.llm_status.is_degraded()
    }
}

/// Immutable snapshot produced by one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtReport {
    #[serde(default = "uuid::Uuid::new_v4")]
    pub id: uuid::Uuid,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub pr_identifier: PrIdentifier,
    pub issues: Vec<IssueRecord>,
    pub category_scores: BTreeMap<Category, f64>,
    pub total_score: f64,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub diagnostics: Vec<FileDiagnostics>,
    #[serde(default)]
    pub duration_ms: u64,
    /// Run-level problems that did not affect the findings, such as a
    /// snapshot that could not be stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<AnalysisCondition>,
}

fn default_schema_version() -> u32 {
    REPORT_SCHEMA_VERSION
}

impl DebtReport {
    pub fn is_degraded(&self) -> bool {
        self.diagnostics.iter().any(FileDiagnostics::is_degraded)
    }

    /// Resolve a weak reference: exact range match first, then any duplicate.
    pub fn find_issue(&self, reference: &IssueReference) -> Option<&IssueRecord> {
        self.issues
            .iter()
            .find(|issue| reference.matches_exactly(issue))
            .or_else(|| self.issues.iter().find(|issue| reference.overlaps(issue)))
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            id: self.id,
            pr_identifier: self.pr_identifier.clone(),
            generated_at: self.generated_at,
            issue_count: self.issues.len(),
            total_score: self.total_score,
            degraded: self.is_degraded(),
        }
    }
}

/// Listing entry for stored reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: uuid::Uuid,
    pub pr_identifier: PrIdentifier,
    pub generated_at: DateTime<Utc>,
    pub issue_count: usize,
    pub total_score: f64,
    pub degraded: bool,
}

/// Emitted once per analyzed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisProgress {
    pub current: usize,
    pub total: usize,
    pub current_file: String,
}
