use crate::models::issue::{Category, IssueRecord, LineRange};
use crate::models::pr::PrIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accepted,
    Rejected,
    Edited,
}

/// Points at an issue by location and category; does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueReference {
    pub file_path: String,
    pub line_range: LineRange,
    pub category: Category,
}

impl IssueReference {
    pub fn matches_exactly(&self, issue: &IssueRecord) -> bool {
        self.file_path == issue.file_path
            && self.category == issue.category
            && self.line_range == issue.line_range
    }

    pub fn overlaps(&self, issue: &IssueRecord) -> bool {
        self.file_path == issue.file_path
            && self.category == issue.category
            && self.line_range.overlaps(&issue.line_range)
    }
}

impl From<&IssueRecord> for IssueReference {
    fn from(issue: &IssueRecord) -> Self {
        Self {
            file_path: issue.file_path.clone(),
            line_range: issue.line_range,
            category: issue.category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(default = "uuid::Uuid::new_v4")]
    pub id: uuid::Uuid,
    pub pr_identifier: PrIdentifier,
    pub issue_reference: IssueReference,
    pub verdict: Verdict,
    #[serde(default)]
    pub reviewer_comment: Option<String>,
    /// Replacement message when the reviewer edited the finding.
    #[serde(default)]
    pub edited_message: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEntry {
    pub fn new(pr_identifier: PrIdentifier, issue_reference: IssueReference, verdict: Verdict) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            pr_identifier,
            issue_reference,
            verdict,
            reviewer_comment: None,
            edited_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.reviewer_comment = comment.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_edited_message(mut self, message: Option<String>) -> Self {
        self.edited_message = message.filter(|m| !m.trim().is_empty());
        self
    }
}

/// Result of `submit_feedback`: storage problems never fail the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Recorded,
    Warning { message: String },
}
