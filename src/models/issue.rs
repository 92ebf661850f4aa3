use crate::error::InvalidIssue;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Style,
    #[serde(alias = "bug_risk", alias = "bugrisk")]
    BugRisk,
    Security,
    Complexity,
    Duplication,
    Maintainability,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Style,
        Category::BugRisk,
        Category::Security,
        Category::Complexity,
        Category::Duplication,
        Category::Maintainability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Style => "style",
            Category::BugRisk => "bug-risk",
            Category::Security => "security",
            Category::Complexity => "complexity",
            Category::Duplication => "duplication",
            Category::Maintainability => "maintainability",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Severity> {
        let normalized = raw.trim().to_ascii_lowercase();
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == normalized)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Static,
    Llm,
}

/// 1-based inclusive line interval. Always `0 < start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLineRange")]
pub struct LineRange {
    start: u32,
    end: u32,
}

#[derive(Deserialize)]
struct RawLineRange {
    start: u32,
    end: u32,
}

impl TryFrom<RawLineRange> for LineRange {
    type Error = InvalidIssue;

    fn try_from(raw: RawLineRange) -> Result<Self, Self::Error> {
        LineRange::new(raw.start, raw.end)
    }
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Result<Self, InvalidIssue> {
        if start == 0 || end == 0 {
            return Err(InvalidIssue::NonPositiveLine { start, end });
        }
        if start > end {
            return Err(InvalidIssue::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(line: u32) -> Result<Self, InvalidIssue> {
        Self::new(line, line)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of lines covered.
    pub fn span(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl std::str::FromStr for LineRange {
    type Err = String;

    /// Accepts `12` or `10-12`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (s.trim(), s.trim()),
        };
        let start: u32 = start.parse().map_err(|_| format!("invalid line number '{start}'"))?;
        let end: u32 = end.parse().map_err(|_| format!("invalid line number '{end}'"))?;
        LineRange::new(start, end).map_err(|e| e.to_string())
    }
}

/// One detected issue, independent of which detector produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    #[serde(deserialize_with = "non_empty_path")]
    pub file_path: String,
    pub line_range: LineRange,
    pub category: Category,
    pub severity: Severity,
    pub source: Source,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(deserialize_with = "unit_interval")]
    pub confidence: f64,
    /// Native rule code of the detector, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Set when a static and an LLM finding were merged into this record.
    #[serde(default)]
    pub corroborated: bool,
}

impl IssueRecord {
    /// Static finding: confidence is fixed at 1.0.
    pub fn from_static(
        file_path: &str,
        line_range: LineRange,
        category: Category,
        severity: Severity,
        message: impl Into<String>,
    ) -> Result<Self, InvalidIssue> {
        Self::build(file_path, line_range, category, severity, Source::Static, message.into(), 1.0)
    }

    pub fn from_llm(
        file_path: &str,
        line_range: LineRange,
        category: Category,
        severity: Severity,
        message: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, InvalidIssue> {
        Self::build(file_path, line_range, category, severity, Source::Llm, message.into(), confidence)
    }

    fn build(
        file_path: &str,
        line_range: LineRange,
        category: Category,
        severity: Severity,
        source: Source,
        message: String,
        confidence: f64,
    ) -> Result<Self, InvalidIssue> {
        if file_path.trim().is_empty() {
            return Err(InvalidIssue::EmptyPath);
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidIssue::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            file_path: file_path.to_string(),
            line_range,
            category,
            severity,
            source,
            message,
            suggested_fix: None,
            confidence,
            rule: None,
            corroborated: false,
        })
    }

    pub fn with_suggested_fix(mut self, fix: Option<String>) -> Self {
        self.suggested_fix = fix.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        let rule = rule.into();
        self.rule = if rule.is_empty() { None } else { Some(rule) };
        self
    }

    /// Same file, overlapping lines, same category.
    pub fn duplicates(&self, other: &IssueRecord) -> bool {
        self.file_path == other.file_path
            && self.category == other.category
            && self.line_range.overlaps(&other.line_range)
    }
}

fn non_empty_path<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let path = String::deserialize(deserializer)?;
    if path.trim().is_empty() {
        return Err(serde::de::Error::custom(InvalidIssue::EmptyPath));
    }
    Ok(path)
}

fn unit_interval<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(serde::de::Error::custom(InvalidIssue::ConfidenceOutOfRange(value)));
    }
    Ok(value)
}
