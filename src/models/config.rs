use crate::models::issue::{Category, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default severity weights: info 1, warning 3, error 7, critical 15.
pub fn default_severity_weights() -> BTreeMap<Severity, f64> {
    let mut w = BTreeMap::new();
    w.insert(Severity::Info, 1.0);
    w.insert(Severity::Warning, 3.0);
    w.insert(Severity::Error, 7.0);
    w.insert(Severity::Critical, 15.0);
    w
}

/// Default category weights. Security counts six times as much as style.
pub fn default_category_weights() -> BTreeMap<Category, f64> {
    let mut w = BTreeMap::new();
    w.insert(Category::Security, 3.0);
    w.insert(Category::BugRisk, 2.5);
    w.insert(Category::Complexity, 1.5);
    w.insert(Category::Maintainability, 1.0);
    w.insert(Category::Duplication, 1.0);
    w.insert(Category::Style, 0.5);
    w
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinterKind {
    Pylint,
    Flake8,
    Eslint,
}

impl LinterKind {
    pub const ALL: [LinterKind; 3] = [LinterKind::Pylint, LinterKind::Flake8, LinterKind::Eslint];

    pub fn name(&self) -> &'static str {
        match self {
            LinterKind::Pylint => "pylint",
            LinterKind::Flake8 => "flake8",
            LinterKind::Eslint => "eslint",
        }
    }

    pub fn from_name(name: &str) -> Option<LinterKind> {
        LinterKind::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            LinterKind::Pylint | LinterKind::Flake8 => &["py"],
            LinterKind::Eslint => &["js", "jsx", "ts", "tsx"],
        }
    }

    /// Arguments placed before the file path.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            LinterKind::Pylint => &["--output-format=json"],
            LinterKind::Flake8 => &["--format=json"],
            LinterKind::Eslint => &["--format=json"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinterConfig {
    pub kind: LinterKind,
    pub enabled: bool,
    /// Executable name or path.
    pub program: String,
}

impl LinterConfig {
    pub fn default_for(kind: LinterKind) -> Self {
        Self {
            kind,
            enabled: true,
            program: kind.name().to_string(),
        }
    }
}

/// Explicit configuration handed to the adapters and the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub severity_weights: BTreeMap<Severity, f64>,
    pub category_weights: BTreeMap<Category, f64>,
    pub llm_enabled: bool,
    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_timeout_seconds: u64,
    pub llm_retry_count: u32,
    pub llm_retry_backoff_ms: u64,
    pub llm_temperature: f64,
    pub llm_max_tokens: u32,
    pub llm_max_input_chars: usize,
    pub linters: Vec<LinterConfig>,
    pub linter_timeout_seconds: u64,
    pub builtin_rules: bool,
    pub max_line_length: usize,
    pub max_concurrent_files: usize,
    pub github_api_url: String,
    pub max_file_changes: u64,
    pub supported_extensions: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            severity_weights: default_severity_weights(),
            category_weights: default_category_weights(),
            llm_enabled: true,
            llm_model: "gpt-4o-mini".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_timeout_seconds: 30,
            llm_retry_count: 1,
            llm_retry_backoff_ms: 1000,
            llm_temperature: 0.1,
            llm_max_tokens: 1500,
            llm_max_input_chars: 10_000,
            linters: LinterKind::ALL.into_iter().map(LinterConfig::default_for).collect(),
            linter_timeout_seconds: 60,
            builtin_rules: true,
            max_line_length: 100,
            max_concurrent_files: 4,
            github_api_url: "https://api.github.com".to_string(),
            max_file_changes: 1000,
            supported_extensions: default_supported_extensions(),
            exclude: Vec::new(),
        }
    }
}

pub fn default_supported_extensions() -> Vec<String> {
    ["py", "js", "jsx", "ts", "tsx", "java", "go", "rb", "c", "cpp", "cs"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

/// Missing, negative and non-finite weights count as zero.
fn usable_weight(weight: Option<f64>) -> f64 {
    weight.filter(|w| w.is_finite() && *w > 0.0).unwrap_or(0.0)
}

impl PipelineConfig {
    pub fn severity_weight(&self, severity: Severity) -> f64 {
        usable_weight(self.severity_weights.get(&severity).copied())
    }

    pub fn category_weight(&self, category: Category) -> f64 {
        usable_weight(self.category_weights.get(&category).copied())
    }

    /// Configuration with no external tools: built-in rules only.
    pub fn offline() -> Self {
        Self {
            llm_enabled: false,
            linters: LinterKind::ALL
                .into_iter()
                .map(|kind| LinterConfig {
                    enabled: false,
                    ..LinterConfig::default_for(kind)
                })
                .collect(),
            ..Self::default()
        }
    }
}
