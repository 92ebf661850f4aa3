//! Parsers for linter JSON output and the lookup tables that map each linter's
//! native vocabulary onto [`Category`] and [`Severity`].
//!
//! Codes missing from the tables become `maintainability` / `info`.

use crate::models::config::LinterKind;
use crate::models::issue::{Category, IssueRecord, LineRange, Severity};
use serde::Deserialize;
use std::collections::HashMap;

const UNMAPPED: (Category, Severity) = (Category::Maintainability, Severity::Info);

/// Parse raw linter stdout into static findings attributed to `file_path`.
pub fn parse_output(kind: LinterKind, stdout: &str, file_path: &str) -> Result<Vec<IssueRecord>, String> {
    match kind {
        LinterKind::Pylint => parse_pylint(stdout, file_path),
        LinterKind::Flake8 => parse_flake8(stdout, file_path),
        LinterKind::Eslint => parse_eslint(stdout, file_path),
    }
}

fn finding(
    file_path: &str,
    line: Option<u32>,
    end_line: Option<u32>,
    (category, severity): (Category, Severity),
    message: String,
    rule: &str,
) -> Result<IssueRecord, String> {
    let start = line.unwrap_or(1).max(1);
    let end = end_line.filter(|end| *end >= start).unwrap_or(start);
    let range = LineRange::new(start, end).map_err(|e| e.to_string())?;
    IssueRecord::from_static(file_path, range, category, severity, message)
        .map(|issue| issue.with_rule(rule))
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// pylint --output-format=json

#[derive(Debug, Deserialize)]
struct PylintMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    symbol: String,
    #[serde(rename = "message-id", default)]
    message_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(rename = "endLine", default)]
    end_line: Option<u32>,
}

const PYLINT_SYMBOLS: &[(&str, Category)] = &[
    ("eval-used", Category::Security),
    ("exec-used", Category::Security),
    ("subprocess-popen-preexec-fn", Category::Security),
    ("duplicate-code", Category::Duplication),
    ("too-many-branches", Category::Complexity),
    ("too-many-statements", Category::Complexity),
    ("too-many-nested-blocks", Category::Complexity),
    ("too-many-return-statements", Category::Complexity),
    ("too-many-locals", Category::Complexity),
    ("too-many-arguments", Category::Complexity),
    ("unused-import", Category::Maintainability),
    ("unused-variable", Category::Maintainability),
    ("unused-argument", Category::Maintainability),
    ("missing-module-docstring", Category::Maintainability),
    ("missing-class-docstring", Category::Maintainability),
    ("missing-function-docstring", Category::Maintainability),
    ("fixme", Category::Maintainability),
    ("undefined-variable", Category::BugRisk),
    ("used-before-assignment", Category::BugRisk),
    ("dangerous-default-value", Category::BugRisk),
    ("bare-except", Category::BugRisk),
    ("broad-exception-caught", Category::BugRisk),
    ("line-too-long", Category::Style),
    ("invalid-name", Category::Style),
    ("trailing-whitespace", Category::Style),
    ("missing-final-newline", Category::Style),
];

fn pylint_category(symbol: &str, message_id: &str) -> Option<Category> {
    if let Some((_, category)) = PYLINT_SYMBOLS.iter().find(|(s, _)| *s == symbol) {
        return Some(*category);
    }
    match message_id.chars().next()? {
        'C' => Some(Category::Style),
        'R' => Some(Category::Complexity),
        'W' => Some(Category::Maintainability),
        'E' | 'F' => Some(Category::BugRisk),
        _ => None,
    }
}

fn pylint_severity(kind: &str) -> Option<Severity> {
    match kind {
        "fatal" => Some(Severity::Critical),
        "error" => Some(Severity::Error),
        "warning" | "refactor" => Some(Severity::Warning),
        "convention" | "info" => Some(Severity::Info),
        _ => None,
    }
}

fn parse_pylint(stdout: &str, file_path: &str) -> Result<Vec<IssueRecord>, String> {
    let messages: Vec<PylintMessage> =
        serde_json::from_str(stdout).map_err(|e| format!("invalid pylint JSON: {e}"))?;

    messages
        .into_iter()
        .map(|m| {
            let category = pylint_category(&m.symbol, &m.message_id).unwrap_or(UNMAPPED.0);
            let severity = pylint_severity(&m.kind).unwrap_or(UNMAPPED.1);
            let rule = if m.symbol.is_empty() { &m.message_id } else { &m.symbol };
            finding(file_path, m.line, m.end_line, (category, severity), m.message.clone(), rule)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// flake8 --format=json

#[derive(Debug, Deserialize)]
struct Flake8Message {
    #[serde(default)]
    code: String,
    #[serde(default)]
    line_number: Option<u32>,
    #[serde(default)]
    text: String,
}

/// First matching prefix wins, so exact codes precede their families.
const FLAKE8_CODES: &[(&str, Category, Severity)] = &[
    ("F401", Category::Maintainability, Severity::Warning),
    ("F841", Category::Maintainability, Severity::Warning),
    ("E9", Category::BugRisk, Severity::Error),
    ("F63", Category::BugRisk, Severity::Error),
    ("F7", Category::BugRisk, Severity::Error),
    ("F82", Category::BugRisk, Severity::Error),
    ("C9", Category::Complexity, Severity::Warning),
    ("S", Category::Security, Severity::Warning),
    ("B", Category::BugRisk, Severity::Warning),
    ("F", Category::BugRisk, Severity::Warning),
    ("E", Category::Style, Severity::Warning),
    ("W", Category::Style, Severity::Warning),
    ("N", Category::Style, Severity::Info),
    ("D", Category::Maintainability, Severity::Info),
];

fn flake8_mapping(code: &str) -> (Category, Severity) {
    FLAKE8_CODES
        .iter()
        .find(|(prefix, _, _)| code.starts_with(prefix))
        .map(|(_, category, severity)| (*category, *severity))
        .unwrap_or(UNMAPPED)
}

fn parse_flake8(stdout: &str, file_path: &str) -> Result<Vec<IssueRecord>, String> {
    let by_file: HashMap<String, Vec<Flake8Message>> =
        serde_json::from_str(stdout).map_err(|e| format!("invalid flake8 JSON: {e}"))?;

    let mut messages: Vec<Flake8Message> = by_file.into_values().flatten().collect();
    messages.sort_by_key(|m| m.line_number.unwrap_or(0));

    messages
        .into_iter()
        .map(|m| {
            let mapping = flake8_mapping(&m.code);
            finding(file_path, m.line_number, None, mapping, m.text.clone(), &m.code)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// eslint --format=json

#[derive(Debug, Deserialize)]
struct EslintResult {
    #[serde(default)]
    messages: Vec<EslintMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintMessage {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    severity: u8,
    #[serde(default)]
    fatal: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    end_line: Option<u32>,
}

const ESLINT_RULES: &[(&str, Category)] = &[
    ("no-eval", Category::Security),
    ("no-implied-eval", Category::Security),
    ("no-new-func", Category::Security),
    ("no-script-url", Category::Security),
    ("complexity", Category::Complexity),
    ("max-depth", Category::Complexity),
    ("max-params", Category::Complexity),
    ("max-statements", Category::Complexity),
    ("max-lines-per-function", Category::Complexity),
    ("max-nested-callbacks", Category::Complexity),
    ("eqeqeq", Category::BugRisk),
    ("no-undef", Category::BugRisk),
    ("no-unreachable", Category::BugRisk),
    ("no-fallthrough", Category::BugRisk),
    ("no-dupe-keys", Category::BugRisk),
    ("no-empty", Category::BugRisk),
    ("no-constant-condition", Category::BugRisk),
    ("@typescript-eslint/no-floating-promises", Category::BugRisk),
    ("no-unused-vars", Category::Maintainability),
    ("@typescript-eslint/no-unused-vars", Category::Maintainability),
    ("@typescript-eslint/no-explicit-any", Category::Maintainability),
    ("no-console", Category::Maintainability),
    ("no-duplicate-imports", Category::Duplication),
    ("sonarjs/no-identical-functions", Category::Duplication),
    ("sonarjs/no-duplicate-string", Category::Duplication),
    ("semi", Category::Style),
    ("quotes", Category::Style),
    ("indent", Category::Style),
    ("comma-dangle", Category::Style),
    ("max-len", Category::Style),
    ("prettier/prettier", Category::Style),
];

fn eslint_category(rule_id: &str) -> Category {
    if rule_id.starts_with("security/") {
        return Category::Security;
    }
    ESLINT_RULES
        .iter()
        .find(|(rule, _)| *rule == rule_id)
        .map(|(_, category)| *category)
        .unwrap_or(UNMAPPED.0)
}

fn eslint_severity(level: u8) -> Severity {
    match level {
        2 => Severity::Error,
        1 => Severity::Warning,
        _ => UNMAPPED.1,
    }
}

fn parse_eslint(stdout: &str, file_path: &str) -> Result<Vec<IssueRecord>, String> {
    let results: Vec<EslintResult> =
        serde_json::from_str(stdout).map_err(|e| format!("invalid eslint JSON: {e}"))?;

    results
        .into_iter()
        .flat_map(|result| result.messages)
        .map(|m| {
            let (mapping, rule) = match (&m.rule_id, m.fatal) {
                (Some(rule), _) => ((eslint_category(rule), eslint_severity(m.severity)), rule.clone()),
                (None, true) => ((Category::BugRisk, Severity::Error), "parse-error".to_string()),
                (None, false) => ((UNMAPPED.0, eslint_severity(m.severity)), String::new()),
            };
            finding(file_path, m.line, m.end_line, mapping, m.message.clone(), &rule)
        })
        .collect()
}
