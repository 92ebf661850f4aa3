use crate::models::issue::{Category, IssueRecord, LineRange, Severity};
use regex::Regex;
use std::sync::OnceLock;

pub const RULE_LINE_LENGTH: &str = "line-length";
pub const RULE_TODO: &str = "todo-comment";
pub const RULE_CREDENTIAL: &str = "hardcoded-credential";
pub const RULE_EMPTY_CATCH: &str = "empty-catch";
pub const RULE_DEEP_NESTING: &str = "deep-nesting";

const MAX_NESTING: usize = 4;

fn todo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(TODO|FIXME|HACK|XXX)\b").expect("valid todo pattern"))
}

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(password|passwd|secret|api_?key|access_?key|token)\b\s*[:=]\s*["'][^"']+["']"#)
            .expect("valid credential pattern")
    })
}

/// Line-based checks that need no external tool. Findings are static with
/// confidence 1.0 and carry the rule name.
pub fn detect_patterns(
    file_path: &str,
    source: &str,
    language: &str,
    max_line_length: usize,
) -> Vec<IssueRecord> {
    let lines: Vec<&str> = source.lines().collect();
    let mut issues = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line_no = (i + 1) as u32;
        let trimmed = line.trim();

        let length = line.chars().count();
        if length > max_line_length {
            push(
                &mut issues,
                file_path,
                line_no,
                line_no,
                Category::Style,
                Severity::Info,
                format!("Line too long ({length}/{max_line_length})"),
                RULE_LINE_LENGTH,
            );
        }

        if let Some(comment) = comment_text(trimmed, language) {
            if let Some(marker) = todo_pattern().find(comment) {
                push(
                    &mut issues,
                    file_path,
                    line_no,
                    line_no,
                    Category::Maintainability,
                    Severity::Info,
                    format!("{} comment found", marker.as_str().to_uppercase()),
                    RULE_TODO,
                );
            }
        }

        if !is_comment(trimmed, language) && credential_pattern().is_match(trimmed) {
            push(
                &mut issues,
                file_path,
                line_no,
                line_no,
                Category::Security,
                Severity::Error,
                "Possible hardcoded credential found".to_string(),
                RULE_CREDENTIAL,
            );
        }

        if let Some(end) = empty_handler_end(&lines, i, language) {
            push(
                &mut issues,
                file_path,
                line_no,
                end as u32,
                Category::BugRisk,
                Severity::Warning,
                "Empty exception handler swallows errors".to_string(),
                RULE_EMPTY_CATCH,
            );
        }
    }

    for (start, end, depth) in deep_nesting_runs(&lines, language) {
        push(
            &mut issues,
            file_path,
            start,
            end,
            Category::Complexity,
            Severity::Info,
            format!("Code nested {depth} levels deep"),
            RULE_DEEP_NESTING,
        );
    }

    issues
}

#[allow(clippy::too_many_arguments)]
fn push(
    issues: &mut Vec<IssueRecord>,
    file_path: &str,
    start: u32,
    end: u32,
    category: Category,
    severity: Severity,
    message: String,
    rule: &str,
) {
    let Ok(range) = LineRange::new(start, end) else {
        return;
    };
    if let Ok(issue) = IssueRecord::from_static(file_path, range, category, severity, message) {
        issues.push(issue.with_rule(rule));
    }
}

fn uses_hash_comments(language: &str) -> bool {
    matches!(language, "python" | "ruby")
}

fn is_comment(line: &str, language: &str) -> bool {
    if uses_hash_comments(language) {
        line.starts_with('#')
    } else {
        line.starts_with("//") || line.starts_with('*') || line.starts_with("/*")
    }
}

/// Text of the comment on this line, whole-line or trailing.
fn comment_text<'a>(line: &'a str, language: &str) -> Option<&'a str> {
    if is_comment(line, language) {
        return Some(line);
    }
    let marker = if uses_hash_comments(language) { " #" } else { " //" };
    line.find(marker).map(|idx| &line[idx..])
}

/// If line `i` opens an empty catch/except block, the 1-based line where it closes.
fn empty_handler_end(lines: &[&str], i: usize, language: &str) -> Option<usize> {
    let trimmed = lines[i].trim();

    if language == "python" {
        if !(trimmed.starts_with("except") && trimmed.ends_with(':')) {
            return None;
        }
        let (offset, next) = next_non_blank(lines, i + 1)?;
        return (next == "pass" || next == "...").then_some(offset + 1);
    }

    if !trimmed.contains("catch") {
        return None;
    }
    let compact: String = trimmed.split_whitespace().collect();
    if compact.ends_with("{}") {
        return Some(i + 1);
    }
    if compact.ends_with('{') {
        let (offset, next) = next_non_blank(lines, i + 1)?;
        if next == "}" || next.starts_with("} ") {
            return Some(offset + 1);
        }
    }
    None
}

fn next_non_blank<'a>(lines: &[&'a str], from: usize) -> Option<(usize, &'a str)> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .map(|(idx, line)| (idx, line.trim()))
        .find(|(_, line)| !line.is_empty())
}

fn nesting_level(line: &str, language: &str) -> usize {
    let expanded = line.replace('\t', "    ");
    let indent = expanded.len() - expanded.trim_start().len();
    if language == "python" || indent >= 4 {
        indent / 4
    } else {
        indent / 2
    }
}

/// Contiguous runs of lines nested deeper than the limit: (start, end, max depth).
fn deep_nesting_runs(lines: &[&str], language: &str) -> Vec<(u32, u32, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(u32, u32, usize)> = None;

    for (i, line) in lines.iter().enumerate() {
        let line_no = (i + 1) as u32;
        if line.trim().is_empty() {
            continue;
        }
        let depth = nesting_level(line, language);
        if depth > MAX_NESTING {
            current = match current {
                Some((start, _, max)) => Some((start, line_no, max.max(depth))),
                None => Some((line_no, line_no, depth)),
            };
        } else if let Some(run) = current.take() {
            runs.push(run);
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }
    runs
}
