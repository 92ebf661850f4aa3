//! Merge duplicate findings: same file, same category, overlapping lines.
//!
//! A static finding absorbs every LLM finding that overlaps it and keeps its
//! own location, category and severity. Findings from the same source collapse
//! to the most severe one.

use crate::models::issue::{Category, IssueRecord, Source};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub fn deduplicate(issues: Vec<IssueRecord>) -> Vec<IssueRecord> {
    let mut groups: BTreeMap<(String, Category), (Vec<IssueRecord>, Vec<IssueRecord>)> = BTreeMap::new();
    for issue in issues {
        let (statics, llms) = groups
            .entry((issue.file_path.clone(), issue.category))
            .or_default();
        match issue.source {
            Source::Static => statics.push(issue),
            Source::Llm => llms.push(issue),
        }
    }

    let mut merged = Vec::new();
    for (_, (statics, llms)) in groups {
        let statics = collapse_same_source(statics);
        let llms = collapse_same_source(llms);
        merged.extend(merge_cross_source(statics, llms));
    }

    merged.sort_by(report_order);
    merged
}

/// Report ordering: file path, then line start.
pub fn report_order(a: &IssueRecord, b: &IssueRecord) -> Ordering {
    a.file_path
        .cmp(&b.file_path)
        .then(a.line_range.start().cmp(&b.line_range.start()))
        .then(a.line_range.end().cmp(&b.line_range.end()))
        .then(a.category.cmp(&b.category))
        .then(b.severity.cmp(&a.severity))
        .then(a.message.cmp(&b.message))
}

/// One sweep in report order. Kept records never overlap each other, so only
/// the last kept record can overlap the next one.
fn collapse_same_source(mut records: Vec<IssueRecord>) -> Vec<IssueRecord> {
    records.sort_by(report_order);

    let mut kept: Vec<IssueRecord> = Vec::with_capacity(records.len());
    for record in records {
        match kept.last_mut() {
            // The earlier record wins ties.
            Some(last) if last.line_range.overlaps(&record.line_range) => {
                if outranks(&record, last) {
                    *last = record;
                }
            }
            _ => kept.push(record),
        }
    }
    kept
}

/// Strictly better: higher severity, then a larger line range.
fn outranks(a: &IssueRecord, b: &IssueRecord) -> bool {
    (a.severity, a.line_range.span()) > (b.severity, b.line_range.span())
}

fn merge_cross_source(statics: Vec<IssueRecord>, llms: Vec<IssueRecord>) -> Vec<IssueRecord> {
    let mut consumed = vec![false; llms.len()];
    let mut out = Vec::with_capacity(statics.len() + llms.len());

    for mut record in statics {
        for (index, llm) in llms.iter().enumerate() {
            if consumed[index] || !record.line_range.overlaps(&llm.line_range) {
                continue;
            }
            consumed[index] = true;
            record.message = format!("{} | {}", record.message, llm.message);
            if record.suggested_fix.is_none() {
                record.suggested_fix = llm.suggested_fix.clone();
            }
            record.confidence = 1.0;
            record.corroborated = true;
        }
        out.push(record);
    }

    out.extend(
        llms.into_iter()
            .zip(consumed)
            .filter(|(_, used)| !used)
            .map(|(llm, _)| llm),
    );
    out
}
