//! Weighted technical-debt score.
//!
//! `category_scores[c]` sums the severity weights of the issues in `c`;
//! `total_score` is the category-weighted sum of those. No normalization.

use crate::models::config::PipelineConfig;
use crate::models::issue::{Category, IssueRecord};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct DebtScore {
    pub category_scores: BTreeMap<Category, f64>,
    pub total_score: f64,
}

pub fn category_scores(issues: &[IssueRecord], config: &PipelineConfig) -> BTreeMap<Category, f64> {
    let mut scores: BTreeMap<Category, f64> = Category::ALL.iter().map(|c| (*c, 0.0)).collect();
    for issue in issues {
        *scores.entry(issue.category).or_insert(0.0) += config.severity_weight(issue.severity);
    }
    scores
}

pub fn total_score(category_scores: &BTreeMap<Category, f64>, config: &PipelineConfig) -> f64 {
    category_scores
        .iter()
        .map(|(category, score)| config.category_weight(*category) * score)
        .sum()
}

pub fn score(issues: &[IssueRecord], config: &PipelineConfig) -> DebtScore {
    let category_scores = category_scores(issues, config);
    let total_score = total_score(&category_scores, config);
    DebtScore {
        category_scores,
        total_score,
    }
}
