//! The dashboard's two IPC commands.

use crate::commands::pipeline;
use crate::models::feedback::{FeedbackEntry, FeedbackOutcome};
use crate::models::pr::{PrFile, PrIdentifier};
use crate::models::report::{AnalysisProgress, DebtReport};
use std::path::PathBuf;
use tauri::Emitter;

pub struct AppState {
    pub data_dir: PathBuf,
}

/// Analyze `files` for the pull request, or fetch them from GitHub when none are given.
#[tauri::command]
pub async fn analyze(
    pr_identifier: String,
    files: Option<Vec<PrFile>>,
    state: tauri::State<'_, AppState>,
    app: tauri::AppHandle,
) -> Result<DebtReport, String> {
    let pr: PrIdentifier = pr_identifier.parse().map_err(|e| format!("{e}"))?;
    let emit = |progress: AnalysisProgress| {
        let _ = app.emit("analysis_progress", progress);
    };

    let result = match files {
        Some(files) => pipeline::analyze_internal(&state.data_dir, &pr, files, emit).await,
        None => pipeline::analyze_pull_request(&state.data_dir, &pr, emit).await,
    };
    result.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn submit_feedback(entry: FeedbackEntry, state: tauri::State<'_, AppState>) -> Result<FeedbackOutcome, String> {
    Ok(pipeline::submit_feedback(&state.data_dir, &entry))
}
