//! Local repository source: the files changed between two revisions, read
//! from the head tree, with their unified diffs.

use crate::error::FetchError;
use crate::models::pr::{FileFilter, PrFile};
use git2::{Delta, DiffOptions, Patch, Repository, Tree};
use log::{debug, info};
use std::path::Path;

pub fn local_pr_files(repo_path: &Path, base: &str, head: &str, filter: &FileFilter) -> Result<Vec<PrFile>, FetchError> {
    let repo = Repository::open(repo_path)?;
    let base_tree = resolve_tree(&repo, base)?;
    let head_tree = resolve_tree(&repo, head)?;

    let mut options = DiffOptions::new();
    options.context_lines(3);
    let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut options))?;

    let mut files = Vec::new();
    for (index, delta) in diff.deltas().enumerate() {
        if matches!(delta.status(), Delta::Deleted) {
            continue;
        }
        let Some(path) = delta.new_file().path().and_then(|p| p.to_str()).map(str::to_string) else {
            continue;
        };
        if delta.new_file().is_binary() {
            debug!("skipping {path}: binary");
            continue;
        }

        let Some(mut patch) = Patch::from_diff(&diff, index)? else {
            continue;
        };
        let (_, additions, deletions) = patch.line_stats()?;
        if let Some(reason) = filter.rejection(&path, (additions + deletions) as u64) {
            debug!("skipping {path}: {reason}");
            continue;
        }

        let buf = patch.to_buf()?;
        let Some(diff_text) = buf.as_str() else {
            debug!("skipping {path}: diff is not UTF-8");
            continue;
        };

        let blob = head_tree.get_path(Path::new(&path))?.to_object(&repo)?.peel_to_blob()?;
        let Ok(text) = std::str::from_utf8(blob.content()) else {
            debug!("skipping {path}: not UTF-8");
            continue;
        };

        files.push(PrFile::new(&path, text, diff_text));
    }

    info!("collected {} changed file(s) between {base} and {head}", files.len());
    Ok(files)
}

fn resolve_tree<'r>(repo: &'r Repository, spec: &str) -> Result<Tree<'r>, FetchError> {
    Ok(repo.revparse_single(spec)?.peel_to_tree()?)
}
