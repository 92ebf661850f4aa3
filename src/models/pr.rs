use crate::error::ParsePrError;
use crate::models::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrIdentifier {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PrIdentifier {
    pub fn new(owner: &str, repo: &str, number: u64) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        }
    }

    /// `owner/repo`
    pub fn full_repo(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Filesystem-safe key used for report directories and feedback logs.
    pub fn storage_key(&self) -> String {
        format!("{}_{}_{}", sanitize(&self.owner), sanitize(&self.repo), self.number)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect()
}

impl fmt::Display for PrIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl FromStr for PrIdentifier {
    type Err = ParsePrError;

    /// Accepts `owner/repo#12`, `owner/repo/pull/12` and full GitHub PR URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePrError(s.to_string());
        let trimmed = s
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("github.com/")
            .trim_end_matches('/');

        let (repo_part, number) = if let Some((repo_part, number)) = trimmed.rsplit_once('#') {
            (repo_part, number)
        } else if let Some((repo_part, number)) = trimmed.rsplit_once("/pull/") {
            (repo_part, number)
        } else {
            return Err(err());
        };

        let (owner, repo) = repo_part.split_once('/').ok_or_else(err)?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(err());
        }
        let number = number.parse::<u64>().map_err(|_| err())?;
        Ok(PrIdentifier::new(owner, repo, number))
    }
}

/// One changed file as handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFile {
    pub file_path: String,
    pub file_text: String,
    #[serde(default)]
    pub diff: String,
}

impl PrFile {
    pub fn new(file_path: &str, file_text: &str, diff: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            file_text: file_text.to_string(),
            diff: diff.to_string(),
        }
    }
}

/// Which changed files a source hands to the pipeline.
#[derive(Debug, Clone)]
pub struct FileFilter {
    supported_extensions: Vec<String>,
    exclude: Vec<glob::Pattern>,
    max_file_changes: u64,
}

impl FileFilter {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let exclude = config
            .exclude
            .iter()
            .filter_map(|pattern| match glob::Pattern::new(pattern) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    log::warn!("ignoring invalid exclude pattern '{pattern}': {e}");
                    None
                }
            })
            .collect();
        Self {
            supported_extensions: config.supported_extensions.clone(),
            exclude,
            max_file_changes: config.max_file_changes,
        }
    }

    /// Reason the file is skipped, or `None` when it should be analyzed.
    pub fn rejection(&self, file_path: &str, changes: u64) -> Option<String> {
        let ext = std::path::Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if self.supported_extensions.iter().any(|s| *s == ext) => {}
            _ => return Some("unsupported extension".to_string()),
        }
        if self.exclude.iter().any(|p| p.matches(file_path)) {
            return Some("excluded by pattern".to_string());
        }
        if changes > self.max_file_changes {
            return Some(format!("{changes} changed lines exceeds {}", self.max_file_changes));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_url_forms() {
        let expected = PrIdentifier::new("acme", "api", 42);
        assert_eq!("acme/api#42".parse::<PrIdentifier>().unwrap(), expected);
        assert_eq!(
            "https://github.com/acme/api/pull/42".parse::<PrIdentifier>().unwrap(),
            expected
        );
        assert_eq!("acme/api/pull/42/".parse::<PrIdentifier>().unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!("acme#42".parse::<PrIdentifier>().is_err());
        assert!("acme/api#forty".parse::<PrIdentifier>().is_err());
        assert!("acme/api".parse::<PrIdentifier>().is_err());
    }

    #[test]
    fn storage_key_is_path_safe() {
        let pr = PrIdentifier::new("my org", "api", 7);
        assert_eq!(pr.storage_key(), "my-org_api_7");
        assert_eq!(pr.to_string(), "my org/api#7");
    }

    #[test]
    fn filter_applies_extension_exclude_and_size_rules() {
        let config = PipelineConfig {
            exclude: vec!["vendor/**".to_string()],
            max_file_changes: 50,
            ..PipelineConfig::default()
        };
        let filter = FileFilter::from_config(&config);
        assert_eq!(filter.rejection("src/app.PY", 10), None);
        assert!(filter.rejection("README.md", 1).is_some());
        assert!(filter.rejection("vendor/lib/x.js", 1).is_some());
        assert!(filter.rejection("src/big.ts", 51).is_some());
    }
}
