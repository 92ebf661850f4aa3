//! GitHub REST client: the changed files of a pull request at its head commit.

use crate::error::FetchError;
use crate::models::config::PipelineConfig;
use crate::models::pr::{FileFilter, PrFile, PrIdentifier};
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const PER_PAGE: usize = 100;
/// GitHub stops listing pull request files after 3000 entries.
const MAX_PAGES: usize = 30;

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ChangedFile {
    filename: String,
    status: String,
    #[serde(default)]
    changes: u64,
    #[serde(default)]
    patch: Option<String>,
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        let http = reqwest::Client::builder()
            .user_agent(concat!("reviewlens/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Client authenticated with `GITHUB_TOKEN` when it is set.
    pub fn from_env(config: &PipelineConfig) -> Result<Self, FetchError> {
        Self::new(&config.github_api_url, std::env::var("GITHUB_TOKEN").ok())
    }

    pub async fn fetch_pr_files(&self, pr: &PrIdentifier, filter: &FileFilter) -> Result<Vec<PrFile>, FetchError> {
        let base = format!("{}/repos/{}/{}/pulls/{}", self.api_url, pr.owner, pr.repo, pr.number);
        let pull: PullRequest = self.get_json(&base).await?;
        let head_sha = pull.head.sha;

        let mut changed = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<ChangedFile> = self
                .get_json(&format!("{base}/files?per_page={PER_PAGE}&page={page}"))
                .await?;
            let last = batch.len() < PER_PAGE;
            changed.extend(batch);
            if last {
                break;
            }
        }

        let mut files = Vec::new();
        for file in changed {
            if file.status == "removed" {
                debug!("skipping {}: removed", file.filename);
                continue;
            }
            let Some(patch) = file.patch else {
                debug!("skipping {}: no textual patch", file.filename);
                continue;
            };
            if let Some(reason) = filter.rejection(&file.filename, file.changes) {
                debug!("skipping {}: {reason}", file.filename);
                continue;
            }
            let text = self.fetch_contents(pr, &file.filename, &head_sha).await?;
            files.push(PrFile::new(&file.filename, &text, &patch));
        }

        info!("fetched {} file(s) from {pr} at {}", files.len(), short_sha(&head_sha));
        Ok(files)
    }

    async fn fetch_contents(&self, pr: &PrIdentifier, path: &str, sha: &str) -> Result<String, FetchError> {
        let mut url = Url::parse(&format!("{}/repos/{}/{}/contents", self.api_url, pr.owner, pr.repo))
            .map_err(|e| FetchError::Transport(format!("invalid API url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport("API url cannot carry a path".to_string()))?
            .extend(path.split('/'));
        url.query_pairs_mut().append_pair("ref", sha);

        let response = self
            .request(url.as_str())
            .header(ACCEPT, "application/vnd.github.raw+json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let response = check_status(response, url.as_str())?;
        response.text().await.map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .request(url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let response = check_status(response, url)?;
        response.json().await.map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.get(url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let quota_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
        StatusCode::FORBIDDEN if quota_exhausted => FetchError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(status.as_u16()),
        StatusCode::NOT_FOUND => FetchError::NotFound(url.to_string()),
        _ => FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        },
    })
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
