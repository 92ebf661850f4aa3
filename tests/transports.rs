mod common;

use common::{Route, TestServer};
use reviewlens_lib::analysis::llm::{CompletionClient, CompletionRequest, LlmAnalyzer, OpenAiClient};
use reviewlens_lib::commands::github::GitHubClient;
use reviewlens_lib::commands::pipeline;
use reviewlens_lib::commands::settings::save_settings_to_disk;
use reviewlens_lib::error::{AnalysisCondition, FetchError, LlmError, PipelineError};
use reviewlens_lib::models::config::PipelineConfig;
use reviewlens_lib::models::pr::{FileFilter, PrFile, PrIdentifier};
use reviewlens_lib::models::report::AdapterStatus;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

const APP_PY: &str = "def handler(request):\n    # TODO validate input\n    return request.body\n";

fn pr() -> PrIdentifier {
    PrIdentifier::new("acme", "api", 7)
}

fn pull_request_routes() -> Vec<Route> {
    vec![
        Route::json("/repos/acme/api/pulls/7", 200, json!({ "number": 7, "head": { "sha": "4f2c9e1b7d" } })),
        Route::json(
            "/repos/acme/api/pulls/7/files",
            200,
            json!([
                { "filename": "src/app.py", "status": "modified", "changes": 2, "patch": "@@ -1,2 +1,3 @@\n def handler(request):\n+    # TODO validate input\n     return request.body" },
                { "filename": "src/old.py", "status": "removed", "changes": 10, "patch": "@@ -1 +0,0 @@\n-x = 1" },
                { "filename": "docs/logo.png", "status": "added", "changes": 0 },
                { "filename": "README.md", "status": "modified", "changes": 1, "patch": "@@ -1 +1 @@\n-a\n+b" },
                { "filename": "vendor/dep.js", "status": "added", "changes": 3, "patch": "@@ -0,0 +1 @@\n+var a;" }
            ]),
        ),
        Route::text("/repos/acme/api/contents/src/app.py", 200, APP_PY),
        Route::text("/repos/acme/api/contents/vendor/dep.js", 200, "var a;\n"),
    ]
}

#[tokio::test]
async fn github_client_fetches_filtered_files_at_head() {
    let server = TestServer::start(pull_request_routes()).await;
    let client = GitHubClient::new(&server.base_url, Some("ghp_test".to_string())).expect("build client");
    let config = PipelineConfig {
        exclude: vec!["vendor/**".to_string()],
        ..PipelineConfig::default()
    };

    let files = client
        .fetch_pr_files(&pr(), &FileFilter::from_config(&config))
        .await
        .expect("fetch files");

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_path, "src/app.py");
    assert_eq!(files[0].file_text, APP_PY);
    assert!(files[0].diff.contains("+    # TODO validate input"));

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| r.headers.get("authorization").map(String::as_str) == Some("Bearer ghp_test")));
    let files_request = requests
        .iter()
        .find(|r| r.target.starts_with("/repos/acme/api/pulls/7/files"))
        .expect("files listing requested");
    assert!(files_request.target.contains("per_page=100"));
    let contents_request = requests
        .iter()
        .find(|r| r.target.starts_with("/repos/acme/api/contents/"))
        .expect("contents requested");
    assert_eq!(contents_request.target, "/repos/acme/api/contents/src/app.py?ref=4f2c9e1b7d");
    assert_eq!(
        contents_request.headers.get("accept").map(String::as_str),
        Some("application/vnd.github.raw+json")
    );
}

#[tokio::test]
async fn github_errors_are_classified() {
    let server = TestServer::start(vec![
        Route::json("/repos/acme/api/pulls/1", 401, json!({ "message": "Bad credentials" })),
        Route::json("/repos/acme/api/pulls/2", 403, json!({ "message": "API rate limit exceeded" }))
            .with_header("x-ratelimit-remaining", "0"),
        Route::json("/repos/acme/api/pulls/3", 500, json!({ "message": "boom" })),
    ])
    .await;
    let client = GitHubClient::new(&server.base_url, None).expect("build client");
    let filter = FileFilter::from_config(&PipelineConfig::default());

    let fetch = |number| {
        let client = &client;
        let filter = &filter;
        async move { client.fetch_pr_files(&PrIdentifier::new("acme", "api", number), filter).await }
    };

    assert!(matches!(fetch(1).await, Err(FetchError::Auth(401))));
    assert!(matches!(fetch(2).await, Err(FetchError::RateLimited)));
    assert!(matches!(fetch(3).await, Err(FetchError::Status { status: 500, .. })));
    assert!(matches!(fetch(4).await, Err(FetchError::NotFound(_))));

    // No token configured: no authorization header is sent.
    assert!(server.requests().iter().all(|r| !r.headers.contains_key("authorization")));
}

#[tokio::test]
async fn fetch_failure_aborts_the_run() {
    let server = TestServer::start(Vec::new()).await;
    let data_dir = tempdir().expect("create temp dir");
    save_settings_to_disk(
        data_dir.path(),
        json!({ "llmEnabled": false, "githubApiUrl": server.base_url }),
    )
    .expect("save settings");

    let result = pipeline::analyze_pull_request(data_dir.path(), &pr(), |_| {}).await;

    assert!(matches!(result, Err(PipelineError::FatalFetch(FetchError::NotFound(_)))));
    assert!(!data_dir.path().join("reports").exists());
}

#[tokio::test]
async fn pull_request_run_fetches_analyzes_and_stores() {
    let server = TestServer::start(pull_request_routes()).await;
    let data_dir = tempdir().expect("create temp dir");
    save_settings_to_disk(
        data_dir.path(),
        json!({
            "llmEnabled": false,
            "githubApiUrl": server.base_url,
            "linters": { "pylint": { "enabled": false }, "flake8": { "enabled": false }, "eslint": { "enabled": false } }
        }),
    )
    .expect("save settings");

    let report = pipeline::analyze_pull_request(data_dir.path(), &pr(), |_| {})
        .await
        .expect("analyze pull request");

    // vendor/dep.js passes the default filter; its code has no built-in findings.
    assert_eq!(report.diagnostics.len(), 2);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].file_path, "src/app.py");
    assert_eq!(report.issues[0].rule.as_deref(), Some("todo-comment"));
    assert_eq!(report.total_score, 1.0);
}

fn completion_request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-4o-mini".to_string(),
        system: "You answer with JSON only.".to_string(),
        user: "File: a.py\n".to_string(),
        temperature: 0.1,
        max_tokens: 256,
    }
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }]
    })
}

#[tokio::test]
async fn openai_client_posts_chat_completion_and_returns_content() {
    let server = TestServer::start(vec![Route::json(
        "/v1/chat/completions",
        200,
        chat_reply("{\"issues\": []}"),
    )])
    .await;
    let client = OpenAiClient::new(&format!("{}/v1/", server.base_url), "sk-test").expect("build client");

    let reply = client.complete(&completion_request()).await.expect("completion");
    assert_eq!(reply, "{\"issues\": []}");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].headers.get("authorization").map(String::as_str), Some("Bearer sk-test"));
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("JSON request body");
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "File: a.py\n");
}

#[tokio::test]
async fn openai_client_maps_http_failures() {
    let server = TestServer::start(vec![
        Route::json("/auth/chat/completions", 401, json!({ "error": "invalid key" })),
        Route::json("/busy/chat/completions", 429, json!({ "error": "slow down" })),
        Route::text("/down/chat/completions", 503, "upstream unavailable"),
        Route::json("/odd/chat/completions", 200, json!({ "choices": [] })),
    ])
    .await;
    let complete = |prefix: &'static str| {
        let base = format!("{}/{prefix}", server.base_url);
        async move {
            OpenAiClient::new(&base, "sk-test")
                .expect("build client")
                .complete(&completion_request())
                .await
        }
    };

    assert_eq!(complete("auth").await, Err(LlmError::Auth(401)));
    assert_eq!(complete("busy").await, Err(LlmError::RateLimited));
    assert_eq!(
        complete("down").await,
        Err(LlmError::Api {
            status: 503,
            body: "upstream unavailable".to_string()
        })
    );
    assert!(matches!(complete("odd").await, Err(LlmError::Envelope(_))));
}

#[test]
fn openai_client_requires_a_key() {
    assert!(matches!(
        OpenAiClient::new("http://localhost", "  "),
        Err(LlmError::MissingApiKey)
    ));
}

#[tokio::test]
async fn retries_server_errors_then_reports_unavailable() {
    let server = TestServer::start(vec![Route::text("/v1/chat/completions", 502, "bad gateway")]).await;
    let client = OpenAiClient::new(&format!("{}/v1", server.base_url), "sk-test").expect("build client");
    let config = PipelineConfig {
        llm_enabled: true,
        llm_retry_count: 2,
        llm_retry_backoff_ms: 1,
        ..PipelineConfig::offline()
    };
    let analyzer = LlmAnalyzer::new(&config, Some(Arc::new(client) as Arc<dyn CompletionClient>));

    let outcome = analyzer
        .analyze(&PrFile::new("a.py", "x = 1\n", ""), "pull request acme/api#7")
        .await;

    assert_eq!(outcome.status, AdapterStatus::Unavailable);
    assert!(outcome.issues.is_empty());
    assert!(matches!(
        outcome.conditions[0],
        AnalysisCondition::LlmUnavailable { attempts: 3, .. }
    ));
    assert_eq!(server.requests().len(), 3);
}
