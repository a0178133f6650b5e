//! Git-host REST client: list tree / get file / create ref / update file /
//! create PR / add reviewers / add labels, against `api.github.com` with
//! bearer auth, a pinned API version header, and a required user agent.
//! Retries failed calls with a linear backoff, honoring rate-limit headers.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use retry::OperationResult;
use retry::delay::Fixed;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::gitops::errors::GitOpsError;

const GITHUB_API_BASE: &str = "https://api.github.com";
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub is_blob: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// Capability surface a GitOps engine run needs from a source-control
/// host. Kept as a trait so a non-GitHub implementation (GitLab, Bitbucket)
/// could be added without touching the engine.
pub trait GitHostClient: Send + Sync {
    fn default_branch(&self, repository: &str) -> Result<String, GitOpsError>;
    fn list_tree(&self, repository: &str, branch: &str) -> Result<Vec<TreeEntry>, GitOpsError>;
    fn get_file_content(&self, repository: &str, branch: &str, path: &str) -> Result<String, GitOpsError>;
    fn create_branch(&self, repository: &str, new_branch: &str, from_branch: &str) -> Result<(), GitOpsError>;
    fn update_file(
        &self,
        repository: &str,
        branch: &str,
        path: &str,
        new_content: &str,
        commit_message: &str,
    ) -> Result<(), GitOpsError>;
    fn create_pull_request(
        &self,
        repository: &str,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
        draft: bool,
    ) -> Result<PullRequestRef, GitOpsError>;
    fn add_reviewers(&self, repository: &str, pr_number: u64, reviewers: &[String]) -> Result<(), GitOpsError>;
    fn add_labels(&self, repository: &str, pr_number: u64, labels: &[String]) -> Result<(), GitOpsError>;
}

pub struct GitHubClient {
    http_client: reqwest::blocking::Client,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self, GitOpsError> {
        use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| GitOpsError::CannotInstantiateClient(err.to_string()))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let http_client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent("privateer")
            .build()
            .map_err(|err| GitOpsError::CannotInstantiateClient(err.to_string()))?;

        Ok(Self { http_client })
    }

    /// Sends `build_request` up to `MAX_ATTEMPTS` times with a linear
    /// backoff, honoring `X-RateLimit-Remaining: 0` by waiting for the
    /// window to reset and retrying once more.
    fn send_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, GitOpsError> {
        let result = retry::retry(Fixed::from_millis(500).take(MAX_ATTEMPTS), || {
            let response = build_request(&self.http_client).send();
            match response {
                Ok(response) if response.status().is_success() => OperationResult::Ok(response),
                Ok(response) if is_rate_limited(&response) => {
                    let wait = rate_limit_reset_wait(&response);
                    warn!(seconds = wait.as_secs(), "rate limited, waiting before retry");
                    std::thread::sleep(wait);
                    OperationResult::Retry(format!("rate limited: {}", response.status()))
                }
                Ok(response) => OperationResult::Err(format!("unexpected status {}", response.status())),
                Err(err) => OperationResult::Retry(err.to_string()),
            }
        });

        result.map_err(|err| GitOpsError::Transport(err.error))
    }
}

fn is_rate_limited(response: &reqwest::blocking::Response) -> bool {
    response
        .headers()
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(false)
}

fn rate_limit_reset_wait(response: &reqwest::blocking::Response) -> Duration {
    response
        .headers()
        .get("X-RateLimit-Reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|reset_epoch| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            Duration::from_secs(reset_epoch.saturating_sub(now).min(60))
        })
        .unwrap_or(Duration::from_secs(5))
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    object: RefObjectSha,
}

#[derive(Debug, Deserialize)]
struct RefObjectSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeResponseEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeResponseEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
}

impl GitHostClient for GitHubClient {
    fn default_branch(&self, repository: &str) -> Result<String, GitOpsError> {
        let url = format!("{GITHUB_API_BASE}/repos/{repository}");
        let response = self.send_with_retry(|client| client.get(&url))?;
        let repo: RepoInfo = response.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;
        Ok(repo.default_branch)
    }

    fn list_tree(&self, repository: &str, branch: &str) -> Result<Vec<TreeEntry>, GitOpsError> {
        let ref_url = format!("{GITHUB_API_BASE}/repos/{repository}/git/ref/heads/{branch}");
        let ref_response = self.send_with_retry(|client| client.get(&ref_url))?;
        let head: RefObject = ref_response.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;

        let tree_url = format!("{GITHUB_API_BASE}/repos/{repository}/git/trees/{}?recursive=1", head.object.sha);
        let tree_response = self.send_with_retry(|client| client.get(&tree_url))?;
        let tree: TreeResponse = tree_response.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;

        Ok(tree
            .tree
            .into_iter()
            .map(|entry| TreeEntry {
                path: entry.path,
                is_blob: entry.entry_type == "blob",
            })
            .collect())
    }

    fn get_file_content(&self, repository: &str, branch: &str, path: &str) -> Result<String, GitOpsError> {
        let url = format!("{GITHUB_API_BASE}/repos/{repository}/contents/{path}?ref={branch}");
        let response = self.send_with_retry(|client| client.get(&url))?;
        let content: ContentResponse = response.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;
        let cleaned: String = content.content.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = BASE64.decode(cleaned).map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;
        String::from_utf8(decoded).map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))
    }

    fn create_branch(&self, repository: &str, new_branch: &str, from_branch: &str) -> Result<(), GitOpsError> {
        let ref_url = format!("{GITHUB_API_BASE}/repos/{repository}/git/ref/heads/{from_branch}");
        let ref_response = self.send_with_retry(|client| client.get(&ref_url))?;
        let head: RefObject = ref_response.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;

        let create_url = format!("{GITHUB_API_BASE}/repos/{repository}/git/refs");
        let body = json!({ "ref": format!("refs/heads/{new_branch}"), "sha": head.object.sha });
        let result = self.send_with_retry(|client| client.post(&create_url).json(&body));

        match result {
            Ok(_) => Ok(()),
            // The branch already existing is a success, not a failure: a
            // rerun against a branch name chosen for this run should reuse it.
            Err(GitOpsError::Transport(msg)) if msg.contains("422") => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn update_file(
        &self,
        repository: &str,
        branch: &str,
        path: &str,
        new_content: &str,
        commit_message: &str,
    ) -> Result<(), GitOpsError> {
        let get_url = format!("{GITHUB_API_BASE}/repos/{repository}/contents/{path}?ref={branch}");
        let existing = self.send_with_retry(|client| client.get(&get_url))?;
        #[derive(Deserialize)]
        struct ExistingFile {
            sha: String,
        }
        let existing: ExistingFile = existing.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;

        let put_url = format!("{GITHUB_API_BASE}/repos/{repository}/contents/{path}");
        let body = json!({
            "message": commit_message,
            "content": BASE64.encode(new_content.as_bytes()),
            "sha": existing.sha,
            "branch": branch,
        });

        self.send_with_retry(|client| client.put(&put_url).json(&body))?;
        Ok(())
    }

    fn create_pull_request(
        &self,
        repository: &str,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body_text: &str,
        draft: bool,
    ) -> Result<PullRequestRef, GitOpsError> {
        let url = format!("{GITHUB_API_BASE}/repos/{repository}/pulls");
        let body = json!({
            "title": title,
            "head": head_branch,
            "base": base_branch,
            "body": body_text,
            "draft": draft,
        });

        let response = self.send_with_retry(|client| client.post(&url).json(&body))?;
        let pr: PullRequestResponse = response.json().map_err(|err| GitOpsError::UnexpectedResponse(err.to_string()))?;
        info!(repository, number = pr.number, "opened pull request");
        Ok(PullRequestRef { number: pr.number, url: pr.html_url })
    }

    fn add_reviewers(&self, repository: &str, pr_number: u64, reviewers: &[String]) -> Result<(), GitOpsError> {
        if reviewers.is_empty() {
            return Ok(());
        }
        let url = format!("{GITHUB_API_BASE}/repos/{repository}/pulls/{pr_number}/requested_reviewers");
        let body = json!({ "reviewers": reviewers });
        self.send_with_retry(|client| client.post(&url).json(&body))?;
        Ok(())
    }

    fn add_labels(&self, repository: &str, pr_number: u64, labels: &[String]) -> Result<(), GitOpsError> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = format!("{GITHUB_API_BASE}/repos/{repository}/issues/{pr_number}/labels");
        let body = json!({ "labels": labels });
        self.send_with_retry(|client| client.post(&url).json(&body))?;
        Ok(())
    }
}
