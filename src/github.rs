//! GitOps repository client
//!
//! Thin GitHub REST v3 client covering exactly the verbs the validation
//! scenarios drive: repository lifecycle, branches, the contents API with
//! SHA-based optimistic concurrency, and pull requests. Mutations raise
//! on failure; they never degrade into report problems.
//!
//! The base URL is injectable so tests run against a local mock server.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::poll::Lookup;

const CONFLICT_RETRIES: usize = 3;
const CONFLICT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base: Url,
    pub token: String,
    pub user_agent: String,
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_base: Url::parse("https://api.github.com")?,
            token: token.into(),
            user_agent: concat!("gitops-verify/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }
}

/// One file inside a repository, as the contents API reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl RepoFile {
    /// Decoded file content. The API wraps base64 across lines.
    pub fn decoded_content(&self) -> Option<Vec<u8>> {
        let raw: String = self
            .content
            .as_deref()?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        BASE64.decode(raw).ok()
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    commit: CommitSha,
}

#[derive(Debug, Deserialize)]
struct CommitSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RepoSummary {
    full_name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    items: Vec<RepoSummary>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
}

pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.config.api_base.join(path)?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", &self.config.user_agent))
    }

    /// Turn a non-success response into [`Error::GitHubApi`].
    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let message = response.text().await.unwrap_or_default();
        Err(Error::GitHubApi {
            status: status.as_u16(),
            url,
            message,
        })
    }

    /// Create a repository inside an organization. Returns nothing; the
    /// repo name is the caller's unique name.
    #[instrument(skip(self))]
    pub async fn create_org_repo(&self, org: &str, name: &str, private: bool) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("orgs/{org}/repos"))?
            .json(&json!({ "name": name, "private": private, "auto_init": true }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        info!(org, repo = name, "repository created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_repo(&self, owner: &str, repo: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("repos/{owner}/{repo}"))?
            .send()
            .await?;
        Self::ensure_success(response).await?;
        info!(owner, repo, "repository deleted");
        Ok(())
    }

    /// Delete a repository, tolerating it already being gone.
    pub async fn delete_repo_if_exists(&self, owner: &str, repo: &str) -> Result<bool> {
        match self.delete_repo(owner, repo).await {
            Ok(()) => Ok(true),
            Err(Error::GitHubApi { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn set_topics(&self, owner: &str, repo: &str, topics: &[String]) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("repos/{owner}/{repo}/topics"))?
            .json(&json!({ "names": topics }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    pub async fn list_topics(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Topics {
            names: Vec<String>,
        }
        let response = self
            .request(Method::GET, &format!("repos/{owner}/{repo}/topics"))?
            .send()
            .await?;
        let topics: Topics = Self::ensure_success(response).await?.json().await?;
        Ok(topics.names)
    }

    /// Full names (`owner/repo`) of org repositories carrying `topic`,
    /// restricted to repos older than `min_age` so a sweep never deletes
    /// a repository another in-flight run just created.
    #[instrument(skip(self))]
    pub async fn repos_by_topic(
        &self,
        org: &str,
        topic: &str,
        min_age: chrono::Duration,
    ) -> Result<Vec<String>> {
        let response = self
            .request(Method::GET, "search/repositories")?
            .query(&[("q", format!("org:{org} topic:{topic}"))])
            .send()
            .await?;
        let results: SearchResults = Self::ensure_success(response).await?.json().await?;

        let cutoff = Utc::now() - min_age;
        Ok(results
            .items
            .into_iter()
            .filter(|repo| repo.created_at <= cutoff)
            .map(|repo| repo.full_name)
            .collect())
    }

    /// Latest commit SHA of a branch head.
    pub async fn branch_head_sha(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let response = self
            .request(
                Method::GET,
                &format!("repos/{owner}/{repo}/git/ref/heads/{branch}"),
            )?
            .send()
            .await?;
        let git_ref: GitRef = Self::ensure_success(response).await?.json().await?;
        Ok(git_ref.object.sha)
    }

    /// Create `branch` pointing at the current head of `from_branch`.
    #[instrument(skip(self))]
    pub async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        from_branch: &str,
    ) -> Result<String> {
        let sha = self.branch_head_sha(owner, repo, from_branch).await?;
        let response = self
            .request(Method::POST, &format!("repos/{owner}/{repo}/git/refs"))?
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        info!(owner, repo, branch, from_branch, "branch created");
        Ok(sha)
    }

    /// Fetch one file's metadata (and content) from a branch.
    pub async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Lookup<RepoFile>> {
        let response = self
            .request(Method::GET, &format!("repos/{owner}/{repo}/contents/{path}"))?
            .query(&[("ref", branch)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        let file: RepoFile = Self::ensure_success(response).await?.json().await?;
        Ok(Lookup::Found(file))
    }

    /// List a directory's entries. `NotFound` covers a path that does not
    /// exist on the branch.
    pub async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Lookup<Vec<RepoFile>>> {
        let response = self
            .request(Method::GET, &format!("repos/{owner}/{repo}/contents/{path}"))?
            .query(&[("ref", branch)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        let entries: Vec<RepoFile> = Self::ensure_success(response).await?.json().await?;
        Ok(Lookup::Found(entries))
    }

    /// Create or update one file and return the new commit SHA.
    ///
    /// The contents API demands the current blob SHA when updating; a
    /// concurrent writer invalidates ours and the API answers 409 (or 422
    /// with a SHA mismatch). On conflict the current SHA is re-fetched
    /// and the write retried a bounded number of times.
    #[instrument(skip(self, content))]
    pub async fn create_or_update_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
        message: &str,
        content: &[u8],
    ) -> Result<String> {
        let encoded = BASE64.encode(content);

        for attempt in 0..=CONFLICT_RETRIES {
            let sha = match self.get_file(owner, repo, path, branch).await? {
                Lookup::Found(file) => Some(file.sha),
                Lookup::NotFound => None,
            };

            let mut body = json!({
                "message": message,
                "content": encoded,
                "branch": branch,
            });
            if let Some(sha) = &sha {
                body["sha"] = json!(sha);
            }

            let response = self
                .request(Method::PUT, &format!("repos/{owner}/{repo}/contents/{path}"))?
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if is_sha_conflict(status) && attempt < CONFLICT_RETRIES {
                warn!(path, attempt, "SHA conflict writing file, re-fetching");
                tokio::time::sleep(CONFLICT_BACKOFF).await;
                continue;
            }

            let committed: CommitResponse = Self::ensure_success(response).await?.json().await?;
            debug!(path, sha = %committed.commit.sha, "file committed");
            return Ok(committed.commit.sha);
        }
        unreachable!("loop returns on the final attempt");
    }

    /// Delete one file if present. Returns the commit SHA of the deletion,
    /// or `None` when the file did not exist.
    #[instrument(skip(self))]
    pub async fn delete_file_if_exists(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
        message: &str,
    ) -> Result<Option<String>> {
        for attempt in 0..=CONFLICT_RETRIES {
            let sha = match self.get_file(owner, repo, path, branch).await? {
                Lookup::Found(file) => file.sha,
                Lookup::NotFound => return Ok(None),
            };

            let response = self
                .request(
                    Method::DELETE,
                    &format!("repos/{owner}/{repo}/contents/{path}"),
                )?
                .json(&json!({ "message": message, "sha": sha, "branch": branch }))
                .send()
                .await?;

            let status = response.status();
            if is_sha_conflict(status) && attempt < CONFLICT_RETRIES {
                warn!(path, attempt, "SHA conflict deleting file, re-fetching");
                tokio::time::sleep(CONFLICT_BACKOFF).await;
                continue;
            }

            let committed: CommitResponse = Self::ensure_success(response).await?.json().await?;
            return Ok(Some(committed.commit.sha));
        }
        unreachable!("loop returns on the final attempt");
    }

    /// Delete every file under `path` on `branch` and return how many
    /// files were removed.
    ///
    /// The traversal is an explicit worklist of directories rather than
    /// recursion, so arbitrarily deep trees cannot exhaust the stack.
    #[instrument(skip(self))]
    pub async fn delete_directory_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
        message: &str,
    ) -> Result<usize> {
        let mut deleted = 0;
        let mut worklist = vec![path.to_string()];

        while let Some(dir) = worklist.pop() {
            let entries = match self.list_directory(owner, repo, &dir, branch).await? {
                Lookup::Found(entries) => entries,
                Lookup::NotFound => continue,
            };

            for entry in entries {
                if entry.kind == "dir" {
                    worklist.push(entry.path);
                } else if self
                    .delete_file_if_exists(owner, repo, &entry.path, branch, message)
                    .await?
                    .is_some()
                {
                    deleted += 1;
                }
            }
        }

        info!(path, deleted, "directory contents deleted");
        Ok(deleted)
    }

    /// Open a pull request and return its number.
    #[instrument(skip(self))]
    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
    ) -> Result<u64> {
        let response = self
            .request(Method::POST, &format!("repos/{owner}/{repo}/pulls"))?
            .json(&json!({ "title": title, "head": head, "base": base }))
            .send()
            .await?;
        let pr: PullRequest = Self::ensure_success(response).await?.json().await?;
        info!(owner, repo, number = pr.number, "pull request opened");
        Ok(pr.number)
    }

    pub async fn close_pull_request(&self, owner: &str, repo: &str, number: u64) -> Result<()> {
        let response = self
            .request(Method::PATCH, &format!("repos/{owner}/{repo}/pulls/{number}"))?
            .json(&json!({ "state": "closed" }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Merge a pull request and return the merge commit SHA.
    #[instrument(skip(self))]
    pub async fn merge_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct MergeResult {
            sha: String,
        }
        let response = self
            .request(
                Method::PUT,
                &format!("repos/{owner}/{repo}/pulls/{number}/merge"),
            )?
            .send()
            .await?;
        let merged: MergeResult = Self::ensure_success(response).await?.json().await?;
        info!(owner, repo, number, sha = %merged.sha, "pull request merged");
        Ok(merged.sha)
    }
}

fn is_sha_conflict(status: StatusCode) -> bool {
    status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY
}
