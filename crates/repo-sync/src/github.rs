//! GitHub REST implementation of [`RepositoryRemote`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::{PutFile, RemoteFile, RepoInfo, RepositoryRemote};

/// Public GitHub API
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Fallback wait when GitHub rate-limits without saying for how long
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct CommitContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: CommitContent,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

/// GitHub client scoped to one owner (organization).
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: Url,
    owner: String,
    token: String,
}

impl GitHubClient {
    /// Create a client for `owner`'s repositories.
    pub fn new(
        base_url: &str,
        owner: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| SyncError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("card-relay/0.3"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            owner: owner.into(),
            token: token.into(),
        })
    }

    /// Organization that owns the repositories.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, repo: &str, path: &str) -> SyncResult<Url> {
        let mut segments = vec!["repos", self.owner.as_str(), repo, "contents"];
        segments.extend(path.split('/'));
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    /// Map rate limiting and generic failures; success passes through.
    async fn check(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let Some(retry_after) = rate_limit_wait(&response) {
            warn!(
                "GitHub rate limit hit, retry in {}s",
                retry_after.as_secs()
            );
            return Err(SyncError::RateLimited { retry_after });
        }
        Err(Self::api_error(status, response).await)
    }

    async fn api_error(status: StatusCode, response: Response) -> SyncError {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .map_or_else(|_| common::truncate_chars(&body, 300), |m| m.message);
        SyncError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// How long to wait when the response is a rate-limit rejection.
fn rate_limit_wait(response: &Response) -> Option<Duration> {
    let status = response.status();
    let headers = response.headers();
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    };

    let exhausted = header_u64("x-ratelimit-remaining") == Some(0);
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (exhausted || headers.contains_key("retry-after")));
    if !limited {
        return None;
    }

    if let Some(secs) = header_u64("retry-after") {
        return Some(Duration::from_secs(secs));
    }
    let wait = header_u64("x-ratelimit-reset").and_then(|reset| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        Some(Duration::from_secs(reset.saturating_sub(now)))
    });
    Some(wait.unwrap_or(DEFAULT_RATE_LIMIT_WAIT))
}

fn is_sha_mismatch(status: StatusCode, message: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.to_lowercase().contains("sha"))
}

fn decode_content(content: &ContentResponse) -> SyncResult<Option<String>> {
    if content.encoding != "base64" {
        return Ok(None);
    }
    let compact: String = content
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| SyncError::Decode(format!("base64 content: {e}")))?;
    Ok(String::from_utf8(bytes).ok())
}

#[async_trait]
impl RepositoryRemote for GitHubClient {
    async fn repository(&self, repo: &str) -> SyncResult<Option<RepoInfo>> {
        let url = self.url(&["repos", self.owner.as_str(), repo])?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let info = response
            .json::<RepoInfo>()
            .await
            .map_err(|e| SyncError::Decode(format!("repository: {e}")))?;
        Ok(Some(info))
    }

    async fn create_repository(&self, repo: &str, description: &str) -> SyncResult<RepoInfo> {
        let url = self.url(&["orgs", self.owner.as_str(), "repos"])?;
        let body = CreateRepoRequest {
            name: repo,
            description,
            private: false,
            auto_init: true,
        };
        let response = self.request(Method::POST, url).json(&body).send().await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            // Created concurrently by another run
            let error = Self::api_error(StatusCode::UNPROCESSABLE_ENTITY, response).await;
            return match self.repository(repo).await? {
                Some(info) => Ok(info),
                None => Err(error),
            };
        }

        let response = Self::check(response).await?;
        let info = response
            .json::<RepoInfo>()
            .await
            .map_err(|e| SyncError::Decode(format!("created repository: {e}")))?;
        info!("Created repository {}/{}", self.owner, repo);
        Ok(info)
    }

    async fn list_tree(&self, repo: &str, branch: &str) -> SyncResult<Vec<String>> {
        let mut url = self.url(&["repos", self.owner.as_str(), repo, "git", "trees", branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let response = self.request(Method::GET, url).send().await?;

        // Empty repositories answer 409, unborn branches 404
        if matches!(
            response.status(),
            StatusCode::CONFLICT | StatusCode::NOT_FOUND
        ) {
            debug!("{}/{}@{} has no tree yet", self.owner, repo, branch);
            return Ok(Vec::new());
        }

        let response = Self::check(response).await?;
        let tree = response
            .json::<TreeResponse>()
            .await
            .map_err(|e| SyncError::Decode(format!("tree: {e}")))?;
        if tree.truncated {
            warn!("Tree listing for {}/{} was truncated by GitHub", self.owner, repo);
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    async fn get_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> SyncResult<Option<RemoteFile>> {
        let mut url = self.contents_url(repo, path)?;
        url.query_pairs_mut().append_pair("ref", branch);
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check(response).await?;
        let value = response
            .json::<Value>()
            .await
            .map_err(|e| SyncError::Decode(format!("contents of {path}: {e}")))?;
        if value.is_array() {
            return Err(SyncError::NotAFile {
                path: path.to_string(),
            });
        }
        let content: ContentResponse = serde_json::from_value(value)
            .map_err(|e| SyncError::Decode(format!("contents of {path}: {e}")))?;
        if content.kind != "file" {
            return Err(SyncError::NotAFile {
                path: path.to_string(),
            });
        }

        Ok(Some(RemoteFile {
            text: decode_content(&content)?,
            content_hash: content.sha,
        }))
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        request: PutFile<'_>,
    ) -> SyncResult<String> {
        let url = self.contents_url(repo, path)?;
        let body = PutRequest {
            message: request.message,
            content: BASE64.encode(request.content),
            branch,
            sha: request.expected_hash,
        };
        let response = self.request(Method::PUT, url).json(&body).send().await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Err(match Self::api_error(status, response).await {
                SyncError::Api { message, .. } if is_sha_mismatch(status, &message) => {
                    SyncError::Conflict {
                        path: path.to_string(),
                    }
                }
                other => other,
            });
        }

        let response = Self::check(response).await?;
        let put = response
            .json::<PutResponse>()
            .await
            .map_err(|e| SyncError::Decode(format!("commit for {path}: {e}")))?;
        Ok(put.content.sha)
    }

    async fn delete_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        expected_hash: &str,
        message: &str,
    ) -> SyncResult<()> {
        let url = self.contents_url(repo, path)?;
        let body = DeleteRequest {
            message,
            sha: expected_hash,
            branch,
        };
        let response = self.request(Method::DELETE, url).json(&body).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(path.to_string()));
        }
        if matches!(
            status,
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Err(match Self::api_error(status, response).await {
                SyncError::Api { message, .. } if is_sha_mismatch(status, &message) => {
                    SyncError::Conflict {
                        path: path.to_string(),
                    }
                }
                other => other,
            });
        }

        Self::check(response).await?;
        Ok(())
    }
}
